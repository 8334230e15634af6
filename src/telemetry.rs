//! Per-operation telemetry.
//!
//! The dispatch loop emits one [`OpRecord`] per executed opcode when a sink
//! is configured and does nothing otherwise. Batching is the sink's concern,
//! not the core's: the bundled [`JsonLinesSink`] commits every
//! [`JsonLinesSink::COMMIT_INTERVAL`] records, and the VM requests a final
//! commit when the top-level invocation returns.

use std::io::Write;

use serde::Serialize;

/// One structured log record for one executed operation.
#[derive(Debug, Clone, Serialize)]
pub struct OpRecord {
    pub op_num: u64,
    pub run_id: u32,
    pub pc: u64,
    pub op_code: u8,
    pub op_name: &'static str,
    /// Named operand fields, varying by opcode.
    pub fields: Vec<(&'static str, u64)>,
}

/// A write-only destination for operation records.
pub trait OpSink {
    fn record(&mut self, rec: &OpRecord);
    /// Makes buffered records durable. Called by the VM on final return and
    /// on close; sinks may also commit on their own cadence.
    fn commit(&mut self);
}

/// Serializes records as one JSON object per line. Writes are best-effort:
/// a failed write must not disturb execution.
pub struct JsonLinesSink<W: Write> {
    out: W,
    pending: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub const COMMIT_INTERVAL: usize = 10_000;

    pub fn new(out: W) -> Self {
        Self { out, pending: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OpSink for JsonLinesSink<W> {
    fn record(&mut self, rec: &OpRecord) {
        if serde_json::to_writer(&mut self.out, rec).is_err() {
            return;
        }
        let _ = self.out.write_all(b"\n");
        self.pending += 1;
        if self.pending >= Self::COMMIT_INTERVAL {
            self.commit();
        }
    }

    fn commit(&mut self) {
        let _ = self.out.flush();
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64) -> OpRecord {
        OpRecord {
            op_num: n,
            run_id: 7,
            pc: 3,
            op_code: 0x6A,
            op_name: "i32.add",
            fields: vec![("stack_depth", 2)],
        }
    }

    #[test]
    fn records_serialize_one_json_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.record(&record(0));
        sink.record(&record(1));
        sink.commit();
        let out = sink.into_inner();
        let lines: Vec<&[u8]> = out.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_slice(lines[0]).unwrap();
        assert_eq!(v["op_name"], "i32.add");
        assert_eq!(v["run_id"], 7);
    }
}
