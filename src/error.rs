use thiserror::Error;

/// Runtime guest faults. A trap terminates the current top-level invocation;
/// it is unrecoverable within the activation that raised it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable")]
    Unreachable,
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    #[error("indirect call type mismatch")]
    SignatureMismatch,
    #[error("undefined element")]
    UndefinedElementIndex,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
}

/// Embedder-facing errors. These are returned from the public API, never
/// raised from inside a running function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The module declares more than one entry in the linear memory space.
    #[error("more than one linear memory in module")]
    MultipleLinearMemories,
    /// The argument count passed to `exec_code` does not match the entry
    /// function's parameter count.
    #[error("invalid number of arguments to function")]
    InvalidArgumentCount,
    /// The entry function declares a result outside the four value types.
    /// Unreachable through the typed module contract; kept so embedders can
    /// match the full error surface.
    #[error("function has invalid return value type: {0}")]
    InvalidReturnType(i8),
    /// The function index does not name a compiled function.
    #[error("invalid index to function index space: {0}")]
    InvalidFunctionIndex(usize),
    #[error(transparent)]
    Trap(#[from] Trap),
}
