use thiserror::Error;

/// Errors that can occur during loading, assembly, or execution.
#[derive(Debug, Error)]
pub enum VMError {
    /// Unknown numeric opcode in a compiled container.
    #[error("invalid opcode: {0}")]
    InvalidOpcode(i64),
    /// Unrecognized instruction mnemonic in assembly input.
    #[error("invalid instruction name: {0}")]
    InvalidMnemonic(String),
    /// Container magic did not match after decoding.
    #[error("container magic mismatch")]
    InvalidMagic,
    /// A token could not be parsed as the expected kind of value.
    #[error("malformed token {token:?}: expected {expected}")]
    MalformedToken {
        token: String,
        expected: &'static str,
    },
    /// The token stream ended in the middle of a record.
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEndOfInput(&'static str),
    /// The instruction table is full.
    #[error("instruction count exceeds the {0} instruction limit")]
    TooManyInstructions(usize),
    /// A record carried a logical address outside the supported range.
    #[error("instruction address {0} out of range")]
    AddressOutOfRange(i64),
    /// A jump or call targeted an address with no instruction.
    #[error("jump target {0} does not map to an instruction")]
    UndefinedJumpTarget(i64),
    /// An operand push exceeded the per-stack slot limit.
    #[error("operand stack overflow (limit {0})")]
    OperandStackOverflow(usize),
    /// An operand pop found the active stack empty.
    #[error("operand stack underflow")]
    OperandStackUnderflow,
    /// `RET` executed with no frame on the control stack.
    #[error("return without an active frame")]
    ReturnWithoutFrame,
    /// `RET` executed but no `CALL` ever recorded a return address.
    #[error("return without call")]
    ReturnWithoutCall,
    /// A frame-scoped opcode executed at global scope.
    #[error("{0} requires an active frame")]
    NoActiveFrame(&'static str),
    /// A variable or constant table access was out of bounds.
    #[error("{table} index {index} out of bounds (size {size})")]
    SlotIndexOutOfBounds {
        table: &'static str,
        index: i64,
        size: usize,
    },
    /// A table slot was read before anything was stored in it.
    #[error("{table} slot {index} read before initialization")]
    UnsetSlot { table: &'static str, index: i64 },
    /// An array subscript was outside the array bounds.
    #[error("subscript {index} out of bounds for array[{size}]")]
    SubscriptOutOfBounds { index: i64, size: usize },
    /// A subscript opcode found a non-array where the array belongs.
    #[error("subscript target {0} is not an array")]
    NotAnArray(String),
    /// An opcode needed an integer operand on the stack and found none.
    #[error("expected an int on the operand stack, got {0}")]
    ExpectedInt(String),
    /// A size operand (`VMALLOC`, `CMALLOC`, array length) was negative.
    #[error("invalid allocation size {0}")]
    InvalidAllocationSize(i64),
    /// Unknown binary operator code.
    #[error("invalid binary operator code {0}")]
    InvalidBinaryOp(i64),
    /// Unknown unary operator code.
    #[error("invalid unary operator code {0}")]
    InvalidUnaryOp(i64),
    /// File or stream I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
