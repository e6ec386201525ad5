//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the
//! canonical opcode list and invokes a callback macro for code generation,
//! so the loader, assembler, disassembler, and tracer all share one
//! definition. This module generates:
//!
//! - The [`Opcode`] enum, whose discriminants are the numeric codes used by
//!   compiled containers
//! - `TryFrom<i64>` for decoding numeric opcodes
//! - [`Opcode::mnemonic`] and [`Opcode::from_mnemonic`] for the assembly form
//! - [`Opcode::operand_count`] (every opcode takes 0 or 1 integer operand)
//!
//! `CONSTANT` and `CMALLOC` records exist only in containers; the loader
//! consumes them and they never reach the instruction table. `CONSTANT`
//! records additionally carry a type/value/refcount triple handled by the
//! [`container`](super::container) codec.

use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Invokes a callback macro with the complete opcode definition list.
///
/// Entry shape: `Name = code, "MNEMONIC", operand_count`. The numeric codes
/// are the on-disk encoding and must never be renumbered.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// CMALLOC n ; size the constant pool (consumed by the loader)
            Cmalloc = 0, "CMALLOC", 1,
            /// VMALLOC n ; size the current scope's variable table
            Vmalloc = 1, "VMALLOC", 1,
            /// CONSTANT t v r ; populate a constant (consumed by the loader)
            Constant = 2, "CONSTANT", 0,
            /// NOOP ; no effect
            Noop = 3, "NOOP", 0,
            /// POP_OP ; discard the top operand
            PopOp = 4, "POP_OP", 0,
            /// LOAD_NULL ; push the void sentinel
            LoadNull = 5, "LOAD_NULL", 0,
            /// LOAD_CONSTANT i ; push constants[i]
            LoadConstant = 6, "LOAD_CONSTANT", 1,
            /// LOAD_NAME i ; push locals[i]
            LoadName = 7, "LOAD_NAME", 1,
            /// LOAD_NAME_GLOBAL i ; push globals[i]
            LoadNameGlobal = 8, "LOAD_NAME_GLOBAL", 1,
            /// LOAD_INT v ; push a fresh int slot
            LoadInt = 9, "LOAD_INT", 1,
            /// LOAD_FLOAT v ; push a fresh float slot (operand is integer-encoded)
            LoadFloat = 10, "LOAD_FLOAT", 1,
            /// LOAD_CHAR v ; push a fresh char slot (operand is integer-encoded)
            LoadChar = 11, "LOAD_CHAR", 1,
            /// BINARY_SUBSCR ; pop index and array, push the addressed cell
            BinarySubscr = 12, "BINARY_SUBSCR", 0,
            /// STORE_SUBSCR ; pop value, index, array; write into the cell
            StoreSubscr = 13, "STORE_SUBSCR", 0,
            /// STORE_SUBSCR_INPLACE ; as STORE_SUBSCR but the array stays on the stack
            StoreSubscrInplace = 14, "STORE_SUBSCR_INPLACE", 0,
            /// STORE_SUBSCR_NOPOP ; as STORE_SUBSCR but the value is pushed back
            StoreSubscrNopop = 15, "STORE_SUBSCR_NOPOP", 0,
            /// STORE_NAME i ; pop into locals[i]
            StoreName = 16, "STORE_NAME", 1,
            /// STORE_NAME_GLOBAL i ; pop into globals[i]
            StoreNameGlobal = 17, "STORE_NAME_GLOBAL", 1,
            /// STORE_NAME_NOPOP i ; peek into locals[i]
            StoreNameNopop = 18, "STORE_NAME_NOPOP", 1,
            /// STORE_NAME_GLOBAL_NOPOP i ; peek into globals[i]
            StoreNameGlobalNopop = 19, "STORE_NAME_GLOBAL_NOPOP", 1,
            /// BUILD_ARR t ; pop length, push a zeroed array of element type t
            BuildArr = 20, "BUILD_ARR", 1,
            /// BINARY_OP b ; pop right and left, push the operator result
            BinaryOp = 21, "BINARY_OP", 1,
            /// UNARY_OP u ; pop the operand, apply the unary operator
            UnaryOp = 22, "UNARY_OP", 1,
            /// JMP a ; continue at logical address a
            Jmp = 23, "JMP", 1,
            /// JMP_TRUE a ; pop v, jump if v is a nonzero int
            JmpTrue = 24, "JMP_TRUE", 1,
            /// JMP_FALSE a ; pop v, jump if v is a zero int
            JmpFalse = 25, "JMP_FALSE", 1,
            /// PUSH ; push a fresh frame onto the control stack
            Push = 26, "PUSH", 0,
            /// RET ; return the top operand to the caller and tear the frame down
            Ret = 27, "RET", 0,
            /// CALL a ; record the return address and continue at a
            Call = 28, "CALL", 1,
            /// LOAD_GLOBAL ; move the top of the global operand stack here
            LoadGlobal = 29, "LOAD_GLOBAL", 0,
            /// STORE_GLOBAL ; move the top operand onto the global operand stack
            StoreGlobal = 30, "STORE_GLOBAL", 0,
            /// HALT ; terminate execution
            Halt = 31, "HALT", 0,
            /// PRINTK ; pop the top operand and print it
            Printk = 32, "PRINTK", 0,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal, $operands:literal
        ),* $(,)?
    ) => {
        /// A VM opcode. Discriminants are the container's numeric codes.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl TryFrom<i64> for Opcode {
            type Error = VMError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidOpcode(value)),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the number of integer operands this opcode carries
            /// in the instruction stream (0 or 1).
            pub const fn operand_count(&self) -> usize {
                match self {
                    $( Opcode::$name => $operands, )*
                }
            }

            /// Resolves an assembly mnemonic to its opcode.
            pub fn from_mnemonic(name: &str) -> Result<Self, VMError> {
                match name {
                    $( $mnemonic => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidMnemonic(name.to_string())),
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction: logical address, opcode, and its operand.
///
/// `operand` is 0 for zero-operand opcodes; [`Opcode::operand_count`] tells
/// the codec and the tracer whether it is meaningful.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Instr {
    pub address: i64,
    pub opcode: Opcode,
    pub operand: i64,
}

impl Instr {
    /// Creates an instruction with an operand.
    pub fn with_operand(address: i64, opcode: Opcode, operand: i64) -> Self {
        Self {
            address,
            opcode,
            operand,
        }
    }

    /// Creates a zero-operand instruction.
    pub fn plain(address: i64, opcode: Opcode) -> Self {
        Self {
            address,
            opcode,
            operand: 0,
        }
    }
}

/// Binary operator codes carried by `BINARY_OP`.
///
/// Arithmetic on two ints stays int; any float operand promotes the result
/// to float. Bitwise operators and modulo require int/int. Comparisons
/// yield int 0/1. Operand tag combinations outside these rules leave the
/// result void (legacy behavior, see the error-handling notes).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Mod = 3,
    Div = 4,
    And = 5,
    Or = 6,
    Shl = 7,
    Shr = 8,
    Xor = 9,
    Lt = 10,
    Le = 11,
    Gt = 12,
    Ge = 13,
    Eq = 14,
    Ne = 15,
}

impl TryFrom<i64> for BinOp {
    type Error = VMError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Mod,
            4 => BinOp::Div,
            5 => BinOp::And,
            6 => BinOp::Or,
            7 => BinOp::Shl,
            8 => BinOp::Shr,
            9 => BinOp::Xor,
            10 => BinOp::Lt,
            11 => BinOp::Le,
            12 => BinOp::Gt,
            13 => BinOp::Ge,
            14 => BinOp::Eq,
            15 => BinOp::Ne,
            _ => return Err(VMError::InvalidBinaryOp(value)),
        })
    }
}

/// Unary operator codes carried by `UNARY_OP`.
///
/// `Inc`/`Dec` mutate the popped slot in place through its shared handle
/// and push nothing; `Not`/`Neg` push a fresh result slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnOp {
    Not = 0,
    Neg = 1,
    Inc = 2,
    Dec = 3,
}

impl TryFrom<i64> for UnOp {
    type Error = VMError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => UnOp::Not,
            1 => UnOp::Neg,
            2 => UnOp::Inc,
            3 => UnOp::Dec,
            _ => return Err(VMError::InvalidUnaryOp(value)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            Opcode::try_from(33),
            Err(VMError::InvalidOpcode(33))
        ));
        assert!(matches!(
            Opcode::try_from(-2),
            Err(VMError::InvalidOpcode(-2))
        ));
    }

    #[test]
    fn mnemonic_round_trip() {
        for code in 0..=32 {
            let opcode = Opcode::try_from(code).unwrap();
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()).unwrap(), opcode);
        }
    }

    #[test]
    fn unknown_mnemonic_rejected() {
        assert!(matches!(
            Opcode::from_mnemonic("LOAD_STRING"),
            Err(VMError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn operator_codes() {
        assert_eq!(BinOp::try_from(0).unwrap(), BinOp::Add);
        assert_eq!(BinOp::try_from(15).unwrap(), BinOp::Ne);
        assert!(BinOp::try_from(16).is_err());
        assert_eq!(UnOp::try_from(3).unwrap(), UnOp::Dec);
        assert!(UnOp::try_from(4).is_err());
    }
}
