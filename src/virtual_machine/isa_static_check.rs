//! Static checks for ISA stability.
//!
//! The numeric opcodes, mnemonics, and operand counts are the on-disk
//! container encoding. These tests pin every one of them so an accidental
//! edit to the opcode list fails loudly instead of corrupting containers.
