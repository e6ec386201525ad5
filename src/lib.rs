//! SLang virtual machine library.
//!
//! Provides the bytecode execution engine, the container codec, and the
//! assembler/disassembler used by the `svm` command-line front end.

pub mod utils;
pub mod virtual_machine;
