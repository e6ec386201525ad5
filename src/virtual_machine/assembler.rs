//! Assembler and disassembler.
//!
//! Assembly source is the mnemonic form of the container's record grammar:
//! whitespace-separated `address MNEMONIC [operand]` records (and
//! `index CONSTANT type value refcount` for constants). Assembling
//! resolves mnemonics to numeric opcodes, copies every operand token
//! verbatim, prefixes the magic, and applies the XOR obfuscation.
//! Disassembling is the exact inverse, one record per output line, so
//! assembling a disassembly reproduces the original container up to
//! whitespace.

use crate::virtual_machine::container::{
    self, ParseMode, StrTokens, read_record, write_record,
};
use crate::virtual_machine::errors::VMError;
use std::fs;
use std::path::Path;

/// Compiles mnemonic source into the container body (numeric tokens,
/// without magic or obfuscation).
pub fn assemble_source(source: &str) -> Result<String, VMError> {
    let mut tokens = StrTokens::new(source);
    let mut body = String::new();
    while let Some(record) = read_record(&mut tokens, ParseMode::Mnemonic)? {
        if !body.is_empty() {
            body.push(' ');
        }
        write_record(&mut body, &record, ParseMode::Numeric);
    }
    Ok(body)
}

/// Assembles a source file into an obfuscated container file.
pub fn assemble_file(input: &Path, output: &Path, password: &str) -> Result<(), VMError> {
    let source = fs::read_to_string(input)?;
    let body = assemble_source(&source)?;
    fs::write(output, container::encode(&body, password))?;
    Ok(())
}

/// Renders a container body as mnemonic records, one per line.
pub fn disassemble_source(body: &str) -> Result<String, VMError> {
    let mut tokens = StrTokens::new(body);
    let mut out = String::new();
    while let Some(record) = read_record(&mut tokens, ParseMode::Numeric)? {
        write_record(&mut out, &record, ParseMode::Mnemonic);
        out.push('\n');
    }
    Ok(out)
}

/// Decodes and disassembles a container file.
pub fn disassemble_file(path: &Path, password: &str) -> Result<String, VMError> {
    let bytes = fs::read(path)?;
    let body = container::decode(bytes, password)?;
    disassemble_source(&body)
}
