//! Bytecode container format and token codec.
//!
//! A compiled container is a whitespace-separated token stream prefixed by
//! the magic token [`MAGIC`], optionally obfuscated by XORing every byte
//! (magic included) with a repeating password. After the magic, the stream
//! is a sequence of records:
//!
//! - `n CMALLOC k` sizes the constant pool
//! - `i CONSTANT t v r` fills constant `i` of type `t` (0 int, 1 float,
//!   2 char) with value token `v` and initial refcount `r`
//! - `a OP [operand]` is a runtime instruction at logical address `a`
//!
//! The same record grammar, with mnemonics instead of numeric opcodes, is
//! the assembly form consumed by the assembler and by interactive mode. An
//! address of `-1` is the interactive sentinel that re-enters dispatch.
//!
//! [`Record`] is the unit shared by the loader, the assembler, and the
//! disassembler; the `CONSTANT` value is kept as its raw token so the
//! assemble/disassemble round trip reproduces it verbatim.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instr, Opcode};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io;

/// Magic token identifying a compiled container.
pub const MAGIC: &str = "80JF34R9S";

/// Applies the repeating-key XOR obfuscation in place.
///
/// An empty password leaves the data untouched. The transform is its own
/// inverse under the same password.
pub fn xor_cipher(data: &mut [u8], password: &[u8]) {
    if password.is_empty() {
        return;
    }
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= password[i % password.len()];
    }
}

/// Decodes container bytes and verifies the magic.
///
/// Returns the token stream after the magic. Any decode failure (magic
/// mismatch, or the non-text bytes a wrong password produces) reports
/// [`VMError::InvalidMagic`], which the front ends treat as a silent
/// rejection.
pub fn decode(mut bytes: Vec<u8>, password: &str) -> Result<String, VMError> {
    xor_cipher(&mut bytes, password.as_bytes());
    let text = String::from_utf8(bytes).map_err(|_| VMError::InvalidMagic)?;
    let rest = text
        .trim_start()
        .strip_prefix(MAGIC)
        .ok_or(VMError::InvalidMagic)?;
    if !rest.is_empty() && !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        return Err(VMError::InvalidMagic);
    }
    Ok(rest.to_string())
}

/// Prefixes the magic and applies the obfuscation, yielding container bytes.
pub fn encode(body: &str, password: &str) -> Vec<u8> {
    let mut text = String::with_capacity(MAGIC.len() + 1 + body.len());
    text.push_str(MAGIC);
    if !body.is_empty() {
        text.push(' ');
        text.push_str(body);
    }
    let mut bytes = text.into_bytes();
    xor_cipher(&mut bytes, password.as_bytes());
    bytes
}

/// How opcode tokens are written in a stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseMode {
    /// Compiled containers: opcodes by number.
    Numeric,
    /// Assembly source and interactive input: opcodes by mnemonic.
    Mnemonic,
}

/// One parsed record of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// The interactive `-1` sentinel: run dispatch on what is loaded.
    Dispatch,
    /// A `CONSTANT` record. `value` is the raw token, parsed by type only
    /// when it reaches the machine.
    Constant {
        index: i64,
        ty: i64,
        value: String,
        refs: i64,
    },
    /// A runtime instruction (including `CMALLOC`, which the loader
    /// consumes instead of adding to the table).
    Instr(Instr),
}

/// Producer of whitespace-separated tokens.
pub trait TokenSource {
    /// Returns the next token, or `None` at end of input.
    fn next_token(&mut self) -> Result<Option<String>, VMError>;
}

/// Token source over an in-memory string (file-based modes).
pub struct StrTokens<'a> {
    iter: std::str::SplitAsciiWhitespace<'a>,
}

impl<'a> StrTokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_ascii_whitespace(),
        }
    }
}

impl TokenSource for StrTokens<'_> {
    fn next_token(&mut self) -> Result<Option<String>, VMError> {
        Ok(self.iter.next().map(str::to_string))
    }
}

/// Token source pulling lines from stdin on demand (interactive mode).
///
/// Stdin is locked per line, not for the source's lifetime, because the
/// stepping tracer reads its pause input from the same stream between
/// records.
#[derive(Default)]
pub struct StdinTokens {
    pending: VecDeque<String>,
}

impl StdinTokens {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenSource for StdinTokens {
    fn next_token(&mut self) -> Result<Option<String>, VMError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_ascii_whitespace().map(str::to_string));
        }
    }
}

/// Parses a token as a signed integer.
pub(crate) fn parse_int(token: &str, expected: &'static str) -> Result<i64, VMError> {
    token.parse::<i64>().map_err(|_| VMError::MalformedToken {
        token: token.to_string(),
        expected,
    })
}

fn require<S: TokenSource>(tokens: &mut S, expected: &'static str) -> Result<String, VMError> {
    tokens
        .next_token()?
        .ok_or(VMError::UnexpectedEndOfInput(expected))
}

/// Reads the next record from a token stream, or `None` at end of input.
pub fn read_record<S: TokenSource>(
    tokens: &mut S,
    mode: ParseMode,
) -> Result<Option<Record>, VMError> {
    let Some(addr_token) = tokens.next_token()? else {
        return Ok(None);
    };
    let address = parse_int(&addr_token, "an instruction address")?;
    if address == -1 {
        return Ok(Some(Record::Dispatch));
    }

    let opcode_token = require(tokens, "an opcode")?;
    let opcode = match mode {
        ParseMode::Numeric => Opcode::try_from(parse_int(&opcode_token, "a numeric opcode")?)?,
        ParseMode::Mnemonic => Opcode::from_mnemonic(&opcode_token)?,
    };

    if opcode == Opcode::Constant {
        let ty = parse_int(&require(tokens, "a constant type")?, "a constant type")?;
        let value = require(tokens, "a constant value")?;
        let refs = parse_int(
            &require(tokens, "a constant refcount")?,
            "a constant refcount",
        )?;
        return Ok(Some(Record::Constant {
            index: address,
            ty,
            value,
            refs,
        }));
    }

    let instr = if opcode.operand_count() == 1 {
        let operand = parse_int(&require(tokens, "an operand")?, "an integer operand")?;
        Instr::with_operand(address, opcode, operand)
    } else {
        Instr::plain(address, opcode)
    };
    Ok(Some(Record::Instr(instr)))
}

/// Appends a record's tokens to `out`, separated by single spaces.
pub fn write_record(out: &mut String, record: &Record, mode: ParseMode) {
    match record {
        Record::Dispatch => out.push_str("-1"),
        Record::Constant {
            index,
            ty,
            value,
            refs,
        } => {
            let _ = match mode {
                ParseMode::Numeric => {
                    write!(out, "{index} {} {ty} {value} {refs}", Opcode::Constant as i64)
                }
                ParseMode::Mnemonic => {
                    write!(out, "{index} {} {ty} {value} {refs}", Opcode::Constant)
                }
            };
        }
        Record::Instr(instr) => {
            let _ = match mode {
                ParseMode::Numeric => write!(out, "{} {}", instr.address, instr.opcode as i64),
                ParseMode::Mnemonic => write!(out, "{} {}", instr.address, instr.opcode),
            };
            if instr.opcode.operand_count() == 1 {
                let _ = write!(out, " {}", instr.operand);
            }
        }
    }
}
