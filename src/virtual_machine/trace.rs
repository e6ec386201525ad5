//! Verbose execution narration.
//!
//! When tracing is enabled the machine describes every executed
//! instruction on stdout: a `#address $ MNEMONIC [operand]` header plus
//! one line per observable effect (value pushed, popped, or stored; jump
//! taken; frame pushed or popped).
//!
//! In stepping mode (interactive front end) the header is printed before
//! the instruction runs and the tracer blocks on a newline from stdin; in
//! running mode everything is printed after the instruction, without
//! blocking. Tracing never alters machine state.

use crate::virtual_machine::isa::Instr;
use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::io::{self, Write as _};

pub struct Tracer {
    stepping: bool,
    banner_shown: Cell<bool>,
    pending: RefCell<Vec<String>>,
}

impl Tracer {
    /// Creates a tracer; `stepping` enables the blocking prompt.
    pub fn new(stepping: bool) -> Self {
        Self {
            stepping,
            banner_shown: Cell::new(false),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Queues one effect line for the instruction being executed.
    pub(crate) fn note(&self, message: String) {
        self.pending.borrow_mut().push(message);
    }

    /// Called before an instruction executes.
    pub(crate) fn begin(&self, instr: &Instr) {
        if !self.stepping {
            return;
        }
        if !self.banner_shown.replace(true) {
            println!("SLang VM opcode-level debugger");
            println!("======================================");
        }
        println!("======================================");
        print!("{} > ", header(instr));
        let _ = io::stdout().flush();
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    }

    /// Called after an instruction executed; prints the header (running
    /// mode) and flushes the queued effect lines.
    pub(crate) fn finish(&self, instr: &Instr) {
        if !self.stepping {
            println!("{}", header(instr));
        }
        for line in self.pending.borrow_mut().drain(..) {
            println!("{line}");
        }
    }
}

/// Renders the `#address $ MNEMONIC [operand]` header.
fn header(instr: &Instr) -> String {
    let mut out = String::new();
    let _ = write!(out, "#{} $ {}", instr.address, instr.opcode);
    if instr.opcode.operand_count() == 1 {
        let _ = write!(out, " {}", instr.operand);
    }
    out
}
