//! SLang virtual machine CLI.
//!
//! Runs, disassembles, assembles, or interactively interprets SLang
//! bytecode containers.
//!
//! # Usage
//! ```text
//! svm -r <file.slb> [-v] [-p password]    Run a compiled container
//! svm -d <file.slb> [-p password]         Disassemble a container
//! svm -a <file.txt> -o <file.slb> [-p password]   Assemble mnemonic source
//! svm -i [-v]                             Interactive mode (stdin)
//! ```
//!
//! The XOR password defaults to the `SVM_PASSWORD` environment variable
//! when `-p` is absent, and to no obfuscation when neither is set.

use std::env;
use std::path::Path;
use std::process;
use svm::virtual_machine::assembler;
use svm::virtual_machine::errors::VMError;
use svm::virtual_machine::machine;
use svm::{error, warn};

/// Selected invocation mode.
enum Mode {
    Run(String),
    Disassemble(String),
    Assemble(String),
    Interact,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        print_usage(&args[0]);
        return;
    }

    let mut mode: Option<Mode> = None;
    let mut output_path: Option<String> = None;
    let mut password: Option<String> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-r" | "-d" | "-a" => {
                let flag = args[i].clone();
                i += 1;
                if i >= args.len() {
                    eprintln!("{flag} requires a file path");
                    process::exit(1);
                }
                let path = args[i].clone();
                mode = Some(match flag.as_str() {
                    "-r" => Mode::Run(path),
                    "-d" => Mode::Disassemble(path),
                    _ => Mode::Assemble(path),
                });
                i += 1;
            }
            "-i" => {
                mode = Some(Mode::Interact);
                i += 1;
            }
            "-o" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-o requires a file path");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "-p" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-p requires a password");
                    process::exit(1);
                }
                password = Some(args[i].clone());
                i += 1;
            }
            "-v" => {
                verbose = true;
                i += 1;
            }
            other => {
                // unknown options are ignored
                warn!("ignoring unknown option: {other}");
                i += 1;
            }
        }
    }

    let Some(mode) = mode else {
        print_usage(&args[0]);
        process::exit(1);
    };

    let password = password
        .or_else(|| env::var("SVM_PASSWORD").ok())
        .unwrap_or_default();

    let result = match mode {
        Mode::Run(path) => machine::run_file(Path::new(&path), verbose, &password),
        Mode::Disassemble(path) => {
            assembler::disassemble_file(Path::new(&path), &password).map(|listing| {
                print!("{listing}");
            })
        }
        Mode::Assemble(input) => {
            let Some(output) = output_path else {
                eprintln!("-a requires an output path (-o)");
                process::exit(1);
            };
            assembler::assemble_file(Path::new(&input), Path::new(&output), &password)
        }
        Mode::Interact => machine::interact(verbose),
    };

    match result {
        Ok(()) => {}
        // a container that fails magic verification is rejected silently
        Err(VMError::InvalidMagic) => {}
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

const USAGE: &str = "\
SLang Virtual Machine

USAGE:
    {program} -r <file.slb> [-v] [-p password]
    {program} -d <file.slb> [-p password]
    {program} -a <file.txt> -o <file.slb> [-p password]
    {program} -i [-v]

MODES:
    -r <file>    Run a compiled bytecode container
    -d <file>    Disassemble a container to stdout
    -a <file>    Assemble mnemonic source into a container (requires -o)
    -i           Interactive mode: read records from stdin; an address of
                 -1 runs what has been loaded so far

OPTIONS:
    -o <file>    Output path for -a
    -p <pass>    XOR obfuscation password (default: $SVM_PASSWORD, else none)
    -v           Verbose: narrate each instruction (-i: step with Enter)
    -h, --help   Print this help message
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
