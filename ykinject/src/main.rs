//! Splice a recorded trace into a program.
//!
//! The trace is read from a file which may contain arbitrary tracer output before the trace
//! itself. The program is read from stdin (or `--program`) and the spliced program is written to
//! stdout (or `--output`).

use clap::{Parser, ValueEnum};
use std::{
    error::Error,
    fs::{read_to_string, write},
    io::{stdin, stdout, Read, Write},
    path::PathBuf,
    process::exit,
};
use yksplice::{
    codec,
    log::{Log, Verbosity},
    Splicer,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Emit {
    /// Bril JSON.
    Json,
    /// A human-readable listing.
    Text,
}

/// Install a recorded trace as a guarded fast path at the entry of the function it was recorded
/// in.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// The tracer's output, containing a `{"func": ..., "trace": [...]}` object.
    trace: PathBuf,

    /// Read the program from this file rather than stdin.
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// Write the spliced program to this file rather than stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// The format to write the spliced program in.
    #[arg(short, long, value_enum, default_value_t = Emit::Json)]
    emit: Emit,
}

fn inner(args: &Args, log: &Log) -> Result<(), Box<dyn Error>> {
    let raw = read_to_string(&args.trace)
        .map_err(|e| format!("could not read trace file {}: {e}", args.trace.display()))?;
    let trace = codec::decode_trace(&raw)?;

    let prog = match &args.program {
        Some(p) => read_to_string(p)
            .map_err(|e| format!("could not read program file {}: {e}", p.display()))?,
        None => {
            let mut s = String::new();
            stdin()
                .read_to_string(&mut s)
                .map_err(|e| format!("could not read program from stdin: {e}"))?;
            s
        }
    };
    let prog = codec::decode_program(&prog)?;

    let prog = Splicer::new(log).splice(prog, &trace)?;
    let out = match args.emit {
        Emit::Json => codec::encode_program(&prog)?,
        Emit::Text => prog.to_string(),
    };
    match &args.output {
        Some(p) => write(p, out)
            .map_err(|e| format!("could not write output file {}: {e}", p.display()))?,
        None => stdout().write_all(out.as_bytes())?,
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let log = match Log::new() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("error: {e}");
            exit(1);
        }
    };
    if let Err(e) = inner(&args, &log) {
        log.log(Verbosity::Error, &e.to_string());
        exit(1);
    }
}
