//! Splice recorded traces into programs as speculative fast paths.
//!
//! A tracer records the instructions executed along one hot path through a function, with guards
//! where the path depended on a condition. [Splicer::splice] installs such a [Trace] at the entry
//! of the function it was recorded in:
//!
//!   * the trace, bracketed by `speculate` and `commit`, becomes the *fast path* and takes over the
//!     function's entry label;
//!   * the original body becomes the *slow path*, and every guard in the trace fails to it;
//!   * a join label after the slow path is where the fast path continues after committing.
//!
//! Splicing is a pure transform over owned values: it performs no I/O (other than logging), has
//! no global state, and either replaces exactly one function body or reports a [SpliceError]
//! without changing anything. Conversion to and from JSON lives in [codec].

mod assemble;
pub mod codec;
pub mod entry;
mod errors;
pub mod ir;
pub mod log;
pub mod rewrite;
pub mod trace;
mod well_formed;

pub use errors::SpliceError;
pub use ir::{FuncIdx, Function, Inst, Program};
pub use trace::Trace;

use entry::EntryLabels;
use log::{IRPhase, Log, Verbosity};

/// Splices traces into programs, logging to a [Log].
pub struct Splicer<'a> {
    log: &'a Log,
}

impl<'a> Splicer<'a> {
    pub fn new(log: &'a Log) -> Self {
        Self { log }
    }

    /// Splice `trace` into the function in `prog` that it was recorded in, returning the updated
    /// program. On error `prog` is dropped: use [Self::splice_in_place] to keep it.
    pub fn splice(&self, prog: Program, trace: &Trace) -> Result<Program, SpliceError> {
        let (fidx, body) = self.plan(&prog, trace)?;
        Ok(rewrite::rewrite(prog, fidx, body))
    }

    /// Splice `trace` into the function in `prog` that it was recorded in. On error, `prog` is
    /// left unchanged.
    pub fn splice_in_place(&self, prog: &mut Program, trace: &Trace) -> Result<(), SpliceError> {
        let (fidx, body) = self.plan(prog, trace)?;
        rewrite::rewrite_in_place(prog, fidx, body);
        Ok(())
    }

    /// Find the function `trace` belongs to and build its new body. This does not modify `prog`.
    fn plan(&self, prog: &Program, trace: &Trace) -> Result<(FuncIdx, Vec<Inst>), SpliceError> {
        let fname = trace.func();
        let fidx = entry::locate(prog, fname)?;
        let n = entry::count_named(prog, fname);
        if n > 1 {
            self.log.log(
                Verbosity::Warning,
                &format!("{n} functions are named {fname}: splicing into the first"),
            );
        }
        let func = prog.func(fidx);
        if let Some(reason) = func.undecoded() {
            return Err(SpliceError::MalformedFunctionBody {
                func: fname.to_owned(),
                reason: reason.to_owned(),
            });
        }
        if trace.num_guards() == 0 {
            self.log.log(
                Verbosity::Warning,
                &format!("trace for {fname} contains no guards"),
            );
        }

        let labels = EntryLabels::resolve(func);
        self.log.log(
            Verbosity::SpliceEvent,
            &format!(
                "splice: {fname} (entry: {}{}, slow: {}, join: {}, trace length: {})",
                labels.entry,
                if labels.had_explicit_label {
                    ""
                } else {
                    " (synthesised)"
                },
                labels.slow,
                labels.after,
                trace.insts().len()
            ),
        );

        if self.log.should_log_ir(IRPhase::PreSplice) {
            self.log.log_ir(&format!(
                "--- Begin pre-splice ---\n{func}--- End pre-splice ---\n"
            ));
        }
        let normalised = trace.normalise(&labels.slow);
        if self.log.should_log_ir(IRPhase::Trace) {
            let insts = normalised
                .iter()
                .map(|x| format!("  {x}\n"))
                .collect::<String>();
            self.log.log_ir(&format!(
                "--- Begin trace: {fname} ---\n{insts}--- End trace ---\n"
            ));
        }

        let body = assemble::assemble(&labels, &normalised, func)?;
        if self.log.should_log_ir(IRPhase::PostSplice) {
            let spliced = Function::new(fname, body.clone());
            self.log.log_ir(&format!(
                "--- Begin post-splice ---\n{spliced}--- End post-splice ---\n"
            ));
        }
        Ok((fidx, body))
    }
}

/// Splice `trace` into `prog` without logging. See [Splicer::splice].
pub fn splice(prog: Program, trace: &Trace) -> Result<Program, SpliceError> {
    Splicer::new(&Log::disabled()).splice(prog, trace)
}

/// Splice `trace` into `prog` without logging. See [Splicer::splice_in_place].
pub fn splice_in_place(prog: &mut Program, trace: &Trace) -> Result<(), SpliceError> {
    Splicer::new(&Log::disabled()).splice_in_place(prog, trace)
}
