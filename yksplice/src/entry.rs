//! Find the function a trace belongs to, and work out the labels a splice into it will use.

use crate::{
    errors::SpliceError,
    ir::{FuncIdx, Function, Inst, Program},
};

/// Return the index of the first function in `prog` named `name`.
///
/// Names are compared exactly. Returns [SpliceError::FunctionNotFound] if there is no such
/// function.
pub fn locate(prog: &Program, name: &str) -> Result<FuncIdx, SpliceError> {
    prog.iter_funcs()
        .find(|(_, f)| f.name() == name)
        .map(|(idx, _)| idx)
        .ok_or_else(|| SpliceError::FunctionNotFound(name.to_owned()))
}

/// How many functions in `prog` are named `name`?
pub(crate) fn count_named(prog: &Program, name: &str) -> usize {
    prog.funcs().iter().filter(|f| f.name() == name).count()
}

/// The labels that splicing a trace into a function introduces or reuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryLabels {
    /// The label the function is entered at. After splicing, this names the fast path.
    pub entry: String,
    /// The label of the slow path, i.e. the original body.
    pub slow: String,
    /// The label the fast path jumps to once it has committed.
    pub after: String,
    /// Did the function's body start with a label (in which case `entry` is that label's name)?
    /// If not, `entry` has been synthesised.
    pub had_explicit_label: bool,
}

impl EntryLabels {
    /// Work out the entry labels for `func`. If its body starts with a label, that is the entry;
    /// otherwise an entry label `.<func name>_entry` is synthesised.
    pub fn resolve(func: &Function) -> Self {
        let (entry, had_explicit_label) = match func.body().first() {
            Some(Inst::Label(x)) => (x.name().to_owned(), true),
            _ => (format!(".{}_entry", func.name()), false),
        };
        Self {
            slow: format!("{entry}_slow"),
            after: format!("{entry}_after"),
            entry,
            had_explicit_label,
        }
    }

    /// The labels that splicing will add to the function body and which thus must not already
    /// exist in it.
    pub(crate) fn introduced(&self) -> impl Iterator<Item = &str> {
        let entry = if self.had_explicit_label {
            None
        } else {
            Some(self.entry.as_str())
        };
        entry
            .into_iter()
            .chain([self.slow.as_str(), self.after.as_str()])
    }
}
