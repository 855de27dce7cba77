//! Well-formedness checks on function bodies before and after splicing.
//!
//! Specifically, after these checks succeed one can safely assume:
//!
//!   * No label is defined more than once in the original function body.
//!   * None of the labels a splice introduces (see [EntryLabels::introduced]) is already defined in
//!     the original function body.
//!   * No label is defined more than once in the spliced function body.

use crate::{entry::EntryLabels, errors::SpliceError, ir::Inst};
use std::collections::HashSet;

/// Return the first label in `body` which has already been defined earlier in `body`, if any.
fn first_duplicate_label(body: &[Inst]) -> Option<&str> {
    let mut seen = HashSet::new();
    body.iter()
        .filter_map(|x| x.label_name())
        .find(|x| !seen.insert(*x))
}

/// Check the original body of `func` before a trace is spliced into it.
pub(crate) fn check_original(
    func: &str,
    body: &[Inst],
    labels: &EntryLabels,
) -> Result<(), SpliceError> {
    if let Some(lbl) = first_duplicate_label(body) {
        return Err(SpliceError::MalformedFunctionBody {
            func: func.to_owned(),
            reason: format!("label {lbl} is defined more than once"),
        });
    }
    for lbl in labels.introduced() {
        if body.iter().any(|x| x.label_name() == Some(lbl)) {
            return Err(SpliceError::LabelCollision {
                func: func.to_owned(),
                label: lbl.to_owned(),
            });
        }
    }
    Ok(())
}

/// Check a spliced body of `func`. The only way this can fail for an original body that passed
/// [check_original] is if the trace itself defines labels.
pub(crate) fn check_spliced(func: &str, body: &[Inst]) -> Result<(), SpliceError> {
    match first_duplicate_label(body) {
        Some(lbl) => Err(SpliceError::LabelCollision {
            func: func.to_owned(),
            label: lbl.to_owned(),
        }),
        None => Ok(()),
    }
}
