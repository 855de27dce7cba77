//! The block assembler: build a function body with a trace installed as its fast path.
//!
//! Given a function `foo` whose body is:
//!
//! ```text
//! foo:
//!   <body>
//! ```
//!
//! and a (normalised) trace `<trace>`, the assembled body is:
//!
//! ```text
//! foo:            ; fast path
//!   speculate
//!   <trace>       ; every guard fails to foo_slow
//!   commit
//!   jmp foo_after
//! foo_slow:       ; slow path
//!   <body>
//! foo_after:      ; join point
//! ```
//!
//! The fast path occupies the original entry label, so anything that jumped to `foo` now reaches
//! the fast path. If a guard fails, the engine discards everything since `speculate` and resumes at
//! `foo_slow`, which is the original body unchanged. Note that the slow path's own exits are left
//! alone: `foo_after` is only a landing pad for the fast path.
//!
//! If the original body does not start with a label, the entry label is synthesised (see
//! [EntryLabels::resolve]) and the slow path is the whole original body preceded by a new label.

use crate::{
    entry::EntryLabels,
    errors::SpliceError,
    ir::{Function, Inst},
    well_formed,
};

/// Assemble the spliced body of `func` from `labels`, which must have been resolved from `func`,
/// and the normalised trace `trace`.
///
/// Neither `func` nor `trace` is modified: every instruction in the result is a fresh copy.
pub(crate) fn assemble(
    labels: &EntryLabels,
    trace: &[Inst],
    func: &Function,
) -> Result<Vec<Inst>, SpliceError> {
    let body = func.body();
    well_formed::check_original(func.name(), body, labels)?;

    // Fast path (trace + bracketing) + slow path (body + at most one new label) + join.
    let mut insts = Vec::with_capacity(trace.len() + body.len() + 6);

    insts.push(Inst::label(labels.entry.as_str()));
    insts.push(Inst::speculate());
    insts.extend(trace.iter().cloned());
    insts.push(Inst::commit());
    insts.push(Inst::jump(labels.after.as_str()));

    match body.split_first() {
        Some((Inst::Label(x), rest)) if labels.had_explicit_label && x.name() == labels.entry => {
            insts.push(Inst::Label(x.renamed(&labels.slow)));
            insts.extend(rest.iter().cloned());
        }
        _ => {
            insts.push(Inst::label(labels.slow.as_str()));
            insts.extend(body.iter().cloned());
        }
    }

    insts.push(Inst::label(labels.after.as_str()));

    well_formed::check_spliced(func.name(), &insts)?;
    Ok(insts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::tests::{guard, plain},
        trace::Trace,
    };
    use fm::FMBuilder;
    use serde_json::json;

    fn op(name: &str) -> Inst {
        plain(json!({"op": "print", "args": [name]}))
    }

    /// Splice `trace` into `func`, returning the spliced function.
    fn spliced(func: &Function, trace: Vec<Inst>) -> Function {
        let labels = EntryLabels::resolve(func);
        let trace = Trace::new(func.name(), trace).unwrap();
        let body = assemble(&labels, &trace.normalise(&labels.slow), func).unwrap();
        Function::new(func.name(), body)
    }

    fn assert_matches(func: &Function, ptn: &str) {
        let fmm = FMBuilder::new(ptn).unwrap().build().unwrap();
        if let Err(e) = fmm.matches(&func.to_string()) {
            panic!("{e}");
        }
    }

    #[test]
    fn explicit_entry() {
        let f = Function::new("foo", vec![Inst::label("foo"), op("x"), Inst::jump("foo")]);
        let s = spliced(&f, vec![op("y"), guard("cond", "__placeholder")]);
        assert_eq!(
            s.body(),
            [
                Inst::label("foo"),
                Inst::speculate(),
                op("y"),
                guard("cond", "foo_slow"),
                Inst::commit(),
                Inst::jump("foo_after"),
                Inst::label("foo_slow"),
                op("x"),
                Inst::jump("foo"),
                Inst::label("foo_after"),
            ]
        );
    }

    #[test]
    fn synthesised_entry() {
        let f = Function::new("bar", vec![op("x")]);
        let s = spliced(&f, vec![op("y"), guard("cond", "__placeholder")]);
        assert_matches(
            &s,
            "
              func @bar
              .bar_entry:
                speculate
                print y
                guard cond .bar_entry_slow
                commit
                jmp .bar_entry_after
              .bar_entry_slow:
                print x
              .bar_entry_after:
            ",
        );
    }

    #[test]
    fn empty_body() {
        let f = Function::new("bar", Vec::new());
        let s = spliced(&f, vec![op("y")]);
        assert_eq!(
            s.body(),
            [
                Inst::label(".bar_entry"),
                Inst::speculate(),
                op("y"),
                Inst::commit(),
                Inst::jump(".bar_entry_after"),
                Inst::label(".bar_entry_slow"),
                Inst::label(".bar_entry_after"),
            ]
        );
    }

    #[test]
    fn interior_labels_untouched() {
        let f = Function::new(
            "loop",
            vec![
                Inst::label("head"),
                plain(json!({"op": "br", "args": ["c"], "labels": ["body", "exit"]})),
                Inst::label("body"),
                guard("d", "exit"),
                Inst::jump("head"),
                Inst::label("exit"),
                plain(json!({"op": "ret"})),
            ],
        );
        let s = spliced(&f, vec![guard("c", "__placeholder"), op("z")]);
        assert_matches(
            &s,
            "
              func @loop
              head:
                speculate
                guard c head_slow
                print z
                commit
                jmp head_after
              head_slow:
                br c body exit
              body:
                guard d exit
                jmp head
              exit:
                ret
              head_after:
            ",
        );
    }

    #[test]
    fn slow_path_is_faithful() {
        let f = Function::new(
            "foo",
            vec![
                Inst::label("foo"),
                plain(json!({"dest": "a", "op": "const", "type": "int", "value": 4, "pos": {"row": 2}})),
                Inst::label("l"),
                Inst::jump("foo"),
            ],
        );
        let labels = EntryLabels::resolve(&f);
        let s = spliced(&f, vec![op("y")]);
        let start = s
            .body()
            .iter()
            .position(|x| x.label_name() == Some(labels.slow.as_str()))
            .unwrap();
        let end = s
            .body()
            .iter()
            .position(|x| x.label_name() == Some(labels.after.as_str()))
            .unwrap();
        assert_eq!(&s.body()[start + 1..end], &f.body()[1..]);
    }

    #[test]
    fn trace_label_collides() {
        let f = Function::new("foo", vec![Inst::label("foo"), Inst::label("l")]);
        let labels = EntryLabels::resolve(&f);
        let trace = Trace::new("foo", vec![Inst::label("l")]).unwrap();
        assert_eq!(
            assemble(&labels, &trace.normalise(&labels.slow), &f),
            Err(SpliceError::LabelCollision {
                func: "foo".into(),
                label: "l".into()
            })
        );
    }

    #[test]
    fn after_label_collides() {
        let f = Function::new("foo", vec![Inst::label("foo"), Inst::label("foo_after")]);
        let labels = EntryLabels::resolve(&f);
        let trace = Trace::new("foo", vec![op("y")]).unwrap();
        assert_eq!(
            assemble(&labels, &trace.normalise(&labels.slow), &f),
            Err(SpliceError::LabelCollision {
                func: "foo".into(),
                label: "foo_after".into()
            })
        );
    }

    #[test]
    fn mismatched_labels() {
        // Labels resolved from a different body never take over that body's first instruction.
        let labels = EntryLabels::resolve(&Function::new("foo", vec![Inst::label("loop")]));
        let f = Function::new("foo", vec![Inst::label("top"), op("x")]);
        assert_eq!(
            assemble(&labels, &[op("y")], &f).unwrap(),
            [
                Inst::label("loop"),
                Inst::speculate(),
                op("y"),
                Inst::commit(),
                Inst::jump("loop_after"),
                Inst::label("loop_slow"),
                Inst::label("top"),
                op("x"),
                Inst::label("loop_after"),
            ]
        );

        let labels = EntryLabels::resolve(&Function::new("foo", vec![Inst::label("top")]));
        let f = Function::new("foo", vec![op("x"), Inst::label("top")]);
        assert_eq!(
            assemble(&labels, &[op("y")], &f),
            Err(SpliceError::LabelCollision {
                func: "foo".into(),
                label: "top".into()
            })
        );
    }
}
