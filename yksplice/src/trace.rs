//! Recorded traces and their normalisation prior to splicing.

use crate::{errors::SpliceError, ir::Inst};

/// A linear sequence of instructions recorded along one execution path of the function `func`.
///
/// A `Trace` always has a non-empty owner name and at least one instruction: [Trace::new] is the
/// only way to create one.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    func: String,
    insts: Vec<Inst>,
}

impl Trace {
    /// Create a trace owned by the function `func`.
    ///
    /// Returns [SpliceError::MalformedTrace] if `func` is empty or `insts` has no instructions.
    pub fn new(func: impl Into<String>, insts: Vec<Inst>) -> Result<Self, SpliceError> {
        let func = func.into();
        if func.is_empty() {
            return Err(SpliceError::MalformedTrace(
                "trace has an empty owner function name".into(),
            ));
        }
        if insts.is_empty() {
            return Err(SpliceError::MalformedTrace(format!(
                "trace for function {func} has no instructions"
            )));
        }
        Ok(Self { func, insts })
    }

    /// The name of the function this trace was recorded in.
    pub fn func(&self) -> &str {
        &self.func
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// How many guards does this trace contain?
    pub fn num_guards(&self) -> usize {
        self.insts.iter().filter(|x| x.is_guard()).count()
    }

    /// Return a copy of this trace's instructions where every guard's failure targets have been
    /// replaced with the single label `slow_label`. Every other instruction is copied unchanged.
    ///
    /// The tracer emits guards with a placeholder target, since it can't know where the
    /// deoptimisation path will be placed: this binds them all to the real one.
    pub fn normalise(&self, slow_label: &str) -> Vec<Inst> {
        self.insts
            .iter()
            .map(|inst| match inst {
                Inst::Guard(x) => Inst::Guard(x.retargeted(slow_label)),
                x => x.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::tests::{guard, plain};
    use serde_json::json;

    #[test]
    fn empty_trace() {
        assert!(matches!(
            Trace::new("foo", Vec::new()),
            Err(SpliceError::MalformedTrace(_))
        ));
    }

    #[test]
    fn empty_owner() {
        assert!(matches!(
            Trace::new("", vec![plain(json!({"op": "nop"}))]),
            Err(SpliceError::MalformedTrace(_))
        ));
    }

    #[test]
    fn normalise_rebinds_every_guard() {
        let t = Trace::new(
            "foo",
            vec![
                plain(json!({"dest": "y", "op": "const", "type": "int", "value": 1})),
                guard("c1", "__placeholder"),
                Inst::label("inner"),
                guard("c2", "somewhere_else"),
                Inst::jump("inner"),
            ],
        )
        .unwrap();
        assert_eq!(t.num_guards(), 2);
        let n = t.normalise("foo_slow");
        assert_eq!(n.len(), t.insts().len());
        for (before, after) in t.insts().iter().zip(n.iter()) {
            match (before, after) {
                (Inst::Guard(b), Inst::Guard(a)) => {
                    assert_eq!(a.targets(), ["foo_slow"]);
                    assert_eq!(a.args(), b.args());
                }
                (b, a) => assert_eq!(b, a),
            }
        }
    }

    #[test]
    fn normalise_does_not_alias_input() {
        let t = Trace::new("foo", vec![guard("c", "__placeholder")]).unwrap();
        let mut n = t.normalise("foo_slow");
        n.push(Inst::commit());
        assert_eq!(t.insts(), [guard("c", "__placeholder")]);
    }
}
