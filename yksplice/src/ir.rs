//! The IR that traces are spliced into.
//!
//! A [Program] is an ordered list of [Function]s. Each function's body is a linear sequence of
//! [Inst]s which is read top-to-bottom as a control-flow graph: [Inst::Label]s name addresses in
//! the sequence, and jumps, branches, and guards refer to those names.
//!
//! Only the instructions that splicing needs to understand are given a structure of their own:
//! labels, unconditional jumps, guards, and the `speculate`/`commit` pair. Everything else is an
//! [Inst::Plain] which is carried around, and copied, but never interpreted.
//!
//! Every instruction, function, and program keeps the JSON object it was decoded from (see
//! [crate::codec]). The typed fields are a validated view onto that object: when one is changed
//! (e.g. by [LabelInst::renamed] or [GuardInst::retargeted]) the matching key is updated in place,
//! so everything else the producer attached (source positions, types, unknown keys) is preserved
//! verbatim and in its original order.
//!
//! IR structures can be converted to a human-readable listing via [std::fmt::Display].

use serde_json::Value;
use std::fmt;

/// A JSON object as decoded from, and encoded back to, the program and trace formats.
pub type Attrs = serde_json::Map<String, Value>;

/// Identify a [Function] within a [Program].
///
/// This is guaranteed to be an index into an array that is freely convertible to/from [usize].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncIdx(usize);

impl From<usize> for FuncIdx {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl From<FuncIdx> for usize {
    fn from(v: FuncIdx) -> Self {
        v.0
    }
}

/// A whole program: an ordered list of functions.
///
/// Function names are expected to be unique, but this is not enforced: lookups by name return the
/// first match.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub(crate) funcs: Vec<Function>,
    /// The top-level object this program was decoded from. Its `functions` entry is a
    /// placeholder marking where the functions are written back on encoding.
    pub(crate) attrs: Attrs,
}

impl Program {
    pub fn new(funcs: Vec<Function>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("functions".to_owned(), Value::Null);
        Self { funcs, attrs }
    }

    pub fn funcs(&self) -> &[Function] {
        &self.funcs
    }

    /// Return the function at `idx`.
    ///
    /// # Panics
    ///
    /// If `idx` is out of bounds.
    pub fn func(&self, idx: FuncIdx) -> &Function {
        &self.funcs[usize::from(idx)]
    }

    pub(crate) fn func_mut(&mut self, idx: FuncIdx) -> &mut Function {
        &mut self.funcs[usize::from(idx)]
    }

    /// Iterate over the functions in this program alongside their [FuncIdx]s.
    pub fn iter_funcs(&self) -> impl Iterator<Item = (FuncIdx, &Function)> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncIdx::from(i), f))
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.funcs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

/// A named function with a linear body of instructions.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) body: Vec<Inst>,
    /// The object this function was decoded from. Its `instrs` entry, if any, is a placeholder
    /// marking where the body is written back on encoding.
    pub(crate) attrs: Attrs,
    /// If the body could not be decoded, why not. `body` is then empty and `attrs` still holds
    /// the original `instrs` entry, so the function is encoded exactly as it was read.
    pub(crate) undecoded: Option<String>,
}

impl Function {
    pub fn new(name: impl Into<String>, body: Vec<Inst>) -> Self {
        let name = name.into();
        let mut attrs = Attrs::new();
        attrs.insert("name".to_owned(), Value::String(name.clone()));
        attrs.insert("instrs".to_owned(), Value::Null);
        Self {
            name,
            body,
            attrs,
            undecoded: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &[Inst] {
        &self.body
    }

    /// If this function's body could not be decoded, return the reason.
    pub fn undecoded(&self) -> Option<&str> {
        self.undecoded.as_deref()
    }

    /// Replace this function's body with `body`.
    pub(crate) fn set_body(&mut self, body: Vec<Inst>) {
        if self.undecoded.take().is_some() {
            self.attrs.insert("instrs".to_owned(), Value::Null);
        }
        self.body = body;
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func @{}", self.name)?;
        if let Some(reason) = &self.undecoded {
            return writeln!(f, "  <undecoded: {reason}>");
        }
        for inst in &self.body {
            match inst {
                Inst::Label(_) => writeln!(f, "{inst}")?,
                _ => writeln!(f, "  {inst}")?,
            }
        }
        Ok(())
    }
}

/// An instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    /// Declares a named address in the instruction stream.
    Label(LabelInst),
    /// An unconditional transfer of control to a label.
    Jump(JumpInst),
    /// A check which, on failure, transfers control to its failure target; on success control
    /// falls through.
    Guard(GuardInst),
    /// Start a region whose effects are tentative until the matching [Inst::Commit]. If a guard
    /// fails within the region, the tentative effects are discarded before control is transferred.
    Speculate(Attrs),
    /// Make the effects of the enclosing speculative region observable.
    Commit(Attrs),
    /// Any other operation.
    Plain(PlainInst),
}

impl Inst {
    pub fn label(name: impl Into<String>) -> Self {
        Inst::Label(LabelInst::new(name))
    }

    pub fn jump(target: impl Into<String>) -> Self {
        Inst::Jump(JumpInst::new(target))
    }

    pub fn speculate() -> Self {
        Inst::Speculate(op_attrs("speculate"))
    }

    pub fn commit() -> Self {
        Inst::Commit(op_attrs("commit"))
    }

    /// If this is a label, return its name.
    pub fn label_name(&self) -> Option<&str> {
        match self {
            Inst::Label(x) => Some(x.name()),
            _ => None,
        }
    }

    /// Is this a guard?
    pub fn is_guard(&self) -> bool {
        matches!(self, Inst::Guard(_))
    }

    /// The JSON object representing this instruction.
    pub fn attrs(&self) -> &Attrs {
        match self {
            Inst::Label(x) => &x.attrs,
            Inst::Jump(x) => &x.attrs,
            Inst::Guard(x) => &x.attrs,
            Inst::Speculate(x) | Inst::Commit(x) => x,
            Inst::Plain(x) => &x.attrs,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Label(x) => write!(f, "{}:", x.name),
            Inst::Jump(x) => write!(f, "jmp {}", x.target),
            Inst::Guard(x) => {
                write!(f, "guard")?;
                for a in x.args.iter().chain(x.targets.iter()) {
                    write!(f, " {a}")?;
                }
                Ok(())
            }
            Inst::Speculate(_) => write!(f, "speculate"),
            Inst::Commit(_) => write!(f, "commit"),
            Inst::Plain(x) => write!(f, "{x}"),
        }
    }
}

fn op_attrs(op: &str) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("op".to_owned(), Value::String(op.to_owned()));
    attrs
}

fn str_list(xs: &[String]) -> Value {
    Value::Array(xs.iter().map(|x| Value::String(x.clone())).collect())
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabelInst {
    pub(crate) name: String,
    pub(crate) attrs: Attrs,
}

impl LabelInst {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut attrs = Attrs::new();
        attrs.insert("label".to_owned(), Value::String(name.clone()));
        Self { name, attrs }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a copy of this label with its name changed to `name`. All other attributes are
    /// copied unchanged.
    pub fn renamed(&self, name: &str) -> Self {
        let mut attrs = self.attrs.clone();
        attrs.insert("label".to_owned(), Value::String(name.to_owned()));
        Self {
            name: name.to_owned(),
            attrs,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JumpInst {
    pub(crate) target: String,
    pub(crate) attrs: Attrs,
}

impl JumpInst {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        let mut attrs = op_attrs("jmp");
        attrs.insert("labels".to_owned(), str_list(&[target.clone()]));
        Self { target, attrs }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuardInst {
    /// The operands making up the guard's condition. These are never interpreted.
    pub(crate) args: Vec<String>,
    /// The labels control is transferred to if the guard fails.
    pub(crate) targets: Vec<String>,
    pub(crate) attrs: Attrs,
}

impl GuardInst {
    pub fn new(args: Vec<String>, targets: Vec<String>) -> Self {
        let mut attrs = op_attrs("guard");
        attrs.insert("args".to_owned(), str_list(&args));
        attrs.insert("labels".to_owned(), str_list(&targets));
        Self {
            args,
            targets,
            attrs,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Return a copy of this guard whose only failure target is `target`. The condition and all
    /// other attributes are copied unchanged.
    pub fn retargeted(&self, target: &str) -> Self {
        let targets = vec![target.to_owned()];
        let mut attrs = self.attrs.clone();
        attrs.insert("labels".to_owned(), str_list(&targets));
        Self {
            args: self.args.clone(),
            targets,
            attrs,
        }
    }
}

/// An operation that splicing does not need to understand.
#[derive(Clone, Debug, PartialEq)]
pub struct PlainInst {
    pub(crate) op: String,
    pub(crate) attrs: Attrs,
}

impl PlainInst {
    /// Create a plain operation from a JSON object. Returns `None` if `attrs` has no string `op`
    /// key, or if that `op` is one that has its own [Inst] variant.
    pub fn from_attrs(attrs: Attrs) -> Option<Self> {
        let op = attrs.get("op")?.as_str()?.to_owned();
        match op.as_str() {
            "jmp" | "guard" | "speculate" | "commit" => None,
            _ => Some(Self { op, attrs }),
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }
}

impl fmt::Display for PlainInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strs = |k: &str| -> Vec<&str> {
            self.attrs
                .get(k)
                .and_then(|x| x.as_array())
                .map(|xs| xs.iter().filter_map(|x| x.as_str()).collect())
                .unwrap_or_default()
        };
        if let Some(dest) = self.attrs.get("dest").and_then(|x| x.as_str()) {
            write!(f, "{dest}")?;
            if let Some(ty) = self.attrs.get("type") {
                match ty {
                    Value::String(x) => write!(f, ": {x}")?,
                    x => write!(f, ": {x}")?,
                }
            }
            write!(f, " = ")?;
        }
        write!(f, "{}", self.op)?;
        for x in strs("funcs") {
            write!(f, " @{x}")?;
        }
        for x in strs("args") {
            write!(f, " {x}")?;
        }
        for x in strs("labels") {
            write!(f, " {x}")?;
        }
        if let Some(x) = self.attrs.get("value") {
            write!(f, " {x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Create a plain operation from a JSON literal.
    pub(crate) fn plain(v: Value) -> Inst {
        let Value::Object(attrs) = v else { panic!() };
        Inst::Plain(PlainInst::from_attrs(attrs).unwrap())
    }

    pub(crate) fn guard(cond: &str, target: &str) -> Inst {
        Inst::Guard(GuardInst::new(vec![cond.to_owned()], vec![target.to_owned()]))
    }

    #[test]
    fn plain_rejects_structured_ops() {
        for op in ["jmp", "guard", "speculate", "commit"] {
            let Value::Object(attrs) = json!({"op": op}) else {
                panic!()
            };
            assert!(PlainInst::from_attrs(attrs).is_none());
        }
        let Value::Object(attrs) = json!({"dest": "x"}) else {
            panic!()
        };
        assert!(PlainInst::from_attrs(attrs).is_none());
    }

    #[test]
    fn renamed_keeps_other_attrs() {
        let mut l = LabelInst::new("foo");
        l.attrs.insert("pos".to_owned(), json!({"row": 3, "col": 1}));
        let r = l.renamed("foo_slow");
        assert_eq!(r.name(), "foo_slow");
        assert_eq!(r.attrs.get("pos"), l.attrs.get("pos"));
        assert_eq!(
            r.attrs.keys().collect::<Vec<_>>(),
            l.attrs.keys().collect::<Vec<_>>()
        );
        // The original is untouched.
        assert_eq!(l.name(), "foo");
    }

    #[test]
    fn retargeted_replaces_all_targets() {
        let g = GuardInst::new(
            vec!["c".to_owned()],
            vec!["a".to_owned(), "b".to_owned()],
        );
        let r = g.retargeted("slow");
        assert_eq!(r.targets(), ["slow"]);
        assert_eq!(r.args(), ["c"]);
        assert_eq!(r.attrs.get("labels"), Some(&json!(["slow"])));
        assert_eq!(g.targets(), ["a", "b"]);
    }

    #[test]
    fn display() {
        let f = Function::new(
            "main",
            vec![
                Inst::label("main"),
                plain(json!({"dest": "v0", "op": "const", "type": "int", "value": 1})),
                plain(json!({"dest": "v1", "op": "add", "type": "int", "args": ["v0", "v0"]})),
                plain(json!({"op": "br", "args": ["b"], "labels": ["t", "f"]})),
                plain(json!({"op": "call", "funcs": ["g"], "args": ["v1"]})),
                Inst::speculate(),
                guard("b", "main_slow"),
                Inst::commit(),
                Inst::jump("main"),
            ],
        );
        assert_eq!(
            f.to_string(),
            "func @main
main:
  v0: int = const 1
  v1: int = add v0 v0
  br b t f
  call @g v1
  speculate
  guard b main_slow
  commit
  jmp main
"
        );
    }
}
