//! Decoding programs and traces from JSON, and encoding programs back to JSON.
//!
//! Programs are in the [Bril](https://capra.cs.cornell.edu/bril/) JSON format:
//!
//! ```text
//! {"functions": [{"name": "main", "instrs": [{"label": "l"}, {"op": "jmp", "labels": ["l"]}]}]}
//! ```
//!
//! Traces are a JSON object `{"func": <owner name>, "trace": [<instruction>, ...]}` in which
//! instructions have the same format as in programs. Tracers tend to print other output before
//! the trace itself, so [decode_trace] skips everything before the first `{`.
//!
//! Everything other than the keys needed to build an [Inst], [Function], or [Program] is kept
//! as-is, and written back out, in its original order, when encoding.

use crate::{
    errors::SpliceError,
    ir::{Attrs, Function, GuardInst, Inst, JumpInst, LabelInst, PlainInst, Program},
    trace::Trace,
};
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

/// How much of a malformed input to include in an error message.
const EXCERPT_LEN: usize = 200;

fn excerpt(s: &str) -> String {
    s.chars().take(EXCERPT_LEN).collect()
}

/// Return the suffix of `raw` starting at the first `{`.
pub fn strip_tracer_prefix(raw: &str) -> Result<&str, SpliceError> {
    match raw.find('{') {
        Some(i) => Ok(&raw[i..]),
        None => Err(SpliceError::MalformedTrace(format!(
            "no JSON object found in trace output (first {EXCERPT_LEN} chars: {})",
            excerpt(raw)
        ))),
    }
}

/// Decode a trace from the output of a tracer, skipping any text before the trace object.
pub fn decode_trace(raw: &str) -> Result<Trace, SpliceError> {
    let json = strip_tracer_prefix(raw)?;
    let v = serde_json::from_str::<Value>(json).map_err(|e| {
        SpliceError::MalformedTrace(format!(
            "failed to parse JSON from trace output: {e} (first {EXCERPT_LEN} chars: {})",
            excerpt(json)
        ))
    })?;
    let Value::Object(mut obj) = v else {
        return Err(SpliceError::MalformedTrace(
            "trace JSON is not an object".into(),
        ));
    };
    let (Some(func), Some(insts)) = (obj.remove("func"), obj.remove("trace")) else {
        return Err(SpliceError::MalformedTrace(
            "trace JSON missing 'func' or 'trace' fields".into(),
        ));
    };
    let func = match func {
        Value::String(x) => x,
        x => {
            return Err(SpliceError::MalformedTrace(format!(
                "trace 'func' field {x} is not a string"
            )))
        }
    };
    let Value::Array(insts) = insts else {
        return Err(SpliceError::MalformedTrace(
            "trace JSON has an invalid 'trace' list".into(),
        ));
    };
    let insts = insts
        .into_iter()
        .enumerate()
        .map(|(i, x)| {
            decode_inst(x)
                .map_err(|e| SpliceError::MalformedTrace(format!("trace instruction {i}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Trace::new(func, insts)
}

/// Decode a program.
pub fn decode_program(s: &str) -> Result<Program, SpliceError> {
    let v = serde_json::from_str::<Value>(s).map_err(|e| {
        SpliceError::MalformedProgram(format!("could not parse program JSON: {e}"))
    })?;
    let Value::Object(mut attrs) = v else {
        return Err(SpliceError::MalformedProgram(
            "program JSON is not an object".into(),
        ));
    };
    // `take` leaves a `null` in place of the functions, which is what [Program] expects.
    let funcs = match attrs.get_mut("functions").map(Value::take) {
        Some(Value::Array(x)) => x,
        Some(_) => {
            return Err(SpliceError::MalformedProgram(
                "program 'functions' field is not a list".into(),
            ))
        }
        None => {
            return Err(SpliceError::MalformedProgram(
                "program JSON missing 'functions' field".into(),
            ))
        }
    };
    let funcs = funcs
        .into_iter()
        .map(decode_func)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Program { funcs, attrs })
}

fn decode_func(v: Value) -> Result<Function, SpliceError> {
    let mut attrs = match v {
        Value::Object(x) => x,
        x => {
            return Err(SpliceError::MalformedProgram(format!(
                "function {} is not an object",
                excerpt(&x.to_string())
            )))
        }
    };
    let name = match attrs.get("name") {
        Some(Value::String(x)) => x.clone(),
        _ => {
            return Err(SpliceError::MalformedProgram(
                "function without a string 'name' field".into(),
            ))
        }
    };
    match decode_body(attrs.get("instrs")) {
        Ok(body) => {
            if let Some(x) = attrs.get_mut("instrs") {
                *x = Value::Null;
            }
            Ok(Function {
                name,
                body,
                attrs,
                undecoded: None,
            })
        }
        // Only the function a trace is spliced into needs a well-formed body: keep this one
        // verbatim and let splicing report it if it's ever the target.
        Err(reason) => Ok(Function {
            name,
            body: Vec::new(),
            attrs,
            undecoded: Some(reason),
        }),
    }
}

/// Decode a function's `instrs` entry, returning a human-readable reason if it is malformed.
fn decode_body(instrs: Option<&Value>) -> Result<Vec<Inst>, String> {
    match instrs {
        Some(Value::Array(xs)) => xs
            .iter()
            .enumerate()
            .map(|(i, x)| decode_inst(x.clone()).map_err(|e| format!("instruction {i}: {e}")))
            .collect(),
        Some(_) => Err("'instrs' is not a list".into()),
        None => Ok(Vec::new()),
    }
}

/// Return the list of strings at `key` in `attrs`. A missing key is treated as an empty list.
fn str_list(attrs: &Attrs, key: &str) -> Result<Vec<String>, String> {
    match attrs.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(xs)) => xs
            .iter()
            .map(|x| match x {
                Value::String(x) => Ok(x.clone()),
                x => Err(format!("'{key}' entry {x} is not a string")),
            })
            .collect(),
        Some(x) => Err(format!("'{key}' field {x} is not a list")),
    }
}

/// Decode an instruction, returning a human-readable reason if it is malformed.
fn decode_inst(v: Value) -> Result<Inst, String> {
    let attrs = match v {
        Value::Object(x) => x,
        x => return Err(format!("{} is not an object", excerpt(&x.to_string()))),
    };
    if let Some(x) = attrs.get("label") {
        let name = match x {
            Value::String(x) => x.clone(),
            x => return Err(format!("label {x} is not a string")),
        };
        return Ok(Inst::Label(LabelInst { name, attrs }));
    }
    let op = match attrs.get("op") {
        Some(Value::String(x)) => x.clone(),
        Some(x) => return Err(format!("op {x} is not a string")),
        None => return Err("instruction has neither a 'label' nor an 'op'".into()),
    };
    match op.as_str() {
        "jmp" => {
            let mut targets = str_list(&attrs, "labels")?;
            if targets.len() != 1 {
                return Err(format!(
                    "jmp must have exactly one target, not {}",
                    targets.len()
                ));
            }
            let target = targets.remove(0);
            Ok(Inst::Jump(JumpInst { target, attrs }))
        }
        "guard" => {
            let args = str_list(&attrs, "args")?;
            let targets = str_list(&attrs, "labels")?;
            Ok(Inst::Guard(GuardInst {
                args,
                targets,
                attrs,
            }))
        }
        "speculate" => Ok(Inst::Speculate(attrs)),
        "commit" => Ok(Inst::Commit(attrs)),
        _ => Ok(Inst::Plain(PlainInst { op, attrs })),
    }
}

/// Encode a program as pretty-printed JSON, with a trailing newline.
pub fn encode_program(prog: &Program) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string_pretty(prog)?;
    s.push('\n');
    Ok(s)
}

impl Serialize for Inst {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.attrs().serialize(s)
    }
}

/// Serialize `attrs`, writing `xs` in place of the entry `key`. If `attrs` has no such entry, `xs`
/// is appended, unless it is empty.
fn serialize_with<S: Serializer, T: Serialize>(
    s: S,
    attrs: &Attrs,
    key: &str,
    xs: &[T],
) -> Result<S::Ok, S::Error> {
    let append = !attrs.contains_key(key) && !xs.is_empty();
    let mut map = s.serialize_map(Some(attrs.len() + usize::from(append)))?;
    for (k, v) in attrs {
        if k == key {
            map.serialize_entry(k, xs)?;
        } else {
            map.serialize_entry(k, v)?;
        }
    }
    if append {
        map.serialize_entry(key, xs)?;
    }
    map.end()
}

impl Serialize for Function {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.undecoded {
            Some(_) => self.attrs.serialize(s),
            None => serialize_with(s, &self.attrs, "instrs", &self.body),
        }
    }
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serialize_with(s, &self.attrs, "functions", &self.funcs)
    }
}
