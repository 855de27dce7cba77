//! The program rewriter: the only place where splicing mutates a program.

use crate::ir::{FuncIdx, Inst, Program};

/// Replace the body of the function at `idx` in `prog` with `body`, returning `prog`. No other
/// function is touched.
pub fn rewrite(mut prog: Program, idx: FuncIdx, body: Vec<Inst>) -> Program {
    rewrite_in_place(&mut prog, idx, body);
    prog
}

pub(crate) fn rewrite_in_place(prog: &mut Program, idx: FuncIdx, body: Vec<Inst>) {
    prog.func_mut(idx).set_body(body);
}
