//! Top-level driver: wires the seven-pass pipeline together and exposes
//! the two entry points a host embeds against.
//!
//! Each call compiles a fresh `ast::Expr` against a caller-supplied
//! environment of prior top-level bindings, runs it, and hands back an
//! updated environment, so a REPL-style session can keep feeding later
//! calls the bindings earlier ones produced without the compiler itself
//! needing to know about "previous calls". A name free in the compiled
//! unit is only accepted if `env` already has a binding for it; anything
//! else is a [`crate::error::LoadError::NotDefined`] rather than a fresh
//! null binding conjured out of nowhere.

use std::{cell::RefCell, rc::Rc};

use ahash::{AHashMap, AHashSet};

use crate::{
    ast,
    error::{EvalError, LoadResult},
    eval::{self, Activation, Tracer, TracerScope},
    ir, limits,
    limits::EvalLimits,
    mast, slots, structure,
    value::{Binding, Storage, Value},
};

/// The caller-visible top-level environment: every name a previous call
/// (or the host) has bound, by name.
pub type Env = AHashMap<String, Binding>;

/// Intermediate artifacts from running the compile passes, kept around
/// for introspection — e.g. a REPL printing the free-variable list a
/// unit needs before running it.
pub struct Pipeline {
    pub resolved: ir::Expr,
    pub free_names: Vec<String>,
}

/// Runs every pass through `RefactorStructure`, short of evaluation.
/// Names free in `expr` are resolved against `env`'s keys; a name neither
/// lexically bound nor already in `env` fails with `LoadError::NotDefined`.
pub fn compile(expr: ast::Expr, env: &Env) -> LoadResult<Pipeline> {
    let saved = mast::save_scripts(expr)?;
    let slotted = slots::recover_slots(saved)?;
    let known: AHashSet<String> = env.keys().cloned().collect();
    let (resolved, free_names) = bind_and_check(slotted, &known)?;
    Ok(Pipeline { resolved, free_names })
}

fn bind_and_check(slotted: slots::Expr, known: &AHashSet<String>) -> LoadResult<(ir::Expr, Vec<String>)> {
    let (resolved, free_names) = crate::bind::bind_nouns(slotted, known)?;
    structure::refactor_structure(&resolved)?;
    Ok((resolved, free_names))
}

/// Runs `expr` against `env`, returning only the result value and
/// discarding whatever new top-level bindings it produced. The common
/// case for a one-shot evaluation.
pub fn eval_monte(expr: ast::Expr, env: &Env, limits: EvalLimits) -> Result<Value, EvalError> {
    Ok(eval_to_pair(expr, env, limits)?.0)
}

/// Runs `expr` against `env`, returning both the result value and an
/// updated environment reflecting every top-level binding `expr` touched.
pub fn eval_to_pair(expr: ast::Expr, env: &Env, eval_limits: EvalLimits) -> Result<(Value, Env), EvalError> {
    let pipeline = compile(expr, env)?;
    let outers: Vec<RefCell<Storage>> = pipeline
        .free_names
        .iter()
        .map(|name| {
            RefCell::new(match env.get(name) {
                Some(binding) => Storage::Binding(binding.clone()),
                None => Storage::null_binding(),
            })
        })
        .collect();

    let _limits_scope = limits::LimitsScope::install(eval_limits);
    let act = Activation { locals: Vec::new(), frame: &[], outers: &outers };
    let result = eval::eval_expr(&pipeline.resolved, &act)?;

    let mut next_env = env.clone();
    for (name, cell) in pipeline.free_names.iter().zip(outers.iter()) {
        next_env.insert(name.clone(), cell.borrow().to_binding());
    }
    Ok((result, next_env))
}

/// Installs `tracer` for the duration of `f`, restoring whatever tracer
/// was active before on return (`eval::TracerScope`).
pub fn with_tracer<T>(tracer: Rc<dyn Tracer>, f: impl FnOnce() -> T) -> T {
    let _scope = TracerScope::install(tracer);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_evaluates_with_empty_env() {
        let env = Env::default();
        let value = eval_monte(ast::Expr::Int(7.into()), &env, EvalLimits::unlimited()).unwrap();
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn top_level_def_round_trips_through_env() {
        let expr = ast::Expr::Seq(vec![
            ast::Expr::Def {
                patt: ast::Patt::Final { name: "x".into(), sigil: ast::Sigil::Noun, guard: None },
                ejector: None,
                rvalue: Box::new(ast::Expr::Int(3.into())),
            },
            ast::Expr::Noun("x".into()),
        ]);
        let env = Env::default();
        let (value, next_env) = eval_to_pair(expr, &env, EvalLimits::unlimited()).unwrap();
        assert_eq!(value, Value::Int(3));
        assert_eq!(next_env.get("x").unwrap().get(), Value::Int(3));
    }

    #[test]
    fn free_read_with_no_env_binding_is_not_defined() {
        let expr = ast::Expr::Noun("unbound".into());
        let env = Env::default();
        let err = eval_monte(expr, &env, EvalLimits::unlimited()).unwrap_err();
        assert!(matches!(err, EvalError::Load(crate::error::LoadError::NotDefined { .. })));
    }

    #[test]
    fn free_read_of_a_host_provided_name_sees_its_binding() {
        let expr = ast::Expr::Noun("unbound".into());
        let mut env = Env::default();
        env.insert("unbound".to_string(), Binding::final_binding(Value::Null, crate::value::any_guard()));
        let value = eval_monte(expr, &env, EvalLimits::unlimited()).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn prior_binding_is_visible_to_a_later_call() {
        let mut env = Env::default();
        env.insert("y".to_string(), Binding::final_binding(Value::Int(10), crate::value::any_guard()));
        let value = eval_monte(ast::Expr::Noun("y".into()), &env, EvalLimits::unlimited()).unwrap();
        assert_eq!(value, Value::Int(10));
    }
}
