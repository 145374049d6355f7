//! The evaluator: a tree walk over `ir::Expr`.
//!
//! Every expression either produces a [`Value`] or exits non-locally
//! through a [`RunError`] — a thrown user exception, a firing ejector, or
//! an exhausted resource limit. There is no separate "return" construct:
//! a method's body value *is* its result.

use std::rc::Rc;

use crate::{
    error::{EjectorId, RunError, RunResult},
    ir, object,
    value::{any_guard, coerce, thrower_ejector, Binding, Ejector, NamedArgs, Slot, Storage, Value},
};

/// Instrumentation hook: a zero-cost tracer trait with no-op default
/// methods, rather than pulling in a logging crate for a handful of
/// evaluator events.
pub trait Tracer {
    fn on_dispatch(&self, _object: &str, _verb: &str, _arity: usize) {}
    fn on_ejector_fire(&self, _id: EjectorId) {}
    fn on_ejector_catch(&self, _id: EjectorId) {}
}

#[derive(Debug, Default)]
pub struct NoopTracer;
impl Tracer for NoopTracer {}

#[derive(Debug, Default)]
pub struct StderrTracer;
impl Tracer for StderrTracer {
    fn on_dispatch(&self, object: &str, verb: &str, arity: usize) {
        eprintln!("dispatch: {object}.{verb}/{arity}");
    }
    fn on_ejector_fire(&self, id: EjectorId) {
        eprintln!("ejector fire: {id:?}");
    }
    fn on_ejector_catch(&self, id: EjectorId) {
        eprintln!("ejector catch: {id:?}");
    }
}

thread_local! {
    static NEXT_EJECTOR_ID: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
    static CURRENT_TRACER: std::cell::RefCell<Rc<dyn Tracer>> =
        std::cell::RefCell::new(Rc::new(NoopTracer));
}

/// Installs `tracer` for the duration of a top-level evaluation, mirroring
/// [`crate::limits::LimitsScope`]. Objects constructed during evaluation
/// outlive individual calls, so the tracer lives behind a thread-local
/// rather than threaded through `Activation` — dispatch needs it long
/// after the activation that constructed the receiving object is gone.
pub struct TracerScope {
    previous: Rc<dyn Tracer>,
}

impl TracerScope {
    pub fn install(tracer: Rc<dyn Tracer>) -> Self {
        let previous = CURRENT_TRACER.with(|t| t.replace(tracer));
        Self { previous }
    }
}

impl Drop for TracerScope {
    fn drop(&mut self) {
        CURRENT_TRACER.with(|t| *t.borrow_mut() = self.previous.clone());
    }
}

pub(crate) fn trace_dispatch(object: &str, verb: &str, arity: usize) {
    CURRENT_TRACER.with(|t| t.borrow().on_dispatch(object, verb, arity));
}

pub(crate) fn trace_ejector_fire(id: EjectorId) {
    CURRENT_TRACER.with(|t| t.borrow().on_ejector_fire(id));
}

pub(crate) fn trace_ejector_catch(id: EjectorId) {
    CURRENT_TRACER.with(|t| t.borrow().on_ejector_catch(id));
}

fn fresh_ejector_id() -> EjectorId {
    NEXT_EJECTOR_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        EjectorId(id)
    })
}

/// One activation: the locals array for the method/matcher/top-level
/// script currently running, plus borrowed access to the enclosing
/// object's frame and the top-level outers environment
/// ("Scope classes").
pub struct Activation<'a> {
    pub locals: Vec<std::cell::RefCell<Storage>>,
    pub frame: &'a [std::cell::RefCell<Storage>],
    pub outers: &'a [std::cell::RefCell<Storage>],
}

impl<'a> Activation<'a> {
    pub fn read(&self, scope: ir::ScopeClass) -> Storage {
        match scope {
            ir::ScopeClass::Local(i) => self.locals[i].borrow().clone(),
            ir::ScopeClass::Frame(i) => self.frame[i].borrow().clone(),
            ir::ScopeClass::Outer(i) => self.outers[i].borrow().clone(),
        }
    }

    pub fn write(&self, scope: ir::ScopeClass, storage: Storage) {
        match scope {
            ir::ScopeClass::Local(i) => *self.locals[i].borrow_mut() = storage,
            ir::ScopeClass::Frame(i) => *self.frame[i].borrow_mut() = storage,
            ir::ScopeClass::Outer(i) => *self.outers[i].borrow_mut() = storage,
        }
    }
}

pub fn eval_expr(expr: &ir::Expr, act: &Activation) -> RunResult<Value> {
    let _guard = crate::limits::RecursionGuard::enter()?;
    eval_expr_inner(expr, act)
}

fn eval_expr_inner(expr: &ir::Expr, act: &Activation) -> RunResult<Value> {
    match expr {
        ir::Expr::Null => Ok(Value::Null),
        ir::Expr::Char(c) => Ok(Value::Char(*c)),
        ir::Expr::Double(d) => Ok(Value::Double(*d)),
        ir::Expr::Int(i) => Ok(int_value(i)),
        ir::Expr::Str(s) => Ok(Value::Str(s.clone())),
        ir::Expr::Call { recv, verb, args, named_args } => {
            let recv_value = eval_expr(recv, act)?;
            let args = args.iter().map(|a| eval_expr(a, act)).collect::<RunResult<Vec<_>>>()?;
            let mut named = NamedArgs::new();
            for (k, v) in named_args {
                named.insert(eval_expr(k, act)?, eval_expr(v, act)?);
            }
            recv_value.recv_named(verb, &args, &named)
        }
        ir::Expr::Def { patt, ejector, rvalue } => {
            let specimen = eval_expr(rvalue, act)?;
            let ej = match ejector {
                Some(e) => eval_expr(e, act)?,
                None => thrower_ejector(),
            };
            match_bind(patt, specimen.clone(), &ej, act, None)?;
            Ok(specimen)
        }
        ir::Expr::EscapeOnly { ej_patt, body } => {
            let id = fresh_ejector_id();
            let ejector = Ejector::new(id);
            match_bind(ej_patt, Value::Host(ejector.clone()), &thrower_ejector(), act, None)?;
            let result = eval_expr(body, act);
            ejector.disable();
            match result {
                Err(RunError::Ejecting(e)) if e.ejector == id => {
                    trace_ejector_catch(id);
                    Ok(e.value)
                }
                other => other,
            }
        }
        ir::Expr::Escape { ej_patt, ej_body, catch_patt, catch_body } => {
            let id = fresh_ejector_id();
            let ejector = Ejector::new(id);
            match_bind(ej_patt, Value::Host(ejector.clone()), &thrower_ejector(), act, None)?;
            let result = eval_expr(ej_body, act);
            ejector.disable();
            match result {
                Err(RunError::Ejecting(e)) if e.ejector == id => {
                    trace_ejector_catch(id);
                    match_bind(catch_patt, e.value, &thrower_ejector(), act, None)?;
                    eval_expr(catch_body, act)
                }
                other => other,
            }
        }
        ir::Expr::Finally { body, at_last } => {
            let body_result = eval_expr(body, act);
            let at_last_result = eval_expr(at_last, act);
            at_last_result.and(body_result)
        }
        ir::Expr::If { test, cons, alt } => {
            if eval_expr(test, act)?.unwrap_bool()? {
                eval_expr(cons, act)
            } else {
                eval_expr(alt, act)
            }
        }
        ir::Expr::Try { body, catch_patt, catch_body } => match eval_expr(body, act) {
            Err(RunError::Thrown(t)) => {
                match_bind(catch_patt, t.payload, &thrower_ejector(), act, None)?;
                eval_expr(catch_body, act)
            }
            other => other,
        },
        ir::Expr::Seq(exprs) => {
            let mut last = Value::Null;
            for e in exprs {
                last = eval_expr(e, act)?;
            }
            Ok(last)
        }
        ir::Expr::Ref { severity, scope } => {
            let storage = act.read(*scope);
            Ok(match severity {
                ir::Severity::Noun => storage.to_value(),
                ir::Severity::Slot => Value::Slot(storage.to_slot()),
                ir::Severity::Binding => Value::Binding(storage.to_binding()),
            })
        }
        ir::Expr::Assign { scope, value } => {
            let new_value = eval_expr(value, act)?;
            let storage = act.read(*scope);
            let slot = storage.assign_slot()?;
            slot.put(new_value)
        }
        ir::Expr::Hide(inner) => eval_expr(inner, act),
        ir::Expr::Object(script) => object::construct_object(script.clone(), act),
        ir::Expr::MetaContext => Ok(meta_context()),
        ir::Expr::MetaState => Ok(meta_state()),
    }
}

fn int_value(i: &num_bigint::BigInt) -> Value {
    match i64::try_from(i) {
        Ok(small) => Value::Int(small),
        Err(_) => Value::BigInt(Rc::new(i.clone())),
    }
}

/// A minimal stand-in for the reflective `meta.context()` capability
/// (`ReifyMeta`). Full FQN/module reflection is out of
/// scope; this just gives `MetaContextExpr` somewhere to evaluate to.
#[derive(Debug)]
struct MetaContext;
impl crate::value::HostObject for MetaContext {
    fn recv_named(&self, verb: &str, args: &[Value], _named: &NamedArgs) -> RunResult<Value> {
        Err(RunError::thrown(Value::str(format!("meta.context does not respond to {verb}/{}", args.len()))))
    }
    fn type_name(&self) -> &'static str {
        "meta.context"
    }
}

fn meta_context() -> Value {
    Value::Host(Rc::new(MetaContext))
}

#[derive(Debug)]
struct MetaState;
impl crate::value::HostObject for MetaState {
    fn recv_named(&self, verb: &str, args: &[Value], _named: &NamedArgs) -> RunResult<Value> {
        Err(RunError::thrown(Value::str(format!("meta.state does not respond to {verb}/{}", args.len()))))
    }
    fn type_name(&self) -> &'static str {
        "meta.state"
    }
}

fn meta_state() -> Value {
    Value::Host(Rc::new(MetaState))
}

fn fail<T>(ej: &Value, message: String) -> RunResult<T> {
    match ej.recv_named("run", &[Value::str(message)], &NamedArgs::new()) {
        Ok(_) => Err(RunError::thrown(Value::str("ejector returned instead of exiting"))),
        Err(e) => Err(e),
    }
}

/// Binds `patt` against `specimen`, firing `ej` on any failure. `named` is
/// only populated when matching a method's declared named parameters;
/// nested `Patt::Named` elsewhere matches against a `[key, value]` pair
/// specimen.
pub fn match_bind(
    patt: &ir::Patt,
    specimen: Value,
    ej: &Value,
    act: &Activation,
    named: Option<&NamedArgs>,
) -> RunResult<()> {
    match patt {
        ir::Patt::Ignore(guard) => {
            if let Some(g) = guard {
                let guard_value = eval_expr(g, act)?;
                coerce(&guard_value, specimen, Some(ej))?;
            }
            Ok(())
        }
        ir::Patt::Noun { scope, guard, mutable } => {
            let guard_value = match guard {
                Some(g) => eval_expr(g, act)?,
                None => any_guard(),
            };
            let value = if guard.is_some() { coerce(&guard_value, specimen, Some(ej))? } else { specimen };
            let storage = if *mutable {
                Storage::Slot(Slot::new_var(value, guard_value))
            } else {
                Storage::Value(value)
            };
            act.write(*scope, storage);
            Ok(())
        }
        ir::Patt::FinalSlot { scope, guard } | ir::Patt::VarSlot { scope, guard } => {
            let specimen = match guard {
                Some(g) => {
                    let guard_value = eval_expr(g, act)?;
                    coerce(&guard_value, specimen, Some(ej))?
                }
                None => specimen,
            };
            let slot = as_slot(specimen, ej)?;
            act.write(*scope, Storage::Slot(slot));
            Ok(())
        }
        ir::Patt::FinalBinding { scope, guard } | ir::Patt::VarBinding { scope, guard } => {
            let specimen = match guard {
                Some(g) => {
                    let guard_value = eval_expr(g, act)?;
                    coerce(&guard_value, specimen, Some(ej))?
                }
                None => specimen,
            };
            act.write(*scope, Storage::Binding(as_binding(specimen)));
            Ok(())
        }
        ir::Patt::RawBinding { scope } => {
            act.write(*scope, Storage::Binding(as_binding(specimen)));
            Ok(())
        }
        ir::Patt::List(patts) => {
            let items = specimen.unwrap_list()?.to_vec();
            if items.len() != patts.len() {
                return fail(
                    ej,
                    format!("list pattern expected {} elements, got {}", patts.len(), items.len()),
                );
            }
            for (p, v) in patts.iter().zip(items) {
                match_bind(p, v, ej, act, named)?;
            }
            Ok(())
        }
        ir::Patt::Via { trans, inner } => {
            let transformer = eval_expr(trans, act)?;
            let transformed = transformer.recv_named("run", &[specimen, ej.clone()], &NamedArgs::new())?;
            match_bind(inner, transformed, ej, act, named)
        }
        ir::Patt::Named { key, patt, default } => {
            let key_value = eval_expr(key, act)?;
            if let Some(map) = named {
                if let Some(value) = map.get(&key_value) {
                    return match_bind(patt, value.clone(), ej, act, None);
                }
            } else if let Value::List(pair) = &specimen {
                if pair.len() == 2 && pair[0] == key_value {
                    return match_bind(patt, pair[1].clone(), ej, act, None);
                }
            }
            match default {
                Some(d) => {
                    let value = eval_expr(d, act)?;
                    match_bind(patt, value, ej, act, None)
                }
                None => fail(ej, format!("missing named argument {key_value}")),
            }
        }
    }
}

fn as_slot(specimen: Value, ej: &Value) -> RunResult<Slot> {
    match specimen {
        Value::Slot(s) => Ok(s),
        Value::Binding(b) => Ok(b.slot()),
        other => fail(ej, format!("expected a slot, got {}", other.type_name())),
    }
}

fn as_binding(specimen: Value) -> Binding {
    match specimen {
        Value::Binding(b) => b,
        Value::Slot(s) => Binding::from_slot(s),
        other => Binding::final_binding(other, any_guard()),
    }
}
