//! Runtime objects: frame construction (with self-patching) and method
//! dispatch.

use std::{cell::RefCell, rc::Rc};

use crate::{
    error::{RunError, RunResult},
    eval::{self, Activation},
    ir,
    value::{NamedArgs, Storage, Value},
};

/// A constructed object: the script it runs plus its captured frame.
/// `cached_atom` remembers the last (verb, arity) dispatched, skipping the
/// linear scan over `script.methods` on repeat calls.
pub struct InterpObject {
    pub script: Rc<ir::Script>,
    pub frame: Vec<RefCell<Storage>>,
    cached_atom: RefCell<Option<(Rc<str>, usize, usize)>>,
}

impl InterpObject {
    pub fn display_name(&self) -> &str {
        &self.script.display_name
    }

    fn find_method(&self, verb: &str, arity: usize) -> Option<usize> {
        if let Some((v, a, idx)) = &*self.cached_atom.borrow() {
            if a == &arity && v.as_ref() == verb {
                return Some(*idx);
            }
        }
        let idx = self.script.methods.iter().position(|m| m.arity == arity && m.verb.as_ref() == verb)?;
        *self.cached_atom.borrow_mut() = Some((self.script.methods[idx].verb.clone(), arity, idx));
        Some(idx)
    }

    pub fn dispatch(self: &Rc<Self>, verb: &str, args: &[Value], named: &NamedArgs) -> RunResult<Value> {
        let _guard = crate::limits::RecursionGuard::enter()?;
        let arity = args.len();
        if let Some(idx) = self.find_method(verb, arity) {
            return self.call_method(idx, args, named);
        }
        for idx in 0..self.script.matchers.len() {
            if let Some(result) = self.try_matcher(idx, verb, args, named)? {
                return Ok(result);
            }
        }
        Err(RunError::thrown(Value::str(format!("{} does not respond to {verb}/{arity}",
            self.display_name()
        ))))
    }

    /// Builds the activation a method/matcher body runs in. A method or
    /// matcher body only ever resolves names to `Local`, `Frame`, or a
    /// nested object's own captures — `bind::Binder::resolve_from` folds
    /// every cross-object reference into a frame capture at the point the
    /// object is defined, so `ir::ScopeClass::Outer` can only appear in
    /// top-level code. The outers slice here is therefore always empty.
    fn new_activation(&self, local_size: usize) -> Activation<'_> {
        Activation {
            locals: (0..local_size).map(|_| RefCell::new(Storage::null_binding())).collect(),
            frame: &self.frame,
            outers: &[],
        }
    }

    fn call_method(self: &Rc<Self>, idx: usize, args: &[Value], named: &NamedArgs) -> RunResult<Value> {
        let method = &self.script.methods[idx];
        eval::trace_dispatch(self.display_name(), &method.verb, method.arity);
        let act = self.new_activation(method.local_size);

        let ej = crate::value::thrower_ejector();
        for (patt, value) in method.patts.iter().zip(args.iter().cloned()) {
            eval::match_bind(patt, value, &ej, &act, None)?;
        }
        for np in &method.named_patts {
            let key = eval::eval_expr(&np.key, &act)?;
            let value = match named.get(&key) {
                Some(v) => v.clone(),
                None => match &np.default {
                    Some(d) => eval::eval_expr(d, &act)?,
                    None => {
                        return Err(RunError::thrown(Value::str(format!("{} missing named argument {key} for {}",
                            self.display_name(),
                            method.verb
                        ))))
                    }
                },
            };
            eval::match_bind(&np.patt, value, &ej, &act, None)?;
        }
        let result = eval::eval_expr(&method.body, &act)?;
        match &method.guard {
            Some(g) => {
                let guard_value = eval::eval_expr(g, &act)?;
                crate::value::coerce(&guard_value, result, None)
            }
            None => Ok(result),
        }
    }

    /// Matchers only ever see positional arguments: a method declared for
    /// the verb is how named arguments get pattern-matched, so a matcher
    /// falling back for an unhandled verb has no named-argument specimen
    /// to offer, just `[verb, args]`.
    fn try_matcher(
        self: &Rc<Self>,
        idx: usize,
        verb: &str,
        args: &[Value],
        _named: &NamedArgs,
    ) -> RunResult<Option<Value>> {
        let matcher = &self.script.matchers[idx];
        let act = self.new_activation(matcher.local_size);
        let message = Value::list(vec![Value::str(verb), Value::list(args.to_vec())]);
        // A non-matching matcher pattern fires this throwaway ejector;
        // catching it here means "this matcher declines" rather than
        // propagating as a thrown exception. It never escapes this
        // function, so reusing the sentinel id across matchers is fine.
        let declined = crate::value::Ejector::new(crate::error::EjectorId(u64::MAX));
        let ej = Value::Host(declined.clone());
        match eval::match_bind(&matcher.patt, message, &ej, &act, None) {
            Ok(()) => eval::eval_expr(&matcher.body, &act).map(Some),
            Err(RunError::Ejecting(e)) if e.ejector == declined.id() => Ok(None),
            Err(other) => Err(other),
        }
    }
}

impl std::fmt::Debug for InterpObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InterpObject({})", self.display_name())
    }
}

/// Evaluates an object literal: captures its frame from the enclosing
/// activation, constructs the `Rc`, patches in the self-reference slot if
/// the object's own methods refer to themselves ("self-patching" — the
/// `Rc` has to exist before it can be stored into its own frame), then
/// discharges its auditors if it has any. A `Clear` object returns
/// unchanged; an `Audited` one returns whatever its guard auditor's
/// `coerce` produces, which is ordinarily the same object back.
pub fn construct_object(script: Rc<ir::Script>, enclosing: &Activation) -> RunResult<Value> {
    let mut frame = Vec::with_capacity(script.frame_size);
    for capture in &script.captures {
        let storage = match capture {
            ir::Capture::From(scope) => enclosing.read(*scope),
            ir::Capture::SelfRef => Storage::null_binding(),
        };
        frame.push(RefCell::new(storage));
    }
    let obj = Rc::new(InterpObject { script: script.clone(), frame, cached_atom: RefCell::new(None) });
    for (idx, capture) in script.captures.iter().enumerate() {
        if matches!(capture, ir::Capture::SelfRef) {
            *obj.frame[idx].borrow_mut() = Storage::Value(Value::Interp(obj.clone()));
        }
    }
    match &script.shape {
        ir::ObjectShape::Clear => Ok(Value::Interp(obj)),
        ir::ObjectShape::Audited { clipboard_id, auditors } => {
            let guard_auditor = eval::eval_expr(&auditors[0], enclosing)?;
            let rest_auditors =
                auditors[1..].iter().map(|a| eval::eval_expr(a, enclosing)).collect::<RunResult<Vec<_>>>()?;
            let guard_env: Vec<Value> = obj.frame.iter().map(|cell| cell.borrow().guard()).collect();
            crate::audit::discharge(*clipboard_id, &guard_auditor, &rest_auditors, &guard_env, Value::Interp(obj))
        }
    }
}
