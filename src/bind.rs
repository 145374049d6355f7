//! **LayoutScopes** + **BindNouns** + **ReifyMeta** fused into one
//! recursive-descent resolution pass.
//!
//! The three passes are kept conceptually distinct but share a single
//! scope-tracking walk: the scope tree layout has no consumer other than
//! noun binding, so building it as a separate artifact just to
//! immediately tear it down bought nothing. `DischargeAuditors`
//! (`audit.rs`) and `RefactorStructure` (`structure.rs`) remain
//! genuinely separate passes over the output of this one.
//!
//! Every name resolves to one of three scope classes:
//! - `Local`: a slot in the current method/matcher's locals array.
//! - `Frame`: a slot in the current object's captured frame array,
//!   registered here the first time something inside the object reaches
//!   for a name defined further out — the classic closure-flattening
//!   trick, so the evaluator never has to walk an enclosing-activation
//!   chain at run time.
//! - `Outer`: a name free in the whole compiled unit, resolved against the
//!   caller-supplied environment. Top-level `def`s live here too, so a
//!   REPL's later calls can see them.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    error::{LoadError, LoadResult},
    ir, slots,
};

#[derive(Debug, Clone, Copy)]
struct OuterSlot {
    index: usize,
    mutable: bool,
}

struct MethodScope {
    locals: IndexMap<String, (usize, bool)>,
}

impl MethodScope {
    fn new() -> Self {
        Self { locals: IndexMap::new() }
    }

    fn define(&mut self, name: &str, mutable: bool) -> LoadResult<usize> {
        if self.locals.contains_key(name) {
            return Err(LoadError::Redefined { name: name.to_string() });
        }
        let idx = self.locals.len();
        self.locals.insert(name.to_string(), (idx, mutable));
        Ok(idx)
    }
}

enum FrameSource {
    SelfRef,
    Captured(ir::ScopeClass),
}

struct ObjectScope {
    frame: IndexMap<String, FrameSource>,
}

impl ObjectScope {
    fn new() -> Self {
        Self { frame: IndexMap::new() }
    }

    fn seed_self(&mut self, name: &str) {
        self.frame.insert(name.to_string(), FrameSource::SelfRef);
    }

    fn capture(&mut self, name: &str, source: ir::ScopeClass) -> usize {
        let idx = self.frame.len();
        self.frame.insert(name.to_string(), FrameSource::Captured(source));
        idx
    }
}

enum Ctx {
    Method(MethodScope),
    Object(ObjectScope),
}

/// Resolution state threaded through the whole compiled unit.
struct Binder {
    stack: Vec<Ctx>,
    outers: IndexMap<String, OuterSlot>,
    next_clipboard_id: u32,
    /// Names the host environment already has bindings for. A name not
    /// found lexically and not in this set is free with nothing to bind
    /// it to, and is rejected rather than silently promoted to a fresh
    /// outer slot.
    known: AHashSet<String>,
}

impl Binder {
    fn new(known: AHashSet<String>) -> Self {
        Self { stack: Vec::new(), outers: IndexMap::new(), next_clipboard_id: 0, known }
    }

    /// Looks up `name`, capturing across object boundaries as needed, and
    /// falling through to the outer environment if nothing lexical binds
    /// it. A name already registered as an outer (from an earlier `def` or
    /// an earlier free read in this same unit) resolves there; a name
    /// that's neither lexically bound nor already an outer is accepted
    /// only if the host's `known` set has it, and rejected otherwise. Used
    /// for both ordinary reads and assignment targets.
    fn resolve(&mut self, name: &str) -> LoadResult<ir::ScopeClass> {
        if let Some(scope) = self.resolve_from(self.stack.len(), name) {
            return Ok(scope);
        }
        if let Some(slot) = self.outers.get(name) {
            return Ok(ir::ScopeClass::Outer(slot.index));
        }
        if !self.known.contains(name) {
            return Err(LoadError::NotDefined { name: name.to_string() });
        }
        let idx = self.outers.len();
        self.outers.insert(name.to_string(), OuterSlot { index: idx, mutable: true });
        Ok(ir::ScopeClass::Outer(idx))
    }

    /// Searches frames `[0, depth)` of the stack for `name`, innermost
    /// first, registering frame captures on the way back out.
    fn resolve_from(&mut self, depth: usize, name: &str) -> Option<ir::ScopeClass> {
        if depth == 0 {
            return None;
        }
        let i = depth - 1;
        enum Hit {
            Local(usize),
            LocalMiss,
            Frame(usize),
            FrameMiss,
        }
        let hit = match &self.stack[i] {
            Ctx::Method(m) => match m.locals.get(name) {
                Some((idx, _)) => Hit::Local(*idx),
                None => Hit::LocalMiss,
            },
            Ctx::Object(o) => match o.frame.get_index_of(name) {
                Some(idx) => Hit::Frame(idx),
                None => Hit::FrameMiss,
            },
        };
        match hit {
            Hit::Local(idx) => Some(ir::ScopeClass::Local(idx)),
            Hit::Frame(idx) => Some(ir::ScopeClass::Frame(idx)),
            Hit::LocalMiss => self.resolve_from(i, name),
            Hit::FrameMiss => {
                let found = self.resolve_from(i, name)?;
                let idx = match &mut self.stack[i] {
                    Ctx::Object(o) => o.capture(name, found),
                    _ => unreachable!(),
                };
                Some(ir::ScopeClass::Frame(idx))
            }
        }
    }

    /// Introduces a fresh binding for `name` in the innermost scope,
    /// rejecting a second definition in that same scope
    /// (`requireShadowable`).
    fn define(&mut self, name: &str, mutable: bool) -> LoadResult<ir::ScopeClass> {
        match self.stack.last_mut() {
            Some(Ctx::Method(m)) => Ok(ir::ScopeClass::Local(m.define(name, mutable)?)),
            Some(Ctx::Object(o)) => {
                if o.frame.contains_key(name) {
                    return Err(LoadError::Redefined { name: name.to_string() });
                }
                let idx = o.frame.len();
                o.frame.insert(name.to_string(), FrameSource::SelfRef);
                Ok(ir::ScopeClass::Frame(idx))
            }
            None => {
                if self.outers.contains_key(name) {
                    return Err(LoadError::Redefined { name: name.to_string() });
                }
                let idx = self.outers.len();
                self.outers.insert(name.to_string(), OuterSlot { index: idx, mutable });
                Ok(ir::ScopeClass::Outer(idx))
            }
        }
    }

    fn mutable_at(&self, scope: ir::ScopeClass) -> bool {
        match scope {
            ir::ScopeClass::Local(idx) => self
                .stack
                .iter()
                .rev()
                .find_map(|c| match c {
                    Ctx::Method(m) => m.locals.values().find(|(i, _)| *i == idx).map(|(_, mutable)| *mutable),
                    Ctx::Object(_) => None,
                })
                .unwrap_or(true),
            ir::ScopeClass::Frame(_) => true,
            ir::ScopeClass::Outer(idx) => {
                self.outers.values().find(|s| s.index == idx).map(|s| s.mutable).unwrap_or(true)
            }
        }
    }
}

/// Entry point: resolves every name in `expr` against `known_outers` (the
/// names the host environment already has bindings for), returning the
/// final IR plus the ordered list of free outer names actually read or
/// defined. A name neither lexically bound nor present in `known_outers`
/// is a [`LoadError::NotDefined`].
pub fn bind_nouns(expr: slots::Expr, known_outers: &AHashSet<String>) -> LoadResult<(ir::Expr, Vec<String>)> {
    let mut binder = Binder::new(known_outers.clone());
    let resolved = bind_expr(&mut binder, expr)?;
    let mut names: Vec<(String, usize)> =
        binder.outers.into_iter().map(|(name, slot)| (name, slot.index)).collect();
    names.sort_by_key(|(_, idx)| *idx);
    Ok((resolved, names.into_iter().map(|(name, _)| name).collect()))
}

fn bind_expr(b: &mut Binder, expr: slots::Expr) -> LoadResult<ir::Expr> {
    Ok(match expr {
        slots::Expr::Null => ir::Expr::Null,
        slots::Expr::Char(c) => ir::Expr::Char(c),
        slots::Expr::Double(d) => ir::Expr::Double(d),
        slots::Expr::Int(i) => ir::Expr::Int(i),
        slots::Expr::Str(s) => ir::Expr::Str(s.into()),
        slots::Expr::Call { recv, verb, args, named_args } => ir::Expr::Call {
            recv: Box::new(bind_expr(b, *recv)?),
            verb: verb.into(),
            args: args.into_iter().map(|a| bind_expr(b, a)).collect::<LoadResult<_>>()?,
            named_args: named_args
                .into_iter()
                .map(|a| Ok((bind_expr(b, *a.key)?, bind_expr(b, *a.value)?)))
                .collect::<LoadResult<_>>()?,
        },
        slots::Expr::Def { patt, ejector, rvalue } => {
            let rvalue = Box::new(bind_expr(b, *rvalue)?);
            let ejector = ejector.map(|e| bind_expr(b, *e).map(Box::new)).transpose()?;
            let patt = bind_patt(b, patt)?;
            ir::Expr::Def { patt, ejector, rvalue }
        }
        slots::Expr::EscapeOnly { patt, body } => {
            let ej_patt = bind_patt(b, patt)?;
            let body = Box::new(bind_expr(b, *body)?);
            ir::Expr::EscapeOnly { ej_patt, body }
        }
        slots::Expr::Escape { ej_patt, ej_body, catch_patt, catch_body } => {
            let ej_patt = bind_patt(b, ej_patt)?;
            let ej_body = Box::new(bind_expr(b, *ej_body)?);
            let catch_patt = bind_patt(b, catch_patt)?;
            let catch_body = Box::new(bind_expr(b, *catch_body)?);
            ir::Expr::Escape { ej_patt, ej_body, catch_patt, catch_body }
        }
        slots::Expr::Finally { body, at_last } => ir::Expr::Finally {
            body: Box::new(bind_expr(b, *body)?),
            at_last: Box::new(bind_expr(b, *at_last)?),
        },
        slots::Expr::If { test, cons, alt } => ir::Expr::If {
            test: Box::new(bind_expr(b, *test)?),
            cons: Box::new(bind_expr(b, *cons)?),
            alt: Box::new(bind_expr(b, *alt)?),
        },
        slots::Expr::Try { body, catch_patt, catch_body } => {
            let body = Box::new(bind_expr(b, *body)?);
            let catch_patt = bind_patt(b, catch_patt)?;
            let catch_body = Box::new(bind_expr(b, *catch_body)?);
            ir::Expr::Try { body, catch_patt, catch_body }
        }
        slots::Expr::Seq(exprs) => {
            ir::Expr::Seq(exprs.into_iter().map(|e| bind_expr(b, e)).collect::<LoadResult<_>>()?)
        }
        slots::Expr::Assign { name, value } => {
            let value = Box::new(bind_expr(b, *value)?);
            let scope = b.resolve(&name)?;
            if !b.mutable_at(scope) {
                return Err(LoadError::AssignToFinal { name });
            }
            ir::Expr::Assign { scope, value }
        }
        slots::Expr::Noun(name) => {
            ir::Expr::Ref { severity: ir::Severity::Noun, scope: b.resolve(&name)? }
        }
        slots::Expr::Binding(name) => {
            ir::Expr::Ref { severity: ir::Severity::Binding, scope: b.resolve(&name)? }
        }
        slots::Expr::Hide(inner) => ir::Expr::Hide(Box::new(bind_expr(b, *inner)?)),
        slots::Expr::Object { doc, patt, auditors, methods, matchers } => {
            bind_object(b, doc, patt, auditors, methods, matchers)?
        }
        slots::Expr::MetaContext => ir::Expr::MetaContext,
        slots::Expr::MetaState => ir::Expr::MetaState,
    })
}

fn self_name(patt: &slots::Patt) -> Option<&str> {
    match patt {
        slots::Patt::Noun { name, .. }
        | slots::Patt::FinalSlot { name, .. }
        | slots::Patt::VarSlot { name, .. }
        | slots::Patt::FinalBinding { name, .. }
        | slots::Patt::VarBinding { name, .. }
        | slots::Patt::RawBinding { name } => Some(name),
        _ => None,
    }
}

fn bind_object(
    b: &mut Binder,
    doc: Option<String>,
    patt: slots::Patt,
    auditors: Vec<slots::Expr>,
    methods: Vec<slots::Method>,
    matchers: Vec<slots::Matcher>,
) -> LoadResult<ir::Expr> {
    // Auditor expressions run in the enclosing scope, before the object's
    // own frame exists.
    let auditors = auditors.into_iter().map(|a| bind_expr(b, a)).collect::<LoadResult<Vec<_>>>()?;

    let mut object_scope = ObjectScope::new();
    if let Some(name) = self_name(&patt) {
        object_scope.seed_self(name);
    }
    b.stack.push(Ctx::Object(object_scope));

    let methods = methods.into_iter().map(|m| bind_method(b, m)).collect::<LoadResult<_>>()?;
    let matchers = matchers.into_iter().map(|m| bind_matcher(b, m)).collect::<LoadResult<_>>()?;

    let object_scope = match b.stack.pop() {
        Some(Ctx::Object(o)) => o,
        _ => unreachable!("pushed an object scope just above"),
    };
    let frame_size = object_scope.frame.len();
    let captures = object_scope
        .frame
        .into_values()
        .map(|src| match src {
            FrameSource::SelfRef => ir::Capture::SelfRef,
            FrameSource::Captured(scope) => ir::Capture::From(scope),
        })
        .collect();

    let shape = if auditors.is_empty() {
        ir::ObjectShape::Clear
    } else {
        let clipboard_id = b.next_clipboard_id;
        b.next_clipboard_id += 1;
        ir::ObjectShape::Audited { clipboard_id, auditors }
    };

    let display_name: std::rc::Rc<str> = self_name(&patt).unwrap_or("_").into();
    let script = ir::Script {
        display_name,
        doc: doc.map(Into::into),
        frame_size,
        captures,
        shape,
        methods,
        matchers,
    };
    let object_expr = ir::Expr::Object(std::rc::Rc::new(script));

    // The object's own name is bound in the *enclosing* scope, same as an
    // ordinary `Def` would.
    let self_patt = bind_patt(b, patt)?;
    Ok(ir::Expr::Def {
        patt: self_patt,
        ejector: None,
        rvalue: Box::new(object_expr),
    })
}

fn bind_method(b: &mut Binder, m: slots::Method) -> LoadResult<ir::Method> {
    b.stack.push(Ctx::Method(MethodScope::new()));
    let arity = m.patts.len();
    let patts = m.patts.into_iter().map(|p| bind_patt(b, p)).collect::<LoadResult<_>>()?;
    let named_patts = m.named_patts.into_iter().map(|np| bind_named_patt(b, np)).collect::<LoadResult<_>>()?;
    let guard = m.guard.map(|g| bind_expr(b, *g).map(Box::new)).transpose()?;
    let body = Box::new(bind_expr(b, *m.body)?);
    let local_size = match b.stack.pop() {
        Some(Ctx::Method(m)) => m.locals.len(),
        _ => unreachable!("pushed a method scope just above"),
    };
    Ok(ir::Method {
        verb: m.verb.into(),
        arity,
        doc: m.doc.map(Into::into),
        patts,
        named_patts,
        guard,
        body,
        local_size,
    })
}

fn bind_matcher(b: &mut Binder, m: slots::Matcher) -> LoadResult<ir::Matcher> {
    b.stack.push(Ctx::Method(MethodScope::new()));
    let patt = bind_patt(b, m.patt)?;
    let body = Box::new(bind_expr(b, *m.body)?);
    let local_size = match b.stack.pop() {
        Some(Ctx::Method(m)) => m.locals.len(),
        _ => unreachable!("pushed a method scope just above"),
    };
    Ok(ir::Matcher { patt, body, local_size })
}

fn bind_named_patt(b: &mut Binder, np: slots::NamedPatt) -> LoadResult<ir::NamedPatt> {
    let key = Box::new(bind_expr(b, np.key)?);
    let default = np.default.map(|d| bind_expr(b, d).map(Box::new)).transpose()?;
    let patt = bind_patt(b, np.patt)?;
    Ok(ir::NamedPatt { key, patt, default })
}

fn bind_patt(b: &mut Binder, patt: slots::Patt) -> LoadResult<ir::Patt> {
    Ok(match patt {
        slots::Patt::Ignore(guard) => {
            ir::Patt::Ignore(guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?)
        }
        slots::Patt::Noun { name, guard, mutable } => {
            let guard = guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?;
            let scope = b.define(&name, mutable)?;
            ir::Patt::Noun { scope, guard, mutable }
        }
        slots::Patt::FinalSlot { name, guard } => {
            let guard = guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?;
            let scope = b.define(&name, true)?;
            ir::Patt::FinalSlot { scope, guard }
        }
        slots::Patt::VarSlot { name, guard } => {
            let guard = guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?;
            let scope = b.define(&name, true)?;
            ir::Patt::VarSlot { scope, guard }
        }
        slots::Patt::FinalBinding { name, guard } => {
            let guard = guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?;
            let scope = b.define(&name, true)?;
            ir::Patt::FinalBinding { scope, guard }
        }
        slots::Patt::VarBinding { name, guard } => {
            let guard = guard.map(|g| bind_expr(b, g).map(Box::new)).transpose()?;
            let scope = b.define(&name, true)?;
            ir::Patt::VarBinding { scope, guard }
        }
        slots::Patt::RawBinding { name } => {
            let scope = b.define(&name, true)?;
            ir::Patt::RawBinding { scope }
        }
        slots::Patt::List(patts) => {
            ir::Patt::List(patts.into_iter().map(|p| bind_patt(b, p)).collect::<LoadResult<_>>()?)
        }
        slots::Patt::Via { trans, inner } => ir::Patt::Via {
            trans: Box::new(bind_expr(b, trans)?),
            inner: Box::new(bind_patt(b, *inner)?),
        },
        slots::Patt::Named { key, patt, default } => ir::Patt::Named {
            key: Box::new(bind_expr(b, key)?),
            patt: Box::new(bind_patt(b, *patt)?),
            default: default.map(|d| bind_expr(b, d).map(Box::new)).transpose()?,
        },
    })
}
