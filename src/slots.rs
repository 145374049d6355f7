//! **RecoverSlots**: normalizes the seven raw pattern shapes
//! into the handful of storage-severity-specific pattern
//! kinds that `LayoutScopes` and `BindNouns` actually discriminate on.
//!
//! `Final`/`Var` patterns carry a [`crate::ast::Sigil`] saying whether the
//! bound name should store a bare value, a slot, or a binding; this pass
//! resolves that sigil into a concrete pattern variant so later passes
//! never have to re-inspect it.

use crate::{
    ast,
    error::{LoadError, LoadResult},
};

#[derive(Debug, Clone)]
pub enum Patt {
    Ignore(Option<Expr>),
    /// `def name`/`var name` — the common case, a bare value in storage.
    Noun { name: String, guard: Option<Expr>, mutable: bool },
    /// `def &name := ...` — storage holds the slot itself, not reassignable.
    FinalSlot { name: String, guard: Option<Expr> },
    /// `var &name := ...` — storage holds the slot itself, reassignable.
    VarSlot { name: String, guard: Option<Expr> },
    /// `def &&name := ...` with an optional guard on the binding value.
    FinalBinding { name: String, guard: Option<Expr> },
    VarBinding { name: String, guard: Option<Expr> },
    /// A bare `&&name` parameter pattern: stores the specimen directly, no
    /// guard coercion at all.
    RawBinding { name: String },
    List(Vec<Patt>),
    Via { trans: Expr, inner: Box<Patt> },
    Named { key: Expr, patt: Box<Patt>, default: Option<Expr> },
}

/// The expression tree with every pattern normalized. Structurally
/// identical to [`ast::Expr`] otherwise.
#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Char(char),
    Double(f64),
    Int(num_bigint::BigInt),
    Str(String),
    Call { recv: Box<Expr>, verb: String, args: Vec<Expr>, named_args: Vec<NamedArg> },
    Def { patt: Patt, ejector: Option<Box<Expr>>, rvalue: Box<Expr> },
    EscapeOnly { patt: Patt, body: Box<Expr> },
    Escape { ej_patt: Patt, ej_body: Box<Expr>, catch_patt: Patt, catch_body: Box<Expr> },
    Finally { body: Box<Expr>, at_last: Box<Expr> },
    If { test: Box<Expr>, cons: Box<Expr>, alt: Box<Expr> },
    Try { body: Box<Expr>, catch_patt: Patt, catch_body: Box<Expr> },
    Seq(Vec<Expr>),
    Assign { name: String, value: Box<Expr> },
    Noun(String),
    Binding(String),
    Hide(Box<Expr>),
    Object {
        doc: Option<String>,
        patt: Patt,
        auditors: Vec<Expr>,
        methods: Vec<Method>,
        matchers: Vec<Matcher>,
    },
    MetaContext,
    MetaState,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub doc: Option<String>,
    pub verb: String,
    pub patts: Vec<Patt>,
    pub named_patts: Vec<NamedPatt>,
    pub guard: Option<Box<Expr>>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub patt: Patt,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct NamedPatt {
    pub key: Expr,
    pub patt: Patt,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct NamedArg {
    pub key: Box<Expr>,
    pub value: Box<Expr>,
}

pub fn recover_slots(expr: ast::Expr) -> LoadResult<Expr> {
    Ok(match expr {
        ast::Expr::Null => Expr::Null,
        ast::Expr::Char(c) => Expr::Char(c),
        ast::Expr::Double(d) => Expr::Double(d),
        ast::Expr::Int(i) => Expr::Int(i),
        ast::Expr::Str(s) => Expr::Str(s),
        ast::Expr::Call { recv, verb, args, named_args } => Expr::Call {
            recv: Box::new(recover_slots(*recv)?),
            verb,
            args: args.into_iter().map(recover_slots).collect::<LoadResult<_>>()?,
            named_args: named_args
                .into_iter()
                .map(|a| {
                    Ok(NamedArg {
                        key: Box::new(recover_slots(*a.key)?),
                        value: Box::new(recover_slots(*a.value)?),
                    })
                })
                .collect::<LoadResult<_>>()?,
        },
        ast::Expr::Def { patt, ejector, rvalue } => Expr::Def {
            patt: recover_patt(patt)?,
            ejector: ejector.map(|e| recover_slots(*e).map(Box::new)).transpose()?,
            rvalue: Box::new(recover_slots(*rvalue)?),
        },
        ast::Expr::EscapeOnly { patt, body } => {
            Expr::EscapeOnly { patt: recover_patt(patt)?, body: Box::new(recover_slots(*body)?) }
        }
        ast::Expr::Escape { ej_patt, ej_body, catch_patt, catch_body } => Expr::Escape {
            ej_patt: recover_patt(ej_patt)?,
            ej_body: Box::new(recover_slots(*ej_body)?),
            catch_patt: recover_patt(catch_patt)?,
            catch_body: Box::new(recover_slots(*catch_body)?),
        },
        ast::Expr::Finally { body, at_last } => Expr::Finally {
            body: Box::new(recover_slots(*body)?),
            at_last: Box::new(recover_slots(*at_last)?),
        },
        ast::Expr::If { test, cons, alt } => Expr::If {
            test: Box::new(recover_slots(*test)?),
            cons: Box::new(recover_slots(*cons)?),
            alt: Box::new(recover_slots(*alt)?),
        },
        ast::Expr::Try { body, catch_patt, catch_body } => Expr::Try {
            body: Box::new(recover_slots(*body)?),
            catch_patt: recover_patt(catch_patt)?,
            catch_body: Box::new(recover_slots(*catch_body)?),
        },
        ast::Expr::Seq(exprs) => {
            Expr::Seq(exprs.into_iter().map(recover_slots).collect::<LoadResult<_>>()?)
        }
        ast::Expr::Assign { name, value } => {
            Expr::Assign { name, value: Box::new(recover_slots(*value)?) }
        }
        ast::Expr::Noun(n) => Expr::Noun(n),
        ast::Expr::Binding(n) => Expr::Binding(n),
        ast::Expr::Hide(inner) => Expr::Hide(Box::new(recover_slots(*inner)?)),
        ast::Expr::Object { doc, patt, auditors, methods, matchers } => Expr::Object {
            doc,
            patt: recover_patt(patt)?,
            auditors: auditors.into_iter().map(recover_slots).collect::<LoadResult<_>>()?,
            methods: methods
                .into_iter()
                .map(|m| {
                    Ok(Method {
                        doc: m.doc,
                        verb: m.verb,
                        patts: m.patts.into_iter().map(recover_patt).collect::<LoadResult<_>>()?,
                        named_patts: m
                            .named_patts
                            .into_iter()
                            .map(recover_named_patt)
                            .collect::<LoadResult<_>>()?,
                        guard: m.guard.map(|g| recover_slots(*g).map(Box::new)).transpose()?,
                        body: Box::new(recover_slots(*m.body)?),
                    })
                })
                .collect::<LoadResult<_>>()?,
            matchers: matchers
                .into_iter()
                .map(|m| Ok(Matcher { patt: recover_patt(m.patt)?, body: Box::new(recover_slots(*m.body)?) }))
                .collect::<LoadResult<_>>()?,
        },
        ast::Expr::MetaContext => Expr::MetaContext,
        ast::Expr::MetaState => Expr::MetaState,
    })
}

fn recover_named_patt(np: ast::NamedPatt) -> LoadResult<NamedPatt> {
    Ok(NamedPatt {
        key: recover_slots(*np.key)?,
        patt: recover_patt(np.patt)?,
        default: np.default.map(|d| recover_slots(*d)).transpose()?,
    })
}

fn recover_patt(patt: ast::Patt) -> LoadResult<Patt> {
    Ok(match patt {
        ast::Patt::Ignore(guard) => Patt::Ignore(guard.map(|g| recover_slots(*g)).transpose()?),
        ast::Patt::Final { name, sigil, guard } => {
            let guard = guard.map(|g| recover_slots(*g)).transpose()?;
            match sigil {
                ast::Sigil::Noun => Patt::Noun { name, guard, mutable: false },
                ast::Sigil::Slot => Patt::FinalSlot { name, guard },
                ast::Sigil::Binding => Patt::FinalBinding { name, guard },
            }
        }
        ast::Patt::Var { name, sigil, guard } => {
            let guard = guard.map(|g| recover_slots(*g)).transpose()?;
            match sigil {
                ast::Sigil::Noun => Patt::Noun { name, guard, mutable: true },
                ast::Sigil::Slot => Patt::VarSlot { name, guard },
                ast::Sigil::Binding => Patt::VarBinding { name, guard },
            }
        }
        ast::Patt::Binding { name } => Patt::RawBinding { name },
        ast::Patt::List(patts) => {
            Patt::List(patts.into_iter().map(recover_patt).collect::<LoadResult<_>>()?)
        }
        ast::Patt::Via { trans, inner } => Patt::Via {
            trans: recover_slots(*trans)?,
            inner: Box::new(recover_patt(*inner)?),
        },
        ast::Patt::Named { key, patt, default } => Patt::Named {
            key: recover_slots(*key)?,
            patt: Box::new(recover_patt(*patt)?),
            default: default.map(|d| recover_slots(*d)).transpose()?,
        },
    })
}

/// Every name bound by a pattern, used by scope-resolution's shadow
/// checks. Composite patterns (list/via/named) recurse into their
/// members; this is a flat, order-preserving walk.
pub fn bound_names(patt: &Patt, out: &mut Vec<String>) {
    match patt {
        Patt::Ignore(_) => {}
        Patt::Noun { name, .. }
        | Patt::FinalSlot { name, .. }
        | Patt::VarSlot { name, .. }
        | Patt::FinalBinding { name, .. }
        | Patt::VarBinding { name, .. }
        | Patt::RawBinding { name } => out.push(name.clone()),
        Patt::List(patts) => patts.iter().for_each(|p| bound_names(p, out)),
        Patt::Via { inner, .. } => bound_names(inner, out),
        Patt::Named { patt, .. } => bound_names(patt, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_noun_is_immutable() {
        let patt = ast::Patt::Final { name: "x".into(), sigil: ast::Sigil::Noun, guard: None };
        match recover_patt(patt).unwrap() {
            Patt::Noun { mutable, .. } => assert!(!mutable),
            other => panic!("expected Noun, got {other:?}"),
        }
    }

    #[test]
    fn var_noun_is_mutable() {
        let patt = ast::Patt::Var { name: "x".into(), sigil: ast::Sigil::Noun, guard: None };
        match recover_patt(patt).unwrap() {
            Patt::Noun { mutable, .. } => assert!(mutable),
            other => panic!("expected Noun, got {other:?}"),
        }
    }

    #[test]
    fn final_slot_sigil_recovered() {
        let patt = ast::Patt::Final { name: "x".into(), sigil: ast::Sigil::Slot, guard: None };
        assert!(matches!(recover_patt(patt).unwrap(), Patt::FinalSlot { .. }));
    }
}
