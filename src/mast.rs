//! **SaveScripts**: groups an object's methods and matchers by atom
//! (verb, arity) and rejects duplicate atoms up front, before any scope
//! analysis runs.
//!
//! Everything below this pass still carries raw, un-recovered
//! [`crate::ast::Patt`] values; [`crate::slots`] normalizes those next.

use crate::{
    ast,
    error::{LoadError, LoadResult},
};

/// An object's method/matcher table, tagged with atoms and de-duplicated.
/// Mirrors `ast::Expr::Object` one-for-one except for this bookkeeping.
#[derive(Debug, Clone)]
pub struct Script {
    pub doc: Option<String>,
    pub patt: ast::Patt,
    pub auditors: Vec<ast::Expr>,
    pub methods: Vec<Method>,
    pub matchers: Vec<ast::Matcher>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub doc: Option<String>,
    pub verb: String,
    pub arity: usize,
    pub patts: Vec<ast::Patt>,
    pub named_patts: Vec<ast::NamedPatt>,
    pub guard: Option<Box<ast::Expr>>,
    pub body: Box<ast::Expr>,
}

/// Replaces every `Object` node in `expr` with its saved-script form,
/// recursing through every other expression shape unchanged.
pub fn save_scripts(expr: ast::Expr) -> LoadResult<ast::Expr> {
    Ok(match expr {
        ast::Expr::Object { doc, patt, auditors, methods, matchers } => {
            let script = save_object(doc, patt, auditors, methods, matchers)?;
            // The evaluator's input type keeps objects as `ast::Expr::Object`
            // further down the pipeline (`mast` only validates), so we fold
            // the script straight back into the tree rather than invent a
            // parallel expression type here.
            ast::Expr::Object {
                doc: script.doc,
                patt: script.patt,
                auditors: script.auditors,
                methods: script
                    .methods
                    .into_iter()
                    .map(|m| ast::Method {
                        doc: m.doc,
                        verb: m.verb,
                        patts: m.patts,
                        named_patts: m.named_patts,
                        guard: m.guard,
                        body: m.body,
                    })
                    .collect(),
                matchers: script.matchers,
            }
        }
        ast::Expr::Call { recv, verb, args, named_args } => ast::Expr::Call {
            recv: Box::new(save_scripts(*recv)?),
            verb,
            args: args.into_iter().map(save_scripts).collect::<LoadResult<_>>()?,
            named_args: named_args
                .into_iter()
                .map(|a| {
                    Ok(ast::NamedArg {
                        key: Box::new(save_scripts(*a.key)?),
                        value: Box::new(save_scripts(*a.value)?),
                    })
                })
                .collect::<LoadResult<_>>()?,
        },
        ast::Expr::Def { patt, ejector, rvalue } => ast::Expr::Def {
            patt,
            ejector: ejector.map(|e| save_scripts(*e).map(Box::new)).transpose()?,
            rvalue: Box::new(save_scripts(*rvalue)?),
        },
        ast::Expr::EscapeOnly { patt, body } => {
            ast::Expr::EscapeOnly { patt, body: Box::new(save_scripts(*body)?) }
        }
        ast::Expr::Escape { ej_patt, ej_body, catch_patt, catch_body } => ast::Expr::Escape {
            ej_patt,
            ej_body: Box::new(save_scripts(*ej_body)?),
            catch_patt,
            catch_body: Box::new(save_scripts(*catch_body)?),
        },
        ast::Expr::Finally { body, at_last } => ast::Expr::Finally {
            body: Box::new(save_scripts(*body)?),
            at_last: Box::new(save_scripts(*at_last)?),
        },
        ast::Expr::If { test, cons, alt } => ast::Expr::If {
            test: Box::new(save_scripts(*test)?),
            cons: Box::new(save_scripts(*cons)?),
            alt: Box::new(save_scripts(*alt)?),
        },
        ast::Expr::Try { body, catch_patt, catch_body } => ast::Expr::Try {
            body: Box::new(save_scripts(*body)?),
            catch_patt,
            catch_body: Box::new(save_scripts(*catch_body)?),
        },
        ast::Expr::Seq(exprs) => {
            ast::Expr::Seq(exprs.into_iter().map(save_scripts).collect::<LoadResult<_>>()?)
        }
        ast::Expr::Assign { name, value } => {
            ast::Expr::Assign { name, value: Box::new(save_scripts(*value)?) }
        }
        ast::Expr::Hide(inner) => ast::Expr::Hide(Box::new(save_scripts(*inner)?)),
        leaf @ (ast::Expr::Null
        | ast::Expr::Char(_)
        | ast::Expr::Double(_)
        | ast::Expr::Int(_)
        | ast::Expr::Str(_)
        | ast::Expr::Noun(_)
        | ast::Expr::Binding(_)
        | ast::Expr::MetaContext
        | ast::Expr::MetaState) => leaf,
    })
}

fn save_object(
    doc: Option<String>,
    patt: ast::Patt,
    auditors: Vec<ast::Expr>,
    methods: Vec<ast::Method>,
    matchers: Vec<ast::Matcher>,
) -> LoadResult<Script> {
    let auditors = auditors.into_iter().map(save_scripts).collect::<LoadResult<_>>()?;
    let mut seen = ahash::AHashSet::default();
    let mut saved = Vec::with_capacity(methods.len());
    for m in methods {
        let arity = m.patts.len();
        if !seen.insert((m.verb.clone(), arity)) {
            return Err(LoadError::DuplicateAtom { verb: m.verb, arity });
        }
        saved.push(Method {
            doc: m.doc,
            verb: m.verb,
            arity,
            patts: m.patts,
            named_patts: m.named_patts,
            guard: m.guard.map(|g| save_scripts(*g).map(Box::new)).transpose()?,
            body: Box::new(save_scripts(*m.body)?),
        });
    }
    let matchers = matchers
        .into_iter()
        .map(|m| Ok(ast::Matcher { patt: m.patt, body: Box::new(save_scripts(*m.body)?) }))
        .collect::<LoadResult<_>>()?;
    Ok(Script { doc, patt, auditors, methods: saved, matchers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(verb: &str, arity: usize) -> ast::Method {
        ast::Method {
            doc: None,
            verb: verb.to_string(),
            patts: (0..arity).map(|_| ast::Patt::Ignore(None)).collect(),
            named_patts: Vec::new(),
            guard: None,
            body: Box::new(ast::Expr::Null),
        }
    }

    #[test]
    fn duplicate_atom_rejected() {
        let obj = ast::Expr::Object {
            doc: None,
            patt: ast::Patt::Ignore(None),
            auditors: Vec::new(),
            methods: vec![method("run", 1), method("run", 1)],
            matchers: Vec::new(),
        };
        let err = save_scripts(obj).unwrap_err();
        assert_eq!(err, LoadError::DuplicateAtom { verb: "run".into(), arity: 1 });
    }

    #[test]
    fn distinct_arity_is_fine() {
        let obj = ast::Expr::Object {
            doc: None,
            patt: ast::Patt::Ignore(None),
            auditors: Vec::new(),
            methods: vec![method("run", 0), method("run", 1)],
            matchers: Vec::new(),
        };
        assert!(save_scripts(obj).is_ok());
    }
}
