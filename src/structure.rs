//! **RefactorStructure**: validates that every object's clear/audited
//! shape is internally consistent before the tree reaches the evaluator.
//!
//! `bind::bind_object` already decides `Clear` vs `Audited` and assigns
//! each audited construction site a clipboard id while it resolves scopes,
//! so by the time a tree reaches here the partition itself is already
//! load-bearing. This pass re-checks the invariants that partition is
//! supposed to uphold, a belt-and-suspenders assertion pass after a
//! fused optimization rather than trusting it silently.

use ahash::AHashSet;

use crate::{error::LoadResult, ir};

/// Walks every object literal in `expr`, checking shape invariants.
pub fn refactor_structure(expr: &ir::Expr) -> LoadResult<()> {
    let mut seen_clipboards = AHashSet::default();
    walk_expr(expr, &mut seen_clipboards)
}

fn walk_expr(expr: &ir::Expr, seen: &mut AHashSet<u32>) -> LoadResult<()> {
    match expr {
        ir::Expr::Null
        | ir::Expr::Char(_)
        | ir::Expr::Double(_)
        | ir::Expr::Int(_)
        | ir::Expr::Str(_)
        | ir::Expr::Ref { .. }
        | ir::Expr::MetaContext
        | ir::Expr::MetaState => Ok(()),
        ir::Expr::Call { recv, args, named_args, .. } => {
            walk_expr(recv, seen)?;
            for a in args {
                walk_expr(a, seen)?;
            }
            for (k, v) in named_args {
                walk_expr(k, seen)?;
                walk_expr(v, seen)?;
            }
            Ok(())
        }
        ir::Expr::Def { ejector, rvalue, .. } => {
            if let Some(e) = ejector {
                walk_expr(e, seen)?;
            }
            walk_expr(rvalue, seen)
        }
        ir::Expr::EscapeOnly { body, .. } => walk_expr(body, seen),
        ir::Expr::Escape { ej_body, catch_body, .. } => {
            walk_expr(ej_body, seen)?;
            walk_expr(catch_body, seen)
        }
        ir::Expr::Finally { body, at_last } => {
            walk_expr(body, seen)?;
            walk_expr(at_last, seen)
        }
        ir::Expr::If { test, cons, alt } => {
            walk_expr(test, seen)?;
            walk_expr(cons, seen)?;
            walk_expr(alt, seen)
        }
        ir::Expr::Try { body, catch_body, .. } => {
            walk_expr(body, seen)?;
            walk_expr(catch_body, seen)
        }
        ir::Expr::Seq(exprs) => {
            for e in exprs {
                walk_expr(e, seen)?;
            }
            Ok(())
        }
        ir::Expr::Assign { value, .. } => walk_expr(value, seen),
        ir::Expr::Hide(inner) => walk_expr(inner, seen),
        ir::Expr::Object(script) => walk_script(script, seen),
    }
}

fn walk_script(script: &ir::Script, seen: &mut AHashSet<u32>) -> LoadResult<()> {
    match &script.shape {
        ir::ObjectShape::Clear => {}
        ir::ObjectShape::Audited { clipboard_id, auditors } => {
            debug_assert!(!auditors.is_empty(), "Audited shape with no auditors should be Clear");
            for a in auditors {
                walk_expr(a, seen)?;
            }
            // Clipboard ids are assigned by a single monotonically
            // increasing counter in `bind::Binder`, so collisions would
            // mean two construction sites are about to share a cache key.
            debug_assert!(seen.insert(*clipboard_id), "duplicate clipboard id {clipboard_id}");
        }
    }
    for m in &script.methods {
        walk_expr(&m.body, seen)?;
        if let Some(g) = &m.guard {
            walk_expr(g, seen)?;
        }
        for np in &m.named_patts {
            walk_expr(&np.key, seen)?;
            if let Some(d) = &np.default {
                walk_expr(d, seen)?;
            }
        }
    }
    for m in &script.matchers {
        walk_expr(&m.body, seen)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;

    use crate::{ast, bind, mast, slots};

    fn compile(expr: ast::Expr) -> ir::Expr {
        let saved = mast::save_scripts(expr).unwrap();
        let slotted = slots::recover_slots(saved).unwrap();
        bind::bind_nouns(slotted, &AHashSet::default()).unwrap().0
    }

    #[test]
    fn clear_object_has_no_auditors() {
        let expr = ast::Expr::Object {
            doc: None,
            patt: ast::Patt::Ignore(None),
            auditors: Vec::new(),
            methods: Vec::new(),
            matchers: Vec::new(),
        };
        let ir = compile(expr);
        assert!(refactor_structure(&ir).is_ok());
    }
}
