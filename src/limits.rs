//! Resource limits for the evaluator: a recursion-depth ceiling that turns
//! a runaway tree walk into a `RunError` instead of a host stack overflow.
//!
//! The evaluator is a literal recursive Rust function; there is no
//! `Namespaces`-style allocator to thread a tracker object through, so
//! the depth counter lives in a thread-local, set once per top-level
//! `driver::eval_monte`/`eval_to_pair` call. This crate does not support
//! reentrant evaluation from within a host callback; that is out of
//! scope (single-threaded, synchronous).

use std::cell::Cell;

use crate::error::{RunError, RunResult};

/// Caller-configured ceilings. `None` means unlimited, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalLimits {
    pub max_depth: Option<usize>,
}

impl EvalLimits {
    pub fn unlimited() -> Self {
        Self { max_depth: None }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth: Some(max_depth) }
    }
}

thread_local! {
    static LIMITS: Cell<EvalLimits> = Cell::new(EvalLimits::unlimited());
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Installs `limits` for the duration of a top-level evaluation, restoring
/// whatever was active before on drop.
pub struct LimitsScope {
    previous: EvalLimits,
}

impl LimitsScope {
    pub fn install(limits: EvalLimits) -> Self {
        let previous = LIMITS.with(|l| l.replace(limits));
        DEPTH.with(|d| d.set(0));
        Self { previous }
    }
}

impl Drop for LimitsScope {
    fn drop(&mut self) {
        LIMITS.with(|l| l.set(self.previous));
    }
}

/// Held for the duration of one method/matcher activation
/// (`object::InterpObject::dispatch`). Dropping it always restores the
/// depth counter, including on the error path via `?`.
pub struct RecursionGuard;

impl RecursionGuard {
    pub fn enter() -> RunResult<Self> {
        let depth = DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        let max_depth = LIMITS.with(|l| l.get().max_depth);
        if let Some(max) = max_depth {
            if depth > max {
                return Err(RunError::ResourceExceeded {
                    reason: format!("recursion depth exceeded ({max})"),
                });
            }
        }
        Ok(Self)
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
