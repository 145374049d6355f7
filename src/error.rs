//! Error types for the compilation pipeline and the evaluator.
//!
//! Two independent families, matching the two places things can go
//! wrong: [`LoadError`] aborts a pipeline pass before the evaluator ever
//! runs, while [`Thrown`] and [`Ejecting`] are runtime control-flow
//! values produced while a program is executing. Neither wraps the
//! other: a load failure never reaches the evaluator, and a thrown
//! exception or ejector fire never propagates out of the pipeline.

use std::fmt;

use crate::value::Value;

/// A failure raised during a compilation pass (SaveScripts through
/// RefactorStructure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A noun, binding, or assignment referenced a name with no enclosing
    /// definition.
    NotDefined { name: String },
    /// An assignment targeted a name whose severity is not mutable.
    AssignToFinal { name: String },
    /// A pattern tried to bind a name already bound in a scope where
    /// shadowing is forbidden (`requireShadowable`).
    Redefined { name: String },
    /// A list pattern's arity could not be determined statically, or an
    /// object pattern had an unsupported shape.
    InvalidPattern { reason: String },
    /// Two methods (or two matchers acting as methods) on the same object
    /// share a verb/arity atom.
    DuplicateAtom { verb: String, arity: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDefined { name } => write!(f, "{name} is not defined"),
            Self::AssignToFinal { name } => {
                write!(f, "Cannot assign to final variable {name}")
            }
            Self::Redefined { name } => write!(f, "Cannot redefine {name}"),
            Self::InvalidPattern { reason } => write!(f, "invalid pattern: {reason}"),
            Self::DuplicateAtom { verb, arity } => {
                write!(f, "duplicate method {verb}/{arity}")
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Result alias used throughout the compilation pipeline.
pub type LoadResult<T> = Result<T, LoadError>;

/// A sealed user exception, produced when a `Try` form catches a thrown
/// value.
///
/// Exceptions are sealed when caught by a `Try` form: the payload is fixed
/// and a (possibly empty) stack trace of display names is attached.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub payload: Value,
    pub trace: Vec<String>,
}

impl Thrown {
    pub fn new(payload: Value) -> Self {
        Self { payload, trace: Vec::new() }
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.payload)
    }
}

/// Identity of a live ejector, used to match a firing `Ejecting` signal to
/// the `EscapeExpr` that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EjectorId(pub u64);

/// Non-local exit in flight: an ejector has fired and is unwinding toward
/// its owning `EscapeExpr`/`EscapeOnlyExpr`.
#[derive(Debug, Clone)]
pub struct Ejecting {
    pub ejector: EjectorId,
    pub value: Value,
}

/// The three ways evaluating an expression can fail to produce a value
/// normally, threaded through every evaluator method.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A host primitive, a guard rejection, an unknown-atom dispatch, or an
    /// explicit `throw` raised a user exception.
    Thrown(Thrown),
    /// An ejector fired and is unwinding.
    Ejecting(Ejecting),
    /// A resource limit (currently: recursion depth) was exceeded.
    ResourceExceeded { reason: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thrown(t) => write!(f, "{t}"),
            Self::Ejecting(e) => write!(f, "uncaught ejector fire ({:?})", e.ejector),
            Self::ResourceExceeded { reason } => write!(f, "resource limit exceeded: {reason}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Result alias used throughout the evaluator.
pub type RunResult<T> = Result<T, RunError>;

impl RunError {
    pub fn thrown(payload: Value) -> Self {
        Self::Thrown(Thrown::new(payload))
    }
}

/// Either half of the pipeline can fail when a host drives a program
/// end-to-end through `driver::eval_monte`/`eval_to_pair`: compilation
/// (`LoadError`) or execution (`RunError`). Kept as a thin wrapper rather
/// than merging the two error sets, so each pass still reports in its own
/// vocabulary.
#[derive(Debug, Clone)]
pub enum EvalError {
    Load(LoadError),
    Run(RunError),
}

impl From<LoadError> for EvalError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<RunError> for EvalError {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "{e}"),
            Self::Run(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}
