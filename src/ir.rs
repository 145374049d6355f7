//! The final intermediate representation the evaluator runs: every name
//! has been resolved to a scope class and slot index, every object has a
//! frame-capture plan, and (after `structure::refactor_structure`) every
//! object is tagged clear or audited.

use std::rc::Rc;

use num_bigint::BigInt;

/// Where a resolved name's storage lives, relative to the activation
/// currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeClass {
    /// An index into the current method/matcher's `locals` array.
    Local(usize),
    /// An index into the current object's captured `frame` array.
    Frame(usize),
    /// An index into the top-level `outers` environment.
    Outer(usize),
}

/// The severity a reference expression asks storage to be unwrapped to
/// (`NounExpr`/`SlotExpr`/`BindingExpr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Noun,
    Slot,
    Binding,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Char(char),
    Double(f64),
    Int(BigInt),
    Str(Rc<str>),
    Call {
        recv: Box<Expr>,
        verb: Rc<str>,
        args: Vec<Expr>,
        named_args: Vec<(Expr, Expr)>,
    },
    /// Binds `patt` to the value of `rvalue`, with `ejector` as the
    /// ambient ejector used if the pattern match fails.
    Def {
        patt: Patt,
        ejector: Option<Box<Expr>>,
        rvalue: Box<Expr>,
    },
    EscapeOnly {
        ej_patt: Patt,
        body: Box<Expr>,
    },
    Escape {
        ej_patt: Patt,
        ej_body: Box<Expr>,
        catch_patt: Patt,
        catch_body: Box<Expr>,
    },
    Finally {
        body: Box<Expr>,
        at_last: Box<Expr>,
    },
    If {
        test: Box<Expr>,
        cons: Box<Expr>,
        alt: Box<Expr>,
    },
    Try {
        body: Box<Expr>,
        catch_patt: Patt,
        catch_body: Box<Expr>,
    },
    Seq(Vec<Expr>),
    /// A resolved reference, with the severity the use site asked for and
    /// where the storage lives.
    Ref {
        severity: Severity,
        scope: ScopeClass,
    },
    Assign {
        scope: ScopeClass,
        value: Box<Expr>,
    },
    Hide(Box<Expr>),
    Object(Rc<Script>),
    MetaContext,
    MetaState,
}

#[derive(Debug, Clone)]
pub enum Patt {
    Ignore(Option<Box<Expr>>),
    Noun { scope: ScopeClass, guard: Option<Box<Expr>>, mutable: bool },
    FinalSlot { scope: ScopeClass, guard: Option<Box<Expr>> },
    VarSlot { scope: ScopeClass, guard: Option<Box<Expr>> },
    FinalBinding { scope: ScopeClass, guard: Option<Box<Expr>> },
    VarBinding { scope: ScopeClass, guard: Option<Box<Expr>> },
    RawBinding { scope: ScopeClass },
    List(Vec<Patt>),
    Via { trans: Box<Expr>, inner: Box<Patt> },
    Named { key: Box<Expr>, patt: Box<Patt>, default: Option<Box<Expr>> },
}

/// How a frame slot is populated when an object literal is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Capture {
    /// Copy the named storage from the enclosing activation.
    From(ScopeClass),
    /// Reserve the slot for the object's own self-reference; patched in
    /// after the object's `Rc` exists.
    SelfRef,
}

/// Whether an object was constructed with a non-empty auditor list and
/// so needs to run through `audit::discharge`.
#[derive(Debug, Clone)]
pub enum ObjectShape {
    Clear,
    Audited {
        /// Stable id for this construction site's clipboard cache key.
        clipboard_id: u32,
        auditors: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct Script {
    pub display_name: Rc<str>,
    pub doc: Option<Rc<str>>,
    pub frame_size: usize,
    pub captures: Vec<Capture>,
    pub shape: ObjectShape,
    pub methods: Vec<Method>,
    pub matchers: Vec<Matcher>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub verb: Rc<str>,
    pub arity: usize,
    pub doc: Option<Rc<str>>,
    pub patts: Vec<Patt>,
    pub named_patts: Vec<NamedPatt>,
    pub guard: Option<Box<Expr>>,
    pub body: Box<Expr>,
    pub local_size: usize,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub patt: Patt,
    pub body: Box<Expr>,
    pub local_size: usize,
}

#[derive(Debug, Clone)]
pub struct NamedPatt {
    pub key: Box<Expr>,
    pub patt: Patt,
    pub default: Option<Box<Expr>>,
}
