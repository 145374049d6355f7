//! Input AST: the shape supplied by an out-of-scope front end. Nothing in
//! this module performs any analysis; it is consumed as-is by
//! [`crate::mast`].

use num_bigint::BigInt;

/// The severity a raw pattern asks for when it binds a name: a plain
/// value, a mutable slot, or a first-class binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
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
    Str(String),
    Call {
        recv: Box<Expr>,
        verb: String,
        args: Vec<Expr>,
        named_args: Vec<NamedArg>,
    },
    Def {
        patt: Patt,
        ejector: Option<Box<Expr>>,
        rvalue: Box<Expr>,
    },
    /// `escape ej { body }`, with no catch clause.
    EscapeOnly {
        patt: Patt,
        body: Box<Expr>,
    },
    /// `escape ej { body } catch p { catchBody }`.
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
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Noun(String),
    /// `&&name`, the binding-severity reference to a name.
    Binding(String),
    Hide(Box<Expr>),
    Object {
        doc: Option<String>,
        /// The pattern the object itself is bound by in its enclosing
        /// scope, e.g. `object point` binds the name `point`.
        patt: Patt,
        auditors: Vec<Expr>,
        methods: Vec<Method>,
        matchers: Vec<Matcher>,
    },
    MetaContext,
    MetaState,
}

#[derive(Debug, Clone)]
pub enum Patt {
    Ignore(Option<Box<Expr>>),
    Final {
        name: String,
        sigil: Sigil,
        guard: Option<Box<Expr>>,
    },
    Var {
        name: String,
        sigil: Sigil,
        guard: Option<Box<Expr>>,
    },
    /// A raw `&&name := specimen` binding pattern: stores the specimen
    /// directly with no guard coercion, distinct from `Final`/`Var` with
    /// `Sigil::Binding`.
    Binding {
        name: String,
    },
    List(Vec<Patt>),
    Via {
        trans: Box<Expr>,
        inner: Box<Patt>,
    },
    Named {
        key: Box<Expr>,
        patt: Box<Patt>,
        default: Option<Box<Expr>>,
    },
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
    pub key: Box<Expr>,
    pub patt: Patt,
    pub default: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct NamedArg {
    pub key: Box<Expr>,
    pub value: Box<Expr>,
}
