//! Runtime values, storage severities, slots and bindings.
//!
//! Primitive object implementations (`Int`, `Str`, `ConstMap`, full guard
//! libraries, ...) are out of scope here; they are collaborators behind
//! the [`HostObject`] trait. This module still has to give *some*
//! concrete representation to values flowing through the evaluator, so
//! it carries a minimal literal/list/string value set plus the handful
//! of always-present host singletons the evaluator's own control flow
//! depends on (`anyGuard`, the default thrower, live ejectors).

use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    error::{EjectorId, Ejecting, RunError, RunResult},
    object::InterpObject,
};

/// Any value the evaluator can hold: a literal, a list, a user-defined
/// object, or an opaque host object reached through [`HostObject`].
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    BigInt(Rc<BigInt>),
    Double(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Host(Rc<dyn HostObject>),
    Interp(Rc<InterpObject>),
    /// A first-class slot, produced by reading a name at `Slot` severity
    /// (`&name`).
    Slot(Slot),
    /// A first-class binding, produced by reading a name at `Binding`
    /// severity (`&&name`).
    Binding(Binding),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(items))
    }

    /// Unwraps a boolean value, used by `IfExpr`.
    pub fn unwrap_bool(&self) -> RunResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(RunError::thrown(Value::str(format!("expected a boolean, got {}",
                other.type_name()
            )))),
        }
    }

    /// Unwraps a list value, used by `ListPatt` pattern semantics.
    pub fn unwrap_list(&self) -> RunResult<&[Value]> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(RunError::thrown(Value::str(format!("expected a list, got {}",
                other.type_name()
            )))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Char(_) => "Char",
            Self::Int(_) => "Int",
            Self::BigInt(_) => "BigInt",
            Self::Double(_) => "Double",
            Self::Str(_) => "Str",
            Self::List(_) => "List",
            Self::Host(h) => h.type_name(),
            Self::Interp(_) => "Object",
            Self::Slot(_) => "Slot",
            Self::Binding(_) => "Binding",
        }
    }

    /// Dispatches a message send, the one operation every value in this
    /// evaluator responds to.
    pub fn recv_named(&self, verb: &str, args: &[Value], named: &NamedArgs) -> RunResult<Value> {
        match self {
            Self::Interp(obj) => obj.dispatch(verb, args, named),
            Self::Host(h) => h.recv_named(verb, args, named),
            Self::Int(i) => int_recv(*i, verb, args),
            Self::Str(s) => str_recv(s, verb, args),
            Self::Bool(b) => bool_recv(*b, verb, args),
            Self::Slot(s) => slot_recv(s, verb, args),
            Self::Binding(b) => binding_recv(b, verb, args),
            other => Err(RunError::thrown(Value::str(format!("{} does not respond to {verb}/{}",
                other.type_name(),
                args.len()
            )))),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Char(c) => write!(f, "'{c}'"),
            Self::Int(i) => write!(f, "{i}"),
            Self::BigInt(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Host(h) => write!(f, "<{}>", h.type_name()),
            Self::Interp(obj) => write!(f, "<{}>", obj.display_name()),
            Self::Slot(_) => write!(f, "<slot>"),
            Self::Binding(_) => write!(f, "<binding>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Host(a), Self::Host(b)) => Rc::ptr_eq(a, b),
            (Self::Interp(a), Self::Interp(b)) => Rc::ptr_eq(a, b),
            (Self::Slot(a), Self::Slot(b)) => a.ptr_addr() == b.ptr_addr(),
            (Self::Binding(a), Self::Binding(b)) => a.slot().ptr_addr() == b.slot().ptr_addr(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Char(c) => c.hash(state),
            Self::Int(i) => i.hash(state),
            Self::BigInt(i) => i.hash(state),
            Self::Double(d) => d.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::List(items) => items.hash(state),
            Self::Host(h) => (Rc::as_ptr(h) as *const ()).hash(state),
            Self::Interp(o) => (Rc::as_ptr(o) as *const ()).hash(state),
            Self::Slot(s) => s.ptr_addr().hash(state),
            Self::Binding(b) => b.slot().ptr_addr().hash(state),
        }
    }
}

/// The map of named arguments passed to a call, or of an object's
/// captured closure guards for the auditor clipboard. Insertion-ordered,
/// since clipboard cache keys depend on argument order.
pub type NamedArgs = IndexMap<Value, Value>;

/// An object the evaluator does not itself implement: guards, ejectors,
/// the default thrower. Kept deliberately small — see module docs.
pub trait HostObject: fmt::Debug {
    fn recv_named(&self, verb: &str, args: &[Value], named: &NamedArgs) -> RunResult<Value>;

    fn type_name(&self) -> &'static str {
        "HostObject"
    }
}

/// The identity guard: `coerce(specimen, _)` always succeeds with the
/// specimen unchanged (`anyGuard`).
#[derive(Debug)]
pub struct AnyGuard;

impl HostObject for AnyGuard {
    fn recv_named(&self, verb: &str, args: &[Value], _named: &NamedArgs) -> RunResult<Value> {
        match (verb, args) {
            ("coerce", [specimen, _ej]) => Ok(specimen.clone()),
            ("get", []) => Ok(Value::Host(Rc::new(Self))),
            _ => Err(RunError::thrown(Value::str(format!("anyGuard does not respond to {verb}/{}",
                args.len()
            )))),
        }
    }

    fn type_name(&self) -> &'static str {
        "anyGuard"
    }
}

pub fn any_guard() -> Value {
    Value::Host(Rc::new(AnyGuard))
}

/// Coerces `specimen` through `guard`:
/// `guard.call("coerce", [specimen, ej])`.
pub fn coerce(guard: &Value, specimen: Value, ej: Option<&Value>) -> RunResult<Value> {
    let thrower = thrower_ejector();
    let ej = ej.unwrap_or(&thrower);
    guard.recv_named("coerce", &[specimen, ej.clone()], &NamedArgs::new())
}

/// The process-wide ejector used when pattern matching has no ambient
/// ejector supplied: firing it raises a user exception.
#[derive(Debug)]
pub struct Thrower;

impl HostObject for Thrower {
    fn recv_named(&self, verb: &str, args: &[Value], _named: &NamedArgs) -> RunResult<Value> {
        match (verb, args) {
            ("run", [value]) => Err(RunError::thrown(value.clone())),
            _ => Err(RunError::thrown(Value::str(format!("thrower does not respond to {verb}/{}",
                args.len()
            )))),
        }
    }

    fn type_name(&self) -> &'static str {
        "thrower"
    }
}

pub fn thrower_ejector() -> Value {
    Value::Host(Rc::new(Thrower))
}

/// A live ejector allocated by `EscapeExpr`/`EscapeOnlyExpr`.
///
/// Firing a disabled ejector is itself a user exception, never a silent
/// no-op or a second `Ejecting` signal.
#[derive(Debug)]
pub struct Ejector {
    id: EjectorId,
    disabled: std::cell::Cell<bool>,
}

impl Ejector {
    pub fn new(id: EjectorId) -> Rc<Self> {
        Rc::new(Self { id, disabled: std::cell::Cell::new(false) })
    }

    pub fn disable(&self) {
        self.disabled.set(true);
    }

    pub fn id(&self) -> EjectorId {
        self.id
    }
}

impl HostObject for Ejector {
    fn recv_named(&self, verb: &str, args: &[Value], _named: &NamedArgs) -> RunResult<Value> {
        match (verb, args) {
            ("run", [value]) => {
                if self.disabled.get() {
                    Err(RunError::thrown(Value::str("ejector already fired/disabled")))
                } else {
                    crate::eval::trace_ejector_fire(self.id());
                    Err(RunError::Ejecting(Ejecting { ejector: self.id(), value: value.clone() }))
                }
            }
            _ => Err(RunError::thrown(Value::str(format!("ejector does not respond to {verb}/{}",
                args.len()
            )))),
        }
    }

    fn type_name(&self) -> &'static str {
        "Ejector"
    }
}

/// A slot: a value plus a value-guard. `FinalSlot` rejects assignment;
/// `VarSlot` coerces and stores.
#[derive(Clone)]
pub enum Slot {
    Final(Rc<FinalSlotData>),
    Var(Rc<VarSlotData>),
}

pub struct FinalSlotData {
    value: Value,
    guard: Value,
}

pub struct VarSlotData {
    value: std::cell::RefCell<Value>,
    guard: Value,
}

impl Slot {
    pub fn new_final(value: Value, guard: Value) -> Self {
        Self::Final(Rc::new(FinalSlotData { value, guard }))
    }

    pub fn new_var(value: Value, guard: Value) -> Self {
        Self::Var(Rc::new(VarSlotData { value: std::cell::RefCell::new(value), guard }))
    }

    pub fn get(&self) -> Value {
        match self {
            Self::Final(d) => d.value.clone(),
            Self::Var(d) => d.value.borrow().clone(),
        }
    }

    pub fn guard(&self) -> Value {
        match self {
            Self::Final(d) => d.guard.clone(),
            Self::Var(d) => d.guard.clone(),
        }
    }

    /// Identity of the underlying storage cell, used so first-class slot
    /// values compare/hash by the cell they alias rather than structurally.
    pub fn ptr_addr(&self) -> usize {
        match self {
            Self::Final(d) => Rc::as_ptr(d) as *const () as usize,
            Self::Var(d) => Rc::as_ptr(d) as *const () as usize,
        }
    }

    /// Assigns through the slot, coercing through its guard for `VarSlot`
    /// and failing outright for `FinalSlot`.
    pub fn put(&self, value: Value) -> RunResult<Value> {
        match self {
            Self::Final(_) => Err(RunError::thrown(Value::str("can't assign to a final slot"))),
            Self::Var(d) => {
                let coerced = coerce(&d.guard, value, None)?;
                *d.value.borrow_mut() = coerced.clone();
                Ok(coerced)
            }
        }
    }
}

/// A binding: a slot plus the guard-on-the-slot seam.
/// `finalBinding`/`varBinding` are the common constructors.
#[derive(Clone)]
pub struct Binding(Slot);

impl Binding {
    pub fn final_binding(value: Value, guard: Value) -> Self {
        Self(Slot::new_final(value, guard))
    }

    pub fn var_binding(value: Value, guard: Value) -> Self {
        Self(Slot::new_var(value, guard))
    }

    pub fn from_slot(slot: Slot) -> Self {
        Self(slot)
    }

    pub fn slot(&self) -> Slot {
        self.0.clone()
    }

    pub fn get(&self) -> Value {
        self.0.get()
    }
}

/// A storage cell as actually held in `locals`/`frame`/`outers`: whichever
/// of value/slot/binding the defining pattern's severity called for.
#[derive(Clone)]
pub enum Storage {
    Value(Value),
    Slot(Slot),
    Binding(Binding),
}

impl Storage {
    pub fn null_binding() -> Self {
        Self::Binding(Binding::final_binding(Value::Null, any_guard()))
    }

    /// Coerces storage down to a bare value regardless of severity.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Slot(s) => s.get(),
            Self::Binding(b) => b.get(),
        }
    }

    /// Synthesizes a slot on demand for a plain-value storage cell, so
    /// `&name` is always legal even on a `def`-bound name that never
    /// allocated one (`SlotExpr`).
    pub fn to_slot(&self) -> Slot {
        match self {
            Self::Slot(s) => s.clone(),
            Self::Binding(b) => b.slot(),
            Self::Value(v) => Slot::new_final(v.clone(), any_guard()),
        }
    }

    /// Synthesizes a binding on demand for lower severities.
    pub fn to_binding(&self) -> Binding {
        match self {
            Self::Binding(b) => b.clone(),
            Self::Slot(s) => Binding::from_slot(s.clone()),
            Self::Value(v) => Binding::final_binding(v.clone(), any_guard()),
        }
    }

    /// The slot to assign through, for names whose definition produced a
    /// slot or binding. `bind::bind_expr` only ever compiles an `Assign`
    /// against such names; a `Value` storage reaching here would be a
    /// compiler bug, not a user error.
    pub fn assign_slot(&self) -> RunResult<Slot> {
        match self {
            Self::Slot(s) => Ok(s.clone()),
            Self::Binding(b) => Ok(b.slot()),
            Self::Value(_) => {
                Err(RunError::thrown(Value::str("internal error: assignment target has no slot")))
            }
        }
    }

    /// The guard governing this storage's value, used when assembling the
    /// auditor clipboard's guard map and when `retrieveGuard` is asked
    /// for a severity-appropriate guard.
    pub fn guard(&self) -> Value {
        match self {
            Self::Value(_) => any_guard(),
            Self::Slot(s) => s.guard(),
            Self::Binding(b) => b.slot().guard(),
        }
    }
}

fn int_recv(i: i64, verb: &str, args: &[Value]) -> RunResult<Value> {
    let other = |args: &[Value]| -> RunResult<i64> {
        match args {
            [Value::Int(n)] => Ok(*n),
            [other] => Err(RunError::thrown(Value::str(format!("Int expected an Int argument, got {}",
                other.type_name()
            )))),
            _ => Err(RunError::thrown(Value::str("Int method expects exactly one argument"))),
        }
    };
    match verb {
        "add" => Ok(Value::Int(i + other(args)?)),
        "subtract" => Ok(Value::Int(i - other(args)?)),
        "multiply" => Ok(Value::Int(i * other(args)?)),
        "aboveZero" if args.is_empty() => Ok(Value::Bool(i > 0)),
        "belowZero" if args.is_empty() => Ok(Value::Bool(i < 0)),
        _ => Err(RunError::thrown(Value::str(format!("Int does not respond to {verb}/{}", args.len())))),
    }
}

fn str_recv(s: &str, verb: &str, args: &[Value]) -> RunResult<Value> {
    match (verb, args) {
        ("add", [Value::Str(other)]) => Ok(Value::str(format!("{s}{other}"))),
        ("size", []) => Ok(Value::Int(s.chars().count() as i64)),
        _ => Err(RunError::thrown(Value::str(format!("Str does not respond to {verb}/{}", args.len())))),
    }
}

fn slot_recv(slot: &Slot, verb: &str, args: &[Value]) -> RunResult<Value> {
    match (verb, args) {
        ("get", []) => Ok(slot.get()),
        ("getGuard", []) => Ok(slot.guard()),
        ("put", [v]) => slot.put(v.clone()),
        _ => Err(RunError::thrown(Value::str(format!("Slot does not respond to {verb}/{}", args.len())))),
    }
}

fn binding_recv(binding: &Binding, verb: &str, args: &[Value]) -> RunResult<Value> {
    match (verb, args) {
        ("get", []) => Ok(Value::Slot(binding.slot())),
        _ => Err(RunError::thrown(Value::str(format!("Binding does not respond to {verb}/{}", args.len())))),
    }
}

fn bool_recv(b: bool, verb: &str, args: &[Value]) -> RunResult<Value> {
    match (verb, args) {
        ("not", []) => Ok(Value::Bool(!b)),
        _ => Err(RunError::thrown(Value::str(format!("Bool does not respond to {verb}/{}", args.len())))),
    }
}
