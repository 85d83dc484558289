//! Runtime value variants shared by the tree-walking evaluator and (for
//! `CompiledFunction`) the bytecode VM, plus the evaluator's `Environment`
//! chain.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// `Array` elements are never mutated in place (the language has no
// index-assignment operator), so a plain `Rc<Vec<Object>>` is enough —
// sharing the backing vector on clone without needing interior mutability.

use ahash::AHashMap;
use strum::Display;

use crate::ast::{BlockStatement, Identifier};

/// A type tag for [`Object`], used in error messages (`unknown operator:
/// -<TYPE>`) and by builtins that switch on operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ObjectType {
    #[strum(serialize = "NULL")]
    Null,
    #[strum(serialize = "INTEGER")]
    Integer,
    #[strum(serialize = "BOOLEAN")]
    Boolean,
    #[strum(serialize = "STRING")]
    String,
    #[strum(serialize = "ARRAY")]
    Array,
    #[strum(serialize = "FUNCTION")]
    Function,
    #[strum(serialize = "COMPILED_FUNCTION")]
    CompiledFunction,
    #[strum(serialize = "BUILTIN")]
    Builtin,
    #[strum(serialize = "RETURN_VALUE")]
    ReturnValue,
    #[strum(serialize = "ERROR")]
    Error,
}

/// A runtime value.
///
/// `Null`, `True`, and `False` are conceptually singletons: equality and
/// truthiness checks compare by value, not identity, since `Object` is a
/// plain (cheaply `Clone`-able) enum rather than a heap handle.
#[derive(Debug, Clone)]
pub enum Object {
    Null,
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Array(Rc<Vec<Object>>),
    Function(Rc<Function>),
    CompiledFunction(Rc<CompiledFunction>),
    Builtin(Rc<BuiltinFunction>),
    ReturnValue(Box<Object>),
    Error(String),
}

impl Object {
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Null => ObjectType::Null,
            Self::Integer(_) => ObjectType::Integer,
            Self::Boolean(_) => ObjectType::Boolean,
            Self::String(_) => ObjectType::String,
            Self::Array(_) => ObjectType::Array,
            Self::Function(_) => ObjectType::Function,
            Self::CompiledFunction(_) => ObjectType::CompiledFunction,
            Self::Builtin(_) => ObjectType::Builtin,
            Self::ReturnValue(_) => ObjectType::ReturnValue,
            Self::Error(_) => ObjectType::Error,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// `Null` and `false` are false; everything else — including `0` and
    /// `""` — is true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Boolean(false))
    }

    #[must_use]
    pub fn inspect(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::String(s) => s.to_string(),
            Self::Array(elements) => {
                let parts: Vec<String> = elements.iter().map(Object::inspect).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Function(f) => f.inspect(),
            Self::CompiledFunction(cf) => format!("CompiledFunction[{cf:p}]"),
            Self::Builtin(_) => "builtin function".to_string(),
            Self::ReturnValue(value) => value.inspect(),
            Self::Error(message) => format!("ERROR: {message}"),
        }
    }
}

/// Equality used for the generic `==`/`!=` fallback across mixed types, and
/// by the VM's `OpEqual`/`OpNotEqual`, which pop a pair and compare them with
/// no type dispatch at all.
///
/// Value types (`Integer`, `Boolean`, `String`) compare by value; heap-ish
/// variants (`Array`, `Function`, `CompiledFunction`, `Builtin`) compare by
/// reference identity, mirroring Go's `==` over the reference implementation's
/// pointer-typed objects.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::CompiledFunction(a), Self::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::ReturnValue(a), Self::ReturnValue(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

/// A function value captured by the tree-walking evaluator: parameters, the
/// body block, and a reference to the environment the closure was defined
/// in.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<Identifier>,
    pub body: BlockStatement,
    pub env: Environment,
}

impl Function {
    fn inspect(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| p.value.clone())
            .collect();
        format!("fn({}) {}", params.join(", "), self.body)
    }
}

/// A function value produced by the bytecode compiler: its instructions
/// plus the local-variable bookkeeping the VM needs to set up a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A host-provided callable reachable from the builtin scope.
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: fn(&[Object]) -> Object,
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("name", &self.name)
            .finish()
    }
}

pub fn new_error(message: impl Into<String>) -> Object {
    Object::Error(message.into())
}

/// A chain of name-to-value scopes for the tree-walking evaluator.
///
/// `Get` walks outward from the innermost scope to the root; `Set` always
/// writes to the innermost scope. The chain is
/// reference-counted rather than owned outright: a [`Function`] closure
/// keeps its defining environment alive for as long as the function value
/// itself is reachable.
#[derive(Debug, Clone)]
pub struct Environment {
    inner: Rc<RefCell<EnvironmentInner>>,
}

#[derive(Debug)]
struct EnvironmentInner {
    store: AHashMap<String, Object>,
    outer: Option<Environment>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                store: AHashMap::new(),
                outer: None,
            })),
        }
    }

    #[must_use]
    pub fn new_enclosed(outer: Environment) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                store: AHashMap::new(),
                outer: Some(outer),
            })),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Object> {
        let inner = self.inner.borrow();
        if let Some(value) = inner.store.get(name) {
            return Some(value.clone());
        }
        inner.outer.as_ref()?.get(name)
    }

    pub fn set(&self, name: impl Into<String>, value: Object) {
        self.inner.borrow_mut().store.insert(name.into(), value);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
