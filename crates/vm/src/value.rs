//! Value representation for the Monkey VM.
//!
//! A tagged enum with `Rc` payloads. Scalars (integers, strings,
//! booleans, errors) behave as values and are cloned when bound to a
//! name; arrays, hashes, functions and closures are shared by reference,
//! so aliases observe in-place mutation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::rc::Rc;

use fnv::FnvHasher;

use crate::builtins::Builtin;
use crate::code::Instructions;

/// A runtime value in Monkey.
#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Str(Rc<String>),
    Boolean(bool),
    Null,
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashMap<HashKey, HashPair>>>),
    /// A compiled function living in the constant pool. Only ever
    /// executed through a [`Closure`].
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    /// A host error produced by a builtin. Flows as an ordinary value.
    Error(Rc<String>),
}

/// Runtime type tags, used by `typeof` and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Integer,
    Str,
    Boolean,
    Null,
    Array,
    Hash,
    Function,
    Closure,
    Builtin,
    Error,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Integer => "int",
            Type::Str => "str",
            Type::Boolean => "bool",
            Type::Null => "null",
            Type::Array => "array",
            Type::Hash => "hash",
            Type::Function => "compiled-fn",
            Type::Closure => "closure",
            Type::Builtin => "builtin",
            Type::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// The key of a hash entry: the value's type tag plus a 64-bit hash.
/// Integers use their raw value, booleans 0/1, strings FNV-1a 64 of
/// their UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: Type,
    pub value: u64,
}

/// A hash entry keeps the original key value alongside the stored value.
#[derive(Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function lowered to bytecode: its instructions plus the frame
/// layout the VM needs to reserve.
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A closure: a compiled function plus its captured free values.
///
/// The free vector is interior-mutable because `SetSelf` patches a slot
/// to point back at the closure itself after creation.
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: RefCell<Vec<Value>>,
}

impl Value {
    /// Get the type tag of this value.
    pub fn kind(&self) -> Type {
        match self {
            Value::Integer(_) => Type::Integer,
            Value::Str(_) => Type::Str,
            Value::Boolean(_) => Type::Boolean,
            Value::Null => Type::Null,
            Value::Array(_) => Type::Array,
            Value::Hash(_) => Type::Hash,
            Value::Function(_) => Type::Function,
            Value::Closure(_) => Type::Closure,
            Value::Builtin(_) => Type::Builtin,
            Value::Error(_) => Type::Error,
        }
    }

    /// Truthiness: false and null are false, everything else is true.
    /// Zero is true; the tests rely on this.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    /// Compute the hash key for this value, if it is hashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(i) => Some(HashKey {
                kind: Type::Integer,
                value: *i as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: Type::Boolean,
                value: u64::from(*b),
            }),
            Value::Str(s) => {
                let mut hasher = FnvHasher::default();
                hasher.write(s.as_bytes());
                Some(HashKey {
                    kind: Type::Str,
                    value: hasher.finish(),
                })
            }
            _ => None,
        }
    }

    /// Clone-on-bind: immutable values get an independent copy, shared
    /// aggregates keep their reference.
    pub fn bind_clone(&self) -> Value {
        match self {
            Value::Integer(i) => Value::Integer(*i),
            Value::Boolean(b) => Value::Boolean(*b),
            Value::Str(s) => Value::Str(Rc::new(s.as_ref().clone())),
            Value::Error(m) => Value::Error(Rc::new(m.as_ref().clone())),
            other => other.clone(),
        }
    }

    /// Equality as observed by `==`: value equality for scalars and
    /// strings, reference identity for aggregates and callables.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }

    /// Debug form: like `Display`, but strings are quoted. Used inside
    /// aggregates, by the REPL echo and by the constant-pool dump.
    pub fn inspect(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                let elems: Vec<String> =
                    elements.borrow().iter().map(|e| e.inspect()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Value::Hash(pairs) => {
                // Sorted by key rendering so output is deterministic.
                let mut rendered: Vec<(String, String)> = pairs
                    .borrow()
                    .values()
                    .map(|pair| (pair.key.inspect(), pair.value.inspect()))
                    .collect();
                rendered.sort();
                let pairs: Vec<String> = rendered
                    .into_iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Value::Function(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(builtin) => write!(f, "builtin function {}", builtin.name),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

/// Convenience constructors used across the compiler, VM and builtins.
impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(pairs: HashMap<HashKey, HashPair>) -> Value {
        Value::Hash(Rc::new(RefCell::new(pairs)))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(message.into()))
    }
}
