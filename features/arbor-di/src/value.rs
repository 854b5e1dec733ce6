use std::fmt::Debug;

use arbor_registry::Instance;

use crate::proxy::{DeferredProxy, ReferenceList, ReferenceProxy};

/// A produced value, before it is converted into what the receiving bean wants
#[derive(Clone)]
pub enum Value {
    Null,
    /// Unconverted literal, placeholders already substituted
    Literal(String),
    Object(Instance),
    /// An object that may still be under construction
    Deferred(DeferredProxy),
    Reference(ReferenceProxy),
    ReferenceList(ReferenceList),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Name of the variant, used in conversion errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Literal(_) => "a literal",
            Value::Object(_) => "an object",
            Value::Deferred(_) => "a deferred object",
            Value::Reference(_) => "a service reference",
            Value::ReferenceList(_) => "a service reference list",
            Value::List(_) => "a list",
            Value::Map(_) => "a map",
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// Set semantics: equal literals and identical objects
    pub(crate) fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Literal(a), Value::Literal(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Literal(literal) => f.debug_tuple("Literal").field(literal).finish(),
            Value::Object(instance) => f.debug_tuple("Object").field(instance).finish(),
            Value::Deferred(proxy) => f.debug_tuple("Deferred").field(proxy).finish(),
            Value::Reference(proxy) => f.debug_tuple("Reference").field(proxy).finish(),
            Value::ReferenceList(list) => f.debug_tuple("ReferenceList").field(list).finish(),
            Value::List(values) => f.debug_list().entries(values).finish(),
            Value::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
        }
    }
}
