//! Conversion of produced [Value]s into the types beans are built from.

use std::fmt::Display;

use crate::{errors::ConversionError, value::Value};

pub mod arc;
pub mod collection;
pub mod deferred;
pub mod literal;
pub mod service;

/// Allows a type to be injected into a bean argument or property
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;

    /// What the metadata may supply, checked before anything is instantiated
    fn expects() -> Expect {
        Expect::Any
    }
}

/// The kind of value a property accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expect {
    Any,
    Scalar,
    Object,
    /// An object, or a proxy to one still under construction
    Deferred,
    Collection,
    Map,
    Reference,
    ReferenceList,
}

/// The kind of value a piece of metadata produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Null,
    Scalar,
    Object,
    Deferred,
    Collection,
    Map,
    Reference,
    ReferenceList,
}

impl Expect {
    pub fn accepts(self, shape: Shape) -> bool {
        match (self, shape) {
            (Expect::Any, _) | (_, Shape::Null) => true,
            (Expect::Scalar, Shape::Scalar)
            | (Expect::Object, Shape::Object)
            | (Expect::Deferred, Shape::Object | Shape::Deferred)
            | (Expect::Collection, Shape::Collection | Shape::ReferenceList)
            | (Expect::Map, Shape::Map)
            | (Expect::Reference, Shape::Reference)
            | (Expect::ReferenceList, Shape::ReferenceList) => true,
            _ => false,
        }
    }
}

impl Display for Expect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Expect::Any => "any value",
            Expect::Scalar => "a literal",
            Expect::Object => "an object",
            Expect::Deferred => "a deferrable object",
            Expect::Collection => "a collection",
            Expect::Map => "a map",
            Expect::Reference => "a service reference",
            Expect::ReferenceList => "a service reference list",
        })
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Shape::Null => "null",
            Shape::Scalar => "a literal",
            Shape::Object => "an object",
            Shape::Deferred => "a deferred object",
            Shape::Collection => "a collection",
            Shape::Map => "a map",
            Shape::Reference => "a service reference",
            Shape::ReferenceList => "a service reference list",
        })
    }
}

pub(crate) fn mismatch(expected: &'static str, value: &Value) -> ConversionError {
    ConversionError::Mismatch {
        expected,
        found: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_accepted_everywhere() {
        for expect in [Expect::Scalar, Expect::Object, Expect::Map, Expect::Reference] {
            assert!(expect.accepts(Shape::Null));
        }
    }

    #[test]
    fn deferred_objects_need_a_deferrable_target() {
        assert!(!Expect::Object.accepts(Shape::Deferred));
        assert!(Expect::Deferred.accepts(Shape::Deferred));
        assert!(Expect::Deferred.accepts(Shape::Object));
    }

    #[test]
    fn reference_lists_can_fill_collections() {
        assert!(Expect::Collection.accepts(Shape::ReferenceList));
        assert!(!Expect::Scalar.accepts(Shape::Collection));
        assert!(!Expect::Reference.accepts(Shape::ReferenceList));
    }
}
