use std::{
    collections::{BTreeMap, HashMap, HashSet},
    hash::Hash,
};

use crate::{
    errors::ConversionError,
    inject::{mismatch, Expect, FromValue},
    value::Value,
};

/// Items of a list, or the current services of a reference list
fn items(value: Value) -> Result<Vec<Value>, ConversionError> {
    match value {
        Value::List(items) => Ok(items),
        Value::ReferenceList(list) => Ok(list.services().into_iter().map(Value::Object).collect()),
        other => Err(mismatch("a collection", &other)),
    }
}

impl<Item: FromValue> FromValue for Vec<Item> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        items(value)?.into_iter().map(Item::from_value).collect()
    }

    fn expects() -> Expect {
        Expect::Collection
    }
}

impl<Item: FromValue + Eq + Hash> FromValue for HashSet<Item> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        items(value)?.into_iter().map(Item::from_value).collect()
    }

    fn expects() -> Expect {
        Expect::Collection
    }
}

impl<Key: FromValue + Eq + Hash, Item: FromValue> FromValue for HashMap<Key, Item> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(key, item)| Ok((Key::from_value(key)?, Item::from_value(item)?)))
                .collect(),
            other => Err(mismatch("a map", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::Map
    }
}

impl<Key: FromValue + Ord, Item: FromValue> FromValue for BTreeMap<Key, Item> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(key, item)| Ok((Key::from_value(key)?, Item::from_value(item)?)))
                .collect(),
            other => Err(mismatch("a map", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::Map
    }
}
