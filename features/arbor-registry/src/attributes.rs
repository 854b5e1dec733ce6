use std::{collections::BTreeMap, fmt::Display};

/// Interfaces a service is published under
pub const OBJECT_CLASS: &str = "objectClass";
/// Registry assigned, unique and increasing
pub const SERVICE_ID: &str = "service.id";
/// Higher ranked providers are preferred
pub const SERVICE_RANKING: &str = "service.ranking";
/// Id of the component that published the service
pub const COMPONENT_NAME: &str = "component.name";

/// A single service attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<AttrValue>),
}
impl Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Str(value) => f.write_str(value),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::List(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", values.join(", "))
            }
        }
    }
}
impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}
impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}
impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}
impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}
impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}
impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(values: Vec<T>) -> Self {
        AttrValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Attributes a service is registered with
///
/// Keys are compared case-insensitively on lookup, the way filters expect them to be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: BTreeMap<String, AttrValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        // Replace an existing key that only differs in case
        if let Some(existing) = self.find_key(&key).map(str::to_string) {
            self.entries.remove(&existing);
        }
        self.entries.insert(key, value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        let existing = self.find_key(key)?.to_string();
        self.entries.remove(&existing)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        match self.entries.get(key) {
            Some(value) => Some(value),
            None => self
                .entries
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                .map(|(_, value)| value),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            AttrValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            AttrValue::Int(value) => Some(*value),
            AttrValue::Str(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` into self, `other` wins on conflicts
    pub fn extend(&mut self, other: &Attributes) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }

    fn find_key(&self, key: &str) -> Option<&str> {
        self.entries
            .keys()
            .find(|candidate| candidate.eq_ignore_ascii_case(key))
            .map(String::as_str)
    }
}
