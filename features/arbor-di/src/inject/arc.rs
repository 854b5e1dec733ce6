use std::{any::type_name, sync::Arc};

use arbor_registry::{Injectable, Instance};

use crate::{
    errors::{ConversionError, ProxyError},
    inject::{mismatch, Expect, FromValue},
    value::Value,
};

impl<T: Injectable> FromValue for Arc<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let instance = Instance::from_value(value)?;
        instance
            .downcast::<T>()
            .map_err(|actual_type| ConversionError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    fn expects() -> Expect {
        Expect::Object
    }
}

impl FromValue for Instance {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Object(instance) => Ok(instance),
            // Only reachable once the cycle is closed
            Value::Deferred(proxy) => match proxy.try_get() {
                Some(result) => Ok(result?),
                None => Err(ProxyError::InConstruction {
                    target: proxy.target().to_string(),
                }
                .into()),
            },
            other => Err(mismatch("an object", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::Object
    }
}

impl<Convertible: FromValue> FromValue for Option<Convertible> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            value => Convertible::from_value(value).map(Some),
        }
    }

    fn expects() -> Expect {
        Convertible::expects()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasts_objects() {
        let value = Value::Object(Instance::new(String::from("cache")));
        let cache = Arc::<String>::from_value(value.clone()).unwrap();
        assert_eq!(cache.as_str(), "cache");

        assert!(matches!(
            Arc::<u32>::from_value(value),
            Err(ConversionError::DowncastFailed { .. })
        ));
    }

    #[test]
    fn option_maps_null_to_none() {
        assert!(Option::<Arc<String>>::from_value(Value::Null).unwrap().is_none());
        assert!(matches!(
            Arc::<String>::from_value(Value::Null),
            Err(ConversionError::Mismatch { found: "null", .. })
        ));
        assert_eq!(Option::<Arc<String>>::expects(), Expect::Object);
    }
}
