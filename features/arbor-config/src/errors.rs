use arbor_registry::TypeInfo;

/// Errors of the [crate::provider::ConfigProvider]
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The config type is already registered
    #[error("Config type '{0}' is already registered")]
    AlreadyRegistered(TypeInfo),
    /// A registered config could not be downcast to the requested type
    #[error("Config type '{0}' could not be retrieved")]
    Downcast(TypeInfo),
    /// A property exists but cannot be used for what it configures
    #[error("Property '{key}' has the invalid value '{value}'")]
    InvalidProperty { key: String, value: String },
}
