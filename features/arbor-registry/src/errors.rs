use thiserror::Error;

use crate::registry::ServiceId;

/// Errors while parsing a filter expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter '{filter}' ended unexpectedly")]
    UnexpectedEnd { filter: String },
    #[error("Unexpected '{found}' at position {position} in filter '{filter}'")]
    Unexpected {
        filter: String,
        position: usize,
        found: char,
    },
    #[error("Missing attribute name at position {position} in filter '{filter}'")]
    MissingAttribute { filter: String, position: usize },
    #[error("Unexpected trailing input at position {position} in filter '{filter}'")]
    Trailing { filter: String, position: usize },
}

/// Errors returned by a service registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The service was never registered or is already gone
    #[error("Service {0} is not registered")]
    UnknownService(ServiceId),
    /// The registry no longer accepts changes
    #[error("The service registry has been closed")]
    Closed,
}
