//! Container settings and `${...}` placeholder substitution in literals.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use thiserror::Error;

/// Settings of one container
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Names the coordinator thread and shows up in logs
    pub name: String,
    /// How long eager components may wait for mandatory references on start
    pub grace_period: Duration,
    /// If false, components are activated without waiting for their references
    pub wait_for_dependencies: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "container".to_string(),
            grace_period: Duration::from_secs(5 * 60),
            wait_for_dependencies: true,
        }
    }
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_wait_for_dependencies(mut self, wait: bool) -> Self {
        self.wait_for_dependencies = wait;
        self
    }
}

/// Supplies the values of `${key}` placeholders
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl PropertySource for BTreeMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("No value for placeholder '{key}'")]
    Unresolved { key: String },
    #[error("Unterminated placeholder in '{literal}'")]
    Unterminated { literal: String },
}

/// Replaces `${key}` and `${key:default}` in `literal`, `$${` yields a literal `${`
pub fn substitute(literal: &str, source: &dyn PropertySource) -> Result<String, PlaceholderError> {
    let mut output = String::with_capacity(literal.len());
    let mut rest = literal;

    while let Some(start) = rest.find('$') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(escaped) = tail.strip_prefix("$${") {
            output.push_str("${");
            rest = escaped;
            continue;
        }

        let Some(placeholder) = tail.strip_prefix("${") else {
            output.push('$');
            rest = &tail[1..];
            continue;
        };

        let Some(end) = placeholder.find('}') else {
            return Err(PlaceholderError::Unterminated {
                literal: literal.to_string(),
            });
        };

        let (key, default) = match placeholder[..end].split_once(':') {
            Some((key, default)) => (key, Some(default)),
            None => (&placeholder[..end], None),
        };

        match (source.property(key), default) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(default)) => output.push_str(default),
            (None, None) => {
                return Err(PlaceholderError::Unresolved {
                    key: key.to_string(),
                })
            }
        }
        rest = &placeholder[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HashMap<String, String> {
        HashMap::from([
            ("db.host".to_string(), "localhost".to_string()),
            ("db.port".to_string(), "5432".to_string()),
        ])
    }

    #[test]
    fn replaces_placeholders() {
        assert_eq!(
            substitute("${db.host}:${db.port}", &source()).unwrap(),
            "localhost:5432"
        );
        assert_eq!(substitute("no placeholders", &source()).unwrap(), "no placeholders");
        assert_eq!(substitute("costs $5", &source()).unwrap(), "costs $5");
    }

    #[test]
    fn falls_back_to_defaults() {
        assert_eq!(substitute("${db.user:admin}", &source()).unwrap(), "admin");
        assert_eq!(substitute("${db.host:other}", &source()).unwrap(), "localhost");
        assert_eq!(substitute("${db.user:}", &source()).unwrap(), "");
    }

    #[test]
    fn escapes_are_kept_literally() {
        assert_eq!(substitute("$${db.host}", &source()).unwrap(), "${db.host}");
    }

    #[test]
    fn reports_missing_and_unterminated() {
        assert_eq!(
            substitute("${missing}", &source()),
            Err(PlaceholderError::Unresolved {
                key: "missing".to_string()
            })
        );
        assert!(matches!(
            substitute("${db.host", &source()),
            Err(PlaceholderError::Unterminated { .. })
        ));
    }

    #[test]
    fn default_grace_period_is_five_minutes() {
        let config = ContainerConfig::new("app");
        assert_eq!(config.grace_period, Duration::from_secs(300));
        assert!(config.wait_for_dependencies);
    }
}
