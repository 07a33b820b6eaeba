//! Error types for dv_schema_sync

use thiserror::Error;

/// Result type for dv_schema_sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dv_schema_sync
#[derive(Error, Debug)]
pub enum Error {
    /// A DDL clause did not match the supported CREATE TABLE grammar.
    #[error("Parse error: {message}{}", fragment_suffix(.fragment))]
    Parse {
        message: String,
        fragment: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata could not be loaded while an operation required a live connection.
    #[error("Dataverse connection unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Dataverse request failed: {0}")]
    Remote(String),

    #[error("SQL data type '{0}' is not supported for automatic attribute creation")]
    UnsupportedType(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Parse error without an offending fragment
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            fragment: None,
        }
    }

    /// Parse error carrying the clause that failed
    pub fn parse_at(message: impl Into<String>, fragment: &str) -> Self {
        Error::Parse {
            message: message.into(),
            fragment: Some(fragment.trim().to_string()),
        }
    }
}

fn fragment_suffix(fragment: &Option<String>) -> String {
    match fragment {
        Some(text) => format!(" (in `{}`)", text.split_whitespace().collect::<Vec<_>>().join(" ")),
        None => String::new(),
    }
}

/// Convert Serde JSON errors to dv_schema_sync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

/// Convert TOML deserialization errors to dv_schema_sync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_flattens_fragment_whitespace() {
        let err = Error::parse_at("Unable to parse column definition", "  amount\n   decimal(12,2) ");
        assert_eq!(
            err.to_string(),
            "Parse error: Unable to parse column definition (in `amount decimal(12,2)`)"
        );
    }

    #[test]
    fn parse_error_without_fragment() {
        let err = Error::parse("No CREATE TABLE statements were found");
        assert_eq!(err.to_string(), "Parse error: No CREATE TABLE statements were found");
    }
}
