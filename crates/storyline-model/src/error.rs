//! Error types for model operations.

/// Errors produced while building grammars, converting cell values or
/// compiling fixtures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("cell '{cell}': cannot convert '{value}' to {type_name}: {reason}")]
    Conversion {
        cell: String,
        value: String,
        type_name: String,
        reason: String,
    },

    #[error("cell '{0}' has no value and no default")]
    MissingValue(String),

    #[error("sentence '{key}' has no cell for placeholder '{placeholder}'")]
    UnboundPlaceholder { key: String, placeholder: String },

    #[error("duplicate cell '{cell}' in grammar '{key}'")]
    DuplicateCell { key: String, cell: String },

    #[error("fixture '{name}' could not be built: {reason}")]
    FixtureConstruction { name: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_display() {
        let err = ModelError::Conversion {
            cell: "x".to_string(),
            value: "abc".to_string(),
            type_name: "i32".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cell 'x'"));
        assert!(msg.contains("'abc'"));
        assert!(msg.contains("i32"));
    }

    #[test]
    fn test_unbound_placeholder_display() {
        let err = ModelError::UnboundPlaceholder {
            key: "Add".to_string(),
            placeholder: "y".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "sentence 'Add' has no cell for placeholder 'y'"
        );
    }
}
