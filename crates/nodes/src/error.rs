//! Registry and config-schema error types.

use thiserror::Error;

use crate::schema::FieldType;

/// Errors returned when looking up a node type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No descriptor is registered under this type id.
    #[error("unknown node type: '{0}'")]
    UnknownNodeType(String),
}

/// Errors returned when a node's config does not satisfy its type's schema.
///
/// The registry reports the first violation it finds:
/// - unknown fields and type mismatches, in field-name order;
/// - then missing required fields, in schema order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config carries a field the schema does not declare.
    #[error("field '{field}' is not recognised by node type '{node_type}'")]
    UnknownField { node_type: String, field: String },

    /// The field is present but holds the wrong kind of value.
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    /// A required field is absent and has no schema default.
    #[error("required field '{field}' is missing")]
    MissingField { field: String },
}
