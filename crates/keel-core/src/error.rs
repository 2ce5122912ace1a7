use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Configuration failures detected eagerly when a schema is built.
/// These indicate a programming mistake, not a runtime condition; there is
/// nothing to retry.
///

#[derive(Clone, Debug, ThisError, Eq, PartialEq)]
pub enum SchemaError {
    #[error("schema '{schema}' has circular field dependencies: {path}")]
    CircularDependency { schema: String, path: String },

    #[error("schema '{schema}': field '{field}' depends on undefined field '{depends}'")]
    UnknownDependency {
        schema: String,
        field: String,
        depends: String,
    },

    #[error("schema '{schema}': field '{field}' cannot depend on opaque field '{target}'")]
    OpaqueDependency {
        schema: String,
        field: String,
        target: String,
    },

    #[error("schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },

    #[error("schema '{schema}' names missing id field '{field}'")]
    UnknownIdField { schema: String, field: String },

    #[error("schema '{schema}' names missing version field '{field}'")]
    UnknownVersionField { schema: String, field: String },
}

///
/// RecordError
///
/// State errors raised synchronously at the call site.
///

#[derive(Clone, Debug, ThisError, Eq, PartialEq)]
pub enum RecordError {
    #[error("record field '{name}' is not declared by schema '{schema}'")]
    UnknownField { schema: String, name: String },

    #[error("id value '{value}' was rejected by the id field converter of schema '{schema}'")]
    InvalidId { schema: String, value: String },

    #[error("cannot reject a record that has been erased")]
    RejectErased,
}
