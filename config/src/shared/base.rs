use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The capture id is empty.
    #[error("`capture_id` cannot be empty")]
    CaptureIdEmpty,
    /// The coordination key base must be an absolute, non-empty path.
    #[error("`key_base` must start with `/` and cannot end with `/`, got `{0}`")]
    InvalidKeyBase(String),
    /// A field holds a value that violates its constraint.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
