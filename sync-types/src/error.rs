//! Error types for syncview-types.

use thiserror::Error;

/// Errors produced when parsing type names from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Name does not match any [`crate::PermissionFlag`].
    #[error("unknown permission flag: {0}")]
    UnknownFlag(String),

    /// Name does not match any [`crate::MetadataAttribute`].
    #[error("unknown metadata attribute: {0}")]
    UnknownAttribute(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::UnknownAttribute("glamour".into());
        assert_eq!(err.to_string(), "unknown metadata attribute: glamour");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
