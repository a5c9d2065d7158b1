use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unique constraint violation on {entity}.{field}")]
    UniqueViolation { entity: String, field: String },

    #[error("Foreign key violation: {entity}.{field} references a missing {target} record")]
    ForeignKeyViolation {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Foreign key violation: {entity} record is still referenced by {child}.{field}")]
    RestrictViolation {
        entity: String,
        child: String,
        field: String,
    },

    #[error("No {entity} record found for the given criteria")]
    NotFound { entity: String },

    #[error("Entity '{0}' is not part of the schema")]
    UnknownEntity(String),

    #[error("Field '{field}' does not exist on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Relation '{relation}' does not exist on {entity}")]
    UnknownRelation { entity: String, relation: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Coarse classification of an error, stable across message changes.
///
/// `KnownConstraint` covers everything the store reported about the data
/// itself (unique/foreign-key violations, required record missing).
/// `Validation` covers requests rejected before any store round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KnownConstraint,
    Validation,
    Initialization,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KnownConstraint => write!(f, "KnownConstraintError"),
            Self::Validation => write!(f, "ValidationError"),
            Self::Initialization => write!(f, "InitializationError"),
            Self::Unknown => write!(f, "UnknownRequestError"),
        }
    }
}

/// How error messages are rendered by [`DbError::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    /// Multi-line, ANSI-colored output for terminals.
    #[default]
    Pretty,
    /// Same layout as `Pretty` without escape codes.
    Colorless,
    /// Single line, message only.
    Minimal,
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UniqueViolation { .. }
            | Self::ForeignKeyViolation { .. }
            | Self::RestrictViolation { .. }
            | Self::NotFound { .. } => ErrorKind::KnownConstraint,

            Self::UnknownEntity(_)
            | Self::UnknownField { .. }
            | Self::UnknownRelation { .. }
            | Self::Validation(_)
            | Self::TypeMismatch(_)
            | Self::Parse(_)
            | Self::Unsupported(_) => ErrorKind::Validation,

            Self::Initialization(_) => ErrorKind::Initialization,

            Self::Transaction(_) | Self::Execution(_) => ErrorKind::Unknown,
        }
    }

    /// Renders the error according to the client's configured format.
    pub fn render(&self, format: ErrorFormat) -> String {
        match format {
            ErrorFormat::Minimal => self.to_string(),
            ErrorFormat::Colorless => format!("{}: {}", self.kind(), self),
            ErrorFormat::Pretty => {
                format!("\x1b[1;31m{}\x1b[0m\n  {}", self.kind(), self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_errors_share_a_kind() {
        let unique = DbError::UniqueViolation {
            entity: "User".into(),
            field: "email".into(),
        };
        let missing = DbError::NotFound {
            entity: "Project".into(),
        };
        assert_eq!(unique.kind(), ErrorKind::KnownConstraint);
        assert_eq!(missing.kind(), ErrorKind::KnownConstraint);
    }

    #[test]
    fn test_validation_kind_covers_pre_dispatch_rejections() {
        assert_eq!(
            DbError::UnknownField {
                entity: "User".into(),
                field: "emial".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            DbError::Parse("unexpected token".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_render_formats() {
        let err = DbError::UnknownEntity("Ghost".into());
        assert_eq!(
            err.render(ErrorFormat::Minimal),
            "Entity 'Ghost' is not part of the schema"
        );
        let colorless = err.render(ErrorFormat::Colorless);
        assert!(colorless.starts_with("ValidationError: "));
        let pretty = err.render(ErrorFormat::Pretty);
        assert!(pretty.contains("\x1b[1;31m"));
    }
}
