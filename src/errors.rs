use miette::Diagnostic;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GrantorError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(code(grantor::invalid_argument))]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    #[diagnostic(
        code(grantor::invalid_state),
        help("Re-fetch the record; it has already moved past this transition")
    )]
    InvalidState(String),

    #[error("{kind} not found: {id}")]
    #[diagnostic(code(grantor::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("Client {0} has been revoked")]
    #[diagnostic(code(grantor::client_revoked))]
    ClientRevoked(String),

    #[error("Authorization code has expired")]
    #[diagnostic(code(grantor::grant_expired))]
    GrantExpired,

    #[error("Authorization code has been revoked")]
    #[diagnostic(code(grantor::grant_revoked))]
    GrantRevoked,

    #[error("Authorization code has already been used")]
    #[diagnostic(code(grantor::grant_already_used))]
    GrantAlreadyUsed,

    #[error("Redirect URI does not match")]
    #[diagnostic(code(grantor::redirect_mismatch))]
    RedirectMismatch,

    #[error("Unique constraint conflict: {0}")]
    #[diagnostic(
        code(grantor::unique_conflict),
        help("Retry with a freshly generated value")
    )]
    UniqueConstraintConflict(String),

    #[error("Storage unavailable: {0}")]
    #[diagnostic(code(grantor::storage_unavailable))]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(grantor::db))]
    Db(DbErr),

    #[error("Config error: {0}")]
    #[diagnostic(code(grantor::config))]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(grantor::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(grantor::serde))]
    Serde(#[from] serde_json::Error),
}

impl From<DbErr> for GrantorError {
    fn from(value: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = value.sql_err() {
            return GrantorError::UniqueConstraintConflict(detail);
        }
        match value {
            DbErr::ConnectionAcquire(e) => GrantorError::StorageUnavailable(e.to_string()),
            DbErr::Conn(e) => GrantorError::StorageUnavailable(e.to_string()),
            other => GrantorError::Db(other),
        }
    }
}

impl GrantorError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GrantorError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// OAuth2 error code (RFC 6749 §4.1.2.1 / §5.2) an HTTP adapter should
    /// report for this failure.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            GrantorError::InvalidArgument(_) => "invalid_request",
            GrantorError::InvalidState(_) => "invalid_request",
            GrantorError::NotFound { kind: "client", .. } => "invalid_client",
            GrantorError::NotFound { kind: "access grant", .. } => "invalid_grant",
            GrantorError::NotFound { .. } => "invalid_request",
            GrantorError::ClientRevoked(_) => "unauthorized_client",
            GrantorError::GrantExpired
            | GrantorError::GrantRevoked
            | GrantorError::GrantAlreadyUsed
            | GrantorError::RedirectMismatch => "invalid_grant",
            GrantorError::UniqueConstraintConflict(_) | GrantorError::StorageUnavailable(_) => {
                "temporarily_unavailable"
            }
            GrantorError::Db(_)
            | GrantorError::Config(_)
            | GrantorError::Io(_)
            | GrantorError::Serde(_) => "server_error",
        }
    }

    /// Whether the caller may retry the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GrantorError::UniqueConstraintConflict(_) | GrantorError::StorageUnavailable(_)
        )
    }
}
