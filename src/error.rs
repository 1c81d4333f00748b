//! Unified error taxonomy for the virtual filesystem engine.
//!
//! Every layer (resolver, host, archive, torrent, storage, meta repository,
//! engine client) returns `VfsError`. Each layer wraps a lower error with its
//! own path/operation context rather than discarding it, and the kind is
//! chosen from the six described in the component design: `NotExist` is
//! never synthesised from a backend failure.

use thiserror::Error;

/// A single validation failure surfaced by `Config::validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug, Clone)]
pub enum VfsError {
    #[error("not found: {path}")]
    NotExist { path: String },

    #[error("not implemented: {op} on {path}")]
    NotImplemented { op: String, path: String },

    #[error("invalid argument: {message} ({path})")]
    InvalidArgument { path: String, message: String },

    #[error("timed out after {millis}ms reading {path}")]
    Timeout { path: String, millis: u64 },

    #[error("backend error at {path} during {op}: {message}")]
    Backend {
        path: String,
        op: String,
        message: String,
    },

    #[error("corruption detected for piece {index} of {info_hash}: {message}")]
    Corruption {
        info_hash: String,
        index: u32,
        message: String,
    },

    #[error("engine API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("connection refused: {message}")]
    ConnectionRefused { message: String },

    #[error("connection timed out: {message}")]
    ConnectionTimeout { message: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("configuration error: {message}")]
    ParseError { message: String },

    #[error("configuration validation failed: {0:?}")]
    ValidationError(Vec<ValidationIssue>),
}

impl VfsError {
    pub fn not_exist(path: impl Into<String>) -> Self {
        Self::NotExist { path: path.into() }
    }

    pub fn invalid_argument(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn backend(path: impl Into<String>, op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            path: path.into(),
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn not_implemented(op: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotImplemented {
            op: op.into(),
            path: path.into(),
        }
    }

    /// Wraps this error with additional path context from an enclosing
    /// layer, preserving the original kind. Used by each component as it
    /// re-raises an error from the layer it delegates to.
    pub fn with_context(self, path: &str) -> Self {
        match self {
            Self::Backend { op, message, .. } => Self::Backend {
                path: path.to_string(),
                op,
                message,
            },
            other => other,
        }
    }

    /// Maps the error kind to a POSIX errno, for the FUSE export.
    pub fn to_errno(&self) -> i32 {
        match self {
            Self::NotExist { .. } => libc::ENOENT,
            Self::NotImplemented { .. } => libc::ENOSYS,
            Self::InvalidArgument { .. } => libc::EINVAL,
            Self::Timeout { .. } => libc::EIO,
            Self::Backend { .. } => libc::EIO,
            Self::Corruption { .. } => libc::EIO,
            Self::ConnectionRefused { .. } => libc::EIO,
            Self::ConnectionTimeout { .. } => libc::ETIMEDOUT,
            Self::SerializationError { .. } => libc::EIO,
            Self::ParseError { .. } => libc::EINVAL,
            Self::ValidationError(_) => libc::EINVAL,
            Self::ApiError { status, .. } => match status {
                404 => libc::ENOENT,
                408 | 504 => libc::ETIMEDOUT,
                429 | 502 | 503 => libc::EAGAIN,
                _ => libc::EIO,
            },
        }
    }

    /// Maps the error kind to the nearest HTTP status, for WebDAV/HTTP
    /// export adapters (named interfaces only; not implemented here).
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::NotExist { .. } => 404,
            Self::NotImplemented { .. } => 501,
            Self::InvalidArgument { .. } => 400,
            _ => 500,
        }
    }

    /// Whether a caller may usefully retry this operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionRefused { .. }
                | Self::ApiError {
                    status: 408 | 429 | 502 | 503 | 504,
                    ..
                }
        )
    }

    /// Whether the failure indicates the external BT engine is unreachable,
    /// as distinct from a per-request failure.
    pub fn is_server_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::ApiError {
                    status: 502 | 503,
                    ..
                }
        )
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotExist {
                path: e.to_string(),
            },
            std::io::ErrorKind::TimedOut => Self::ConnectionTimeout {
                message: e.to_string(),
            },
            std::io::ErrorKind::ConnectionRefused => Self::ConnectionRefused {
                message: e.to_string(),
            },
            std::io::ErrorKind::InvalidInput => Self::InvalidArgument {
                path: String::new(),
                message: e.to_string(),
            },
            _ => Self::Backend {
                path: String::new(),
                op: "io".to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for VfsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::ConnectionTimeout {
                message: e.to_string(),
            }
        } else if e.is_connect() {
            Self::ConnectionRefused {
                message: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            Self::ApiError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Backend {
                path: String::new(),
                op: "http".to_string(),
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError {
            message: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for VfsError {
    fn from(e: toml::de::Error) -> Self {
        Self::ParseError {
            message: e.to_string(),
        }
    }
}

impl From<redb::DatabaseError> for VfsError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Backend {
            path: String::new(),
            op: "redb.open".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<redb::TransactionError> for VfsError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Backend {
            path: String::new(),
            op: "redb.tx".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<redb::TableError> for VfsError {
    fn from(e: redb::TableError) -> Self {
        Self::Backend {
            path: String::new(),
            op: "redb.table".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<redb::StorageError> for VfsError {
    fn from(e: redb::StorageError) -> Self {
        Self::Backend {
            path: String::new(),
            op: "redb.storage".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<redb::CommitError> for VfsError {
    fn from(e: redb::CommitError) -> Self {
        Self::Backend {
            path: String::new(),
            op: "redb.commit".to_string(),
            message: e.to_string(),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_exist_maps_to_enoent() {
        assert_eq!(VfsError::not_exist("/x").to_errno(), libc::ENOENT);
    }

    #[test]
    fn not_implemented_maps_to_enosys() {
        assert_eq!(
            VfsError::not_implemented("write", "/x").to_errno(),
            libc::ENOSYS
        );
    }

    #[test]
    fn invalid_argument_maps_to_einval() {
        assert_eq!(
            VfsError::invalid_argument("/x", "bad").to_errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn api_status_maps_to_errno_by_code() {
        assert_eq!(
            (VfsError::ApiError {
                status: 404,
                message: "x".into()
            })
            .to_errno(),
            libc::ENOENT
        );
        assert_eq!(
            (VfsError::ApiError {
                status: 503,
                message: "x".into()
            })
            .to_errno(),
            libc::EAGAIN
        );
        assert_eq!(
            (VfsError::ApiError {
                status: 500,
                message: "x".into()
            })
            .to_errno(),
            libc::EIO
        );
    }

    #[test]
    fn transience_is_limited_to_retryable_kinds() {
        assert!((VfsError::ConnectionTimeout { message: "x".into() }).is_transient());
        assert!((VfsError::ApiError {
            status: 429,
            message: "x".into()
        })
        .is_transient());
        assert!(!(VfsError::NotExist { path: "/x".into() }).is_transient());
    }

    #[test]
    fn server_unavailable_is_narrower_than_transient() {
        assert!((VfsError::ConnectionRefused { message: "x".into() }).is_server_unavailable());
        assert!(!(VfsError::ConnectionTimeout { message: "x".into() }).is_server_unavailable());
    }

    #[test]
    fn io_not_found_becomes_not_exist() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VfsError = io.into();
        assert!(matches!(err, VfsError::NotExist { .. }));
    }

    #[test]
    fn context_preserves_kind_and_replaces_path() {
        let err = VfsError::backend("/old", "open", "disk full").with_context("/new");
        match err {
            VfsError::Backend { path, op, .. } => {
                assert_eq!(path, "/new");
                assert_eq!(op, "open");
            }
            _ => panic!("expected Backend"),
        }
    }

    #[test]
    fn http_status_mapping_covers_named_kinds() {
        assert_eq!(VfsError::not_exist("/x").to_http_status(), 404);
        assert_eq!(VfsError::not_implemented("w", "/x").to_http_status(), 501);
        assert_eq!(VfsError::invalid_argument("/x", "m").to_http_status(), 400);
    }
}
