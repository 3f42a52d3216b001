//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

//
// Datastore errors.
//
// Every failure reported by the datastore or by one of its subscribers
// belongs to exactly one of these kinds.
//
#[derive(Debug)]
pub enum Error {
    InvalidArgument(String),
    NoMemory(String),
    NotFound(String),
    Internal(String),
    Unsupported(String),
    ValidationFailed(String),
    OperationFailed(String),
    Unauthorized(String),
    Locked(String),
    Timeout(String),
    CallbackFailed(Box<Error>),
    Exists(String),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    InvalidArgument,
    NoMemory,
    NotFound,
    Internal,
    Unsupported,
    ValidationFailed,
    OperationFailed,
    Unauthorized,
    Locked,
    Timeout,
    CallbackFailed,
    Exists,
}

// ===== impl Error =====

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(..) => ErrorKind::InvalidArgument,
            Error::NoMemory(..) => ErrorKind::NoMemory,
            Error::NotFound(..) => ErrorKind::NotFound,
            Error::Internal(..) => ErrorKind::Internal,
            Error::Unsupported(..) => ErrorKind::Unsupported,
            Error::ValidationFailed(..) => ErrorKind::ValidationFailed,
            Error::OperationFailed(..) => ErrorKind::OperationFailed,
            Error::Unauthorized(..) => ErrorKind::Unauthorized,
            Error::Locked(..) => ErrorKind::Locked,
            Error::Timeout(..) => ErrorKind::Timeout,
            Error::CallbackFailed(..) => ErrorKind::CallbackFailed,
            Error::Exists(..) => ErrorKind::Exists,
        }
    }

    /// Message without the kind prefix. Chained errors yield the message
    /// of the innermost error.
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidArgument(msg)
            | Error::NoMemory(msg)
            | Error::NotFound(msg)
            | Error::Internal(msg)
            | Error::Unsupported(msg)
            | Error::ValidationFailed(msg)
            | Error::OperationFailed(msg)
            | Error::Unauthorized(msg)
            | Error::Locked(msg)
            | Error::Timeout(msg)
            | Error::Exists(msg) => msg,
            Error::CallbackFailed(error) => error.message(),
        }
    }

    pub fn log(&self) {
        warn!(kind = %self.kind(), error = %self, "datastore error");
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CallbackFailed(error) => {
                write!(f, "callback failed: {}", error)
            }
            _ => write!(f, "{}: {}", self.kind(), self.message()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CallbackFailed(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<goldstone_yang::Error> for Error {
    fn from(error: goldstone_yang::Error) -> Error {
        match error {
            goldstone_yang::Error::NodeExists(..) => {
                Error::Exists(error.to_string())
            }
            goldstone_yang::Error::NodeNotFound(..) => {
                Error::NotFound(error.to_string())
            }
            _ => Error::InvalidArgument(error.to_string()),
        }
    }
}

impl From<goldstone_utils::DatabaseError> for Error {
    fn from(error: goldstone_utils::DatabaseError) -> Error {
        Error::OperationFailed(format!("startup database: {}", error))
    }
}

// ===== impl ErrorKind =====

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NoMemory => "no-memory",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::ValidationFailed => "validation-failed",
            ErrorKind::OperationFailed => "operation-failed",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Locked => "locked",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CallbackFailed => "callback-failed",
            ErrorKind::Exists => "exists",
        };
        write!(f, "{}", name)
    }
}
