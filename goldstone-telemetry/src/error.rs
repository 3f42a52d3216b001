//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::store::Ids;

pub type Result<T> = std::result::Result<T, Error>;

// Telemetry errors.
#[derive(Debug)]
pub enum Error {
    InvalidRequest(String),
    RequestExists(u64),
    RequestNotFound(u64),
    TelemetryNotFound(Ids, String),
    NotPollMode(u64),
    ModificationUnsupported,
    Datastore(goldstone_datastore::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::InvalidRequest(reason) => {
                warn!(%reason, "{}", self);
            }
            Error::RequestExists(id)
            | Error::RequestNotFound(id)
            | Error::NotPollMode(id) => {
                warn!(%id, "{}", self);
            }
            Error::TelemetryNotFound(ids, path) => {
                warn!(%ids, %path, "{}", self);
            }
            Error::ModificationUnsupported => {
                warn!("{}", self);
            }
            Error::Datastore(error) => {
                error.log();
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidRequest(reason) => {
                write!(f, "invalid subscription parameter: {}", reason)
            }
            Error::RequestExists(id) => {
                write!(f, "subscribe-request {} already exists", id)
            }
            Error::RequestNotFound(id) => {
                write!(f, "invalid id {}", id)
            }
            Error::TelemetryNotFound(ids, path) => {
                write!(f, "no telemetry data for {} at {}", ids, path)
            }
            Error::NotPollMode(id) => {
                write!(f, "subscribe-request {} is not in POLL mode", id)
            }
            Error::ModificationUnsupported => {
                write!(f, "subscription modification is not supported")
            }
            Error::Datastore(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Datastore(error) => Some(error),
            _ => None,
        }
    }
}

impl From<goldstone_datastore::Error> for Error {
    fn from(error: goldstone_datastore::Error) -> Error {
        Error::Datastore(error)
    }
}

impl From<Error> for goldstone_datastore::Error {
    fn from(error: Error) -> goldstone_datastore::Error {
        use goldstone_datastore::Error as DsError;

        match error {
            Error::InvalidRequest(..) | Error::NotPollMode(..) => {
                DsError::InvalidArgument(error.to_string())
            }
            Error::RequestExists(..) => DsError::Exists(error.to_string()),
            Error::RequestNotFound(..) | Error::TelemetryNotFound(..) => {
                DsError::NotFound(error.to_string())
            }
            Error::ModificationUnsupported => {
                DsError::Unsupported(error.to_string())
            }
            Error::Datastore(error) => error,
        }
    }
}
