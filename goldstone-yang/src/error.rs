//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

pub type Result<T> = std::result::Result<T, Error>;

// Schema and instance data errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    InvalidPath(String, String),
    UnknownModule(String),
    UnknownNode(String),
    ModuleExists(String),
    InvalidValue(String, String),
    KeyModified(String),
    NodeExists(String),
    NodeNotFound(String),
    InvalidData(String),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        warn!(error = %self, "schema error");
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidPath(path, reason) => {
                write!(f, "invalid path {path}: {reason}")
            }
            Error::UnknownModule(module) => {
                write!(f, "unknown module: {module}")
            }
            Error::UnknownNode(path) => {
                write!(f, "schema node not found: {path}")
            }
            Error::ModuleExists(module) => {
                write!(f, "module already loaded: {module}")
            }
            Error::InvalidValue(path, reason) => {
                write!(f, "invalid value for {path}: {reason}")
            }
            Error::KeyModified(path) => {
                write!(f, "list key can't be modified: {path}")
            }
            Error::NodeExists(path) => {
                write!(f, "data node already exists: {path}")
            }
            Error::NodeNotFound(path) => {
                write!(f, "data node not found: {path}")
            }
            Error::InvalidData(reason) => {
                write!(f, "invalid instance data: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
