//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

pub mod api;
pub mod connector;
pub mod db;
pub mod debug;
pub mod error;

pub use api::{
    ChangeRequest, DataChange, GetOptions, ModuleChangeEvent, Notification,
    OperDataRequest, PhaseRequest, RpcRequest, View,
};
pub use connector::{Config, Connector, Session};
pub use error::{Error, ErrorKind, Result};
