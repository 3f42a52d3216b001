//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

pub mod data;
pub mod error;
pub mod modules;
pub mod path;
pub mod schema;

pub use data::{Change, ChangeKind, DataNode, DataTree, diff, key_string};
pub use error::{Error, Result};
pub use path::{DataPath, MEMBER_KEY, PathElem, xpath_split};
pub use schema::{
    BaseType, Context, LeafType, Module, NodeKind, Resolved, SchemaNode,
};
