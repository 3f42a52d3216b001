//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod debug;

pub mod handler;
pub mod server;

use async_trait::async_trait;
use goldstone_datastore::{Connector, Error, Result};
use goldstone_yang::DataPath;
use serde_json::Value;

pub use crate::handler::{
    Handler, HandlerFactory, HandlerNode, HandlerTree, Lookup, ServerContext,
    Transaction,
};
pub use crate::server::{
    Config, DEFAULT_REVERT_TIMEOUT, REVERT_TIMEOUT_ENV, Server, ServerHandle,
};

/// Owner of one module's device state.
///
/// A provider is driven by a [`Server`], which calls it from a single task:
/// the methods never run concurrently with each other or with the
/// provider's handlers.
#[async_trait]
pub trait Provider
where
    Self: 'static + Send + Sized,
{
    // Per-transaction scratch space shared by the handlers.
    type User: Default + Send;

    fn module(&self) -> &str;

    fn handlers(&self) -> HandlerTree<Self>;

    // RPCs served by this provider.
    fn rpcs(&self) -> Vec<String> {
        Vec::new()
    }

    async fn pre(
        &mut self,
        _conn: &Connector,
        _tx: &mut Transaction<Self::User>,
    ) -> Result<()> {
        Ok(())
    }

    async fn post(
        &mut self,
        _conn: &Connector,
        _tx: &mut Transaction<Self::User>,
    ) -> Result<()> {
        Ok(())
    }

    /// Operational data under `path`, as JSON instance data rooted at the
    /// module's top container. Must not change any state.
    async fn oper_data(
        &mut self,
        _conn: &Connector,
        _path: &DataPath,
    ) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn rpc(
        &mut self,
        _conn: &Connector,
        path: &DataPath,
        _input: Value,
    ) -> Result<Value> {
        Err(Error::Unsupported(format!("{} not supported", path)))
    }

    /// Pushes the running configuration to the device. Runs once after the
    /// subscriptions are in place and must be idempotent.
    async fn reconcile(&mut self, _conn: &Connector) -> Result<()> {
        Ok(())
    }
}
