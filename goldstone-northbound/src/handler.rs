//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use goldstone_datastore::{Connector, Error, GetOptions, Result, View};
use goldstone_yang::{Change, ChangeKind, DataPath, DataTree};
use serde_json::Value;

use crate::Provider;
use crate::server::Config;

//
// Useful type definitions.
//
pub type HandlerFactory<P> = fn(&Change) -> Box<dyn Handler<P>>;

/// Path-indexed table of handler factories for one module.
///
/// Keys are node names without module prefix. List keys play no role in
/// the lookup, only the list name does.
pub struct HandlerTree<P: Provider>(BTreeMap<String, HandlerNode<P>>);

pub enum HandlerNode<P: Provider> {
    Dispatch(BTreeMap<String, HandlerNode<P>>),
    Handler(HandlerFactory<P>),
    // Accept every change in the subtree without doing anything.
    Skip,
}

pub enum Lookup<P: Provider> {
    Handler(HandlerFactory<P>),
    Skip,
    Unsupported,
}

/// Per-change unit of work.
///
/// A handler is built for one change when the change event arrives and
/// lives until the transaction is done, aborted or timed out. Reverting is
/// best effort: errors are logged and otherwise ignored.
#[async_trait]
pub trait Handler<P>: Send
where
    P: Provider,
{
    async fn init(
        &mut self,
        _server: &mut ServerContext<'_, P>,
        _tx: &mut Transaction<P::User>,
    ) -> Result<()> {
        Ok(())
    }

    async fn validate(
        &mut self,
        _server: &mut ServerContext<'_, P>,
        _tx: &mut Transaction<P::User>,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply(
        &mut self,
        server: &mut ServerContext<'_, P>,
        tx: &mut Transaction<P::User>,
    ) -> Result<()>;

    async fn revert(
        &mut self,
        _server: &mut ServerContext<'_, P>,
        _tx: &mut Transaction<P::User>,
    ) -> Result<()> {
        Ok(())
    }
}

/// What handlers get to see of the server that owns them.
pub struct ServerContext<'a, P> {
    pub provider: &'a mut P,
    pub conn: &'a Connector,
    pub config: &'a Config,
}

/// Changes of one module delivered in a single change event.
#[derive(Debug)]
pub struct Transaction<U> {
    pub req_id: u64,
    pub changes: Arc<Vec<Change>>,
    // Candidate configuration, with defaults.
    pub config: Arc<DataTree>,
    // Scratch space shared by the handlers of the transaction.
    pub user: U,
}

// ===== impl HandlerTree =====

impl<P: Provider> HandlerTree<P> {
    pub fn new<I, S>(nodes: I) -> HandlerTree<P>
    where
        I: IntoIterator<Item = (S, HandlerNode<P>)>,
        S: Into<String>,
    {
        HandlerTree(
            nodes
                .into_iter()
                .map(|(name, node)| (name.into(), node))
                .collect(),
        )
    }

    /// Finds what to do with a change at `path`.
    ///
    /// The walk stops at the first handler or skip node found. A path that
    /// ends on a dispatch node is skipped, a path that leaves the tree is
    /// unsupported.
    pub fn lookup(&self, path: &DataPath) -> Lookup<P> {
        let mut cursor = &self.0;
        for name in path.names() {
            match cursor.get(name) {
                Some(HandlerNode::Dispatch(children)) => cursor = children,
                Some(HandlerNode::Handler(factory)) => {
                    return Lookup::Handler(*factory);
                }
                Some(HandlerNode::Skip) => return Lookup::Skip,
                None => return Lookup::Unsupported,
            }
        }
        Lookup::Skip
    }
}

impl<P: Provider> Default for HandlerTree<P> {
    fn default() -> HandlerTree<P> {
        HandlerTree(BTreeMap::new())
    }
}

impl<P: Provider> std::fmt::Debug for HandlerTree<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

// ===== impl HandlerNode =====

impl<P: Provider> HandlerNode<P> {
    pub fn dispatch<I, S>(children: I) -> HandlerNode<P>
    where
        I: IntoIterator<Item = (S, HandlerNode<P>)>,
        S: Into<String>,
    {
        HandlerNode::Dispatch(
            children
                .into_iter()
                .map(|(name, node)| (name.into(), node))
                .collect(),
        )
    }
}

impl<P: Provider> std::fmt::Debug for HandlerNode<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerNode::Dispatch(children) => {
                f.debug_map().entries(children.iter()).finish()
            }
            HandlerNode::Handler(..) => write!(f, "Handler"),
            HandlerNode::Skip => write!(f, "Skip"),
        }
    }
}

// ===== impl Lookup =====

impl<P: Provider> std::fmt::Debug for Lookup<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Handler(..) => write!(f, "Handler"),
            Lookup::Skip => write!(f, "Skip"),
            Lookup::Unsupported => write!(f, "Unsupported"),
        }
    }
}

// ===== impl ServerContext =====

impl<P> ServerContext<'_, P> {
    /// Committed running value at `path`.
    pub async fn get_running_data(
        &self,
        path: &str,
        default: Option<Value>,
    ) -> Result<Value> {
        self.get(path, default, View::Running).await
    }

    /// Value a leaf takes once the change is committed. Deleting a leaf
    /// with a schema default falls back to that default.
    pub fn new_value(&self, change: &Change) -> Result<Option<Value>> {
        match change.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                Ok(change.value.clone())
            }
            ChangeKind::Deleted => self
                .conn
                .context()
                .default_value(&change.path.to_string())
                .map_err(Error::from),
        }
    }

    pub fn range(
        &self,
        path: &DataPath,
    ) -> Result<Option<RangeInclusive<i128>>> {
        self.conn
            .context()
            .range(&path.to_string())
            .map_err(Error::from)
    }

    pub fn enums(&self, path: &DataPath) -> Result<Vec<String>> {
        self.conn
            .context()
            .enums(&path.to_string())
            .map_err(Error::from)
    }

    /// Rejects integers outside the schema range of the leaf.
    pub fn check_range(&self, path: &DataPath, value: &Value) -> Result<()> {
        let Some(range) = self.range(path)? else {
            return Ok(());
        };
        let number = value
            .as_i64()
            .map(i128::from)
            .or_else(|| value.as_u64().map(i128::from));
        match number {
            Some(number) if range.contains(&number) => Ok(()),
            _ => Err(Error::InvalidArgument(format!(
                "{} is out of range {}..{} for {}",
                value,
                range.start(),
                range.end(),
                path
            ))),
        }
    }

    /// Rejects values not found in `supported`, typically the subset of
    /// the schema enumeration the device can do.
    pub fn check_supported(
        &self,
        path: &DataPath,
        value: &Value,
        supported: &[&str],
    ) -> Result<()> {
        match value.as_str() {
            Some(value) if supported.contains(&value) => Ok(()),
            _ => Err(Error::InvalidArgument(format!(
                "{} not supported for {}. supported values: {}",
                value,
                path,
                supported.join(", ")
            ))),
        }
    }

    pub fn send_notification(&self, path: &str, body: Value) -> Result<()> {
        self.conn.send_notification(path, body)
    }

    async fn get(
        &self,
        path: &str,
        default: Option<Value>,
        view: View,
    ) -> Result<Value> {
        let options = GetOptions {
            default,
            strip: true,
            ..Default::default()
        };
        self.conn.get(path, options, view).await
    }
}

impl<P> ServerContext<'_, P>
where
    P: Provider,
{
    /// Observed value at `path`, including data of other providers.
    ///
    /// The server is busy running the caller, so data of its own module
    /// is asked from the provider directly.
    pub async fn get_operational_data(
        &mut self,
        path: &str,
        default: Option<Value>,
    ) -> Result<Value> {
        let options = GetOptions {
            default,
            strip: true,
            ..Default::default()
        };
        let data_path = DataPath::parse(path)?;
        let conn = self.conn;
        let module = self.provider.module().to_owned();
        if conn.context().resolve(&data_path)?.module.name != module {
            return conn.get(path, options, View::Operational).await;
        }

        let local = self
            .provider
            .oper_data(conn, &data_path)
            .await?
            .map(|data| DataTree::from_value(conn.context().clone(), &data))
            .transpose()?;
        conn.get_operational_local(path, options, &module, local).await
    }
}

// ===== impl Transaction =====

impl<U> Transaction<U>
where
    U: Default,
{
    pub fn new(
        req_id: u64,
        changes: Arc<Vec<Change>>,
        config: Arc<DataTree>,
    ) -> Transaction<U> {
        Transaction {
            req_id,
            changes,
            config,
            user: U::default(),
        }
    }
}

impl<U> Transaction<U> {
    /// Candidate value at `path`, defaults included.
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = DataPath::parse(path).ok()?;
        let mut found = self.config.find(&path).ok()?;
        match found.len() {
            1 => Some(found.remove(0).1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use goldstone_yang::modules;
    use serde_json::json;

    use super::*;

    struct Device;

    struct AdminStatus;

    #[async_trait]
    impl Provider for Device {
        type User = ();

        fn module(&self) -> &str {
            "goldstone-interfaces"
        }

        fn handlers(&self) -> HandlerTree<Device> {
            HandlerTree::default()
        }
    }

    #[async_trait]
    impl Handler<Device> for AdminStatus {
        async fn apply(
            &mut self,
            _server: &mut ServerContext<'_, Device>,
            _tx: &mut Transaction<()>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn admin_status(_change: &Change) -> Box<dyn Handler<Device>> {
        Box::new(AdminStatus)
    }

    fn tree() -> HandlerTree<Device> {
        HandlerTree::new([(
            "interfaces",
            HandlerNode::dispatch([(
                "interface",
                HandlerNode::dispatch([
                    ("name", HandlerNode::Skip),
                    (
                        "config",
                        HandlerNode::dispatch([
                            ("name", HandlerNode::Skip),
                            (
                                "admin-status",
                                HandlerNode::Handler(admin_status),
                            ),
                        ]),
                    ),
                    ("ethernet", HandlerNode::Skip),
                ]),
            )]),
        )])
    }

    fn lookup(path: &str) -> Lookup<Device> {
        tree().lookup(&DataPath::parse(path).unwrap())
    }

    #[test]
    fn lookup_finds_handler_ignoring_keys() {
        let path = "/goldstone-interfaces:interfaces/interface[name='Ethernet1/1/1']/config/admin-status";
        assert!(matches!(lookup(path), Lookup::Handler(..)));
    }

    #[test]
    fn lookup_skips_subtrees_and_dispatch_nodes() {
        for path in [
            "/goldstone-interfaces:interfaces/interface[name='e1']/name",
            "/goldstone-interfaces:interfaces/interface[name='e1']/ethernet/config/fec",
            "/goldstone-interfaces:interfaces/interface[name='e1']",
            "/goldstone-interfaces:interfaces",
        ] {
            assert!(matches!(lookup(path), Lookup::Skip), "{}", path);
        }
    }

    #[test]
    fn lookup_rejects_unknown_branches() {
        let path =
            "/goldstone-interfaces:interfaces/interface[name='e1']/config/mtu";
        assert!(matches!(lookup(path), Lookup::Unsupported));
    }

    #[test]
    fn transaction_reads_candidate() {
        let ctx = Arc::new(modules::builtin_context().unwrap());
        let mut config = DataTree::new(ctx);
        let path = DataPath::parse(
            "/goldstone-interfaces:interfaces/interface[name='e1']/config/mtu",
        )
        .unwrap();
        config.set(&path, Some(&json!(9000))).unwrap();
        let change = Change::new(
            ChangeKind::Created,
            path,
            Some(json!(9000)),
            None,
        );
        let tx = Transaction::<()>::new(
            1,
            Arc::new(vec![change]),
            Arc::new(config.with_defaults(true)),
        );
        let interface = "/goldstone-interfaces:interfaces/interface";
        assert_eq!(
            tx.get(&format!("{interface}[name='e1']/config/mtu")),
            Some(json!(9000))
        );
        assert_eq!(
            tx.get(&format!("{interface}[name='e1']/config/admin-status")),
            Some(json!("DOWN"))
        );
        assert_eq!(tx.get(&format!("{interface}[name='e2']/config/mtu")), None);
    }
}
