//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use derive_new::new;
use goldstone_utils::task::Task;
use goldstone_utils::{Database, UnboundedReceiver, UnboundedSender};
use goldstone_yang::{
    Change, Context, DataPath, DataTree, MEMBER_KEY, NodeKind, PathElem,
    SchemaNode, diff, key_string,
};
use serde_json::{Map, Value};
use tokio::sync::{OwnedMutexGuard, mpsc, oneshot};
use tokio::time;
use tracing::{error, warn};

use crate::api::{
    ChangeRequest, DataChange, GetOptions, ModuleChangeEvent, Notification,
    OperDataRequest, PhaseRequest, RpcRequest, View,
};
use crate::db;
use crate::debug::Debug;
use crate::error::{Error, Result};

/// Datastore timeouts.
#[derive(Clone, Debug)]
pub struct Config {
    // Time a subscriber may take to answer a commit event.
    pub commit_timeout: Duration,
    // Time an operational data callback may take.
    pub oper_timeout: Duration,
}

/// Handle to the shared datastore. Cloning is cheap and every clone sees
/// the same views and subscriptions.
#[derive(Clone, Debug)]
pub struct Connector {
    inner: Arc<Datastore>,
}

/// Staged edits against one view.
///
/// Edits are validated against a private candidate copy as they are made
/// and only become visible to others on [`Session::apply`].
#[derive(Debug)]
pub struct Session {
    conn: Connector,
    view: View,
    edits: Vec<Edit>,
    candidate: Option<DataTree>,
}

struct Datastore {
    ctx: Arc<Context>,
    config: Config,
    db: Option<Database>,
    state: Mutex<State>,
    // Serializes commits of the running view.
    commit_lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug)]
struct State {
    running: DataTree,
    startup: DataTree,
    // Data pushed by daemons into the operational view.
    oper_push: DataTree,
    next_req_id: u64,
    change_subs: Vec<ChangeSubscription>,
    oper_subs: Vec<OperSubscription>,
    rpc_subs: BTreeMap<String, UnboundedSender<RpcRequest>>,
    notif_subs: Vec<(DataPath, UnboundedSender<Notification>)>,
    data_change_subs: Vec<(DataPath, UnboundedSender<DataChange>)>,
}

#[derive(Debug, new)]
struct ChangeSubscription {
    module: String,
    tx: UnboundedSender<ModuleChangeEvent>,
}

#[derive(Debug, new)]
struct OperSubscription {
    module: String,
    root: DataPath,
    tx: UnboundedSender<OperDataRequest>,
}

// Module slice of a commit, addressed to one subscriber.
#[derive(Debug, new)]
struct ChangeDelivery {
    module: String,
    tx: UnboundedSender<ModuleChangeEvent>,
    changes: Arc<Vec<Change>>,
}

#[derive(Clone, Debug)]
enum Edit {
    Set(DataPath, Option<Value>),
    Delete(DataPath),
    DeleteModule(String),
    Replace(DataTree),
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Done,
    Abort,
}

// ===== impl Datastore =====

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("ctx", &self.ctx)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("commit_lock", &self.commit_lock)
            .finish_non_exhaustive()
    }
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            commit_timeout: Duration::from_secs(60),
            oper_timeout: Duration::from_secs(10),
        }
    }
}

// ===== impl Connector =====

impl Connector {
    /// Opens the datastore. When a database is given, the startup view is
    /// loaded from it and kept in sync with it.
    pub fn new(
        ctx: Arc<Context>,
        config: Config,
        db: Option<Database>,
    ) -> Result<Connector> {
        let startup = match &db {
            Some(db) => {
                let db = db.lock().unwrap_or_else(PoisonError::into_inner);
                db::startup_load(&db, &ctx)?
            }
            None => None,
        };
        let state = State {
            running: DataTree::new(ctx.clone()),
            startup: startup.unwrap_or_else(|| DataTree::new(ctx.clone())),
            oper_push: DataTree::new(ctx.clone()),
            next_req_id: 0,
            change_subs: Vec::new(),
            oper_subs: Vec::new(),
            rpc_subs: BTreeMap::new(),
            notif_subs: Vec::new(),
            data_change_subs: Vec::new(),
        };

        Ok(Connector {
            inner: Arc::new(Datastore {
                ctx,
                config,
                db,
                state: Mutex::new(state),
                commit_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.inner.ctx
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn new_session(&self, view: View) -> Session {
        Session {
            conn: self.clone(),
            view,
            edits: Vec::new(),
            candidate: None,
        }
    }

    /// Looks up the schema node of a data path.
    pub fn find_node(&self, path: &str) -> Result<&SchemaNode> {
        self.inner.ctx.find_node(path).map_err(Error::from)
    }

    /// Reads the data at `path`.
    ///
    /// Without `strip` or `one` the result is the tree enclosing the
    /// selected nodes. Operational reads of containers and lists without
    /// data return an empty value.
    pub async fn get(
        &self,
        path: &str,
        options: GetOptions,
        view: View,
    ) -> Result<Value> {
        let path = DataPath::parse(path)?;
        let kind = self.inner.ctx.resolve(&path)?.node().kind;
        let tree = self.view_data(&path, view, None).await?;
        select(&path, kind, tree, options, view)
    }

    /// Operational read made from a callback of `module`, whose own pull
    /// callback can't answer meanwhile. `local` stands in for the data that
    /// callback would provide.
    pub async fn get_operational_local(
        &self,
        path: &str,
        options: GetOptions,
        module: &str,
        local: Option<DataTree>,
    ) -> Result<Value> {
        let path = DataPath::parse(path)?;
        let kind = self.inner.ctx.resolve(&path)?.node().kind;
        let view = View::Operational;
        let tree = self.view_data(&path, view, Some((module, local))).await?;
        select(&path, kind, tree, options, view)
    }

    /// Reads the data under `path` as a tree.
    pub async fn get_data(
        &self,
        path: &str,
        view: View,
        include_implicit_defaults: bool,
    ) -> Result<DataTree> {
        let path = DataPath::parse(path)?;
        let mut tree = self.view_data(&path, view, None).await?;
        if include_implicit_defaults {
            tree = tree.with_defaults(view != View::Operational);
        }
        tree.filter(&path).map_err(Error::from)
    }

    /// Running configuration of a module's top container, with defaults.
    pub fn get_config_cache(&self, module: &str) -> Result<Value> {
        let not_found =
            || Error::NotFound(format!("no data container in {}", module));
        let ctx = &self.inner.ctx;
        let module = ctx.module(module).ok_or_else(not_found)?;
        let top = module.top_container().ok_or_else(not_found)?;
        let key = format!("{}:{}", module.name, top.name);
        let running = self.inner.state().running.with_defaults(true);
        Ok(running
            .to_value()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Invokes the RPC at `path` and returns its output.
    pub async fn rpc(&self, path: &str, input: Value) -> Result<Value> {
        let path = DataPath::parse(path)?;
        let key = self.schema_key(&path, NodeKind::Rpc)?;
        let tx = self
            .inner
            .state()
            .rpc_subs
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("no subscriber for rpc {}", key))
            })?;

        Debug::RpcRequestTx(&path).log();
        let (responder, rx) = oneshot::channel();
        tx.send(RpcRequest::new(path, input, responder)).map_err(|_| {
            Error::NotFound(format!("rpc subscriber for {} is gone", key))
        })?;
        match time::timeout(self.inner.config.commit_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Internal(format!(
                "rpc subscriber for {} dropped the request",
                key
            ))),
            Err(_) => Err(Error::Timeout(format!("rpc {} timed out", key))),
        }
    }

    /// Publishes a notification to every matching subscriber.
    pub fn send_notification(&self, path: &str, body: Value) -> Result<()> {
        let path = DataPath::parse(path)?;
        let resolved = self.inner.ctx.resolve(&path)?;
        let node = resolved.node();
        if node.kind != NodeKind::Notification {
            return Err(Error::InvalidArgument(format!(
                "{} is not a notification",
                path
            )));
        }
        if let Some(member) = body
            .as_object()
            .and_then(|body| body.keys().find(|k| node.find_child(k).is_none()))
        {
            return Err(Error::InvalidArgument(format!(
                "unknown member {} in notification {}",
                member, path
            )));
        }

        Debug::NotificationTx(&path).log();
        let notification = Notification::new(path, body);
        self.inner.state().notif_subs.retain(|(filter, tx)| {
            !notification.path.intersects(filter)
                || tx.send(notification.clone()).is_ok()
        });
        Ok(())
    }

    /// Registers for the commit events of a module.
    pub fn subscribe_module_change(
        &self,
        module: &str,
    ) -> Result<UnboundedReceiver<ModuleChangeEvent>> {
        self.check_module(module)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .state()
            .change_subs
            .push(ChangeSubscription::new(module.to_owned(), tx));
        Ok(rx)
    }

    /// Registers an operational data source for the subtree at `root`.
    pub fn subscribe_oper_data_request(
        &self,
        module: &str,
        root: &str,
    ) -> Result<UnboundedReceiver<OperDataRequest>> {
        self.check_module(module)?;
        let root = DataPath::parse(root)?;
        if self.inner.ctx.find_module(&root)?.name != module {
            return Err(Error::InvalidArgument(format!(
                "{} doesn't belong to {}",
                root, module
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state().oper_subs.push(OperSubscription::new(
            module.to_owned(),
            root,
            tx,
        ));
        Ok(rx)
    }

    /// Registers the handler of an RPC. Each RPC has at most one handler.
    pub fn subscribe_rpc(
        &self,
        path: &str,
    ) -> Result<UnboundedReceiver<RpcRequest>> {
        let path = DataPath::parse(path)?;
        let key = self.schema_key(&path, NodeKind::Rpc)?;
        let mut state = self.inner.state();
        if state.rpc_subs.get(&key).is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::Exists(format!(
                "rpc {} already has a subscriber",
                key
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.rpc_subs.insert(key, tx);
        Ok(rx)
    }

    /// Registers for notifications under `filter`.
    pub fn subscribe_notification(
        &self,
        filter: &str,
    ) -> Result<UnboundedReceiver<Notification>> {
        let filter = DataPath::parse(filter)?;
        self.inner.ctx.resolve(&filter)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state().notif_subs.push((filter, tx));
        Ok(rx)
    }

    /// Registers for changes of running or pushed operational data under
    /// `filter`.
    pub fn subscribe_data_change(
        &self,
        filter: &str,
    ) -> Result<UnboundedReceiver<DataChange>> {
        let filter = DataPath::parse(filter)?;
        self.inner.ctx.resolve(&filter)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state().data_change_subs.push((filter, tx));
        Ok(rx)
    }

    /// Copies the running configuration to startup, or startup to running.
    /// Copying to running goes through a regular commit.
    pub async fn copy_config(&self, from: View, to: View) -> Result<()> {
        match (from, to) {
            (View::Running, View::Startup) => {
                let running = self.inner.state().running.clone();
                self.commit_startup(vec![Edit::Replace(running)])
            }
            (View::Startup, View::Running) => {
                let startup = self.inner.state().startup.clone();
                self.commit_running(vec![Edit::Replace(startup)]).await
            }
            _ => Err(Error::Unsupported(format!(
                "can't copy {} to {}",
                from, to
            ))),
        }
    }

    fn check_module(&self, module: &str) -> Result<()> {
        match self.inner.ctx.module(module) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("unknown module {}", module))),
        }
    }

    // Prefixed schema path of an RPC or notification.
    fn schema_key(&self, path: &DataPath, kind: NodeKind) -> Result<String> {
        let resolved = self.inner.ctx.resolve(path)?;
        if resolved.node().kind != kind {
            return Err(Error::InvalidArgument(format!(
                "{} is not a {:?} node",
                path, kind
            )));
        }
        let names = path.names().collect::<Vec<_>>().join("/");
        Ok(format!("/{}:{}", resolved.module.name, names))
    }

    fn view_tree(&self, view: View) -> DataTree {
        let state = self.inner.state();
        match view {
            View::Running => state.running.clone(),
            View::Operational => state.oper_push.clone(),
            View::Startup => state.startup.clone(),
        }
    }

    // Full data of a view. Operational data is composed from the pull
    // callbacks whose root intersects `path` and the pushed data, layered
    // over the running configuration. The callback of the `local` module,
    // if any, is replaced by the data given along.
    async fn view_data(
        &self,
        path: &DataPath,
        view: View,
        local: Option<(&str, Option<DataTree>)>,
    ) -> Result<DataTree> {
        if view != View::Operational {
            return Ok(self.view_tree(view));
        }

        let (local_module, local_data) = match local {
            Some((module, data)) => (Some(module), data),
            None => (None, None),
        };
        let sources = {
            let mut state = self.inner.state();
            state.oper_subs.retain(|sub| !sub.tx.is_closed());
            state
                .oper_subs
                .iter()
                .filter(|sub| sub.root.intersects(path))
                .filter(|sub| Some(sub.module.as_str()) != local_module)
                .map(|sub| (sub.module.clone(), sub.tx.clone()))
                .collect::<Vec<_>>()
        };

        let mut scratch = DataTree::new(self.inner.ctx.clone());
        for (module, tx) in sources {
            Debug::OperDataRequestTx(&module, path).log();
            let (responder, rx) = oneshot::channel();
            if tx.send(OperDataRequest::new(path.clone(), responder)).is_err() {
                continue;
            }
            match time::timeout(self.inner.config.oper_timeout, rx).await {
                Ok(Ok(Ok(Some(data)))) => scratch.merge(&data)?,
                Ok(Ok(Ok(None))) | Ok(Err(_)) => (),
                Ok(Ok(Err(error))) => {
                    return Err(Error::CallbackFailed(Box::new(error)));
                }
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "{} didn't provide operational data in time",
                        module
                    )));
                }
            }
        }

        if let Some(data) = &local_data {
            scratch.merge(data)?;
        }

        let (mut tree, oper_push) = {
            let state = self.inner.state();
            (state.running.clone(), state.oper_push.clone())
        };
        scratch.merge(&oper_push)?;
        tree.merge(&scratch)?;
        Ok(tree)
    }

    // Two-phase commit of the running view.
    async fn commit_running(&self, edits: Vec<Edit>) -> Result<()> {
        let guard = self.inner.commit_lock.clone().lock_owned().await;

        let (candidate, req_id, paths, deliveries) = {
            let mut state = self.inner.state();
            let mut candidate = state.running.clone();
            for edit in &edits {
                edit.replay(&mut candidate)?;
            }
            let changes = diff(&state.running, &candidate, true);
            if changes.is_empty() {
                state.running = candidate;
                return Ok(());
            }

            state.next_req_id += 1;
            let req_id = state.next_req_id;
            let paths = changes.iter().map(|c| c.path.clone()).collect();
            state.change_subs.retain(|sub| !sub.tx.is_closed());
            let deliveries =
                group_changes(&self.inner.ctx, &state.change_subs, changes);
            (candidate, req_id, paths, deliveries)
        };

        // Phase one. Dropping this future before it completes abandons the
        // transaction and no subscriber hears about it again.
        let config = Arc::new(candidate.with_defaults(true));
        let mut accepted = Vec::new();
        let mut failure = None;
        for delivery in deliveries {
            let (responder, rx) = oneshot::channel();
            let request = ChangeRequest::new(
                req_id,
                delivery.changes.clone(),
                config.clone(),
                responder,
            );
            Debug::ChangeEventTx(
                &delivery.module,
                req_id,
                delivery.changes.len(),
            )
            .log();
            if delivery.tx.send(ModuleChangeEvent::Change(request)).is_err() {
                continue;
            }

            let timeout = self.inner.config.commit_timeout;
            let result = match time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result
                    .map_err(|error| Error::CallbackFailed(Box::new(error))),
                Ok(Err(_)) => Err(Error::CallbackFailed(Box::new(
                    Error::Internal(format!(
                        "{} subscriber dropped change event {}",
                        delivery.module, req_id
                    )),
                ))),
                Err(_) => Err(Error::Timeout(format!(
                    "{} subscriber didn't answer change event {}",
                    delivery.module, req_id
                ))),
            };
            match result {
                Ok(()) => accepted.push((delivery.module, delivery.tx)),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = failure {
            error.log();
            self.deliver_phase(Phase::Abort, req_id, accepted, guard).await;
            return Err(error);
        }

        // Phase two.
        self.inner.state().running = candidate;
        self.deliver_phase(Phase::Done, req_id, accepted, guard).await;
        self.publish_data_change(View::Running, paths);
        Ok(())
    }

    // Delivers done or abort to the subscribers that accepted phase one.
    //
    // Delivery runs in a detached task and completes even if the caller
    // goes away. The commit lock is released once every subscriber has
    // acknowledged.
    async fn deliver_phase(
        &self,
        phase: Phase,
        req_id: u64,
        subscribers: Vec<(String, UnboundedSender<ModuleChangeEvent>)>,
        guard: OwnedMutexGuard<()>,
    ) {
        let timeout = self.inner.config.commit_timeout;
        let mut task = Task::spawn(async move {
            for (module, tx) in subscribers {
                let (responder, rx) = oneshot::channel();
                let request = PhaseRequest::new(req_id, responder);
                let event = match phase {
                    Phase::Done => {
                        Debug::DoneEventTx(&module, req_id).log();
                        ModuleChangeEvent::Done(request)
                    }
                    Phase::Abort => {
                        Debug::AbortEventTx(&module, req_id).log();
                        ModuleChangeEvent::Abort(request)
                    }
                };
                if tx.send(event).is_err() {
                    continue;
                }
                if time::timeout(timeout, rx).await.is_err() {
                    warn!(
                        %module, %req_id, ?phase,
                        "subscriber didn't acknowledge"
                    );
                }
            }
            drop(guard);
        });
        task.detach();
        if let Err(error) = task.await {
            error!(%req_id, %error, "failed to deliver commit outcome");
        }
    }

    fn commit_operational(&self, edits: Vec<Edit>) -> Result<()> {
        let paths = {
            let mut state = self.inner.state();
            let mut candidate = state.oper_push.clone();
            for edit in &edits {
                edit.replay(&mut candidate)?;
            }
            let changes = diff(&state.oper_push, &candidate, false);
            state.oper_push = candidate;
            changes.into_iter().map(|c| c.path).collect::<Vec<_>>()
        };
        self.publish_data_change(View::Operational, paths);
        Ok(())
    }

    fn commit_startup(&self, edits: Vec<Edit>) -> Result<()> {
        let mut candidate = self.inner.state().startup.clone();
        for edit in &edits {
            edit.replay(&mut candidate)?;
        }
        if let Some(db) = &self.inner.db {
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            db::startup_store(&mut db, &candidate)?;
            Debug::StartupStored.log();
        }
        self.inner.state().startup = candidate;
        Ok(())
    }

    fn publish_data_change(&self, view: View, paths: Vec<DataPath>) {
        if paths.is_empty() {
            return;
        }
        self.inner.state().data_change_subs.retain(|(filter, tx)| {
            let paths = paths
                .iter()
                .filter(|path| path.intersects(filter))
                .cloned()
                .collect::<Vec<_>>();
            if paths.is_empty() {
                return !tx.is_closed();
            }
            tx.send(DataChange::new(view, paths)).is_ok()
        });
    }
}

// ===== impl Session =====

impl Session {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn connector(&self) -> &Connector {
        &self.conn
    }

    /// Stages a write.
    ///
    /// Containers and list entries are created as needed. Setting a
    /// leaf-list to an array replaces its members: removed members are
    /// deleted and new ones created, one member at a time.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let path = DataPath::parse(path)?;
        let ctx = self.conn.inner.ctx.clone();
        let node = ctx.resolve(&path)?.node();
        if self.view != View::Operational && !node.config {
            return Err(Error::InvalidArgument(format!(
                "{} is state data and can't be written to {}",
                path, self.view
            )));
        }

        match node.kind {
            NodeKind::LeafList if value.is_array() => {
                self.set_leaf_list(&path, node, &value)
            }
            NodeKind::Leaf | NodeKind::LeafList => {
                self.stage(Edit::Set(path, Some(value)))
            }
            NodeKind::Container | NodeKind::List => {
                self.stage(Edit::Set(path, None))
            }
            NodeKind::Notification | NodeKind::Rpc => {
                Err(Error::InvalidArgument(format!("{} is not data", path)))
            }
        }
    }

    /// Stages the removal of a node and its descendants.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let path = DataPath::parse(path)?;
        self.stage(Edit::Delete(path))
    }

    /// Stages the removal of all data of a module.
    pub fn delete_all(&mut self, module: &str) -> Result<()> {
        self.conn.check_module(module)?;
        self.stage(Edit::DeleteModule(module.to_owned()))
    }

    pub fn discard_changes(&mut self) {
        self.edits.clear();
        self.candidate = None;
    }

    pub fn has_changes(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Reads committed data of the session's view.
    pub async fn get(&self, path: &str, options: GetOptions) -> Result<Value> {
        self.conn.get(path, options, self.view).await
    }

    /// Commits the staged edits.
    ///
    /// Running commits go through the two-phase protocol and fail with
    /// `callback-failed` when a subscriber rejects them. Operational and
    /// startup commits don't involve subscribers.
    pub async fn apply(&mut self) -> Result<()> {
        let edits = std::mem::take(&mut self.edits);
        self.candidate = None;
        if edits.is_empty() {
            return Ok(());
        }

        Debug::SessionApply(self.view, edits.len()).log();
        match self.view {
            View::Running => self.conn.commit_running(edits).await,
            View::Operational => self.conn.commit_operational(edits),
            View::Startup => self.conn.commit_startup(edits),
        }
    }

    fn set_leaf_list(
        &mut self,
        path: &DataPath,
        node: &SchemaNode,
        value: &Value,
    ) -> Result<()> {
        if path.last().and_then(PathElem::member).is_some() {
            return Err(Error::InvalidArgument(format!(
                "{} selects a single member",
                path
            )));
        }

        let mut wanted = Vec::new();
        for member in value.as_array().into_iter().flatten() {
            let member = node.canonicalize(&path.to_string(), member)?;
            if !wanted.contains(&member) {
                wanted.push(member);
            }
        }
        let current = self
            .candidate()
            .find(path)?
            .into_iter()
            .filter_map(|(_, members)| members.as_array().cloned())
            .flatten()
            .collect::<Vec<_>>();

        for member in current.iter().filter(|m| !wanted.contains(m)) {
            self.stage(Edit::Delete(member_path(path, member)))?;
        }
        for member in wanted.iter().filter(|m| !current.contains(m)) {
            self.stage(Edit::Set(member_path(path, member), None))?;
        }
        Ok(())
    }

    fn candidate(&mut self) -> &mut DataTree {
        let view = self.view;
        self.candidate
            .get_or_insert_with(|| self.conn.view_tree(view))
    }

    fn stage(&mut self, edit: Edit) -> Result<()> {
        edit.replay(self.candidate())?;
        self.edits.push(edit);
        Ok(())
    }
}

// ===== impl Datastore =====

impl Datastore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ===== impl Edit =====

impl Edit {
    fn replay(&self, tree: &mut DataTree) -> Result<()> {
        match self {
            Edit::Set(path, value) => tree.set(path, value.as_ref())?,
            Edit::Delete(path) => tree.delete(path)?,
            Edit::DeleteModule(module) => tree.delete_module(module),
            Edit::Replace(data) => *tree = data.clone(),
        }
        Ok(())
    }
}

// ===== helper functions =====

// Splits changes per module, following module declaration order, and
// addresses each slice to the module's subscribers.
// Picks the nodes at `path` out of a view's data, as `Connector::get`
// returns them.
fn select(
    path: &DataPath,
    kind: NodeKind,
    mut tree: DataTree,
    options: GetOptions,
    view: View,
) -> Result<Value> {
    if options.include_implicit_defaults {
        tree = tree.with_defaults(view != View::Operational);
    }

    let mut found = tree.find(path)?;
    if found.is_empty() {
        if let Some(default) = options.default {
            return Ok(default);
        }
        return match (view, kind) {
            (View::Operational, NodeKind::List) if options.strip => {
                Ok(Value::Array(Vec::new()))
            }
            (View::Operational, NodeKind::Container | NodeKind::List) => {
                Ok(Value::Object(Map::new()))
            }
            _ => Err(Error::NotFound(format!("no data at {}", path))),
        };
    }

    if options.one {
        if found.len() > 1 {
            return Err(Error::InvalidArgument(format!(
                "{} selects {} nodes",
                path,
                found.len()
            )));
        }
        return Ok(found.remove(0).1);
    }
    if options.strip {
        return Ok(match found.len() {
            1 => found.remove(0).1,
            _ => Value::Array(found.into_iter().map(|(_, v)| v).collect()),
        });
    }
    Ok(tree.filter(path)?.to_value())
}

fn group_changes(
    ctx: &Context,
    subscriptions: &[ChangeSubscription],
    changes: Vec<Change>,
) -> Vec<ChangeDelivery> {
    let mut modules: BTreeMap<usize, (String, Vec<Change>)> = BTreeMap::new();
    for change in changes {
        let module = change.path.module().unwrap_or_default().to_owned();
        let index = ctx.module_index(&module).unwrap_or(usize::MAX);
        modules
            .entry(index)
            .or_insert_with(|| (module, Vec::new()))
            .1
            .push(change);
    }

    let mut deliveries = Vec::new();
    for (module, changes) in modules.into_values() {
        let changes = Arc::new(changes);
        for sub in subscriptions.iter().filter(|sub| sub.module == module) {
            deliveries.push(ChangeDelivery::new(
                module.clone(),
                sub.tx.clone(),
                changes.clone(),
            ));
        }
    }
    deliveries
}

// Path of one leaf-list member.
fn member_path(path: &DataPath, member: &Value) -> DataPath {
    let mut path = path.clone();
    if let Some(last) = path.last_mut() {
        last.keys = vec![(MEMBER_KEY.to_owned(), key_string(member))];
    }
    path
}
