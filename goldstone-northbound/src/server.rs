//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};

use goldstone_datastore::{
    Connector, Error, ModuleChangeEvent, OperDataRequest, Result, RpcRequest,
};
use goldstone_utils::task::{Task, TimeoutTask};
use goldstone_utils::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use goldstone_yang::{Change, ChangeKind, DataTree};
use tokio::sync::mpsc;
use tracing::{Instrument, error, info_span, warn};

use crate::Provider;
use crate::debug::Debug;
use crate::handler::{
    Handler, HandlerTree, Lookup, ServerContext, Transaction,
};

// Time to wait for the outcome of a transaction before reverting it.
pub const DEFAULT_REVERT_TIMEOUT: Duration = Duration::from_secs(6);

// Environment variable overriding the default revert timeout (seconds).
pub const REVERT_TIMEOUT_ENV: &str = "DEFAULT_REVERT_TIMEOUT";

/// Change-handling server settings.
#[derive(Clone, Debug)]
pub struct Config {
    pub revert_timeout: Duration,
}

/// Change-handling server of one module.
///
/// The server subscribes to the module's commit events and dispatches
/// every change to a handler chosen from the provider's handler tree.
///
/// Phase one of a commit initializes, validates and applies the handlers
/// in change order. If any of them fails, the ones already applied are
/// reverted in reverse order and the commit is rejected. Otherwise the
/// handlers are kept until the datastore announces the outcome: on `done`
/// they are dropped, on `abort` they are reverted in reverse order.
///
/// The outcome may never come when the client goes away during phase one.
/// If nothing arrives within the revert timeout, the handlers are reverted
/// as if the transaction had been aborted.
pub struct Server<P: Provider> {
    module: String,
    provider: P,
    conn: Connector,
    config: Config,
    tree: HandlerTree<P>,
    // Transaction waiting for its outcome.
    pending: Option<Pending<P>>,
    timeout_tx: UnboundedSender<u64>,
}

/// Handle to a running server. Dropping it stops the server.
#[derive(Debug)]
pub struct ServerHandle {
    module: String,
    task: Task<()>,
    stop_tx: Sender<()>,
}

struct Pending<P: Provider> {
    tx: Transaction<P::User>,
    handlers: Vec<Applied<P>>,
    reverter: TimeoutTask,
}

// Handler along with the change it was built for.
struct Applied<P: Provider> {
    change: Change,
    handler: Box<dyn Handler<P>>,
}

struct Channels {
    change_rx: UnboundedReceiver<ModuleChangeEvent>,
    oper_rx: Vec<UnboundedReceiver<OperDataRequest>>,
    rpc_rx: Vec<UnboundedReceiver<RpcRequest>>,
    timeout_rx: UnboundedReceiver<u64>,
    stop_rx: Receiver<()>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Done,
    Abort,
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            revert_timeout: revert_timeout_from_env(),
        }
    }
}

// ===== impl Server =====

impl<P> Server<P>
where
    P: Provider,
{
    /// Subscribes to the provider's module, reconciles the device with the
    /// running configuration and starts serving events.
    pub async fn start(
        conn: Connector,
        mut provider: P,
        config: Config,
    ) -> Result<ServerHandle> {
        let module = provider.module().to_owned();
        let tree = provider.handlers();

        let change_rx = conn.subscribe_module_change(&module)?;
        let mut oper_rx = Vec::new();
        let top = conn
            .context()
            .module(&module)
            .and_then(|module| module.top_container())
            .map(|top| top.name.clone());
        if let Some(top) = top {
            let root = format!("/{}:{}", module, top);
            oper_rx.push(conn.subscribe_oper_data_request(&module, &root)?);
        }
        let rpc_rx = provider
            .rpcs()
            .iter()
            .map(|path| conn.subscribe_rpc(path))
            .collect::<Result<Vec<_>>>()?;

        Debug::Reconcile(&module).log();
        if let Err(error) = provider.reconcile(&conn).await {
            error.log();
        }

        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let channels = Channels {
            change_rx,
            oper_rx,
            rpc_rx,
            timeout_rx,
            stop_rx,
        };
        let server = Server {
            module: module.clone(),
            provider,
            conn,
            config,
            tree,
            pending: None,
            timeout_tx,
        };

        let span = info_span!("server", %module);
        let task = Task::spawn(server.run(channels).instrument(span));
        Ok(ServerHandle {
            module,
            task,
            stop_tx,
        })
    }

    // Main event loop.
    async fn run(mut self, mut channels: Channels) {
        loop {
            tokio::select! {
                biased;
                _ = channels.stop_rx.recv() => break,
                event = channels.change_rx.recv() => match event {
                    Some(event) => {
                        if let Err(error) =
                            self.process_change_event(event).await
                        {
                            error!(%error, "fatal error, stopping server");
                            break;
                        }
                    }
                    // The datastore is gone.
                    None => break,
                },
                Some(req_id) = channels.timeout_rx.recv() => {
                    self.process_revert_timeout(req_id).await;
                }
                Some(request) = recv_any(&mut channels.oper_rx) => {
                    self.process_oper_data_request(request).await;
                }
                Some(request) = recv_any(&mut channels.rpc_rx) => {
                    self.process_rpc_request(request).await;
                }
            }
        }
    }

    // Processes a commit event. An error means the server can't go on.
    async fn process_change_event(
        &mut self,
        event: ModuleChangeEvent,
    ) -> Result<()> {
        match event {
            ModuleChangeEvent::Change(request) => {
                Debug::ChangeEventRx(
                    &self.module,
                    request.req_id,
                    request.changes.len(),
                )
                .log();
                let result = self
                    .process_change(
                        request.req_id,
                        request.changes,
                        request.config,
                    )
                    .await;
                if let Err(error) = &result {
                    error.log();
                }
                let _ = request.responder.send(result);
                Ok(())
            }
            ModuleChangeEvent::Done(request) => {
                Debug::DoneEventRx(&self.module, request.req_id).log();
                let result =
                    self.process_outcome(Phase::Done, request.req_id).await;
                let _ = request.responder.send(());
                result
            }
            ModuleChangeEvent::Abort(request) => {
                Debug::AbortEventRx(&self.module, request.req_id).log();
                let result =
                    self.process_outcome(Phase::Abort, request.req_id).await;
                let _ = request.responder.send(());
                result
            }
        }
    }

    // Phase one: builds, validates and applies the handlers of every
    // change of the transaction.
    async fn process_change(
        &mut self,
        req_id: u64,
        changes: Arc<Vec<Change>>,
        config: Arc<DataTree>,
    ) -> Result<()> {
        if let Some(pending) = &self.pending {
            return Err(Error::Internal(format!(
                "waiting 'done' or 'abort' event for id {}. got 'change' event for id {}",
                pending.tx.req_id, req_id
            )));
        }

        let mut tx = Transaction::new(req_id, changes.clone(), config);
        let mut server = ServerContext {
            provider: &mut self.provider,
            conn: &self.conn,
            config: &self.config,
        };
        server.provider.pre(server.conn, &mut tx).await?;

        let mut handlers = Vec::new();
        for change in changes.iter() {
            let factory = match self.tree.lookup(&change.path) {
                Lookup::Handler(factory) => factory,
                Lookup::Skip => {
                    Debug::ChangeSkipped(change).log();
                    continue;
                }
                // Descendants of a removed node.
                Lookup::Unsupported if change.kind == ChangeKind::Deleted => {
                    Debug::ChangeSkipped(change).log();
                    continue;
                }
                Lookup::Unsupported => {
                    return Err(Error::Unsupported(format!(
                        "{} not supported",
                        change.path
                    )));
                }
            };

            let mut handler = factory(change);
            Debug::HandlerCall("init", change).log();
            handler.init(&mut server, &mut tx).await?;
            Debug::HandlerCall("validate", change).log();
            handler.validate(&mut server, &mut tx).await?;
            handlers.push(Applied {
                change: change.clone(),
                handler,
            });
        }

        for i in 0..handlers.len() {
            let entry = &mut handlers[i];
            Debug::HandlerCall("apply", &entry.change).log();
            let result = entry.handler.apply(&mut server, &mut tx).await;
            if let Err(error) = result {
                revert(&mut server, &mut tx, &mut handlers[..i]).await;
                return Err(error);
            }
        }

        if let Err(error) = server.provider.post(server.conn, &mut tx).await {
            revert(&mut server, &mut tx, &mut handlers).await;
            return Err(error);
        }

        let timeout_tx = self.timeout_tx.clone();
        let reverter =
            TimeoutTask::new(self.config.revert_timeout, move || async move {
                let _ = timeout_tx.send(req_id);
            });
        self.pending = Some(Pending {
            tx,
            handlers,
            reverter,
        });
        Ok(())
    }

    // Phase two: forgets or reverts the pending transaction.
    async fn process_outcome(
        &mut self,
        phase: Phase,
        req_id: u64,
    ) -> Result<()> {
        // An outcome arriving after the timeout reverted the transaction
        // leaves the device out of sync with the running configuration.
        let Some(pending) = self.pending.take() else {
            return Err(Error::Internal(format!(
                "no pending transaction for {:?} event of id {}",
                phase, req_id
            )));
        };
        if pending.tx.req_id != req_id {
            return Err(Error::Internal(format!(
                "pending transaction id {} != {:?} event id {}",
                pending.tx.req_id, phase, req_id
            )));
        }

        let Pending {
            mut tx,
            mut handlers,
            reverter,
        } = pending;
        drop(reverter);
        if phase == Phase::Abort {
            let mut server = ServerContext {
                provider: &mut self.provider,
                conn: &self.conn,
                config: &self.config,
            };
            revert(&mut server, &mut tx, &mut handlers).await;
        }
        Ok(())
    }

    async fn process_revert_timeout(&mut self, req_id: u64) {
        // The outcome arrived in the meantime.
        if self.pending.as_ref().map(|pending| pending.tx.req_id)
            != Some(req_id)
        {
            return;
        }
        let Some(Pending {
            mut tx,
            mut handlers,
            reverter,
        }) = self.pending.take()
        else {
            return;
        };
        drop(reverter);

        warn!(%req_id, "client timeout happens? reverting changes we made");
        let mut server = ServerContext {
            provider: &mut self.provider,
            conn: &self.conn,
            config: &self.config,
        };
        revert(&mut server, &mut tx, &mut handlers).await;
    }

    async fn process_oper_data_request(&mut self, request: OperDataRequest) {
        let OperDataRequest { path, responder } = request;
        let start = Instant::now();
        let result = self
            .provider
            .oper_data(&self.conn, &path)
            .await
            .and_then(|data| {
                data.map(|data| {
                    DataTree::from_value(self.conn.context().clone(), &data)
                })
                .transpose()
                .map_err(Error::from)
            });
        let elapsed = start.elapsed().as_nanos() as f64 / 1e9;
        Debug::OperDataRequestRx(&path, elapsed).log();
        if let Err(error) = &result {
            error.log();
        }
        let _ = responder.send(result);
    }

    async fn process_rpc_request(&mut self, request: RpcRequest) {
        let RpcRequest {
            path,
            input,
            responder,
        } = request;
        Debug::RpcRequestRx(&path).log();
        let result = self.provider.rpc(&self.conn, &path, input).await;
        if let Err(error) = &result {
            error.log();
        }
        let _ = responder.send(result);
    }
}

// ===== impl ServerHandle =====

impl ServerHandle {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Asks the server to stop. Pending transactions are left as they are.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Returns whether the server stopped, either on request or because of
    /// a fatal error.
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the server to stop.
    pub async fn wait(self) {
        if let Err(error) = self.task.await {
            error!(module = %self.module, %error, "server task failed");
        }
    }
}

// ===== helper functions =====

// Reverts applied handlers, last applied first. Failures are logged.
async fn revert<P>(
    server: &mut ServerContext<'_, P>,
    tx: &mut Transaction<P::User>,
    handlers: &mut [Applied<P>],
) where
    P: Provider,
{
    for entry in handlers.iter_mut().rev() {
        Debug::HandlerCall("revert", &entry.change).log();
        if let Err(error) = entry.handler.revert(server, tx).await {
            warn!(change = %entry.change, %error, "failed to revert change");
        }
    }
}

// Receives from whichever channel is ready first. Yields `None` once all
// channels are closed and never completes when there are none.
async fn recv_any<T>(channels: &mut [UnboundedReceiver<T>]) -> Option<T> {
    poll_fn(|cx| {
        let mut open = false;
        for rx in channels.iter_mut() {
            match rx.poll_recv(cx) {
                Poll::Ready(Some(msg)) => return Poll::Ready(Some(msg)),
                Poll::Ready(None) => (),
                Poll::Pending => open = true,
            }
        }
        if open || channels.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    })
    .await
}

/// Revert timeout taken from the environment, when set to a whole number
/// of seconds of at least one.
pub fn revert_timeout_from_env() -> Duration {
    parse_revert_timeout(std::env::var(REVERT_TIMEOUT_ENV).ok().as_deref())
}

fn parse_revert_timeout(value: Option<&str>) -> Duration {
    let Some(value) = value else {
        return DEFAULT_REVERT_TIMEOUT;
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs >= 1 => Duration::from_secs(secs),
        _ => {
            warn!(%value, "invalid {}, using default", REVERT_TIMEOUT_ENV);
            DEFAULT_REVERT_TIMEOUT
        }
    }
}

#[cfg(test)]
mod tests {
    use goldstone_datastore::{
        ChangeRequest, Config as DatastoreConfig, ErrorKind, PhaseRequest,
    };
    use goldstone_yang::modules;
    use tokio::sync::oneshot;

    use super::*;

    struct Noop;

    impl Provider for Noop {
        type User = ();

        fn module(&self) -> &str {
            modules::INTERFACES
        }

        fn handlers(&self) -> HandlerTree<Noop> {
            HandlerTree::default()
        }
    }

    fn server() -> Server<Noop> {
        let ctx = Arc::new(modules::builtin_context().unwrap());
        let conn =
            Connector::new(ctx, DatastoreConfig::default(), None).unwrap();
        let (timeout_tx, _) = mpsc::unbounded_channel();
        Server {
            module: modules::INTERFACES.to_owned(),
            provider: Noop,
            conn,
            config: Config {
                revert_timeout: Duration::from_secs(1),
            },
            tree: HandlerTree::default(),
            pending: None,
            timeout_tx,
        }
    }

    async fn change(server: &mut Server<Noop>, req_id: u64) -> Result<()> {
        let config = Arc::new(DataTree::new(server.conn.context().clone()));
        let (responder, rx) = oneshot::channel();
        let request =
            ChangeRequest::new(req_id, Arc::new(vec![]), config, responder);
        server
            .process_change_event(ModuleChangeEvent::Change(request))
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn done(server: &mut Server<Noop>, req_id: u64) -> Result<()> {
        let (responder, rx) = oneshot::channel();
        let request = PhaseRequest::new(req_id, responder);
        let result = server
            .process_change_event(ModuleChangeEvent::Done(request))
            .await;
        rx.await.unwrap();
        result
    }

    #[tokio::test]
    async fn outcome_without_pending_transaction_is_fatal() {
        let mut server = server();
        let error = done(&mut server, 7).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn outcome_of_another_transaction_is_fatal() {
        let mut server = server();
        change(&mut server, 1).await.unwrap();
        let error = done(&mut server, 2).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn second_change_waits_for_outcome() {
        let mut server = server();
        change(&mut server, 1).await.unwrap();
        let error = change(&mut server, 2).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert_eq!(
            error.message(),
            "waiting 'done' or 'abort' event for id 1. got 'change' event for id 2"
        );

        done(&mut server, 1).await.unwrap();
        change(&mut server, 2).await.unwrap();
        done(&mut server, 2).await.unwrap();
    }

    #[tokio::test]
    async fn late_outcome_after_timeout_is_fatal() {
        let mut server = server();
        change(&mut server, 1).await.unwrap();
        server.process_revert_timeout(1).await;
        assert!(server.pending.is_none());
        let error = done(&mut server, 1).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn stale_timeout_is_ignored() {
        let mut server = server();
        change(&mut server, 1).await.unwrap();
        done(&mut server, 1).await.unwrap();
        change(&mut server, 2).await.unwrap();
        server.process_revert_timeout(1).await;
        assert_eq!(server.pending.as_ref().map(|p| p.tx.req_id), Some(2));
    }

    #[test]
    fn revert_timeout_parsing() {
        assert_eq!(parse_revert_timeout(None), DEFAULT_REVERT_TIMEOUT);
        assert_eq!(parse_revert_timeout(Some("1")), Duration::from_secs(1));
        assert_eq!(parse_revert_timeout(Some(" 30 ")), Duration::from_secs(30));
        assert_eq!(parse_revert_timeout(Some("0")), DEFAULT_REVERT_TIMEOUT);
        assert_eq!(parse_revert_timeout(Some("-3")), DEFAULT_REVERT_TIMEOUT);
        assert_eq!(parse_revert_timeout(Some("1.5")), DEFAULT_REVERT_TIMEOUT);
    }
}
