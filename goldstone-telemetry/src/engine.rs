//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::future::poll_fn;
use std::task::Poll;
use std::time::Duration;

use goldstone_datastore::{Connector, DataChange, View};
use goldstone_utils::task::{IntervalTask, Task};
use goldstone_utils::{UnboundedReceiver, UnboundedSender};
use goldstone_yang::DataPath;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{Instrument, info_span, warn};

use crate::debug::Debug;
use crate::error::{Error, Result};
use crate::queue::{EmitQueue, Event, Overflow};
use crate::request::{PathSpec, RequestMode, StreamMode, SubscribeRequest};
use crate::store::{Ids, SubscriptionStore, TelemetryStore};

// Notification carrying the collected telemetry.
pub const NOTIFICATION_PATH: &str =
    "/goldstone-telemetry:telemetry-notify-event";

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_SIZE: usize = 128;

/// Telemetry engine settings.
#[derive(Clone, Debug)]
pub struct Config {
    // Shortest sample and heartbeat interval accepted.
    pub update_interval: Duration,
    // Events a subscribe-request may have waiting for publication.
    pub queue_size: usize,
}

/// Subscription engine.
///
/// Every subscribe-request gets a collector task, which reads the
/// requested paths and feeds the telemetry store, and a publisher task,
/// which sends the resulting events as notifications. The two are
/// connected by a bounded queue. Deleting the request stops both.
#[derive(Debug)]
pub struct Engine {
    conn: Connector,
    config: Config,
    store: TelemetryStore,
    requests: SubscriptionStore<Subscription>,
    next_id: u64,
}

#[derive(Debug)]
struct Subscription {
    request: SubscribeRequest,
    poll_tx: UnboundedSender<()>,
    _collector: Task<()>,
    _publisher: Task<()>,
}

// Collection state of one subscribe-request, owned by its collector task.
struct Collector {
    conn: Connector,
    store: TelemetryStore,
    request: SubscribeRequest,
    queue: EmitQueue,
}

// What wakes up a collector.
struct Inputs {
    tick_rx: UnboundedReceiver<Tick>,
    change_rx: Vec<(u64, UnboundedReceiver<DataChange>)>,
    poll_rx: UnboundedReceiver<()>,
    // Dropping the timers stops them.
    _timers: Vec<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
enum Tick {
    Sample(u64),
    Heartbeat(u64),
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

// ===== impl Engine =====

impl Engine {
    pub fn new(conn: Connector, config: Config) -> Engine {
        Engine {
            conn,
            config,
            store: TelemetryStore::default(),
            requests: SubscriptionStore::default(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    /// Validates a subscribe-request entry.
    pub fn build(&self, value: &Value) -> Result<SubscribeRequest> {
        SubscribeRequest::from_value(
            self.conn.context(),
            value,
            self.config.update_interval,
        )
    }

    /// Starts a request under a newly allocated id and returns the id.
    pub fn create(&mut self, mut request: SubscribeRequest) -> Result<u64> {
        while self.requests.get(self.next_id).is_ok() {
            self.next_id += 1;
        }
        let id = self.next_id;
        request.id = id;
        self.start(request)?;
        Ok(id)
    }

    /// Starts a request under the id it carries.
    pub fn start(&mut self, request: SubscribeRequest) -> Result<()> {
        let id = request.id;
        if self.requests.get(id).is_ok() {
            return Err(Error::RequestExists(id));
        }
        Debug::RequestStart(id, request.mode, request.subscriptions.len())
            .log();

        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let inputs = self.inputs(&request, poll_rx)?;
        let queue = EmitQueue::new(self.config.queue_size);
        let span = info_span!("subscribe-request", %id);
        let publisher = Task::spawn(
            publish(self.conn.clone(), queue.clone()).instrument(span.clone()),
        );
        let collector = Collector {
            conn: self.conn.clone(),
            store: self.store.clone(),
            request: request.clone(),
            queue,
        };
        let collector = Task::spawn(collector.run(inputs).instrument(span));

        self.next_id = self.next_id.max(id.saturating_add(1));
        self.requests.add(
            id,
            Subscription {
                request,
                poll_tx,
                _collector: collector,
                _publisher: publisher,
            },
        )
    }

    /// Stops a request and drops its telemetry data.
    pub fn delete(&mut self, id: u64) -> Result<SubscribeRequest> {
        let subscription = self.requests.delete(id)?;
        Debug::RequestStop(id).log();
        self.store.delete_request(id);
        Ok(subscription.request)
    }

    pub fn get(&self, id: u64) -> Result<&SubscribeRequest> {
        self.requests.get(id).map(|subscription| &subscription.request)
    }

    pub fn list(&self) -> Vec<u64> {
        self.requests.list()
    }

    /// Triggers a full snapshot of a POLL request.
    pub fn poll(&self, id: u64) -> Result<()> {
        let subscription = self.requests.get(id)?;
        if subscription.request.mode != RequestMode::Poll {
            return Err(Error::NotPollMode(id));
        }
        // The collector is gone only if the request stopped on its own.
        let _ = subscription.poll_tx.send(());
        Ok(())
    }

    /// Stops every request.
    pub fn clear(&mut self) {
        for id in self.list() {
            let _ = self.delete(id);
        }
    }

    /// Operational state of all requests, rooted at the module's top
    /// container.
    pub fn state(&self) -> Value {
        let requests = self
            .requests
            .iter()
            .map(|(_, subscription)| subscription.request.state())
            .collect::<Vec<_>>();
        json!({
            "goldstone-telemetry:subscribe-requests": {
                "subscribe-request": requests,
            }
        })
    }

    // Sets up the timers and change feeds of a request. Only STREAM
    // requests have any.
    fn inputs(
        &self,
        request: &SubscribeRequest,
        poll_rx: UnboundedReceiver<()>,
    ) -> Result<Inputs> {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let mut change_rx = Vec::new();
        let mut timers = Vec::new();
        if request.mode == RequestMode::Stream {
            for spec in request.subscriptions.values() {
                if spec.is_change_driven() {
                    let path = spec.path.to_string();
                    let rx = self.conn.subscribe_data_change(&path)?;
                    change_rx.push((spec.id, rx));
                } else {
                    let tick = Tick::Sample(spec.id);
                    timers.push(ticker(spec.sample_interval, tick, &tick_tx));
                }
                if !spec.heartbeat_interval.is_zero() {
                    let tick = Tick::Heartbeat(spec.id);
                    let interval = spec.heartbeat_interval;
                    timers.push(ticker(interval, tick, &tick_tx));
                }
            }
        }

        Ok(Inputs {
            tick_rx,
            change_rx,
            poll_rx,
            _timers: timers,
        })
    }
}

// ===== impl Collector =====

impl Collector {
    async fn run(self, mut inputs: Inputs) {
        let id = self.request.id;
        self.snapshot(!self.request.updates_only).await;

        match self.request.mode {
            RequestMode::Once => (),
            RequestMode::Stream | RequestMode::Poll => loop {
                tokio::select! {
                    Some(tick) = inputs.tick_rx.recv() => {
                        let (sub_id, force) = match tick {
                            Tick::Sample(sub_id) => (sub_id, false),
                            Tick::Heartbeat(sub_id) => (sub_id, true),
                        };
                        self.sample(sub_id, force).await;
                    }
                    Some(sub_id) = recv_change(&mut inputs.change_rx) => {
                        self.sample(sub_id, false).await;
                    }
                    Some(()) = inputs.poll_rx.recv() => {
                        Debug::PollRx(id).log();
                        self.snapshot(true).await;
                    }
                    else => break,
                }

                if self.queue.is_closed() {
                    warn!(%id, "telemetry stream closed after queue overflow");
                    break;
                }
            },
        }

        self.queue.close();
    }

    // Reads every path of the request into the store and, if `send` is
    // set, emits all of it. Ends with a sync response either way.
    async fn snapshot(&self, send: bool) {
        Debug::Snapshot(self.request.id).log();
        for spec in self.request.subscriptions.values() {
            let ids = Ids::new(self.request.id, spec.id);
            let leaves = match self.leaves(&spec.path).await {
                Ok(leaves) => leaves,
                Err(error) => {
                    error.log();
                    continue;
                }
            };

            let mut stale = self.stored(ids);
            for (path, value) in leaves {
                stale.remove(&path);
                self.store.set(ids, &path, value.clone());
                if send {
                    let event = Event::update(ids, path, value);
                    self.queue.push(event, Overflow::DropOldest);
                }
            }
            for path in stale {
                let _ = self.store.delete(ids, &path);
            }
        }

        let event = Event::sync_response(self.request.id);
        self.queue.push(event, Overflow::DropOldest);
    }

    // Collects one path. Values equal to the stored ones are left out
    // when redundancy is suppressed, unless `force` is set. Leaves that
    // vanished are reported as deleted.
    async fn sample(&self, sub_id: u64, force: bool) {
        let Some(spec) = self.request.subscriptions.get(&sub_id) else {
            return;
        };
        let ids = Ids::new(self.request.id, sub_id);
        Debug::Sample(ids, force).log();

        let leaves = match self.leaves(&spec.path).await {
            Ok(leaves) => leaves,
            Err(error) => {
                error.log();
                return;
            }
        };

        let overflow = overflow(spec);
        let suppress = !force
            && (spec.suppress_redundant || spec.mode == StreamMode::OnChange);
        let mut stale = self.stored(ids);
        for (path, value) in leaves {
            stale.remove(&path);
            if suppress
                && self
                    .store
                    .get(ids, &path)
                    .is_ok_and(|telemetry| telemetry.value == value)
            {
                continue;
            }
            self.store.set(ids, &path, value.clone());
            self.queue.push(Event::update(ids, path, value), overflow);
        }
        for path in stale {
            if self.store.delete(ids, &path).is_ok() {
                self.queue.push(Event::delete(ids, path), overflow);
            }
        }
    }

    // Current operational leaves under `path`.
    async fn leaves(&self, path: &DataPath) -> Result<Vec<(String, Value)>> {
        let tree = self
            .conn
            .get_data(&path.to_string(), View::Operational, false)
            .await?;
        Ok(tree
            .leaves()
            .into_iter()
            .filter(|(leaf, _)| leaf.starts_with(path))
            .map(|(leaf, value)| (leaf.to_string(), value))
            .collect())
    }

    fn stored(&self, ids: Ids) -> BTreeSet<String> {
        self.store.list(ids).into_iter().collect()
    }
}

// The collector is dropped when it ends or its task is aborted. Whatever
// it recorded goes with it, including writes made after the engine
// already cleared the request.
impl Drop for Collector {
    fn drop(&mut self) {
        self.store.delete_request(self.request.id);
    }
}

// ===== helper functions =====

// Sends queued events until the queue is closed and drained.
async fn publish(conn: Connector, queue: EmitQueue) {
    while let Some(event) = queue.pop().await {
        Debug::EventTx(&event).log();
        let body = event.body();
        if let Err(error) = conn.send_notification(NOTIFICATION_PATH, body) {
            error.log();
        }
    }
}

fn ticker(
    interval: Duration,
    tick: Tick,
    tick_tx: &UnboundedSender<Tick>,
) -> IntervalTask {
    let tick_tx = tick_tx.clone();
    IntervalTask::new(interval, false, move || {
        let _ = tick_tx.send(tick);
        async {}
    })
}

// Sampled paths lose the oldest events when the publisher falls behind,
// ON_CHANGE streams are closed.
fn overflow(spec: &PathSpec) -> Overflow {
    match spec.mode {
        StreamMode::OnChange => Overflow::Close,
        StreamMode::Sample | StreamMode::TargetDefined => Overflow::DropOldest,
    }
}

// Waits for a data change on any feed and returns the subscription it
// belongs to. Yields `None` once all feeds are closed.
async fn recv_change(
    feeds: &mut [(u64, UnboundedReceiver<DataChange>)],
) -> Option<u64> {
    poll_fn(|cx| {
        let mut open = false;
        for (sub_id, rx) in feeds.iter_mut() {
            match rx.poll_recv(cx) {
                Poll::Ready(Some(_)) => return Poll::Ready(Some(*sub_id)),
                Poll::Ready(None) => (),
                Poll::Pending => open = true,
            }
        }
        if open {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    })
    .await
}
