//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use derive_new::new;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, error};

/// Owned handle to a spawned task.
///
/// The task is aborted when the handle is dropped, unless [`Task::detach`]
/// was called first. Awaiting the handle yields the task output.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// Handle to a one-shot timer created by [`TimeoutTask::new`].
///
/// Dropping the handle disarms the timer. If the callback is already
/// running, it is aborted at its next suspension point.
#[derive(Debug)]
pub struct TimeoutTask {
    inner: TimerInner,
}

/// Handle to a periodic timer created by [`IntervalTask::new`].
///
/// Dropping the handle stops the timer.
#[derive(Debug)]
pub struct IntervalTask {
    inner: TimerInner,
}

#[derive(Debug, new)]
struct TimerInner {
    _task: Task<()>,
    control: UnboundedSender<Control>,
    deadline: Deadline,
}

// Next expiration time shared between a timer task and its handle.
#[derive(Clone, Debug)]
struct Deadline(Arc<Mutex<Instant>>);

#[derive(Debug)]
enum Control {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns an asynchronous task on the current runtime.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Runs a blocking closure on the worker thread pool.
    pub fn spawn_blocking<F>(f: F) -> Task<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn_blocking(f),
            detached: false,
        }
    }

    /// Keeps the task running after the handle is dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Returns whether the task has run to completion (or was aborted).
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Arms a timer that runs `cb` once `timeout` has elapsed.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let deadline = Deadline::new(Instant::now() + timeout);
        let deadline_child = deadline.clone();

        let task = Task::spawn(
            async move {
                let sleep = time::sleep(timeout);
                tokio::pin!(sleep);

                loop {
                    tokio::select! {
                        _ = &mut sleep => {
                            (cb)().await;
                            break;
                        }
                        control = control_rx.recv() => match control {
                            Some(Control::Reset(new_timeout)) => {
                                let next = Instant::now()
                                    + new_timeout.unwrap_or(timeout);
                                sleep.as_mut().reset(next);
                                deadline_child.set(next);
                            }
                            // The handle was dropped.
                            None => break,
                        }
                    }
                }
            }
            .in_current_span(),
        );

        TimeoutTask {
            inner: TimerInner::new(task, control_tx, deadline),
        }
    }

    /// Rearms the timer. Without a new value the original timeout is
    /// reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        if self.inner.control.send(Control::Reset(timeout)).is_err() {
            error!("failed to reset timeout");
        }
    }

    /// Time left before the timer fires.
    pub fn remaining(&self) -> Duration {
        self.inner.deadline.remaining()
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Starts a timer that runs `cb` on every tick.
    ///
    /// With `tick_on_start` the first tick happens immediately, otherwise
    /// one full interval after creation. Ticks missed while the callback
    /// is running are delivered as soon as it returns.
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let start = if tick_on_start {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let deadline = Deadline::new(start);
        let deadline_child = deadline.clone();

        let task = Task::spawn(
            async move {
                let mut period = interval;
                let mut ticker = time::interval_at(start, period);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            deadline_child.set(Instant::now() + period);
                            (cb)().await;
                        }
                        control = control_rx.recv() => match control {
                            Some(Control::Reset(new_interval)) => {
                                if let Some(new_interval) = new_interval {
                                    period = new_interval;
                                }
                                let next = Instant::now() + period;
                                ticker = time::interval_at(next, period);
                                deadline_child.set(next);
                            }
                            // The handle was dropped.
                            None => break,
                        }
                    }
                }
            }
            .in_current_span(),
        );

        IntervalTask {
            inner: TimerInner::new(task, control_tx, deadline),
        }
    }

    /// Restarts the period from now, optionally with a new interval.
    pub fn reset(&mut self, interval: Option<Duration>) {
        if self.inner.control.send(Control::Reset(interval)).is_err() {
            error!("failed to reset interval");
        }
    }

    /// Time left before the next tick.
    pub fn remaining(&self) -> Duration {
        self.inner.deadline.remaining()
    }
}

// ===== impl Deadline =====

impl Deadline {
    fn new(instant: Instant) -> Deadline {
        Deadline(Arc::new(Mutex::new(instant)))
    }

    fn set(&self, instant: Instant) {
        if let Ok(mut next) = self.0.lock() {
            *next = instant;
        }
    }

    fn remaining(&self) -> Duration {
        match self.0.lock() {
            Ok(next) => next.saturating_duration_since(Instant::now()),
            Err(_) => Duration::ZERO,
        }
    }
}

// ===== global functions =====

/// Runs a blocking function on the worker pool and waits for its result,
/// so that callers on the event loop never block on device I/O.
pub async fn blocking<F, T>(f: F) -> Result<T, JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Task::spawn_blocking(f).await
}
