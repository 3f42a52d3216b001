//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod debug;

pub mod engine;
pub mod error;
pub mod openconfig;
pub mod provider;
pub mod queue;
pub mod request;
pub mod store;

pub use crate::engine::{
    Config, DEFAULT_QUEUE_SIZE, DEFAULT_UPDATE_INTERVAL, Engine,
    NOTIFICATION_PATH,
};
pub use crate::error::{Error, Result};
pub use crate::openconfig::OpenConfigTelemetry;
pub use crate::provider::{POLL_RPC, TelemetryProvider};
pub use crate::queue::{EmitQueue, Event, EventType, Overflow};
pub use crate::request::{PathSpec, RequestMode, StreamMode, SubscribeRequest};
pub use crate::store::{Ids, SubscriptionStore, Telemetry, TelemetryStore};
