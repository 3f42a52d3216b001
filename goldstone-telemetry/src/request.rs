//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use goldstone_yang::{Context, DataPath};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestMode {
    Stream,
    Once,
    Poll,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMode {
    TargetDefined,
    OnChange,
    Sample,
}

/// Validated subscribe-request.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeRequest {
    pub id: u64,
    pub mode: RequestMode,
    pub updates_only: bool,
    pub subscriptions: BTreeMap<u64, PathSpec>,
}

/// One collection path of a subscribe-request.
#[derive(Clone, Debug, PartialEq)]
pub struct PathSpec {
    pub id: u64,
    pub path: DataPath,
    // Effective mode: for STREAM requests TARGET_DEFINED is resolved when
    // the request is built.
    pub mode: StreamMode,
    // Zero means sampling on every change.
    pub sample_interval: Duration,
    // Zero means no heartbeat.
    pub heartbeat_interval: Duration,
    pub suppress_redundant: bool,
}

// Subscribe-request list entry, as found in the configuration.
#[derive(Debug, Deserialize)]
struct RequestData {
    id: u64,
    #[serde(default)]
    config: RequestConfigData,
    #[serde(default)]
    subscriptions: SubscriptionsData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RequestConfigData {
    mode: Option<RequestMode>,
    updates_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionsData {
    #[serde(default)]
    subscription: Vec<SubscriptionData>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionData {
    id: u64,
    #[serde(default)]
    config: SubscriptionConfigData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SubscriptionConfigData {
    path: Option<String>,
    mode: Option<StreamMode>,
    // Intervals are in nanoseconds.
    sample_interval: Option<u64>,
    suppress_redundant: Option<bool>,
    heartbeat_interval: Option<u64>,
}

// ===== impl RequestMode =====

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMode::Stream => write!(f, "STREAM"),
            RequestMode::Once => write!(f, "ONCE"),
            RequestMode::Poll => write!(f, "POLL"),
        }
    }
}

// ===== impl StreamMode =====

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::TargetDefined => write!(f, "TARGET_DEFINED"),
            StreamMode::OnChange => write!(f, "ON_CHANGE"),
            StreamMode::Sample => write!(f, "SAMPLE"),
        }
    }
}

// ===== impl SubscribeRequest =====

impl SubscribeRequest {
    /// Builds a request from its configuration entry.
    ///
    /// `update_interval` is the shortest sample or heartbeat interval the
    /// collector accepts. Missing STREAM sample intervals default to twice
    /// that value.
    pub fn from_value(
        ctx: &Context,
        value: &Value,
        update_interval: Duration,
    ) -> Result<SubscribeRequest> {
        let data = RequestData::deserialize(value)
            .map_err(|error| Error::InvalidRequest(error.to_string()))?;
        let mode = data.config.mode.ok_or_else(|| {
            Error::InvalidRequest("mode should be specified".to_owned())
        })?;

        let mut subscriptions = BTreeMap::new();
        for subscription in data.subscriptions.subscription {
            let spec = match mode {
                RequestMode::Stream => PathSpec::stream(
                    ctx,
                    subscription.id,
                    &subscription.config,
                    update_interval,
                )?,
                RequestMode::Once | RequestMode::Poll => PathSpec::snapshot(
                    ctx,
                    subscription.id,
                    &subscription.config,
                )?,
            };
            subscriptions.insert(spec.id, spec);
        }

        Ok(SubscribeRequest {
            id: data.id,
            mode,
            updates_only: data.config.updates_only.unwrap_or(false),
            subscriptions,
        })
    }

    /// Operational state of the request, as a subscribe-request entry.
    pub fn state(&self) -> Value {
        let subscriptions = self
            .subscriptions
            .values()
            .map(|spec| {
                json!({
                    "id": spec.id,
                    "state": {
                        "id": spec.id,
                        "path": spec.path.to_string(),
                        "mode": spec.mode.to_string(),
                        "sample-interval": nanos(spec.sample_interval),
                        "suppress-redundant": spec.suppress_redundant,
                        "heartbeat-interval": nanos(spec.heartbeat_interval),
                    },
                })
            })
            .collect::<Vec<_>>();

        let mut state = json!({
            "id": self.id,
            "state": {
                "id": self.id,
                "mode": self.mode.to_string(),
                "updates-only": self.updates_only,
            },
        });
        if !subscriptions.is_empty() {
            state["subscriptions"] = json!({ "subscription": subscriptions });
        }
        state
    }
}

// ===== impl PathSpec =====

impl PathSpec {
    fn stream(
        ctx: &Context,
        id: u64,
        config: &SubscriptionConfigData,
        update_interval: Duration,
    ) -> Result<PathSpec> {
        let path = parse_path(ctx, config)?;
        let heartbeat_interval = config
            .heartbeat_interval
            .map(Duration::from_nanos)
            .unwrap_or_default();
        let suppress_redundant = config.suppress_redundant.unwrap_or(false);
        let sample_interval = config.sample_interval.map(Duration::from_nanos);

        let (mode, sample_interval) =
            match config.mode.unwrap_or(StreamMode::TargetDefined) {
                StreamMode::Sample => (
                    StreamMode::Sample,
                    sample_interval.unwrap_or(update_interval * 2),
                ),
                StreamMode::OnChange => {
                    (StreamMode::OnChange, sample_interval.unwrap_or_default())
                }
                StreamMode::TargetDefined => {
                    match sample_interval.or_else(|| {
                        schema_interval(ctx, &path)
                            .map(|interval| interval.max(update_interval))
                    }) {
                        Some(interval) => (StreamMode::Sample, interval),
                        None => (StreamMode::OnChange, Duration::ZERO),
                    }
                }
            };

        if !heartbeat_interval.is_zero() && heartbeat_interval < update_interval
        {
            return Err(Error::InvalidRequest(format!(
                "heartbeat-interval is shorter than minimum interval {}",
                nanos(update_interval)
            )));
        }
        if mode == StreamMode::Sample
            && !sample_interval.is_zero()
            && sample_interval < update_interval
        {
            return Err(Error::InvalidRequest(format!(
                "sample-interval is shorter than minimum interval {}",
                nanos(update_interval)
            )));
        }
        if suppress_redundant && heartbeat_interval.is_zero() {
            return Err(Error::InvalidRequest(
                "suppress-redundant requires heartbeat-interval".to_owned(),
            ));
        }

        Ok(PathSpec {
            id,
            path,
            mode,
            sample_interval,
            heartbeat_interval,
            suppress_redundant,
        })
    }

    // ONCE and POLL paths are only read on demand.
    fn snapshot(
        ctx: &Context,
        id: u64,
        config: &SubscriptionConfigData,
    ) -> Result<PathSpec> {
        Ok(PathSpec {
            id,
            path: parse_path(ctx, config)?,
            mode: config.mode.unwrap_or(StreamMode::TargetDefined),
            sample_interval: config
                .sample_interval
                .map(Duration::from_nanos)
                .unwrap_or_default(),
            heartbeat_interval: config
                .heartbeat_interval
                .map(Duration::from_nanos)
                .unwrap_or_default(),
            suppress_redundant: config.suppress_redundant.unwrap_or(false),
        })
    }

    /// Whether the path is collected from the data-change feed rather
    /// than from a sampling timer.
    pub fn is_change_driven(&self) -> bool {
        self.mode == StreamMode::OnChange || self.sample_interval.is_zero()
    }
}

// ===== helper functions =====

fn parse_path(
    ctx: &Context,
    config: &SubscriptionConfigData,
) -> Result<DataPath> {
    let path = config.path.as_deref().ok_or_else(|| {
        Error::InvalidRequest("path is mandatory".to_owned())
    })?;
    DataPath::parse(path)
        .ok()
        .filter(|parsed| ctx.resolve(parsed).is_ok())
        .ok_or_else(|| Error::InvalidRequest(format!("invalid path: {}", path)))
}

// Preferred sampling interval of the node or its closest ancestor.
fn schema_interval(ctx: &Context, path: &DataPath) -> Option<Duration> {
    let resolved = ctx.resolve(path).ok()?;
    resolved
        .nodes
        .iter()
        .rev()
        .find_map(|node| node.sample_interval)
        .map(Duration::from_nanos)
}

fn nanos(interval: Duration) -> u64 {
    interval.as_nanos() as u64
}
