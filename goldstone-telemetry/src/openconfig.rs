//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use async_trait::async_trait;
use goldstone_datastore::{Connector, Result, View};
use goldstone_northbound::{HandlerNode, HandlerTree, Provider};
use goldstone_yang::{DataPath, modules};
use serde_json::{Value, json};

const SUBSCRIBE_REQUESTS: &str = "/goldstone-telemetry:subscribe-requests";
const PROTOCOL: &str = "openconfig-telemetry-types:STREAM_GRPC";
const ENCODING: &str = "openconfig-telemetry-types:ENC_JSON_IETF";

/// Read-only openconfig-telemetry view of the running subscribe-requests.
/// Every subscription shows up as one dynamic subscription.
#[derive(Debug, Default)]
pub struct OpenConfigTelemetry;

// ===== impl OpenConfigTelemetry =====

#[async_trait]
impl Provider for OpenConfigTelemetry {
    type User = ();

    fn module(&self) -> &str {
        modules::OPENCONFIG_TELEMETRY
    }

    fn handlers(&self) -> HandlerTree<OpenConfigTelemetry> {
        HandlerTree::new([("telemetry-system", HandlerNode::Skip)])
    }

    async fn oper_data(
        &mut self,
        conn: &Connector,
        _path: &DataPath,
    ) -> Result<Option<Value>> {
        let data = conn
            .get_data(SUBSCRIBE_REQUESTS, View::Operational, false)
            .await?
            .to_value();
        let subscriptions = dynamic_subscriptions(&data);
        if subscriptions.is_empty() {
            return Ok(None);
        }
        Ok(Some(json!({
            "openconfig-telemetry:telemetry-system": {
                "subscriptions": {
                    "dynamic-subscriptions": {
                        "dynamic-subscription": subscriptions,
                    },
                },
            },
        })))
    }
}

// ===== global functions =====

/// Dynamic subscription id of a subscription: the request id in the upper
/// half, the subscription id in the lower one. Ids that don't fit in 32
/// bits have no dynamic subscription id.
pub fn dynamic_subscription_id(request: u64, subscription: u64) -> Option<u64> {
    let limit = u64::from(u32::MAX);
    (request <= limit && subscription <= limit)
        .then_some((request << 32) | subscription)
}

/// Splits a dynamic subscription id into request and subscription ids.
pub fn split_id(id: u64) -> (u64, u64) {
    (id >> 32, id & u64::from(u32::MAX))
}

/// Translates goldstone-telemetry operational data into dynamic
/// subscription entries. Subscriptions without state are left out.
pub fn dynamic_subscriptions(data: &Value) -> Vec<Value> {
    let requests = data
        .pointer("/goldstone-telemetry:subscribe-requests/subscribe-request")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut result = Vec::new();
    for request in requests {
        let Some(request_id) = request.get("id").and_then(Value::as_u64) else {
            continue;
        };
        let subscriptions = request
            .pointer("/subscriptions/subscription")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for subscription in subscriptions {
            if let Some(entry) = translate(request_id, subscription) {
                result.push(entry);
            }
        }
    }
    result
}

// ===== helper functions =====

fn translate(request_id: u64, subscription: &Value) -> Option<Value> {
    let sub_id = subscription.get("id").and_then(Value::as_u64)?;
    let id = dynamic_subscription_id(request_id, sub_id)?;
    let state = subscription.get("state")?;
    let path = state.get("path").and_then(Value::as_str)?;

    let mut entry = json!({
        "id": id,
        "state": {
            "id": id,
            "protocol": PROTOCOL,
            "encoding": ENCODING,
        },
        "sensor-paths": {
            "sensor-path": [{"path": path, "state": {"path": path}}],
        },
    });
    for leaf in ["sample-interval", "heartbeat-interval", "suppress-redundant"]
    {
        if let Some(value) = state.get(leaf) {
            entry["state"][leaf] = value.clone();
        }
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_pack_and_split() {
        let id = dynamic_subscription_id(3, 7).unwrap();
        assert_eq!(id, (3 << 32) + 7);
        assert_eq!(split_id(id), (3, 7));

        let max = u64::from(u32::MAX);
        let id = dynamic_subscription_id(max, max).unwrap();
        assert_eq!(id, u64::MAX);
        assert_eq!(split_id(id), (max, max));

        assert_eq!(dynamic_subscription_id(max + 1, 0), None);
        assert_eq!(dynamic_subscription_id(0, max + 1), None);
    }

    #[test]
    fn subscriptions_translate_to_dynamic_subscriptions() {
        let data = json!({
            "goldstone-telemetry:subscribe-requests": {
                "subscribe-request": [{
                    "id": 1,
                    "config": {"id": 1, "mode": "STREAM"},
                    "state": {"id": 1, "mode": "STREAM"},
                    "subscriptions": {"subscription": [
                        {
                            "id": 2,
                            "state": {
                                "id": 2,
                                "path": "/goldstone-interfaces:interfaces",
                                "mode": "SAMPLE",
                                "sample-interval": 10_000_000_000_u64,
                                "suppress-redundant": false,
                            },
                        },
                        // Not running yet.
                        {"id": 3, "config": {"id": 3}},
                    ]},
                }],
            },
        });
        let id = (1_u64 << 32) + 2;
        assert_eq!(
            dynamic_subscriptions(&data),
            vec![json!({
                "id": id,
                "state": {
                    "id": id,
                    "protocol": PROTOCOL,
                    "encoding": ENCODING,
                    "sample-interval": 10_000_000_000_u64,
                    "suppress-redundant": false,
                },
                "sensor-paths": {"sensor-path": [{
                    "path": "/goldstone-interfaces:interfaces",
                    "state": {"path": "/goldstone-interfaces:interfaces"},
                }]},
            })]
        );
    }

    #[test]
    fn no_requests_no_subscriptions() {
        assert!(dynamic_subscriptions(&json!({})).is_empty());
    }
}
