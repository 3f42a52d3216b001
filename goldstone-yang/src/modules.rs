//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use crate::error::Result;
use crate::schema::{BaseType, Context, LeafType, Module, SchemaNode};

pub const INTERFACES: &str = "goldstone-interfaces";
pub const TRANSPONDER: &str = "goldstone-transponder";
pub const TELEMETRY: &str = "goldstone-telemetry";
pub const OPENCONFIG_TELEMETRY: &str = "openconfig-telemetry";

// Subscription modes and stream modes of telemetry requests.
pub const SUBSCRIPTION_MODES: [&str; 3] = ["STREAM", "ONCE", "POLL"];
pub const STREAM_MODES: [&str; 3] = ["TARGET_DEFINED", "ON_CHANGE", "SAMPLE"];

/// Context holding every module known to the daemon, in commit order.
pub fn builtin_context() -> Result<Context> {
    Context::from_modules([
        interfaces(),
        transponder(),
        telemetry(),
        openconfig_telemetry(),
    ])
}

fn admin_status() -> LeafType {
    LeafType::enumeration(&["UP", "DOWN"])
}

fn counter() -> LeafType {
    LeafType::new(BaseType::Uint64)
}

pub fn interfaces() -> Module {
    let config = || {
        SchemaNode::container("config")
            .child(SchemaNode::leaf("name", LeafType::string()))
            .child(SchemaNode::leaf(
                "admin-status",
                admin_status().with_default("DOWN"),
            ))
            .child(SchemaNode::leaf("description", LeafType::string()))
            .child(SchemaNode::leaf(
                "interface-type",
                LeafType::enumeration(&["IF_ETHERNET", "IF_OTN"]),
            ))
            .child(SchemaNode::leaf(
                "loopback-mode",
                LeafType::enumeration(&["NONE", "SHALLOW", "DEEP"])
                    .with_default("NONE"),
            ))
            .child(SchemaNode::leaf(
                "mtu",
                LeafType::new(BaseType::Uint16).with_range(1312, 9216),
            ))
    };
    let state = SchemaNode::container("state")
        .state()
        .child(SchemaNode::leaf("name", LeafType::string()))
        .child(SchemaNode::leaf("admin-status", admin_status()))
        .child(SchemaNode::leaf(
            "oper-status",
            LeafType::enumeration(&["UP", "DOWN", "DORMANT"]),
        ))
        .child(SchemaNode::leaf("description", LeafType::string()))
        .child(SchemaNode::leaf(
            "mtu",
            LeafType::new(BaseType::Uint16).with_range(1312, 9216),
        ))
        .child(
            SchemaNode::container("counters")
                .with_sample_interval(Duration::from_secs(10))
                .child(SchemaNode::leaf("in-octets", counter()))
                .child(SchemaNode::leaf("out-octets", counter()))
                .child(SchemaNode::leaf("in-errors", counter()))
                .child(SchemaNode::leaf("out-errors", counter())),
        );
    let ethernet = SchemaNode::container("ethernet").child(
        SchemaNode::container("config")
            .child(SchemaNode::leaf(
                "fec",
                LeafType::enumeration(&["NONE", "FC", "RS"])
                    .with_default("NONE"),
            ))
            .child(SchemaNode::leaf(
                "speed",
                LeafType::enumeration(&[
                    "SPEED_10G",
                    "SPEED_25G",
                    "SPEED_40G",
                    "SPEED_100G",
                    "SPEED_400G",
                ]),
            )),
    );

    Module::new(INTERFACES, "gs-if")
        .with_revision("2020-10-13")
        .node(
            SchemaNode::container("interfaces").child(
                SchemaNode::list("interface", &["name"])
                    .child(SchemaNode::leaf("name", LeafType::string()))
                    .child(config())
                    .child(state)
                    .child(ethernet),
            ),
        )
}

pub fn transponder() -> Module {
    let admin_status = || LeafType::enumeration(&["up", "down"]);
    let network_interface = SchemaNode::list("network-interface", &["name"])
        .child(SchemaNode::leaf("name", LeafType::string()))
        .child(
            SchemaNode::container("config")
                .child(SchemaNode::leaf("name", LeafType::string()))
                .child(SchemaNode::leaf("tx-laser-freq", counter()))
                .child(SchemaNode::leaf(
                    "output-power",
                    LeafType::new(BaseType::Decimal64),
                ))
                .child(SchemaNode::leaf(
                    "tx-dis",
                    LeafType::boolean().with_default(false),
                )),
        )
        .child(
            SchemaNode::container("state")
                .state()
                .child(SchemaNode::leaf("name", LeafType::string()))
                .child(SchemaNode::leaf(
                    "current-output-power",
                    LeafType::new(BaseType::Decimal64),
                ))
                .child(SchemaNode::leaf(
                    "current-input-power",
                    LeafType::new(BaseType::Decimal64),
                ))
                .with_sample_interval(Duration::from_secs(2)),
        );

    Module::new(TRANSPONDER, "gs-transponder")
        .with_revision("2019-11-01")
        .node(
            SchemaNode::container("modules").child(
                SchemaNode::list("module", &["name"])
                    .child(SchemaNode::leaf("name", LeafType::string()))
                    .child(
                        SchemaNode::container("config")
                            .child(SchemaNode::leaf("name", LeafType::string()))
                            .child(SchemaNode::leaf(
                                "admin-status",
                                admin_status().with_default("up"),
                            ))
                            .child(SchemaNode::leaf(
                                "description",
                                LeafType::string(),
                            )),
                    )
                    .child(
                        SchemaNode::container("state")
                            .state()
                            .child(SchemaNode::leaf("name", LeafType::string()))
                            .child(SchemaNode::leaf(
                                "admin-status",
                                admin_status(),
                            ))
                            .child(SchemaNode::leaf(
                                "oper-status",
                                LeafType::enumeration(&[
                                    "unknown",
                                    "initialize",
                                    "ready",
                                ]),
                            ))
                            .child(SchemaNode::leaf(
                                "vendor-name",
                                LeafType::string(),
                            )),
                    )
                    .child(network_interface),
            ),
        )
}

pub fn telemetry() -> Module {
    let interval = || LeafType::new(BaseType::Uint64);
    let request_config = SchemaNode::container("config")
        .child(SchemaNode::leaf("id", counter()))
        .child(SchemaNode::leaf(
            "mode",
            LeafType::enumeration(&SUBSCRIPTION_MODES).with_default("STREAM"),
        ))
        .child(SchemaNode::leaf(
            "updates-only",
            LeafType::boolean().with_default(false),
        ));
    let subscription = SchemaNode::list("subscription", &["id"])
        .child(SchemaNode::leaf("id", counter()))
        .child(
            SchemaNode::container("config")
                .child(SchemaNode::leaf("id", counter()))
                .child(SchemaNode::leaf("path", LeafType::string()))
                .child(SchemaNode::leaf(
                    "mode",
                    LeafType::enumeration(&STREAM_MODES)
                        .with_default("TARGET_DEFINED"),
                ))
                .child(SchemaNode::leaf("sample-interval", interval()))
                .child(SchemaNode::leaf(
                    "suppress-redundant",
                    LeafType::boolean().with_default(false),
                ))
                .child(SchemaNode::leaf("heartbeat-interval", interval())),
        )
        .child(
            SchemaNode::container("state")
                .state()
                .child(SchemaNode::leaf("id", counter()))
                .child(SchemaNode::leaf("path", LeafType::string()))
                .child(SchemaNode::leaf(
                    "mode",
                    LeafType::enumeration(&STREAM_MODES),
                ))
                .child(SchemaNode::leaf("sample-interval", interval()))
                .child(SchemaNode::leaf(
                    "suppress-redundant",
                    LeafType::boolean(),
                ))
                .child(SchemaNode::leaf("heartbeat-interval", interval())),
        );
    let request = SchemaNode::list("subscribe-request", &["id"])
        .child(SchemaNode::leaf("id", counter()))
        .child(request_config)
        .child(
            SchemaNode::container("state")
                .state()
                .child(SchemaNode::leaf("id", counter()))
                .child(SchemaNode::leaf(
                    "mode",
                    LeafType::enumeration(&SUBSCRIPTION_MODES),
                ))
                .child(SchemaNode::leaf("updates-only", LeafType::boolean())),
        )
        .child(SchemaNode::container("subscriptions").child(subscription));

    Module::new(TELEMETRY, "gs-telemetry")
        .with_revision("2022-05-25")
        .node(
            SchemaNode::container("subscribe-requests").child(request),
        )
        .node(
            SchemaNode::rpc("poll").child(
                SchemaNode::container("input")
                    .child(SchemaNode::leaf("id", counter())),
            ),
        )
        .node(
            SchemaNode::notification("telemetry-notify-event")
                .child(SchemaNode::leaf(
                    "type",
                    LeafType::enumeration(&[
                        "UPDATE",
                        "DELETE",
                        "SYNC_RESPONSE",
                    ]),
                ))
                .child(SchemaNode::leaf("request-id", counter()))
                .child(SchemaNode::leaf("subscription-id", counter()))
                .child(SchemaNode::leaf("path", LeafType::string()))
                .child(SchemaNode::leaf("json-data", LeafType::string())),
        )
}

pub fn openconfig_telemetry() -> Module {
    let interval = || LeafType::new(BaseType::Uint64);
    let sensor_path = SchemaNode::list("sensor-path", &["path"])
        .child(SchemaNode::leaf("path", LeafType::string()))
        .child(
            SchemaNode::container("state")
                .child(SchemaNode::leaf("path", LeafType::string())),
        );
    let subscription = SchemaNode::list("dynamic-subscription", &["id"])
        .child(SchemaNode::leaf("id", counter()))
        .child(
            SchemaNode::container("state")
                .child(SchemaNode::leaf("id", counter()))
                .child(SchemaNode::leaf(
                    "destination-address",
                    LeafType::string(),
                ))
                .child(SchemaNode::leaf(
                    "destination-port",
                    LeafType::new(BaseType::Uint16),
                ))
                .child(SchemaNode::leaf("sample-interval", interval()))
                .child(SchemaNode::leaf("heartbeat-interval", interval()))
                .child(SchemaNode::leaf(
                    "suppress-redundant",
                    LeafType::boolean(),
                ))
                .child(SchemaNode::leaf("protocol", LeafType::string()))
                .child(SchemaNode::leaf("encoding", LeafType::string())),
        )
        .child(SchemaNode::container("sensor-paths").child(sensor_path));

    Module::new(OPENCONFIG_TELEMETRY, "oc-telemetry")
        .with_revision("2018-08-17")
        .node(
            SchemaNode::container("telemetry-system").child(
                SchemaNode::container("subscriptions").child(
                    SchemaNode::container("dynamic-subscriptions")
                        .state()
                        .child(subscription),
                ),
            ),
        )
}
