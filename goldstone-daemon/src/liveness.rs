//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use axum::Router;
use axum::routing::get;
use goldstone_utils::task::Task;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};

use crate::config;

// Answers as long as the runtime is able to run the handler.
async fn healthz() -> &'static str {
    "OK"
}

pub(crate) fn router(path: &str) -> Router {
    Router::new().route(path, get(healthz))
}

// Serves the liveness probe until the returned task is dropped.
pub(crate) async fn start(
    config: &config::Liveness,
) -> std::io::Result<Task<()>> {
    let listener = TcpListener::bind(&config.address).await?;
    let app = router(&config.path);
    info!(
        address = %config.address, path = %config.path,
        "liveness probe listening"
    );

    let task = Task::spawn(
        async move {
            if let Err(error) = axum::serve(listener, app).await {
                error!(%error, "liveness probe failed");
            }
        }
        .instrument(info_span!("liveness")),
    );
    Ok(task)
}
