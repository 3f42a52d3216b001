//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::sync::{Arc, Mutex};

use goldstone_datastore::{Connector, Result, View};
use goldstone_northbound::{Server, ServerHandle};
use goldstone_telemetry::{Engine, OpenConfigTelemetry, TelemetryProvider};
use goldstone_utils::task::Task;
use goldstone_yang::modules;
use pickledb::PickleDb;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::liveness;

pub struct Northbound {
    servers: Vec<ServerHandle>,
    liveness: Option<Task<()>>,
}

// ===== impl Northbound =====

impl Northbound {
    pub(crate) async fn init(
        config: &Config,
        db: PickleDb,
    ) -> Result<Northbound> {
        let db = Arc::new(Mutex::new(db));
        let ctx = Arc::new(modules::builtin_context()?);
        let conn = Connector::new(ctx, config.datastore.config(), Some(db))?;

        // Start the providers before loading the startup configuration so
        // that it goes through their handlers.
        let servers = start_servers(config, &conn).await?;
        conn.copy_config(View::Startup, View::Running).await?;

        let liveness = match config.liveness.enabled {
            true => match liveness::start(&config.liveness).await {
                Ok(task) => Some(task),
                Err(error) => {
                    error!(%error, "failed to start liveness probe");
                    None
                }
            },
            false => None,
        };

        Ok(Northbound {
            servers,
            liveness,
        })
    }

    // Serves until `shutdown` resolves, then stops every server.
    #[instrument(skip_all, "northbound")]
    pub(crate) async fn run(mut self, shutdown: impl Future<Output = ()>) {
        shutdown.await;

        self.liveness = None;
        for server in &self.servers {
            server.stop();
        }
        for server in self.servers.drain(..) {
            info!(module = %server.module(), "stopping server");
            server.wait().await;
        }
    }
}

// ===== helper functions =====

async fn start_servers(
    config: &Config,
    conn: &Connector,
) -> Result<Vec<ServerHandle>> {
    let mut servers = Vec::new();
    let server_config = config.northbound.config();

    if config.telemetry.enabled {
        let engine = Engine::new(conn.clone(), config.telemetry.config());
        let provider = TelemetryProvider::new(engine);
        servers.push(
            Server::start(conn.clone(), provider, server_config.clone())
                .await?,
        );
        servers.push(
            Server::start(conn.clone(), OpenConfigTelemetry, server_config)
                .await?,
        );
    }

    Ok(servers)
}
