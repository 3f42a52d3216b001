//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;
mod liveness;
mod northbound;

use clap::{App, Arg};
use config::{Config, Logging, LoggingFmt, LoggingFmtStyle};
use northbound::Northbound;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{Subscriber, error, info};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

// Formatting layer shared by the file and stdout outputs.
fn fmt_layer<S, W>(fmt: &LoggingFmt, writer: W) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_ansi(fmt.colors);
    match fmt.style {
        LoggingFmtStyle::Compact => layer.compact().boxed(),
        LoggingFmtStyle::Full => layer.boxed(),
        LoggingFmtStyle::Json => layer.json().boxed(),
    }
}

fn init_tracing(logging: &Logging) {
    let journald = logging.journald.enabled.then(|| {
        tracing_journald::layer().expect("couldn't connect to journald")
    });
    let file = logging.file.enabled.then(|| {
        let appender = RollingFileAppender::new(
            logging.file.rotation.rotation(),
            &logging.file.dir,
            &logging.file.name,
        );
        fmt_layer(&logging.file.fmt, appender)
    });
    let stdout = logging
        .stdout
        .enabled
        .then(|| fmt_layer(&logging.stdout.fmt, std::io::stdout));

    let filter = EnvFilter::builder()
        .with_default_directive("goldstone=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(file)
        .with(stdout)
        .init();
}

// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();
    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    info!(signal = name, "shutting down");
}

fn version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    rustc_tools_util::get_version_info!()
        .commit_hash
        .map_or_else(|| version.to_owned(), |hash| format!("{version} ({hash})"))
}

// ===== main =====

fn main() {
    let version = version();
    let matches = App::new("goldstoned")
        .about("Goldstone management daemon")
        .version(version.as_str())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Configuration file to use instead of the default."),
        )
        .get_matches();
    let config = Config::load(matches.value_of("config"));
    init_tracing(&config.logging);

    let db = goldstone_datastore::db::init(&config.datastore.startup_path)
        .expect("failed to initialize startup datastore");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime");

    info!(%version, "starting up");
    runtime.block_on(async {
        match Northbound::init(&config, db).await {
            Ok(nb) => nb.run(shutdown_signal()).await,
            Err(error) => {
                error.log();
                error!("failed to initialize northbound");
                std::process::exit(1);
            }
        }
    });
    info!("exiting");
}
