// SPDX-License-Identifier: Apache-2.0

//! Process bootstrap helpers: logging, panic handling, config loading, and the
//! liveness/metrics HTTP surface. Mirrors `server-framework::lib.rs` in the teacher,
//! which every one of its processors shares verbatim rather than reimplementing per
//! binary.

use std::{fs::File, io::Read, panic::PanicInfo, path::Path, process};

use anyhow::{Context, Result};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use warp::{http::Response, Filter};

/// Parses a YAML file into `T`. The `logLevel` config key is folded into `RUST_LOG`
/// by `setup_logging` when the environment variable itself is unset, so callers load
/// config before calling `setup_logging`.
pub fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open config file at {path:?}"))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .with_context(|| format!("failed to read config file at {path:?}"))?;
    serde_yaml::from_str(&contents).context("failed to parse config file as YAML")
}

/// Installs a JSON `tracing` subscriber honoring `RUST_LOG`, falling back to
/// `fallback_level` (the config's `logLevel`) when `RUST_LOG` is unset.
pub fn setup_logging(fallback_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_thread_names(true)
        .with_env_filter(env_filter)
        .init();
}

/// Ensures a panic on any task (including ones spawned onto the Tokio runtime, which
/// otherwise swallows task panics silently) logs its details and backtrace, then
/// exits the process rather than leaving it running in a half-dead state.
pub fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info: &PanicInfo<'_>| {
        handle_panic(info);
    }));
}

fn handle_panic(panic_info: &PanicInfo<'_>) {
    let details = panic_info.to_string();
    let backtrace = format!("{:#?}", backtrace::Backtrace::new());
    tracing::error!(details, backtrace, "process panicked");
    // Synchronous write to make sure this is visible even if the process is torn
    // down before the tracing subscriber's buffered writer flushes.
    eprintln!("{details}\n{backtrace}");
    process::exit(12);
}

/// Serves `/healthz` (liveness only; the RPC read-API stays out of scope) and
/// `/metrics` (Prometheus text exposition) on `port`. Intended to run for the
/// lifetime of the process, raced against the main pipeline task via `tokio::select!`
/// so an operator sees a fatal error if either side exits.
pub async fn serve_health_and_metrics(port: u16) {
    let healthz = warp::path("healthz")
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
    let metrics = warp::path("metrics").map(|| {
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("prometheus text encoding cannot fail for well-formed metrics");
        Response::builder()
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(buffer)
    });
    warp::serve(healthz.or(metrics)).run(([0, 0, 0, 0], port)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_yaml_parses_a_real_file() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Example {
            name: String,
            count: u32,
        }

        let dir = std::env::temp_dir();
        let path = dir.join(format!("gov-collector-util-test-{}.yaml", std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "name: foo\ncount: 3").unwrap();

        let parsed: Example = load_yaml(&path).unwrap();
        assert_eq!(
            parsed,
            Example {
                name: "foo".to_string(),
                count: 3
            }
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_yaml_missing_file_is_an_error() {
        let result: Result<serde_yaml::Value> = load_yaml(Path::new("/nonexistent/path.yaml"));
        assert!(result.is_err());
    }
}
