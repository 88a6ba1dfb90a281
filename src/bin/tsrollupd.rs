//! Daemon hosting a rollup core.
//!
//! Settings are layered as defaults < TOML file < `TSROLLUP_*` environment < CLI flags. On start
//! the daemon checks its data directory, restores the latest snapshot and serves `/healthz` and
//! `/readyz`. SIGINT/SIGTERM trigger a final forced rollup and snapshot before exit.

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use config::{Config, Environment, File};
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tsrollup::{Resolution, RollupConfig, RollupCore, RollupEvent, RollupEventListener};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_CONFIG_FILE: &str = "tsrollupd.toml";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Hierarchical time-series rollup daemon.
#[derive(Parser, Debug)]
#[command(name = "tsrollupd", version, about)]
struct Cli {
    /// TOML config file. Without it, `./tsrollupd.toml` is read when present.
    #[arg(long, env = "TSROLLUP_CONFIG")]
    config: Option<PathBuf>,

    /// Snapshot directory root.
    #[arg(long, env = "TSROLLUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Skip config files entirely (defaults + env + CLI).
    #[arg(long)]
    no_config: bool,

    /// Print the effective settings and exit.
    #[arg(long)]
    validate_config: bool,

    /// Listen address for the health endpoints.
    #[arg(long, env = "TSROLLUP_HTTP_BIND")]
    http_bind: Option<String>,

    /// Scheduler tick in milliseconds.
    #[arg(long)]
    rollup_interval_ms: Option<u64>,

    /// Resolution raw chunks are stored at, e.g. `hundred_millis`.
    #[arg(long)]
    natural_resolution: Option<Resolution>,
}

/// Keys accepted from the config file and `TSROLLUP_*` variables. Absent keys keep defaults.
#[derive(Debug, Default, serde::Deserialize)]
struct FileSettings {
    data_dir: Option<PathBuf>,
    http_bind: Option<String>,
    rollup_interval_ms: Option<u64>,
    natural_resolution: Option<Resolution>,
    max_descriptors_per_pass: Option<usize>,
    enable_snapshots: Option<bool>,
    snapshot_interval_secs: Option<u64>,
    snapshots_to_keep: Option<usize>,
}

impl FileSettings {
    fn load(cli: &Cli) -> Result<Self, String> {
        let mut builder = Config::builder();
        match (&cli.config, cli.no_config) {
            (_, true) => {}
            (Some(path), false) if !path.exists() => {
                return Err(format!("config file not found: {}", path.display()));
            }
            (Some(path), false) => builder = builder.add_source(File::from(path.as_path())),
            (None, false) => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            }
        }
        builder
            .add_source(
                Environment::with_prefix("TSROLLUP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .ignore_empty(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| e.to_string())
    }

    /// Overlays every present key onto `config`.
    fn apply(&self, config: &mut RollupConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(ms) = self.rollup_interval_ms {
            config.rollup_interval = Duration::from_millis(ms);
        }
        if let Some(resolution) = self.natural_resolution {
            config.natural_resolution = resolution;
        }
        if let Some(cap) = self.max_descriptors_per_pass {
            config.max_descriptors_per_pass = cap;
        }
        if let Some(enabled) = self.enable_snapshots {
            config.enable_snapshots = enabled;
        }
        if let Some(secs) = self.snapshot_interval_secs {
            config.snapshot_interval = Duration::from_secs(secs);
        }
        if let Some(keep) = self.snapshots_to_keep {
            config.snapshots_to_keep = keep;
        }
    }
}

/// Effective daemon settings after all layers are applied.
#[derive(Debug)]
struct Settings {
    rollup: RollupConfig,
    http_bind: SocketAddr,
}

impl Settings {
    fn resolve(cli: &Cli) -> Result<Self, String> {
        let file = FileSettings::load(cli)?;

        // The daemon snapshots by default; the library leaves it to the embedder.
        let mut rollup = RollupConfig {
            enable_snapshots: true,
            event_listener: Arc::new(TracingEventListener),
            ..RollupConfig::default()
        };
        file.apply(&mut rollup);
        if let Some(dir) = &cli.data_dir {
            rollup.data_dir = dir.clone();
        }
        if let Some(ms) = cli.rollup_interval_ms {
            rollup.rollup_interval = Duration::from_millis(ms);
        }
        if let Some(resolution) = cli.natural_resolution {
            rollup.natural_resolution = resolution;
        }

        if rollup.rollup_interval.is_zero() {
            return Err("rollup_interval_ms must be positive".to_string());
        }
        if rollup.enable_snapshots && rollup.snapshot_interval.is_zero() {
            return Err("snapshot_interval_secs must be positive".to_string());
        }
        if rollup.max_descriptors_per_pass == 0 {
            return Err("max_descriptors_per_pass must be positive".to_string());
        }

        let bind = cli
            .http_bind
            .as_deref()
            .or(file.http_bind.as_deref())
            .unwrap_or(DEFAULT_HTTP_BIND);
        let http_bind = bind
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid http_bind {:?}: {}", bind, e))?;

        Ok(Settings { rollup, http_bind })
    }

    fn print(&self) {
        let r = &self.rollup;
        println!("data_dir={}", r.data_dir.display());
        println!("rollup_interval_ms={}", r.rollup_interval.as_millis());
        println!("natural_resolution={}", r.natural_resolution);
        println!("max_descriptors_per_pass={}", r.max_descriptors_per_pass);
        println!("enable_snapshots={}", r.enable_snapshots);
        println!("snapshot_interval_secs={}", r.snapshot_interval.as_secs());
        println!("snapshots_to_keep={}", r.snapshots_to_keep);
        println!("http_bind={}", self.http_bind);
    }
}

/// Forwards core events to `tracing`.
#[derive(Debug)]
struct TracingEventListener;

impl RollupEventListener for TracingEventListener {
    fn on_event(&self, event: RollupEvent) {
        match event {
            RollupEvent::SchedulerStarted => info!("rollup scheduler started"),
            RollupEvent::SchedulerStopping => info!("rollup scheduler stopping"),
            RollupEvent::SchedulerPanicked => error!("rollup scheduler panicked"),
            RollupEvent::PassCompleted {
                forced,
                jobs,
                written,
                deleted,
                duration,
            } => debug!(forced, jobs, written, deleted, ?duration, "rollup pass completed"),
            RollupEvent::PassFailed { error } => error!(%error, "rollup pass failed"),
            RollupEvent::DescriptorCapReached {
                resolution,
                limit,
                deferred_from,
            } => warn!(%resolution, limit, deferred_from, "descriptor cap reached, deferring"),
            RollupEvent::BucketDeleted { descriptor } => debug!(%descriptor, "bucket deleted"),
            RollupEvent::SnapshotCreated {
                path,
                timestamp,
                buckets,
            } => info!(path = %path.display(), timestamp, buckets, "snapshot created"),
            RollupEvent::SnapshotFailed { error } => error!(%error, "snapshot failed"),
        }
    }
}

fn init_tracing() {
    use std::io::IsTerminal;
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

/// Logs `result`'s error under `context` before handing it back.
fn logged<T, E: Display>(context: &str, result: Result<T, E>) -> Result<T, E> {
    result.map_err(|e| {
        error!("{}: {}", context, e);
        e
    })
}

/// Creates `data_dir` if needed and proves it accepts writes.
fn ensure_writable(data_dir: &Path) -> Result<(), String> {
    let shown = data_dir.display();
    std::fs::create_dir_all(data_dir).map_err(|e| format!("data_dir {} cannot be created: {}", shown, e))?;
    let probe = data_dir.join(".tsrollup_write_probe");
    std::fs::write(&probe, b"").map_err(|e| format!("data_dir {} not writable: {}", shown, e))?;
    let _ = std::fs::remove_file(probe);
    Ok(())
}

struct HealthState {
    ready: AtomicBool,
    #[cfg(feature = "prometheus")]
    metrics: Option<tsrollup::telemetry::rollup_metrics::InProcessPrometheus>,
}

fn route(state: &HealthState, method: &Method, path: &str) -> (StatusCode, &'static str) {
    if method != Method::GET {
        return (StatusCode::NOT_FOUND, "not found");
    }
    match path {
        "/healthz" => (StatusCode::OK, "ok"),
        // Ready once the latest snapshot is restored, until shutdown starts.
        "/readyz" if state.ready.load(Ordering::Acquire) => (StatusCode::OK, "ok"),
        "/readyz" => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => (StatusCode::NOT_FOUND, "not found"),
    }
}

async fn health_service(
    state: Arc<HealthState>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    #[cfg(feature = "prometheus")]
    if req.method() == Method::GET && req.uri().path() == "/metrics" {
        if let Some(m) = &state.metrics {
            return Ok(Response::new(Full::new(Bytes::from(m.render()))));
        }
    }

    let (status, body) = route(&state, req.method(), req.uri().path());
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    Ok(response)
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("ctrl_c handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("SIGTERM handler unavailable: {}", e);
                return interrupt.await;
            }
        };
        tokio::select! {
            _ = interrupt => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    interrupt.await;
}

/// Accepts health connections until a shutdown signal, then waits for open connections to drain.
async fn serve_health(listener: TcpListener, state: Arc<HealthState>) {
    let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut signal = std::pin::pin!(shutdown_signal());

    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    debug!("accept failed: {}", e);
                    continue;
                }
            },
            _ = &mut signal => break,
        };
        let state = Arc::clone(&state);
        let service = service_fn(move |req| health_service(Arc::clone(&state), req));
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(Box::pin(stream)), service);
        let conn = graceful.watch(conn.into_owned());
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("health connection error: {:?}", e);
            }
        });
    }

    info!("shutdown signal received");
    state.ready.store(false, Ordering::Release);
    drop(listener);
    if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown()).await.is_err() {
        warn!("shutdown timeout waiting for health connections");
    }
}

/// Forced rollup of everything still dirty, then a final snapshot. Blocks on the scheduler.
fn final_rollup(core: &RollupCore) {
    match core.rollup_now() {
        Ok(report) => info!(jobs = report.jobs, written = report.written, "final rollup done"),
        Err(e) => error!("final rollup failed: {}", e),
    }
    if core.get_config().enable_snapshots {
        if let Err(e) = core.snapshot() {
            error!("snapshot during shutdown: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();
    let cli = Cli::parse();
    let settings = logged("config error", Settings::resolve(&cli))?;

    if cli.validate_config {
        settings.print();
        return Ok(());
    }

    logged("startup check failed", ensure_writable(&settings.rollup.data_dir))?;

    #[cfg(feature = "prometheus")]
    let metrics = tsrollup::telemetry::rollup_metrics::InProcessPrometheus::install(Duration::from_secs(10))
        .map_err(|e| warn!("metrics disabled: {}", e))
        .ok();

    let data_dir = settings.rollup.data_dir.clone();
    let mut core = logged("failed to open rollup core", RollupCore::with_config(settings.rollup))?;
    let restored = logged("recovery failed", core.recover())?;
    info!(buckets = restored, "recovery complete");

    let listener = logged(
        "failed to bind health endpoint",
        TcpListener::bind(settings.http_bind).await,
    )?;
    info!(
        data_dir = %data_dir.display(),
        http = %settings.http_bind,
        "tsrollupd running; send SIGINT or SIGTERM to stop"
    );

    let state = Arc::new(HealthState {
        ready: AtomicBool::new(true),
        #[cfg(feature = "prometheus")]
        metrics,
    });
    serve_health(listener, state).await;

    info!("running final rollup and snapshot");
    let core = tokio::task::spawn_blocking(move || {
        final_rollup(&core);
        core
    })
    .await?;
    // Joins the scheduler thread.
    drop(core);
    info!("shutdown complete");
    Ok(())
}
