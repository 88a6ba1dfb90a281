//! tsrollupd process tests: startup checks, health and readiness endpoints, and the final
//! rollup + snapshot performed on SIGTERM.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const BASE_PORT: u16 = 19_599;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running daemon, killed on drop unless it already exited.
struct Daemon {
    child: Option<Child>,
    port: u16,
}

impl Daemon {
    fn spawn(args: &[&str], port: u16) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_tsrollupd"))
            .args(args)
            .env("RUST_LOG", "info")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn tsrollupd");
        Daemon {
            child: Some(child),
            port,
        }
    }

    /// Spawns with `--no-config` against `data_dir` and waits until /healthz answers.
    fn start(data_dir: &Path, port: u16) -> Self {
        let bind = format!("127.0.0.1:{}", port);
        let daemon = Self::spawn(
            &[
                "--no-config",
                "--data-dir",
                data_dir.to_str().unwrap(),
                "--http-bind",
                &bind,
            ],
            port,
        );
        daemon.wait_until_serving();
        daemon
    }

    fn wait_until_serving(&self) {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while self.get("/healthz").is_none() {
            assert!(Instant::now() < deadline, "tsrollupd on port {} never came up", self.port);
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Status code of `GET path`, or `None` when the daemon is unreachable.
    fn get(&self, path: &str) -> Option<u16> {
        let mut stream = TcpStream::connect(("127.0.0.1", self.port)).ok()?;
        stream.set_read_timeout(Some(Duration::from_secs(2))).ok()?;
        write!(stream, "GET {} HTTP/1.0\r\nHost: localhost\r\n\r\n", path).ok()?;
        let mut response = String::new();
        stream.read_to_string(&mut response).ok()?;
        // "HTTP/1.0 200 OK"
        response.split_whitespace().nth(1)?.parse().ok()
    }

    /// Sends SIGTERM (or kills on non-unix) and returns the exit code and captured stderr.
    fn terminate(mut self) -> (Option<i32>, String) {
        let mut child = self.child.take().expect("daemon already stopped");
        #[cfg(unix)]
        {
            let _ = Command::new("kill")
                .args(["-TERM", &child.id().to_string()])
                .status();
        }
        #[cfg(not(unix))]
        let _ = child.kill();

        let pid = child.id();
        let mut stderr_pipe = child.stderr.take();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let code = child.wait().ok().and_then(|s| s.code());
            let mut stderr = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let _ = tx.send((code, stderr));
        });
        rx.recv_timeout(SHUTDOWN_TIMEOUT).unwrap_or_else(|_| {
            #[cfg(unix)]
            let _ = Command::new("kill").args(["-9", &pid.to_string()]).status();
            #[cfg(not(unix))]
            let _ = Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/F"])
                .status();
            rx.recv().unwrap_or((None, String::new()))
        })
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Runs the daemon to completion. Returns (success, stderr).
fn run_to_exit(args: &[&str]) -> (bool, String) {
    let out = Command::new(env!("CARGO_BIN_EXE_tsrollupd"))
        .args(args)
        .output()
        .expect("run tsrollupd");
    (
        out.status.success(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

fn scratch_data_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    (dir, data_dir)
}

fn snapshot_files(data_dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(data_dir.join("snapshots"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("snapshot_"))
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------- Startup checks ----------

#[test]
fn invalid_http_bind_fails_at_startup() {
    let (_dir, data_dir) = scratch_data_dir();
    let (ok, stderr) = run_to_exit(&[
        "--no-config",
        "--data-dir",
        data_dir.to_str().unwrap(),
        "--http-bind",
        "not-a-valid-address",
    ]);
    assert!(!ok, "invalid http_bind should fail");
    assert!(stderr.contains("invalid http_bind"), "stderr: {}", stderr);
}

#[test]
fn data_dir_that_is_a_file_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let not_a_dir = dir.path().join("file_not_dir");
    std::fs::write(&not_a_dir, b"x").expect("write file");

    let (ok, stderr) = run_to_exit(&["--no-config", "--data-dir", not_a_dir.to_str().unwrap()]);
    assert!(!ok, "data_dir as file should fail");
    assert!(
        stderr.contains("startup check failed") && stderr.contains("data_dir"),
        "stderr: {}",
        stderr
    );
}

// ---------- Endpoints ----------

#[test]
fn health_endpoints_answer_while_running() {
    let (_dir, data_dir) = scratch_data_dir();
    let daemon = Daemon::start(&data_dir, BASE_PORT);

    assert_eq!(daemon.get("/healthz"), Some(200));
    assert_eq!(daemon.get("/readyz"), Some(200));
    assert_eq!(daemon.get("/nonexistent"), Some(404));
    #[cfg(not(feature = "prometheus"))]
    assert_eq!(daemon.get("/metrics"), Some(404));
}

// ---------- Shutdown ----------

#[test]
fn sigterm_runs_final_rollup_and_snapshot() {
    let (_dir, data_dir) = scratch_data_dir();
    let daemon = Daemon::start(&data_dir, BASE_PORT + 1);
    assert!(snapshot_files(&data_dir).is_empty(), "no snapshot before shutdown");

    let (exit_code, stderr) = daemon.terminate();
    assert!(stderr.contains("shutdown"), "stderr: {}", stderr);

    #[cfg(unix)]
    {
        assert_eq!(exit_code, Some(0), "graceful SIGTERM should exit 0; stderr: {}", stderr);
        assert!(stderr.contains("final rollup done"), "stderr: {}", stderr);
        assert!(stderr.contains("snapshot created"), "stderr: {}", stderr);
        assert!(stderr.contains("shutdown complete"), "stderr: {}", stderr);
        assert_eq!(snapshot_files(&data_dir).len(), 1);
    }
    #[cfg(not(unix))]
    let _ = exit_code;
}

/// After a graceful shutdown a second daemon on the same data_dir (loaded from a config file this
/// time) recovers the snapshot and reports ready.
#[test]
fn restart_after_sigterm_recovers_snapshot() {
    let (dir, data_dir) = scratch_data_dir();

    let first = Daemon::start(&data_dir, BASE_PORT + 2);
    let (_, first_stderr) = first.terminate();

    let config_path = dir.path().join("tsrollupd.toml");
    std::fs::write(
        &config_path,
        format!(
            "data_dir = {:?}\nrollup_interval_ms = 100\nsnapshot_interval_secs = 1\nsnapshots_to_keep = 2\nhttp_bind = \"127.0.0.1:{}\"\n",
            data_dir.to_str().unwrap(),
            BASE_PORT + 3
        ),
    )
    .expect("write config");

    let second = Daemon::spawn(&["--config", config_path.to_str().unwrap()], BASE_PORT + 3);
    second.wait_until_serving();
    assert_eq!(
        second.get("/readyz"),
        Some(200),
        "second run must be ready after recovery; first run stderr: {}",
        first_stderr
    );

    let (_, second_stderr) = second.terminate();
    assert!(second_stderr.contains("recovery complete"), "stderr: {}", second_stderr);
    #[cfg(unix)]
    assert!(
        snapshot_files(&data_dir).len() <= 2,
        "snapshots must be pruned to snapshots_to_keep"
    );
}
