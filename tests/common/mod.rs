#![allow(dead_code)]

use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::StatusCode;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Server process shared by one test binary.
///
/// The shared instance lives in a static and is never dropped, so the server
/// is started with `--exit-on-stdin-eof` and watches the pipe held here: it
/// shuts down once the test process exits and the pipe closes.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
    _stdin: Option<ChildStdin>,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tenant-scope-api"));
        cmd.arg("--exit-on-stdin-eof")
            .env("API_PORT", port.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server sees DATABASE_URL
        let mut child = cmd.spawn().context("failed to spawn server binary")?;
        let stdin = child.stdin.take();

        Ok(Self {
            port,
            base_url,
            child,
            _stdin: stdin,
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// True when a database is configured; integration tests are skipped otherwise
pub fn database_configured() -> bool {
    let _ = dotenvy::dotenv();
    if std::env::var("DATABASE_URL").is_ok() {
        return true;
    }
    eprintln!("DATABASE_URL not set; skipping integration test");
    false
}

/// Shared server for the test binary, or `None` when no database is configured
pub async fn ensure_server() -> Result<Option<&'static TestServer>> {
    if !database_configured() {
        return Ok(None);
    }
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(20)).await?;
    Ok(Some(server))
}

/// A tenant id no seeded row and no other test run uses
pub fn fresh_tenant() -> i32 {
    static NEXT: OnceLock<AtomicI32> = OnceLock::new();
    let next = NEXT.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() % 100_000_000)
            .unwrap_or(0) as i32;
        AtomicI32::new(1_000_000 + seed * 10)
    });
    next.fetch_add(1, Ordering::SeqCst)
}
