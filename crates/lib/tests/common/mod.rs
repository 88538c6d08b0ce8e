//! Shared fixtures: a gateway on a free port with injected process runner and permission lookup.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tdt::auth::{Permission, PermissionError, PermissionGrant, PermissionLookup};
use tdt::config::Config;
use tdt::exec::{ExecError, Invocation, ProcessOutput, ProcessRunner};
use tdt::gateway::{self, GatewayState};
use tdt::taxonomy::TaxonomyVolume;

pub const ADMIN_SECRET: &str = "admin-s3cret";
pub const TOKEN_SECRET: &str = "token-s3cret";

/// Config for tests: known secrets, default rltbl layout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.admin_secret = Some(ADMIN_SECRET.to_string());
    config.auth.token_secret = Some(TOKEN_SECRET.to_string());
    config
}

/// Start the gateway on 127.0.0.1:<free port>; returns the base URL. The server task is left
/// running when the test ends.
pub async fn spawn_gateway(
    mut config: Config,
    volume: &Path,
    runner: Arc<dyn ProcessRunner>,
    lookup: Arc<dyn PermissionLookup>,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    config.gateway.port = port;
    let volume = TaxonomyVolume::open(volume).expect("open volume");
    let state = GatewayState::new(&config, volume, runner, lookup);
    tokio::spawn(async move {
        let _ = gateway::serve(listener, state, "").await;
    });
    format!("http://127.0.0.1:{}", port)
}

/// Directory names in the volume, sorted.
pub fn listing(volume: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(volume)
        .expect("read volume")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Permission lookup answering a fixed grant and counting calls.
pub struct FixedLookup {
    grant: PermissionGrant,
    calls: AtomicUsize,
}

impl FixedLookup {
    pub fn new(permission: Permission, status: u16) -> Arc<Self> {
        Arc::new(Self {
            grant: PermissionGrant { permission, status },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionLookup for FixedLookup {
    async fn lookup(
        &self,
        _org: &str,
        _repo: &str,
        _user: &str,
    ) -> Result<PermissionGrant, PermissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.grant)
    }
}

/// Records lifecycle commands instead of running them. `git clone <url> <name>` creates the
/// checkout directory and `make init` the rltbl database marker.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, inv: Invocation) -> Result<ProcessOutput, ExecError> {
        self.commands.lock().unwrap().push(inv.display());
        let program = inv.program.to_string_lossy().into_owned();
        match (program.as_str(), inv.args.first().map(String::as_str)) {
            ("git", Some("clone")) => {
                std::fs::create_dir_all(inv.cwd.join(&inv.args[2])).unwrap();
            }
            ("make", Some("init")) => {
                let marker: PathBuf = inv.cwd.join(".relatable");
                std::fs::create_dir_all(&marker).unwrap();
                std::fs::write(marker.join("relatable.db"), b"").unwrap();
            }
            _ => {}
        }
        Ok(ProcessOutput {
            code: Some(0),
            ..Default::default()
        })
    }
}
