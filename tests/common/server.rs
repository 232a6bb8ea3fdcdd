//! Test hub management.
//!
//! Spawns and manages nmdc-hubd processes for integration testing.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

/// A running hub process with its own data directory.
pub struct TestServer {
    child: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a hub with the default test configuration.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with("").await
    }

    /// Spawn a hub, appending `extra` TOML to the generated configuration.
    pub async fn spawn_with(extra: &str) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;
        let dir = data_dir.path().display();

        let config_path = data_dir.path().join("hub.toml");
        let config_content = format!(
            r#"
[hub]
name = "Test Hub"
address = "127.0.0.1:{port}"
motd = "Welcome to the test hub."

[login]
handshake_timeout = 5
delayed_logout = 0

[files]
banlist = "{dir}/bans.json"
hardbanlist = "{dir}/hardbans.json"
accounts = "{dir}/accounts.json"
autosave_interval = 0

[security]
connection_burst_per_ip = 100

[server]
metrics_port = 0

{extra}
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_nmdc-hubd"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the hub is accepting connections.
    ///
    /// The probe is a full connection, so it shows up in the hub's
    /// per-IP admission budget.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Hub failed to start within 5 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Connect, answer the lock and log in as `nick`.
    pub async fn login(&self, nick: &str) -> anyhow::Result<super::client::TestClient> {
        let mut client = super::client::TestClient::connect(&self.address()).await?;
        client.login(nick).await?;
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
