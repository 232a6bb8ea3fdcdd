//! Test NMDC client.
//!
//! Speaks just enough of the client side of the protocol to log in and
//! exchange chat, searches and private messages.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use nmdc_proto::{NmdcCodec, lock_challenge, lock_to_key};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// A test client.
pub struct TestClient {
    framed: Framed<TcpStream, NmdcCodec>,
    lock: Vec<u8>,
}

impl TestClient {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        Ok(Self {
            framed: Framed::new(stream, NmdcCodec::new()),
            lock: Vec::new(),
        })
    }

    /// Send one token; the delimiter is appended.
    pub async fn send(&mut self, token: &str) -> anyhow::Result<()> {
        self.send_bytes(token.as_bytes()).await
    }

    pub async fn send_bytes(&mut self, token: &[u8]) -> anyhow::Result<()> {
        let mut framed = token.to_vec();
        framed.push(b'|');
        self.framed.send(Bytes::from(framed)).await?;
        Ok(())
    }

    /// Receive a single token, without its delimiter.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        match timeout(dur, self.framed.next()).await? {
            Some(token) => Ok(String::from_utf8_lossy(&token?).into_owned()),
            None => anyhow::bail!("Connection closed"),
        }
    }

    /// Receive tokens until one satisfies `predicate`; returns all of them.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut tokens = Vec::new();
        loop {
            let token = self.recv().await?;
            let done = predicate(&token);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Drain whatever arrives within `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<String> {
        let mut tokens = Vec::new();
        while let Ok(token) = self.recv_timeout(quiet).await {
            tokens.push(token);
        }
        tokens
    }

    /// True once the hub has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match timeout(Duration::from_secs(5), self.framed.next()).await {
                Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Read `$Lock` and `$HubName`, then answer with `$Supports` and `$Key`.
    pub async fn handshake(&mut self) -> anyhow::Result<()> {
        let lock = self.recv().await?;
        let payload = lock
            .strip_prefix("$Lock ")
            .ok_or_else(|| anyhow::anyhow!("Expected $Lock, got {lock:?}"))?;
        self.lock = lock_challenge(payload.as_bytes()).to_vec();
        let name = self.recv().await?;
        anyhow::ensure!(name.starts_with("$HubName "), "Expected $HubName, got {name:?}");

        self.send("$Supports NoGetINFO NoHello UserIP2").await?;
        self.recv_until(|t| t.starts_with("$Supports ")).await?;
        let mut key = b"$Key ".to_vec();
        key.extend_from_slice(&lock_to_key(&self.lock));
        self.send_bytes(&key).await
    }

    /// Full login: handshake, nick, version, MyINFO, then the MOTD.
    pub async fn login(&mut self, nick: &str) -> anyhow::Result<()> {
        self.handshake().await?;
        self.send(&format!("$ValidateNick {nick}")).await?;
        let hello = format!("$Hello {nick}");
        self.recv_until(|t| t == hello).await?;
        self.send("$Version 1,0091").await?;
        self.send(&myinfo(nick)).await?;
        self.recv_until(|t| t.starts_with("<")).await?;
        Ok(())
    }
}

/// An active-mode MyINFO with a client tag.
pub fn myinfo(nick: &str) -> String {
    format!("$MyINFO $ALL {nick} test client<++ V:0.868,M:A,H:1/0/0,S:3>$ $DSL\x01$$1073741824$")
}
