//! Integration tests for the connection lifecycle: lock/key, nick
//! validation, login announcement and logout.

mod common;

use std::time::Duration;

use common::{TestClient, TestServer};

const QUIET: Duration = Duration::from_millis(400);

#[tokio::test]
async fn test_login_and_announcement() {
    let server = TestServer::spawn().await.expect("Failed to spawn hub");

    let mut alice = server.login("alice").await.expect("alice login failed");
    alice.drain(QUIET).await;

    let mut bob = server.login("bob").await.expect("bob login failed");

    // alice learns about bob on the next cache flush.
    let seen = alice
        .recv_until(|t| t.starts_with("$MyINFO $ALL bob "))
        .await
        .expect("bob's MyINFO never reached alice");
    assert!(seen.iter().all(|t| !t.starts_with("$Hello ")), "NoHello client got $Hello");

    bob.send("$GetNickList").await.unwrap();
    let list = bob
        .recv_until(|t| t.starts_with("$NickList "))
        .await
        .expect("no nicklist");
    let nicklist = list.last().unwrap();
    assert!(nicklist.contains("alice$$"));
    assert!(nicklist.contains("bob$$"));
}

#[tokio::test]
async fn test_broken_key_disconnects() {
    let server = TestServer::spawn().await.expect("Failed to spawn hub");
    let mut client = TestClient::connect(&server.address()).await.unwrap();

    let lock = client.recv().await.unwrap();
    assert!(lock.starts_with("$Lock EXTENDEDPROTOCOL"));
    assert!(lock.contains(" Pk="));
    client.send("$Key definitely-not-the-key").await.unwrap();
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_invalid_nick_is_denied() {
    let server = TestServer::spawn().await.expect("Failed to spawn hub");
    let mut client = TestClient::connect(&server.address()).await.unwrap();
    client.handshake().await.unwrap();

    client.send("$ValidateNick bad$nick").await.unwrap();
    let tokens = client
        .recv_until(|t| t.starts_with("$ValidateDenide"))
        .await
        .expect("nick was not denied");
    assert_eq!(tokens.last().unwrap(), "$ValidateDenide bad$nick");
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_same_address_reconnect_replaces_ghost() {
    let server = TestServer::spawn().await.expect("Failed to spawn hub");
    let mut ghost = server.login("carol").await.unwrap();
    ghost.drain(QUIET).await;

    let mut fresh = server.login("carol").await.expect("relogin failed");
    assert!(ghost.is_closed().await);

    fresh.drain(QUIET).await;
    fresh.send("<carol> still here").await.unwrap();
    assert_eq!(fresh.recv().await.unwrap(), "<carol> still here");
}

#[tokio::test]
async fn test_quit_is_broadcast() {
    let server = TestServer::spawn().await.expect("Failed to spawn hub");
    let mut alice = server.login("alice").await.unwrap();
    let bob = server.login("bob").await.unwrap();
    alice
        .recv_until(|t| t.starts_with("$MyINFO $ALL bob "))
        .await
        .unwrap();

    drop(bob);
    let tokens = alice
        .recv_until(|t| t == "$Quit bob")
        .await
        .expect("no $Quit for bob");
    assert_eq!(tokens.last().unwrap(), "$Quit bob");
}
