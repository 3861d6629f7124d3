pub mod publisher_tests;

use anyhow::Result;
use tracing::Level;

use crate::utils::{LoopbackMesh, TestPeer};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Two clients in `room`, joined in order and fully connected.
pub async fn connected_pair(mesh: &LoopbackMesh, room: &str) -> Result<(TestPeer, TestPeer)> {
    let mut alice = mesh.client("alice");
    let mut bob = mesh.client("bob");

    alice.join(room).await?;
    bob.join(room).await?;

    alice.wait_connected(bob.handle).await?;
    bob.wait_connected(alice.handle).await?;
    Ok((alice, bob))
}
