mod test_switch_failures;

use anyhow::Result;

use crate::utils::{LoopbackMesh, TestPeer};

/// alice publishes camera and microphone, then bob and carol join her room.
pub async fn publishing_trio(mesh: &LoopbackMesh) -> Result<(TestPeer, TestPeer, TestPeer)> {
    let mut alice = mesh.client("alice");
    let mut bob = mesh.client("bob");
    let mut carol = mesh.client("carol");

    alice.client.publisher().publish_default().await?;
    alice.join("studio").await?;
    bob.join("studio").await?;
    carol.join("studio").await?;

    for peer in [&mut bob, &mut carol] {
        alice.wait_connected(peer.handle).await?;
        peer.wait_connected(alice.handle).await?;
    }
    Ok((alice, bob, carol))
}
