//! End-to-end: a 9-node linear chain. The first hop is a plain MSG frame
//! and each RELAY hop after that decrements the hop count from
//! `MAX_HOP_COUNT - 1`; the message reaches nodes 2 through 8 (6 relay
//! hops beyond the direct first hop) but dies before reaching node 9.

mod common;

use common::TestNode;

#[tokio::test]
async fn message_does_not_survive_past_the_hop_budget() {
    let mut nodes = Vec::new();
    for i in 1..=9 {
        nodes.push(TestNode::spawn(&format!("N{i}")).await);
    }

    // Chain each node to the next: N1—N2—N3—...—N9.
    for i in 0..nodes.len() - 1 {
        let (left, right) = nodes.split_at_mut(i + 1);
        left[i].dial(&right[0]).await;
    }

    nodes[0].send_text("how far can this go");

    // Nodes 2 through 8 (indices 1..=7) must all see it.
    for (idx, node) in nodes.iter_mut().enumerate().take(8).skip(1) {
        let line = node
            .recv_transcript_line()
            .await
            .unwrap_or_else(|| panic!("node {} (index {idx}) should have received the message", idx + 1));
        assert!(line.contains("how far can this go"), "unexpected line at node {}: {line}", idx + 1);
    }

    // Node 9 (index 8) must never see it — the hop budget runs out at
    // node 8, which delivers but does not forward further.
    let ninth = &mut nodes[8];
    let leftover = tokio::time::timeout(std::time::Duration::from_millis(500), ninth.recv_transcript_line()).await;
    match leftover {
        Ok(Some(line)) => panic!("node 9 should never receive this message, got: {line}"),
        Ok(None) | Err(_) => {}
    }
}
