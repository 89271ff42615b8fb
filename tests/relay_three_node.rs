//! End-to-end: A—B—C chain. A is not directly connected to C, so its
//! message only reaches C by B relaying it onward.

mod common;

use common::TestNode;

#[tokio::test]
async fn message_reaches_third_node_via_relay() {
    let a = TestNode::spawn("A").await;
    let mut b = TestNode::spawn("B").await;
    let mut c = TestNode::spawn("C").await;

    a.dial(&b).await;
    b.dial(&c).await;

    a.send_text("reaching across the mesh");

    // B displays it directly (first hop is a plain MSG frame) before
    // relaying it onward as a RELAY frame.
    let b_line = b.recv_transcript_line().await.expect("B should receive the direct message");
    assert!(b_line.contains("reaching across the mesh"), "unexpected line: {b_line}");

    let c_line = c.recv_transcript_line().await.expect("C should receive the relayed message");
    assert!(c_line.contains("reaching across the mesh"), "unexpected line: {c_line}");
    assert!(c_line.contains("via mesh"), "expected the via-mesh tag: {c_line}");
}
