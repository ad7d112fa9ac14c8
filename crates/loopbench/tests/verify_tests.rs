use bytes::Bytes;
use hyper::Uri;
use loopbench::engine::target::{FaultPlan, TargetEndpoint};
use loopbench::engine::verify::{build_client, verify, verify_with_deadline, VerificationError};
use loopbench_common::ClientConfig;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const PAYLOAD: &[u8] = b"hello bench.\n";

#[tokio::test]
async fn matching_body_verifies() {
    let target = TargetEndpoint::start(Bytes::from_static(PAYLOAD), FaultPlan::default()).unwrap();
    let client = build_client(&ClientConfig::default());

    verify(&client, target.url(), &Bytes::from_static(PAYLOAD))
        .await
        .expect("body should match");
    assert_eq!(target.hits(), 1);

    target.shutdown().await;
}

#[tokio::test]
async fn mismatch_carries_both_payloads() {
    let target = TargetEndpoint::start(
        Bytes::from_static(PAYLOAD),
        FaultPlan {
            corrupt_every: Some(1),
            ..FaultPlan::default()
        },
    )
    .unwrap();
    let client = build_client(&ClientConfig::default());

    let err = verify(&client, target.url(), &Bytes::from_static(PAYLOAD))
        .await
        .unwrap_err();
    match &err {
        VerificationError::Mismatch { got, want } => {
            assert_eq!(want.as_ref(), PAYLOAD);
            assert_ne!(got.as_ref(), PAYLOAD);
            assert_eq!(got.len(), PAYLOAD.len());
        }
        other => panic!("expected Mismatch, got {:?}", other),
    }
    assert!(err.to_string().starts_with("got body "));

    target.shutdown().await;
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url: Uri = format!("http://{}/", addr).parse().unwrap();
    let client = build_client(&ClientConfig::default());

    let err = verify(&client, &url, &Bytes::from_static(PAYLOAD))
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Transport(_)), "got {:?}", err);
    assert!(err.to_string().starts_with("error during GET"));
}

#[tokio::test]
async fn truncated_body_is_a_read_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Read the request before answering so the client sees a full response head.
        let mut buf = [0u8; 1024];
        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let url: Uri = format!("http://{}/", addr).parse().unwrap();
    let client = build_client(&ClientConfig::default());

    let err = verify(&client, &url, &Bytes::from_static(PAYLOAD))
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Read(_)), "got {:?}", err);
}

#[tokio::test]
async fn slow_response_hits_the_deadline() {
    let target = TargetEndpoint::start(
        Bytes::from_static(PAYLOAD),
        FaultPlan {
            delay: Some(Duration::from_millis(500)),
            ..FaultPlan::default()
        },
    )
    .unwrap();
    let client = build_client(&ClientConfig::default());

    let err = verify_with_deadline(
        &client,
        target.url(),
        &Bytes::from_static(PAYLOAD),
        Duration::from_millis(50),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VerificationError::Timeout(d) if d == Duration::from_millis(50)));
}
