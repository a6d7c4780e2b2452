//! Scan runner against a local WebSocket checking service

use futures::{SinkExt, StreamExt};
use proxy_scan::checker::{ScanController, ScanRunner, ScanState};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn result_frame(i: usize) -> Message {
    let alive = i % 2 == 0;
    let mut frame = json!({
        "ip": format!("10.0.0.{}", i),
        "port": 1080,
        "protocol": "socks5",
        "status": alive,
        "latency": if alive { 100 + i as u64 } else { 0 },
    });
    if !alive {
        frame["error"] = json!("connection refused");
    }
    Message::Text(frame.to_string().into())
}

fn proxies(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("10.0.0.{}:1080", i)).collect()
}

/// Accept one client, read its request and play `script` back to it.
/// Returns the URL and a handle resolving to the request payload.
async fn checker<F, Fut>(script: F) -> (String, tokio::task::JoinHandle<Value>)
where
    F: FnOnce(
            futures::stream::SplitSink<
                tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
                Message,
            >,
        ) -> Fut
        + Send
        + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (sink, mut source) = ws.split();

        let request = match source.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected first frame: {:?}", other),
        };

        script(sink).await;

        // Drain until the client goes away
        while let Some(Ok(_)) = source.next().await {}
        request
    });

    (format!("ws://{}", addr), handle)
}

#[tokio::test]
async fn test_results_then_done_completes_scan() {
    let (url, server) = checker(|mut sink| async move {
        for i in 0..5 {
            sink.send(result_frame(i)).await.unwrap();
        }
        sink.send(Message::Text(r#"{"status":"done"}"#.to_string().into()))
            .await
            .unwrap();
    })
    .await;

    let (_controller, controls) = ScanController::new();
    let mut observed = 0;
    let session = ScanRunner::new(url)
        .run(proxies(5), controls, |_| observed += 1)
        .await;

    assert_eq!(*session.state(), ScanState::Completed);
    assert_eq!(session.results().len(), 5);
    assert_eq!(session.progress(), 100);
    assert_eq!(session.results()[1].error.as_deref(), Some("connection refused"));
    assert!(observed > 0);

    let request = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request["proxies"].as_array().unwrap().len(), 5);
    assert_eq!(request["proxies"][0], "10.0.0.0:1080");
}

#[tokio::test]
async fn test_server_error_keeps_buffered_results() {
    let (url, _server) = checker(|mut sink| async move {
        sink.send(result_frame(0)).await.unwrap();
        sink.send(result_frame(2)).await.unwrap();
        sink.send(Message::Text(r#"{"error":"rate limited"}"#.to_string().into()))
            .await
            .unwrap();
    })
    .await;

    let (_controller, controls) = ScanController::new();
    let session = ScanRunner::new(url).run(proxies(4), controls, |_| {}).await;

    assert_eq!(session.error(), Some("rate limited"));
    assert_eq!(session.results().len(), 2);
}

#[tokio::test]
async fn test_early_close_errors_scan() {
    let (url, _server) = checker(|mut sink| async move {
        sink.send(result_frame(0)).await.unwrap();
        let _ = sink.close().await;
    })
    .await;

    let (_controller, controls) = ScanController::new();
    let session = ScanRunner::new(url).run(proxies(3), controls, |_| {}).await;

    assert!(matches!(session.state(), ScanState::Errored(_)));
    assert_eq!(session.results().len(), 1);
}

#[tokio::test]
async fn test_stop_from_observer_ends_scan() {
    let (url, _server) = checker(|mut sink| async move {
        for i in 0..25 {
            sink.send(result_frame(i)).await.unwrap();
        }
        // Never sends done
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await;

    let (controller, controls) = ScanController::new();
    let session = tokio::time::timeout(
        Duration::from_secs(10),
        ScanRunner::new(url).run(proxies(40), controls, move |session| {
            if session.results().len() >= 20 {
                controller.stop();
            }
        }),
    )
    .await
    .unwrap();

    assert_eq!(*session.state(), ScanState::Idle);
    assert!(session.results().len() >= 20);
    assert!(session.results().len() <= 25);
}

#[tokio::test]
async fn test_stop_during_stalled_handshake() {
    // Accepts TCP connections but never answers the WebSocket upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let (controller, controls) = ScanController::new();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop();
    });

    let session = tokio::time::timeout(
        Duration::from_secs(3),
        ScanRunner::new(format!("ws://{}", addr)).run(proxies(3), controls, |_| {}),
    )
    .await
    .expect("stop was not honoured while connecting");

    assert_eq!(*session.state(), ScanState::Idle);
    assert!(session.results().is_empty());
    assert!(!session.socket_open());
}

#[tokio::test]
async fn test_pause_during_handshake_keeps_scanning() {
    let (url, _server) = checker(|mut sink| async move {
        sink.send(Message::Text(r#"{"status":"done"}"#.to_string().into()))
            .await
            .unwrap();
    })
    .await;

    let (controller, controls) = ScanController::new();
    controller.pause();
    controller.resume();
    let session = ScanRunner::new(url).run(proxies(1), controls, |_| {}).await;

    assert_eq!(*session.state(), ScanState::Completed);
}
