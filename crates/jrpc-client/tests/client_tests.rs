mod common;

use common::{client_with_server, serve};
use jrpc_client::{ClientError, LocalClient};
use jrpc_core::ConnectionState;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_ping_returns_server_reply() {
    let (client, mut seen) =
        client_with_server(|_| Some(br#"{"jsonrpc":"2.0","result":"pong"}"#.to_vec()));
    client.start().unwrap();

    let result = timeout(WAIT, client.call("ping", None)).await.unwrap().unwrap();
    assert_eq!(result, json!({"jsonrpc": "2.0", "result": "pong"}));

    let request = seen.recv().await.unwrap();
    assert_eq!(request, json!({"jsonrpc": "2.0", "method": "ping"}));
    assert!(request.get("params").is_none());
}

#[tokio::test]
async fn test_add_sends_full_envelope() {
    let (client, mut seen) = client_with_server(|_| Some(br#"{"result":3}"#.to_vec()));
    client.start().unwrap();

    let params = json!({"a": 1, "b": 2});
    let result = timeout(WAIT, client.call("add", Some(&params)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, json!({"result": 3}));

    assert_eq!(
        seen.recv().await.unwrap(),
        json!({"jsonrpc": "2.0", "method": "add", "params": {"a": 1, "b": 2}})
    );
}

#[tokio::test]
async fn test_call_before_start_is_not_active() {
    let (client, mut seen) = client_with_server(|_| Some(b"{}".to_vec()));

    let err = client.call("ping", None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotActive));
    assert_eq!(client.state(), ConnectionState::Inactive);
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_call_after_close_is_not_active() {
    let (client, _seen) = client_with_server(|_| Some(b"{}".to_vec()));
    client.start().unwrap();
    client.call("ping", None).await.unwrap();

    client.close();
    timeout(WAIT, client.wait_until_closed()).await.unwrap();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.call("ping", None).await,
        Err(ClientError::NotActive)
    ));
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let (client, _seen) = client_with_server(|_| None);
    client.start().unwrap();

    assert!(matches!(client.start(), Err(ClientError::AlreadyStarted)));
}

#[tokio::test]
async fn test_close_fails_pending_call_with_reason() {
    let (client, mut seen) = client_with_server(|_| None);
    client.start().unwrap();

    let call = client.call("never", None);
    let closer = async {
        seen.recv().await.unwrap();
        client.close_with_error("shutting down");
    };

    let (result, ()) = timeout(WAIT, async { tokio::join!(call, closer) })
        .await
        .unwrap();

    match result {
        Err(ClientError::ConnectionClosed(reason)) => assert_eq!(reason, "shutting down"),
        other => panic!("expected closure error, got {other:?}"),
    }
    timeout(WAIT, client.wait_until_closed()).await.unwrap();
}

#[tokio::test]
async fn test_malformed_reply_fails_only_that_call() {
    let (client, _seen) = client_with_server(|request| match request["method"].as_str() {
        Some("broken") => Some(b"{\"result\":".to_vec()),
        _ => Some(br#"{"result":"ok"}"#.to_vec()),
    });
    client.start().unwrap();

    let err = client.call("broken", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)));

    let result = timeout(WAIT, client.call("fine", None)).await.unwrap().unwrap();
    assert_eq!(result["result"], "ok");
    assert_eq!(client.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_replies() {
    let (client, _seen) = client_with_server(|request| {
        let reply = json!({"echo": request["params"]["n"]});
        Some(serde_json::to_vec(&reply).unwrap())
    });
    client.start().unwrap();

    let params: Vec<Value> = (0..10).map(|n| json!({"n": n})).collect();
    let calls = params.iter().map(|p| client.call("echo", Some(p)));
    let results = timeout(WAIT, futures::future::join_all(calls)).await.unwrap();

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), json!({"echo": n}));
    }
}

#[tokio::test]
async fn test_call_with_timeout() {
    let (client, _seen) = client_with_server(|_| None);
    client.start().unwrap();

    let err = client
        .call_with_timeout("slow", None, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
    assert_eq!(client.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_empty_method_rejected() {
    let (client, _seen) = client_with_server(|_| None);
    client.start().unwrap();

    assert!(matches!(
        client.call("", None).await,
        Err(ClientError::InvalidMethod)
    ));
}

#[tokio::test]
async fn test_connect_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, seen_tx, |request| {
            Some(serde_json::to_vec(&json!({"method": request["method"]})).unwrap())
        })
        .await;
    });

    let client = LocalClient::connect(tokio::runtime::Handle::current(), "127.0.0.1", port)
        .await
        .unwrap();
    client.start().unwrap();

    let result = timeout(WAIT, client.call("getPeers", None)).await.unwrap().unwrap();
    assert_eq!(result, json!({"method": "getPeers"}));

    client.close();
    timeout(WAIT, client.wait_until_closed()).await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = LocalClient::connect(tokio::runtime::Handle::current(), "127.0.0.1", port).await;
    assert!(matches!(result, Err(ClientError::Connect(_))));
}

#[test]
fn test_call_once_blocking() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            listener.set_nonblocking(true).unwrap();
            let listener = TcpListener::from_std(listener).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
            serve(stream, seen_tx, |request| {
                Some(serde_json::to_vec(&json!({"result": request["params"]})).unwrap())
            })
            .await;
        });
    });

    let params = json!({"address": "0xabc"});
    let result = LocalClient::call_once("127.0.0.1", port, "getBalance", Some(&params)).unwrap();
    assert_eq!(result, json!({"result": {"address": "0xabc"}}));

    server.join().unwrap();
}
