use std::io::ErrorKind;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use streamchat::conversation::Role;
use streamchat::generation::{GenerationConfig, Model};
use streamchat::llm::{CompletionClient, OpenAiClient};
use streamchat::session::{ChatSession, NoticeLevel};
use streamchat::streaming::Discard;
use streamchat::ChatError;

const GREETING: &str = "Hi there! How can I help you today?";

enum Reply {
    Sse(Vec<Vec<u8>>),
    Status { status: &'static str, body: &'static str },
}

/// Serve exactly one request and hand back the JSON body it carried.
async fn start_server(reply: Reply) -> Option<(String, JoinHandle<Value>)> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => return None,
        Err(err) => panic!("failed to bind local test listener: {err}"),
    };
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let body = read_request_body(&mut socket).await;

        match reply {
            Reply::Sse(events) => {
                let headers = b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(headers).await;
                for event in events {
                    let _ = socket.write_all(&event).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
            Reply::Status { status, body } => {
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        }
        let _ = socket.shutdown().await;

        serde_json::from_slice(&body).unwrap()
    });

    Some((format!("http://{addr}/v1"), handle))
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&data[..header_end]).to_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|value| value.trim().parse().unwrap())
        .unwrap_or(0);

    while data.len() < header_end + content_length {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    data[header_end..].to_vec()
}

fn packets(events: Vec<String>) -> Vec<Vec<u8>> {
    events.into_iter().map(String::into_bytes).collect()
}

fn delta(content: &str) -> String {
    let chunk = serde_json::json!({
        "choices": [{ "index": 0, "delta": { "content": content } }]
    });
    format!("data: {chunk}\n\n")
}

fn client(base_url: &str) -> OpenAiClient {
    OpenAiClient::new("test-key", base_url, Duration::from_secs(5)).unwrap()
}

fn gpt4o_mini() -> GenerationConfig {
    GenerationConfig::new(Model::Gpt4oMini, 0.9, 2048).unwrap()
}

#[tokio::test]
async fn hello_scenario_streams_reply_into_conversation() {
    let events = packets(vec![
        delta("Hi"),
        delta(" there"),
        delta("! 👋"),
        "data: [DONE]\n\n".to_string(),
    ]);
    let Some((base_url, server)) = start_server(Reply::Sse(events)).await else {
        return;
    };

    let client = client(&base_url);
    let mut session = ChatSession::new(GREETING, gpt4o_mini());
    let mut seen = Vec::new();
    let mut sink = |fragment: &str, _buffer: &str| seen.push(fragment.to_string());

    let outcome = session.submit(&client, "Hello", &mut sink).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.text, "Hi there! 👋");
    assert_eq!(seen, vec!["Hi", " there", "! 👋"]);

    let turns = session.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!((turns[0].role(), turns[0].content()), (Role::Assistant, GREETING));
    assert_eq!((turns[1].role(), turns[1].content()), (Role::User, "Hello"));
    assert_eq!((turns[2].role(), turns[2].content()), (Role::Assistant, "Hi there! 👋"));

    let request = server.await.unwrap();
    assert_eq!(request["model"], "gpt-4o-mini");
    assert_eq!(request["stream"], true);
    assert_eq!(request["max_tokens"], 2048);
    let messages = request["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "Hello");
}

#[tokio::test]
async fn multibyte_character_split_across_packets() {
    let event = delta("héllo").into_bytes();
    let split = event.iter().position(|b| *b == 0xc3).unwrap() + 1;
    let events = vec![event[..split].to_vec(), event[split..].to_vec()];

    let Some((base_url, server)) = start_server(Reply::Sse(events)).await else {
        return;
    };

    let client = client(&base_url);
    let turns = vec![streamchat::Turn::user("hi")];
    let stream = client.stream_completion(&turns, &gpt4o_mini()).await.unwrap();
    let fragments: Vec<_> = stream.collect().await;

    assert_eq!(fragments, vec![Ok("héllo".to_string())]);
    server.await.unwrap();
}

#[tokio::test]
async fn rejected_request_commits_empty_reply_and_notice() {
    let reply = Reply::Status {
        status: "401 Unauthorized",
        body: r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
    };
    let Some((base_url, server)) = start_server(reply).await else {
        return;
    };

    let client = client(&base_url);
    let mut session = ChatSession::new(GREETING, gpt4o_mini());
    let outcome = session.submit(&client, "Hello", &mut Discard).await.unwrap();

    match &outcome.error {
        Some(ChatError::CompletionRequestFailed(message)) => {
            assert!(message.contains("401"), "{message}");
            assert!(message.contains("Incorrect API key provided"), "{message}");
        }
        other => panic!("expected request failure, got {other:?}"),
    }

    assert_eq!(session.turns().len(), 3);
    assert_eq!(session.turns()[2].content(), "");
    assert!(!session.is_streaming());
    assert_eq!(session.latest_notice().unwrap().level, NoticeLevel::Error);

    server.await.unwrap();
}

#[tokio::test]
async fn malformed_chunk_keeps_partial_reply() {
    let events = packets(vec![
        delta("partial"),
        "data: {not json\n\n".to_string(),
        delta(" never seen"),
    ]);
    let Some((base_url, server)) = start_server(Reply::Sse(events)).await else {
        return;
    };

    let client = client(&base_url);
    let mut session = ChatSession::new(GREETING, gpt4o_mini());
    let outcome = session.submit(&client, "Hello", &mut Discard).await.unwrap();

    assert_eq!(outcome.text, "partial");
    assert!(matches!(outcome.error, Some(ChatError::CompletionRequestFailed(_))));
    assert_eq!(session.turns().len(), 3);
    assert_eq!(session.turns()[2].content(), "partial");

    // The session accepts the next submission after a failed one.
    assert!(session.begin_turn("again").is_ok());

    server.await.unwrap();
}

#[tokio::test]
async fn body_without_done_marker_ends_cleanly() {
    let events = packets(vec![delta("one"), delta(" two")]);
    let Some((base_url, server)) = start_server(Reply::Sse(events)).await else {
        return;
    };

    let client = client(&base_url);
    let mut session = ChatSession::new(GREETING, gpt4o_mini());
    let outcome = session.submit(&client, "count", &mut Discard).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.text, "one two");
    server.await.unwrap();
}
