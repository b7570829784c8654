//! Claude adapter against a mock HTTP server

mod common;

use common::{call, init_logging};
use futures::StreamExt;
use relay_agent::{
    Agent, Backend, CalculatorTool, ClaudeBackend, Conversation, Error, Message, StreamChunk,
    Tool, ToolResult,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> ClaudeBackend {
    ClaudeBackend::new("test-key").with_base_url(server.uri())
}

fn sse(events: &[Value]) -> ResponseTemplate {
    let mut body = String::new();
    for event in events {
        let kind = event["type"].as_str().unwrap_or("message");
        body.push_str(&format!("event: {kind}\ndata: {event}\n\n"));
    }
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream")
}

async fn last_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.expect("recording enabled");
    requests.last().expect("a request").body_json().expect("json body")
}

#[tokio::test]
async fn test_send_wire_shape_and_headers() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hi there"}],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let convo = Conversation::with_messages(vec![
        Message::system("Be kind."),
        Message::user("Hello"),
    ]);
    let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(CalculatorTool)];
    let response = backend(&server).send(&convo, &tools).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("Hi there"));
    assert!(response.tool_calls.is_none());

    let body = last_body(&server).await;
    assert_eq!(body["model"], "claude-3-opus-20240229");
    assert_eq!(body["max_tokens"], 4096);
    assert_eq!(body["stream"], false);
    assert_eq!(body["system"], "Be kind.");
    assert_eq!(body["messages"], json!([
        {"role": "user", "content": [{"type": "text", "text": "Hello"}]}
    ]));
    assert_eq!(body["tools"][0]["name"], "calculator");
    assert_eq!(
        body["tools"][0]["input_schema"]["required"],
        json!(["expression"])
    );
}

#[tokio::test]
async fn test_send_decodes_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Let me compute."},
                {"type": "tool_use", "id": "toolu_01", "name": "calculator",
                 "input": {"expression": "2+2", "options": {"precise": true, "digits": [1, 2]}}}
            ]
        })))
        .mount(&server)
        .await;

    let response = backend(&server)
        .send(&Conversation::with_messages(vec![Message::user("2+2")]), &[])
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("Let me compute."));
    let calls = response.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_01");
    assert_eq!(calls[0].input["options"], json!({"precise": true, "digits": [1, 2]}));
}

#[tokio::test]
async fn test_send_encodes_tool_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "4"}]
        })))
        .mount(&server)
        .await;

    let convo = Conversation::with_messages(vec![
        Message::user("2+2?"),
        Message::assistant_with_tool_calls(
            None,
            vec![call("toolu_1", "calculator", json!({"expression": "2+2"}))],
        ),
        Message::tool_result(ToolResult::success("toolu_1", "The result of 2+2 is 4")),
    ]);
    backend(&server).send(&convo, &[]).await.unwrap();

    let body = last_body(&server).await;
    assert_eq!(body["messages"][1], json!({
        "role": "assistant",
        "content": [{"type": "tool_use", "id": "toolu_1", "name": "calculator",
                     "input": {"expression": "2+2"}}]
    }));
    assert_eq!(body["messages"][2], json!({
        "role": "user",
        "content": [{"type": "tool_result", "tool_use_id": "toolu_1",
                     "content": "The result of 2+2 is 4", "is_error": false}]
    }));
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (401u16, Error::Authentication),
        (429, Error::RateLimitExceeded),
        (503, Error::server("503")),
        (404, Error::network("Bad server response: 404")),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let convo = Conversation::with_messages(vec![Message::user("x")]);
        let err = backend(&server).send(&convo, &[]).await.unwrap_err();
        assert_eq!(err, expected, "status {status}");

        let streamed: Vec<_> = backend(&server).stream(&convo, &[]).collect().await;
        assert_eq!(streamed, vec![Err(expected)], "streamed status {status}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .send(&Conversation::new(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let backend = ClaudeBackend::new("k")
        .with_base_url("http://127.0.0.1:9")
        .with_timeout(Duration::from_secs(2))
        .unwrap();
    let err = backend.send(&Conversation::new(), &[]).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_stream_text_and_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(&[
            json!({"type": "message_start", "message": {"id": "msg_1", "content": []}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me "}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "check."}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_7", "name": "calculator", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"expres"}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "sion\": \"6*7\"}"}}),
            json!({"type": "content_block_stop", "index": 1}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
            json!({"type": "message_stop"}),
        ]))
        .mount(&server)
        .await;

    let convo = Conversation::with_messages(vec![Message::user("6*7")]);
    let chunks: Vec<StreamChunk> = backend(&server)
        .stream(&convo, &[])
        .map(|c| c.unwrap())
        .collect()
        .await;

    assert_eq!(
        chunks,
        vec![
            StreamChunk::Content("Let me ".into()),
            StreamChunk::Content("check.".into()),
            StreamChunk::ToolCall(call("toolu_7", "calculator", json!({"expression": "6*7"}))),
            StreamChunk::Done,
        ]
    );
    assert_eq!(last_body(&server).await["stream"], true);
}

#[tokio::test]
async fn test_stream_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(&[
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "never"}}),
        ]))
        .mount(&server)
        .await;

    let items: Vec<_> = backend(&server)
        .stream(&Conversation::new(), &[])
        .collect()
        .await;
    assert_eq!(
        items,
        vec![
            Ok(StreamChunk::Content("Hi".into())),
            Err(Error::server("Overloaded"))
        ]
    );
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(&[json!({"type": "message_stop"})]))
        .mount(&server)
        .await;

    let mut stream = backend(&server).stream(&Conversation::new(), &[]);
    assert!(server.received_requests().await.unwrap().is_empty());

    assert_eq!(stream.next().await, Some(Ok(StreamChunk::Done)));
    assert_eq!(stream.next().await, None);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_agent_tool_loop_end_to_end() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "calculator",
                         "input": {"expression": "(1 + 2) * 3"}}]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "The answer is 9."}]
        })))
        .mount(&server)
        .await;

    let mut agent = Agent::builder()
        .backend(backend(&server))
        .system_prompt("Use tools for arithmetic.")
        .tool(CalculatorTool)
        .build()
        .unwrap();

    let answer = agent.send_message("What is (1 + 2) * 3?").await.unwrap();
    assert_eq!(answer, "The answer is 9.");
    assert_eq!(agent.messages().len(), 5);

    let body = last_body(&server).await;
    assert_eq!(body["system"], "Use tools for arithmetic.");
    assert_eq!(body["messages"][2]["content"][0]["content"], "The result of (1 + 2) * 3 is 9");
}
