mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use common::{monument_image, scene_image};
use monument_mixer::config::GeminiSettings;
use monument_mixer::error::MonumentError;
use monument_mixer::gemini::{ApiKey, GeminiClient};
use monument_mixer::studio::{MonumentService, Studio};
use serde_json::{Value, json};

#[derive(Clone, Debug)]
struct Seen {
    path: String,
    key: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Stub {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Stub {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("lock").clone()
    }
}

/// Mimics `generateContent`: key "bad" is rejected the way Gemini rejects
/// it, prompts mentioning "refuse" get text instead of an image.
async fn generate_content(
    State(stub): State<Stub>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().expect("lock").push(Seen {
        path: uri.path().to_string(),
        key: key.clone(),
        body: body.clone(),
    });

    if key.as_deref() == Some("bad") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }})),
        )
            .into_response();
    }
    if key.as_deref() == Some("spent") {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}})),
        )
            .into_response();
    }

    let parts = body["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
    let prompt = parts
        .last()
        .and_then(|part| part["text"].as_str())
        .unwrap_or_default()
        .to_string();

    if body["generationConfig"]["responseModalities"] == json!(["TEXT"]) {
        return Json(json!({"candidates": [{"content": {"parts": [
            {"text": "a quiet harbour at dusk\nwith boats"}
        ]}}]}))
        .into_response();
    }
    if prompt.contains("refuse") {
        return Json(json!({"candidates": [{
            "content": {"parts": [{"text": "I can't make that image."}]},
            "finishReason": "STOP"
        }]}))
        .into_response();
    }

    let image = monument_image();
    Json(json!({"candidates": [{"content": {"parts": [
        {"text": "Here is your image"},
        {"inlineData": {"mimeType": image.mime_type(), "data": image.data()}}
    ]}}]}))
    .into_response()
}

async fn start_stub() -> (SocketAddr, Stub) {
    let stub = Stub::default();
    let app = Router::new()
        .fallback(generate_content)
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, stub)
}

fn studio(addr: SocketAddr, key: &str) -> Studio<GeminiClient> {
    let settings = GeminiSettings::new(
        &format!("http://{addr}/v1beta"),
        "image-model",
        "text-model",
        5,
    )
    .expect("settings");
    let client = GeminiClient::new(settings, Some(ApiKey::new(key).expect("key"))).expect("client");
    Studio::new(client)
}

#[tokio::test]
async fn monument_call_sends_key_and_returns_first_image() {
    let (addr, stub) = start_stub().await;
    let studio = studio(addr, "good");

    let image = studio.generate_monument("a lion").await.expect("image");
    assert_eq!(image, monument_image());

    let seen = stub.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1beta/models/image-model:generateContent");
    assert_eq!(seen[0].key.as_deref(), Some("good"));
    let parts = seen[0].body["contents"][0]["parts"]
        .as_array()
        .expect("parts");
    assert_eq!(parts.len(), 1);
    assert!(parts[0]["text"].as_str().expect("text").contains("a lion"));
    assert_eq!(
        seen[0].body["generationConfig"]["responseModalities"],
        json!(["IMAGE", "TEXT"])
    );
}

#[tokio::test]
async fn placement_sends_scene_then_monument_then_instruction() {
    let (addr, stub) = start_stub().await;
    let studio = studio(addr, "good");
    let scene = scene_image();
    let monument = monument_image();

    studio
        .place_monument(&scene, &monument, "next to the fountain")
        .await
        .expect("composite");

    let seen = stub.seen();
    let parts = seen[0].body["contents"][0]["parts"]
        .as_array()
        .expect("parts");
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0]["inlineData"]["data"], json!(scene.data()));
    assert_eq!(parts[1]["inlineData"]["data"], json!(monument.data()));
    let text = parts[2]["text"].as_str().expect("text");
    assert!(text.contains("Instruction: next to the fountain"));
}

#[tokio::test]
async fn describe_uses_text_model_and_keeps_first_line() {
    let (addr, stub) = start_stub().await;
    let studio = studio(addr, "good");

    let description = studio.describe_scene(&scene_image()).await.expect("text");
    assert_eq!(description, "a quiet harbour at dusk");
    let seen = stub.seen();
    assert_eq!(seen[0].path, "/v1beta/models/text-model:generateContent");
    assert_eq!(
        seen[0].body["generationConfig"]["responseModalities"],
        json!(["TEXT"])
    );
}

#[tokio::test]
async fn text_only_answer_is_an_empty_response() {
    let (addr, _stub) = start_stub().await;
    let studio = studio(addr, "good");

    let err = studio.generate_scene("please refuse").await.unwrap_err();
    match err {
        MonumentError::EmptyResponse(message) => {
            assert!(message.contains("I can't make that image."));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn rejected_key_is_an_invalid_credential() {
    let (addr, _stub) = start_stub().await;
    let studio = studio(addr, "bad");

    let err = studio.generate_monument("a lion").await.unwrap_err();
    assert!(err.is_invalid_credential());
    assert_eq!(err.code(), "INVALID_CREDENTIAL");
    assert!(err.to_string().contains("API key not valid"));
}

#[tokio::test]
async fn replaced_key_is_used_for_later_calls() {
    let (addr, stub) = start_stub().await;
    let studio = studio(addr, "bad");
    assert!(studio.generate_monument("a lion").await.is_err());

    studio
        .set_credential(ApiKey::new("good").expect("key"))
        .await
        .expect("set key");
    studio.generate_monument("a lion").await.expect("image");
    let keys: Vec<_> = stub.seen().into_iter().map(|seen| seen.key).collect();
    assert_eq!(keys, vec![Some("bad".to_string()), Some("good".to_string())]);
}

#[tokio::test]
async fn exhausted_quota_is_reported_as_such() {
    let (addr, _stub) = start_stub().await;
    let studio = studio(addr, "spent");
    let err = studio.generate_monument("a lion").await.unwrap_err();
    assert_eq!(err.code(), "QUOTA_EXCEEDED");
}

#[tokio::test]
async fn blank_prompt_never_reaches_the_network() {
    let (addr, stub) = start_stub().await;
    let studio = studio(addr, "good");
    assert!(studio.generate_monument(" ").await.is_err());
    assert!(stub.seen().is_empty());
}
