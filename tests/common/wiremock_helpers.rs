use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_MODEL: &str = "gemini-test";
pub const TEST_KEY: &str = "test-key";

/// A `generateContent` response whose first candidate carries `text` and
/// one grounding chunk per `(uri, title)` source.
pub fn gemini_response(text: &str, sources: &[(&str, &str)]) -> Value {
    let chunks: Vec<Value> = sources
        .iter()
        .map(|(uri, title)| json!({ "web": { "uri": uri, "title": title } }))
        .collect();
    let supports: Vec<Value> = (0..sources.len())
        .map(|i| json!({ "segment": { "text": format!("supporting text {}", i) }, "groundingChunkIndices": [i] }))
        .collect();

    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "groundingMetadata": {
                "groundingChunks": chunks,
                "groundingSupports": supports
            }
        }]
    })
}

/// Mount a `generateContent` mock answering with `body` at most `times` times
/// (unlimited when None).
pub async fn mount_generate(server: &MockServer, status: u16, body: Value, times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(format!("/{}:generateContent", TEST_MODEL)))
        .and(query_param("key", TEST_KEY))
        .respond_with(ResponseTemplate::new(status).set_body_json(body));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}
