use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use qwenvl_contracts::config::{Credential, NodeConfig};
use qwenvl_contracts::messages::{ContentPart, MessageContent, MessageTurn};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::error::NodeError;
use crate::pixels::path_from_file_url;

const MULTIMODAL_PATH: &str = "/services/aigc/multimodal-generation/generation";
const TEXT_GENERATION_PATH: &str = "/services/aigc/text-generation/generation";
const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultimodalRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [MessageTurn],
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [MessageTurn],
    pub seed: u64,
    pub result_format: &'a str,
}

pub trait RemoteTransport: Send + Sync {
    fn multimodal(&self, request: &MultimodalRequest<'_>) -> Result<Value, NodeError>;
    fn generation(&self, request: &GenerationRequest<'_>) -> Result<Value, NodeError>;
}

pub struct DashScopeTransport {
    api_base: String,
    credential: Credential,
    http: HttpClient,
}

impl DashScopeTransport {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            credential: config.credential.clone(),
            http: HttpClient::new(),
        }
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value, NodeError> {
        let endpoint = format!("{}{}", self.api_base, path);
        tracing::debug!(%endpoint, "dashscope request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.credential.expose())
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .map_err(|err| NodeError::RemoteService(format!("request to {endpoint} failed: {err}")))?;
        response_json_or_error(response)
    }
}

impl RemoteTransport for DashScopeTransport {
    fn multimodal(&self, request: &MultimodalRequest<'_>) -> Result<Value, NodeError> {
        let payload = multimodal_payload(request)?;
        self.post_json(MULTIMODAL_PATH, &payload)
    }

    fn generation(&self, request: &GenerationRequest<'_>) -> Result<Value, NodeError> {
        self.post_json(TEXT_GENERATION_PATH, &generation_payload(request))
    }
}

fn multimodal_payload(request: &MultimodalRequest<'_>) -> Result<Value, NodeError> {
    let messages = request
        .messages
        .iter()
        .map(inline_local_images)
        .collect::<Result<Vec<MessageTurn>, NodeError>>()?;
    Ok(json!({
        "model": request.model,
        "input": { "messages": messages },
        "parameters": { "seed": request.seed },
    }))
}

fn generation_payload(request: &GenerationRequest<'_>) -> Value {
    json!({
        "model": request.model,
        "input": { "messages": request.messages },
        "parameters": {
            "seed": request.seed,
            "result_format": request.result_format,
        },
    })
}

// `file://` references go over the wire as data URIs.
fn inline_local_images(turn: &MessageTurn) -> Result<MessageTurn, NodeError> {
    let MessageContent::Parts(parts) = &turn.content else {
        return Ok(turn.clone());
    };
    let parts = parts
        .iter()
        .map(|part| match part {
            ContentPart::Image { image } => Ok(ContentPart::image(inline_image_reference(image)?)),
            other => Ok(other.clone()),
        })
        .collect::<Result<Vec<ContentPart>, NodeError>>()?;
    Ok(MessageTurn {
        role: turn.role.clone(),
        content: MessageContent::Parts(parts),
    })
}

fn inline_image_reference(reference: &str) -> Result<String, NodeError> {
    let Some(path) = path_from_file_url(reference) else {
        return Ok(reference.to_string());
    };
    let bytes = fs::read(&path).map_err(|source| NodeError::io(&path, source))?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for_path(&path),
        BASE64.encode(bytes)
    ))
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, NodeError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| NodeError::RemoteService(format!("response body read failed: {err}")))?;
    if !status.is_success() {
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let field = |key: &str| {
            parsed
                .as_ref()
                .and_then(|value| value.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        return Err(NodeError::RemoteStatus {
            status: status.as_u16(),
            code: field("code"),
            message: field("message").unwrap_or_else(|| truncate_text(&body, ERROR_BODY_MAX_CHARS)),
        });
    }
    serde_json::from_str(&body).map_err(|err| {
        NodeError::RemoteService(format!(
            "invalid JSON payload ({err}): {}",
            truncate_text(&body, ERROR_BODY_MAX_CHARS)
        ))
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn step<'a>(value: &'a Value, key: &str, path: &str) -> Result<&'a Value, NodeError> {
    value
        .get(key)
        .filter(|found| !found.is_null())
        .ok_or_else(|| NodeError::malformed(format!("response missing `{path}`")))
}

fn first<'a>(value: &'a Value, path: &str) -> Result<&'a Value, NodeError> {
    value
        .as_array()
        .ok_or_else(|| NodeError::malformed(format!("`{path}` is not a list")))?
        .first()
        .ok_or_else(|| NodeError::malformed(format!("`{path}` is empty")))
}

/// Reads `output.choices[0].message` of a multimodal response as a turn,
/// failing at the first missing key.
pub fn extract_choice_message(response: &Value) -> Result<MessageTurn, NodeError> {
    let output = step(response, "output", "output").map_err(|err| with_service_message(err, response))?;
    let choices = step(output, "choices", "output.choices")?;
    let choice = first(choices, "output.choices")?;
    let message = step(choice, "message", "output.choices[0].message")?;
    serde_json::from_value(message.clone()).map_err(|err| {
        NodeError::malformed(format!(
            "`output.choices[0].message` is not a chat message: {err}"
        ))
    })
}

/// `content[0].text` of a reply turn.
pub fn extract_choice_text(message: &MessageTurn) -> Result<&str, NodeError> {
    match &message.content {
        MessageContent::Text(text) => Ok(text.as_str()),
        MessageContent::Parts(parts) => parts
            .first()
            .ok_or_else(|| NodeError::malformed("`output.choices[0].message.content` is empty"))?
            .as_text()
            .ok_or_else(|| {
                NodeError::malformed("response missing `output.choices[0].message.content[0].text`")
            }),
    }
}

/// `output.text` of a text generation response requested with
/// `result_format: "text"`.
pub fn extract_output_text(response: &Value) -> Result<String, NodeError> {
    let output = step(response, "output", "output").map_err(|err| with_service_message(err, response))?;
    step(output, "text", "output.text")?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| NodeError::malformed("`output.text` is not a string"))
}

fn with_service_message(err: NodeError, response: &Value) -> NodeError {
    match response.get("message").and_then(Value::as_str) {
        Some(message) if !message.trim().is_empty() => {
            NodeError::malformed(format!("response missing `output` ({})", message.trim()))
        }
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use qwenvl_contracts::messages::Role;

    use super::*;
    use crate::pixels::file_url;

    fn transport_for(server: &mockito::ServerGuard) -> DashScopeTransport {
        let config = NodeConfig::new("/unused", Credential::new("sk-test")).with_api_base(server.url());
        DashScopeTransport::new(&config)
    }

    #[test]
    fn multimodal_posts_envelope_with_inlined_local_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image_path = temp.path().join("image_temp_abcde.png");
        fs::write(&image_path, b"not really a png")?;
        let messages = vec![MessageTurn::user_image_prompt(
            file_url(&image_path),
            "Describe this image",
        )];

        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", MULTIMODAL_PATH)
            .match_header("authorization", "Bearer sk-test")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen-vl-plus",
                "input": {"messages": [{
                    "role": "user",
                    "content": [
                        {"image": format!("data:image/png;base64,{}", BASE64.encode(b"not really a png"))},
                        {"text": "Describe this image"}
                    ]
                }]},
                "parameters": {"seed": 7}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"output":{"choices":[{"message":{"role":"assistant","content":[{"text":"ok"}]}}]}}"#)
            .create();

        let response = transport_for(&server).multimodal(&MultimodalRequest {
            model: "qwen-vl-plus",
            messages: &messages,
            seed: 7,
        })?;
        mock.assert();
        assert_eq!(response["output"]["choices"][0]["message"]["content"][0]["text"], json!("ok"));
        Ok(())
    }

    #[test]
    fn generation_posts_text_result_format() -> anyhow::Result<()> {
        let messages = vec![
            MessageTurn::system_text("translate"),
            MessageTurn::user_text("一只猫"),
        ];
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", TEXT_GENERATION_PATH)
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen-turbo",
                "input": {"messages": [
                    {"role": "system", "content": "translate"},
                    {"role": "user", "content": "一只猫"}
                ]},
                "parameters": {"seed": 3, "result_format": "text"}
            })))
            .with_status(200)
            .with_body(r#"{"output":{"text":"a cat","finish_reason":"stop"}}"#)
            .create();

        let response = transport_for(&server).generation(&GenerationRequest {
            model: "qwen-turbo",
            messages: &messages,
            seed: 3,
            result_format: "text",
        })?;
        mock.assert();
        assert_eq!(extract_output_text(&response)?, "a cat");
        Ok(())
    }

    #[test]
    fn error_status_maps_service_code_and_message() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", TEXT_GENERATION_PATH)
            .with_status(401)
            .with_body(r#"{"code":"InvalidApiKey","message":"Invalid API-key provided.","request_id":"r1"}"#)
            .create();

        let result = transport_for(&server).generation(&GenerationRequest {
            model: "qwen-turbo",
            messages: &[],
            seed: 0,
            result_format: "text",
        });
        match result {
            Err(NodeError::RemoteStatus {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(code.as_deref(), Some("InvalidApiKey"));
                assert_eq!(message, "Invalid API-key provided.");
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_body_is_remote_service_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", TEXT_GENERATION_PATH)
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create();

        let result = transport_for(&server).generation(&GenerationRequest {
            model: "qwen-turbo",
            messages: &[],
            seed: 0,
            result_format: "text",
        });
        assert!(matches!(result, Err(NodeError::RemoteService(_))));
    }

    #[test]
    fn missing_local_image_fails_before_sending() {
        let messages = vec![MessageTurn::user_image_prompt(
            "file:///definitely/not/here/image_x.png",
            "hi",
        )];
        let result = multimodal_payload(&MultimodalRequest {
            model: "qwen-vl-max",
            messages: &messages,
            seed: 0,
        });
        assert!(matches!(result, Err(NodeError::Io { .. })));
    }

    #[test]
    fn remote_image_urls_are_sent_unchanged() -> anyhow::Result<()> {
        let messages = vec![MessageTurn::user_image_prompt(
            "https://example.com/cat.png",
            "hi",
        )];
        let payload = multimodal_payload(&MultimodalRequest {
            model: "qwen-vl-max",
            messages: &messages,
            seed: 0,
        })?;
        assert_eq!(
            payload["input"]["messages"][0]["content"][0]["image"],
            json!("https://example.com/cat.png")
        );
        Ok(())
    }

    #[test]
    fn extract_choice_message_reads_nested_reply() -> anyhow::Result<()> {
        let response = json!({
            "output": {"choices": [
                {"finish_reason": "stop", "message": {"role": "assistant", "content": [{"text": "first"}]}},
                {"finish_reason": "stop", "message": {"role": "assistant", "content": [{"text": "second"}]}}
            ]},
            "usage": {"input_tokens": 10, "output_tokens": 2}
        });
        let message = extract_choice_message(&response)?;
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(extract_choice_text(&message)?, "first");
        Ok(())
    }

    #[test]
    fn extraction_names_the_first_missing_key() {
        let cases = [
            (json!({"request_id": "r"}), "`output`"),
            (json!({"output": {}}), "`output.choices`"),
            (json!({"output": {"choices": []}}), "`output.choices` is empty"),
            (json!({"output": {"choices": [{}]}}), "`output.choices[0].message`"),
        ];
        for (response, needle) in cases {
            let err = match extract_choice_message(&response) {
                Err(err) => err,
                Ok(message) => panic!("expected failure, got {message:?}"),
            };
            assert!(matches!(err, NodeError::RemoteService(_)));
            assert!(err.to_string().contains(needle), "{err} should mention {needle}");
        }
    }

    #[test]
    fn extraction_fails_without_leading_text_part() -> anyhow::Result<()> {
        let message = extract_choice_message(&json!({
            "output": {"choices": [{"message": {"role": "assistant", "content": [{"box": "(1,2)"}]}}]}
        }))?;
        assert!(matches!(
            extract_choice_text(&message),
            Err(NodeError::RemoteService(_))
        ));

        let empty = extract_choice_message(&json!({
            "output": {"choices": [{"message": {"role": "assistant", "content": []}}]}
        }))?;
        assert!(extract_choice_text(&empty).is_err());
        Ok(())
    }

    #[test]
    fn missing_output_carries_service_message() {
        let err = extract_output_text(&json!({"code": "Throttling", "message": "Requests throttled"}))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("Requests throttled"));
    }
}
