use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use qwenvl_contracts::messages::MessageTurn;
use serde_json::{json, Value};

use crate::error::NodeError;
use crate::pixels::path_from_file_url;
use crate::transport::{GenerationRequest, MultimodalRequest, RemoteTransport};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub endpoint: &'static str,
    pub model: String,
    pub seed: u64,
    pub messages: Vec<MessageTurn>,
    pub result_format: Option<String>,
    pub local_images: Vec<(PathBuf, bool)>,
}

#[derive(Default)]
struct FakeState {
    responses: VecDeque<Result<Value, NodeError>>,
    calls: Vec<RecordedCall>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: Result<Value, NodeError>) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.responses.push_back(response);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn record(&self, call: RecordedCall) -> Result<Value, NodeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| NodeError::RemoteService("fake transport lock poisoned".to_string()))?;
        state.calls.push(call);
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(NodeError::RemoteService("no scripted response".to_string())))
    }
}

fn local_images(messages: &[MessageTurn]) -> Vec<(PathBuf, bool)> {
    messages
        .iter()
        .flat_map(|turn| turn.image_urls())
        .filter_map(path_from_file_url)
        .map(|path| {
            let exists = path.exists();
            (path, exists)
        })
        .collect()
}

impl RemoteTransport for FakeTransport {
    fn multimodal(&self, request: &MultimodalRequest<'_>) -> Result<Value, NodeError> {
        self.record(RecordedCall {
            endpoint: "multimodal",
            model: request.model.to_string(),
            seed: request.seed,
            messages: request.messages.to_vec(),
            result_format: None,
            local_images: local_images(request.messages),
        })
    }

    fn generation(&self, request: &GenerationRequest<'_>) -> Result<Value, NodeError> {
        self.record(RecordedCall {
            endpoint: "generation",
            model: request.model.to_string(),
            seed: request.seed,
            messages: request.messages.to_vec(),
            result_format: Some(request.result_format.to_string()),
            local_images: local_images(request.messages),
        })
    }
}

pub(crate) fn vision_reply(text: &str) -> Value {
    json!({
        "output": {
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": [{"text": text}]}
            }]
        },
        "usage": {"input_tokens": 1200, "output_tokens": 12, "image_tokens": 1100},
        "request_id": "3a1c5b0e-test"
    })
}

pub(crate) fn text_reply(text: &str) -> Value {
    json!({
        "output": {"text": text, "finish_reason": "stop"},
        "usage": {"input_tokens": 150, "output_tokens": 20},
        "request_id": "7f2e9d41-test"
    })
}
