use qwenvl_contracts::config::NodeConfig;
use qwenvl_contracts::messages::MessageTurn;
use qwenvl_contracts::models::ChatModel;

use super::require_credential;
use crate::error::NodeError;
use crate::transport::{
    extract_output_text, DashScopeTransport, GenerationRequest, RemoteTransport,
};

pub const TRANSLATOR_INSTRUCTIONS: [&str; 3] = [
    "你是一个提示词翻译器，你会将接下来用户输入的文本描述翻译成英文版本的适合Stable Diffusion输入的提示词。不需要额外的描述信息，只需要回复单纯正向提示词即可。",
    "在Stable Diffusion的正向提示词书写中，应该注重准确、清晰地传达你期望生成图像的特征。首先，描述应简洁且具体，避免模糊的词汇，可以使用具体的物体、风格、颜色、情感等词语。其次，关键词之间的顺序和组合要有逻辑性，通常将核心元素放在前面，辅以风格或细节描述，确保模型能理解并生成符合要求的图像。同时，可以使用多个逗号或分隔符来强化不同特征，但避免过多重复。正向提示词的书写要根据实际需求灵活调整，通常建议在输出中体现具体场景、氛围或某种视觉效果。",
    "当我的回复本就是英文时，不需要再次翻译，直接回复即可。当我的回复中含有括号包含的内容时，例如`(树林:1.2)`，请在翻译后的提示词中也保留这个括号，例如`(forest:1.2)`。如果我的描述不是某个具体画面，那么请发挥你的想象力来为这段话讲述画面并回复提示词。",
];

const RESULT_FORMAT_TEXT: &str = "text";

pub struct PromptTranslatorNode {
    config: NodeConfig,
    transport: Box<dyn RemoteTransport>,
}

impl PromptTranslatorNode {
    pub fn new(config: NodeConfig) -> Self {
        let transport = DashScopeTransport::new(&config);
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: NodeConfig, transport: Box<dyn RemoteTransport>) -> Self {
        Self { config, transport }
    }

    pub fn translate(&self, prompt: &str, model: ChatModel, seed: u64) -> Result<String, NodeError> {
        require_credential(&self.config)?;

        let mut messages: Vec<MessageTurn> = TRANSLATOR_INSTRUCTIONS
            .iter()
            .map(|instruction| MessageTurn::system_text(*instruction))
            .collect();
        messages.push(MessageTurn::user_text(prompt));

        tracing::info!(model = %model, seed, "prompt translation");
        let response = self.transport.generation(&GenerationRequest {
            model: model.as_str(),
            messages: &messages,
            seed,
            result_format: RESULT_FORMAT_TEXT,
        })?;
        extract_output_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use qwenvl_contracts::config::Credential;
    use qwenvl_contracts::messages::{MessageContent, Role};
    use serde_json::json;

    use super::*;
    use crate::testing::{text_reply, FakeTransport};

    fn node(key: &str, fake: &FakeTransport) -> PromptTranslatorNode {
        PromptTranslatorNode::with_transport(
            NodeConfig::new("/unused", Credential::new(key)),
            Box::new(fake.clone()),
        )
    }

    #[test]
    fn translate_sends_instructions_then_prompt() -> anyhow::Result<()> {
        let fake = FakeTransport::new();
        fake.respond(Ok(text_reply("a quiet (forest:1.2) at dawn, soft light")));

        let text = node("sk-test", &fake).translate(
            "黎明时安静的(树林:1.2)",
            ChatModel::QwenPlus,
            1234,
        )?;
        assert_eq!(text, "a quiet (forest:1.2) at dawn, soft light");

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.endpoint, "generation");
        assert_eq!(call.model, "qwen-plus");
        assert_eq!(call.seed, 1234);
        assert_eq!(call.result_format.as_deref(), Some("text"));

        let roles: Vec<Role> = call.messages.iter().map(|turn| turn.role.clone()).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::System, Role::User]
        );
        assert!(call
            .messages
            .iter()
            .all(|turn| matches!(turn.content, MessageContent::Text(_))));
        assert_eq!(call.messages[3].text_segments(), vec!["黎明时安静的(树林:1.2)"]);
        let sent: Vec<&str> = call.messages[..3]
            .iter()
            .flat_map(|turn| turn.text_segments())
            .collect();
        assert_eq!(sent, TRANSLATOR_INSTRUCTIONS.to_vec());
        assert!(sent[0].starts_with("你是一个提示词翻译器"));
        assert!(sent[2].contains("`(树林:1.2)`") && sent[2].contains("`(forest:1.2)`"));
        Ok(())
    }

    #[test]
    fn empty_credential_makes_no_call() {
        let fake = FakeTransport::new();
        let result = node("", &fake).translate("cat", ChatModel::QwenTurbo, 0);
        assert!(matches!(result, Err(NodeError::Configuration(_))));
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn missing_output_text_is_a_remote_service_error() {
        let fake = FakeTransport::new();
        fake.respond(Ok(json!({"output": {"finish_reason": "stop"}})));
        let result = node("sk-test", &fake).translate("cat", ChatModel::QwenMax, 0);
        match result {
            Err(err @ NodeError::RemoteService(_)) => {
                assert!(err.to_string().contains("`output.text`"));
            }
            other => panic!("expected RemoteService error, got {other:?}"),
        }
    }

    #[test]
    fn transport_errors_propagate_unchanged() {
        let fake = FakeTransport::new();
        fake.respond(Err(NodeError::RemoteStatus {
            status: 400,
            code: Some("InvalidParameter".to_string()),
            message: "Model not exist.".to_string(),
        }));
        let result = node("sk-test", &fake).translate("cat", ChatModel::Llama31_8bInstruct, 0);
        assert!(matches!(
            result,
            Err(NodeError::RemoteStatus { status: 400, .. })
        ));
        assert_eq!(fake.call_count(), 1);
    }
}
