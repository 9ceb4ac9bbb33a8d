mod prompt_translator;
mod visual_chat;
mod visual_qa;

use qwenvl_contracts::config::NodeConfig;

use crate::error::NodeError;
use crate::pixels::PixelTensor;

pub use prompt_translator::{PromptTranslatorNode, TRANSLATOR_INSTRUCTIONS};
pub use visual_chat::VisualChatNode;
pub use visual_qa::VisualQaNode;

fn require_credential(config: &NodeConfig) -> Result<(), NodeError> {
    if config.credential.is_empty() {
        return Err(NodeError::Configuration("API key is required".to_string()));
    }
    Ok(())
}

fn require_image(image: Option<&PixelTensor>) -> Result<&PixelTensor, NodeError> {
    image.ok_or_else(|| NodeError::Validation("qwen_vl needs an image".to_string()))
}
