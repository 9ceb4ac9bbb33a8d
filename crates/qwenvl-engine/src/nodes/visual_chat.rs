use qwenvl_contracts::config::NodeConfig;
use qwenvl_contracts::conversation::ConversationState;
use qwenvl_contracts::messages::MessageTurn;
use qwenvl_contracts::models::VisionModel;

use super::{require_credential, require_image};
use crate::dedup::ImageDedupCache;
use crate::error::NodeError;
use crate::pixels::{content_hash, file_url, write_png, PixelTensor};
use crate::transport::{
    extract_choice_message, extract_choice_text, DashScopeTransport, MultimodalRequest,
    RemoteTransport,
};

pub struct VisualChatNode {
    config: NodeConfig,
    transport: Box<dyn RemoteTransport>,
    conversation: ConversationState,
    last_image: ImageDedupCache,
}

impl VisualChatNode {
    pub fn new(config: NodeConfig) -> Self {
        let transport = DashScopeTransport::new(&config);
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: NodeConfig, transport: Box<dyn RemoteTransport>) -> Self {
        Self {
            config,
            transport,
            conversation: ConversationState::new(),
            last_image: ImageDedupCache::new(),
        }
    }

    /// Sends `prompt` about `image` with the whole history and returns the
    /// rendered transcript. A failed call leaves the history as it was.
    pub fn generate(
        &mut self,
        image: Option<&PixelTensor>,
        prompt: &str,
        model: VisionModel,
        seed: u64,
    ) -> Result<String, NodeError> {
        require_credential(&self.config)?;
        let image = require_image(image)?;

        let image_url = self.materialize(image)?;
        let mark = self.conversation.len();
        self.conversation
            .push(MessageTurn::user_image_prompt(image_url, prompt));

        match self.exchange(model, seed) {
            Ok(reply) => {
                self.conversation.push(reply);
                Ok(self.conversation.transcript())
            }
            Err(err) => {
                self.conversation.rewind(mark);
                Err(err)
            }
        }
    }

    pub fn history(&self) -> &[MessageTurn] {
        self.conversation.turns()
    }

    pub fn transcript(&self) -> String {
        self.conversation.transcript()
    }

    pub fn reset(&mut self) {
        self.conversation.clear();
        self.last_image.clear();
    }

    fn materialize(&mut self, image: &PixelTensor) -> Result<String, NodeError> {
        let raster = image.to_static_image()?;
        let hash = content_hash(&raster);
        if let Some(url) = self.last_image.lookup(&hash) {
            tracing::info!(%hash, "image identical to the last one, not saved");
            return Ok(url.to_string());
        }

        let filename = format!("image_{hash}.png");
        let path = self.config.chat_image_dir().join(&filename);
        write_png(&path, &raster)?;
        tracing::info!(%filename, "image saved");

        let url = file_url(&path);
        self.last_image.remember(hash, url.clone());
        Ok(url)
    }

    fn exchange(&self, model: VisionModel, seed: u64) -> Result<MessageTurn, NodeError> {
        tracing::info!(model = %model, seed, turns = self.conversation.len(), "visual chat turn");
        let response = self.transport.multimodal(&MultimodalRequest {
            model: model.as_str(),
            messages: self.conversation.turns(),
            seed,
        })?;
        let reply = extract_choice_message(&response)?;
        extract_choice_text(&reply)?;
        Ok(reply)
    }
}
