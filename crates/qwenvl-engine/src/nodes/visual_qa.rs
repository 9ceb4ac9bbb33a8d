use std::path::PathBuf;

use qwenvl_contracts::config::NodeConfig;
use qwenvl_contracts::messages::MessageTurn;
use qwenvl_contracts::models::VisionModel;

use super::{require_credential, require_image};
use crate::error::NodeError;
use crate::pixels::{PixelTensor, TempImageFile};
use crate::transport::{
    extract_choice_message, extract_choice_text, DashScopeTransport, MultimodalRequest,
    RemoteTransport,
};

pub struct VisualQaNode {
    config: NodeConfig,
    transport: Box<dyn RemoteTransport>,
    temp_dir: PathBuf,
}

impl VisualQaNode {
    pub fn new(config: NodeConfig) -> Self {
        let transport = DashScopeTransport::new(&config);
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: NodeConfig, transport: Box<dyn RemoteTransport>) -> Self {
        Self {
            config,
            transport,
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn generate(
        &self,
        image: Option<&PixelTensor>,
        prompt: &str,
        model: VisionModel,
        seed: u64,
    ) -> Result<String, NodeError> {
        require_credential(&self.config)?;
        let image = require_image(image)?;

        let raster = image.to_static_image()?;
        let temp_image = TempImageFile::create(&self.temp_dir, &raster)?;
        let messages = [MessageTurn::user_image_prompt(temp_image.url(), prompt)];

        tracing::info!(model = %model, seed, "visual question");
        let response = self.transport.multimodal(&MultimodalRequest {
            model: model.as_str(),
            messages: &messages,
            seed,
        })?;
        let reply = extract_choice_message(&response)?;
        let text = extract_choice_text(&reply)?.to_string();
        Ok(text)
    }
}
