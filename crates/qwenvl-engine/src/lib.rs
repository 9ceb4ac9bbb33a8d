mod error;

pub mod dedup;
pub mod nodes;
pub mod pixels;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use dedup::ImageDedupCache;
pub use error::NodeError;
pub use nodes::{PromptTranslatorNode, VisualChatNode, VisualQaNode, TRANSLATOR_INSTRUCTIONS};
pub use pixels::{content_hash, file_url, path_from_file_url, PixelTensor, TempImageFile};
pub use transport::{DashScopeTransport, GenerationRequest, MultimodalRequest, RemoteTransport};
