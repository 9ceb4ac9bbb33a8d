mod registry;

pub use registry::{
    InputKind, InputSpec, NodeRegistry, NodeSpec, PROMPT_TRANSLATOR, VISUAL_CHAT, VISUAL_QA,
};
