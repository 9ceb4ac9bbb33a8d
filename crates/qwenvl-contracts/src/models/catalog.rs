use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisionModel {
    #[default]
    QwenVlPlus,
    QwenVlMax,
}

impl VisionModel {
    pub const ALL: [VisionModel; 2] = [VisionModel::QwenVlPlus, VisionModel::QwenVlMax];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisionModel::QwenVlPlus => "qwen-vl-plus",
            VisionModel::QwenVlMax => "qwen-vl-max",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(VisionModel::as_str).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatModel {
    #[default]
    QwenTurbo,
    QwenPlus,
    QwenMax,
    Llama31_8bInstruct,
}

impl ChatModel {
    pub const ALL: [ChatModel; 4] = [
        ChatModel::QwenTurbo,
        ChatModel::QwenPlus,
        ChatModel::QwenMax,
        ChatModel::Llama31_8bInstruct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::QwenTurbo => "qwen-turbo",
            ChatModel::QwenPlus => "qwen-plus",
            ChatModel::QwenMax => "qwen-max",
            ChatModel::Llama31_8bInstruct => "llama3.1-8b-instruct",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(ChatModel::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModel {
    pub requested: String,
    pub expected: Vec<&'static str>,
}

impl fmt::Display for UnknownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown model '{}' (expected one of: {})",
            self.requested,
            self.expected.join(", ")
        )
    }
}

impl std::error::Error for UnknownModel {}

fn parse_model<T: Copy>(
    raw: &str,
    all: &[T],
    name: impl Fn(&T) -> &'static str,
) -> Result<T, UnknownModel> {
    let wanted = raw.trim().to_ascii_lowercase();
    all.iter()
        .find(|model| name(*model) == wanted)
        .copied()
        .ok_or_else(|| UnknownModel {
            requested: raw.trim().to_string(),
            expected: all.iter().map(&name).collect(),
        })
}

impl FromStr for VisionModel {
    type Err = UnknownModel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_model(raw, &Self::ALL, VisionModel::as_str)
    }
}

impl FromStr for ChatModel {
    type Err = UnknownModel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_model(raw, &Self::ALL, ChatModel::as_str)
    }
}

impl fmt::Display for VisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
