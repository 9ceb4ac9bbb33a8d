mod catalog;

pub use catalog::{ChatModel, UnknownModel, VisionModel};
