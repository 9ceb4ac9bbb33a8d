use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::models::{ChatModel, VisionModel};

pub const VISUAL_QA: &str = "QWenVL_API_S_Zho";
pub const VISUAL_CHAT: &str = "QWenVL_API_S_Multi_Zho";
pub const PROMPT_TRANSLATOR: &str = "QWenPrompt_Translator";

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    Image,
    Text { default: String, multiline: bool },
    Choice { options: Vec<&'static str> },
    Int { default: u64, min: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: &'static str,
    pub kind: InputKind,
}

impl InputSpec {
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            InputKind::Image => "IMAGE",
            InputKind::Text { .. } => "STRING",
            InputKind::Choice { .. } => "CHOICE",
            InputKind::Int { .. } => "INT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub class_name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub function: &'static str,
    pub inputs: Vec<InputSpec>,
    pub return_types: Vec<&'static str>,
    pub return_names: Vec<&'static str>,
}

impl NodeSpec {
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|input| input.name == name)
    }

    pub fn input_types(&self) -> Value {
        let mut required = serde_json::Map::new();
        for input in &self.inputs {
            let entry = match &input.kind {
                InputKind::Image => json!(["IMAGE"]),
                InputKind::Text { default, multiline } => {
                    json!(["STRING", {"default": default, "multiline": multiline}])
                }
                InputKind::Choice { options } => json!([options]),
                InputKind::Int { default, min, max } => {
                    json!(["INT", {"default": default, "min": min, "max": max}])
                }
            };
            required.insert(input.name.to_string(), entry);
        }
        json!({ "required": required })
    }
}

#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: IndexMap<String, NodeSpec>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NodeRegistry {
    pub fn new(nodes: Option<IndexMap<String, NodeSpec>>) -> Self {
        Self {
            nodes: nodes.unwrap_or_else(default_nodes),
        }
    }

    pub fn get(&self, class_name: &str) -> Option<&NodeSpec> {
        self.nodes.get(class_name)
    }

    pub fn list(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn display_name(&self, class_name: &str) -> Option<&'static str> {
        self.get(class_name).map(|node| node.display_name)
    }
}

fn seed_input() -> InputSpec {
    InputSpec {
        name: "seed",
        kind: InputKind::Int {
            default: 0,
            min: 0,
            max: u64::MAX,
        },
    }
}

fn prompt_input(default: &str) -> InputSpec {
    InputSpec {
        name: "prompt",
        kind: InputKind::Text {
            default: default.to_string(),
            multiline: true,
        },
    }
}

fn vision_inputs() -> Vec<InputSpec> {
    vec![
        InputSpec {
            name: "image",
            kind: InputKind::Image,
        },
        prompt_input("Describe this image"),
        InputSpec {
            name: "model_name",
            kind: InputKind::Choice {
                options: VisionModel::names(),
            },
        },
        seed_input(),
    ]
}

fn default_nodes() -> IndexMap<String, NodeSpec> {
    let mut map = IndexMap::new();

    let mut insert = |class_name: &'static str,
                      display_name: &'static str,
                      category: &'static str,
                      function: &'static str,
                      inputs: Vec<InputSpec>| {
        map.insert(
            class_name.to_string(),
            NodeSpec {
                class_name,
                display_name,
                category,
                function,
                inputs,
                return_types: vec!["STRING"],
                return_names: vec!["text"],
            },
        );
    };

    insert(
        VISUAL_QA,
        "㊙️QWenVL_Zho",
        "Zho模块组/💫QWenVL",
        "qwen_vl_generation",
        vision_inputs(),
    );
    insert(
        VISUAL_CHAT,
        "㊙️QWenVL_Chat_Zho",
        "Zho模块组/💫QWenVL",
        "qwen_vl_generation",
        vision_inputs(),
    );
    insert(
        PROMPT_TRANSLATOR,
        "🍐通义千问提示词翻译",
        "Zho模块组/💫QWen",
        "qwen_generation",
        vec![
            prompt_input(""),
            InputSpec {
                name: "model_name",
                kind: InputKind::Choice {
                    options: ChatModel::names(),
                },
            },
            seed_input(),
        ],
    );

    map
}
