use crate::messages::{MessageTurn, Role};

pub const TRANSCRIPT_DIVIDER_WIDTH: usize = 40;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    turns: Vec<MessageTurn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: MessageTurn) {
        self.turns.push(turn);
    }

    pub fn rewind(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[MessageTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn transcript(&self) -> String {
        format_transcript(&self.turns)
    }
}

pub fn format_transcript(turns: &[MessageTurn]) -> String {
    let divider = "-".repeat(TRANSCRIPT_DIVIDER_WIDTH);
    let mut lines = Vec::new();
    for turn in turns {
        for text in turn.text_segments() {
            lines.push(format!("{}: {}", turn.role, text));
        }
        if turn.role == Role::Assistant {
            lines.push(divider.clone());
        }
    }
    lines.join("\n")
}
