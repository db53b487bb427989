//! Conversation flattening
//!
//! The chat application has a single text box, so a structured conversation
//! has to be serialized into one block before injection. Pure functions only;
//! nothing here touches the browser.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One typed content block within a turn. Only text is meaningful to the
/// target application; other kinds are rendered as explicit placeholders so
/// the conversion is visible instead of silently lossy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, data: String },
}

impl ContentBlock {
    fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Image { .. } => "image",
        }
    }

    fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            other => format!("[Unsupported {}]", other.kind()),
        }
    }

    /// Text content when this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    fn render(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(ContentBlock::render)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Flatten a system prompt plus ordered turns into one text block:
/// system prompt, a separator, then `role: content` per turn joined by blank
/// lines. Trailing whitespace is trimmed.
pub fn flatten_conversation(system_prompt: Option<&str>, turns: &[ConversationTurn]) -> String {
    let mut out = String::new();

    if let Some(system) = system_prompt
        && !system.trim().is_empty()
    {
        out.push_str(system.trim_end());
        out.push_str("\n\n---\n\n");
    }

    let rendered: Vec<String> = turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content.render()))
        .collect();
    out.push_str(&rendered.join("\n\n"));

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_and_turns_golden() {
        let turns = vec![ConversationTurn::user("hi"), ConversationTurn::assistant("yo")];
        assert_eq!(
            flatten_conversation(Some("S"), &turns),
            "S\n\n---\n\nuser: hi\n\nassistant: yo"
        );
    }

    #[test]
    fn empty_system_adds_no_separator() {
        let turns = vec![ConversationTurn::user("hello")];
        assert_eq!(flatten_conversation(None, &turns), "user: hello");
        assert_eq!(flatten_conversation(Some("   "), &turns), "user: hello");
    }

    #[test]
    fn non_text_blocks_become_placeholders() {
        let turns = vec![ConversationTurn {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "look at this".into(),
                },
                ContentBlock::Image {
                    media_type: "image/png".into(),
                    data: String::new(),
                },
            ]),
        }];
        assert_eq!(
            flatten_conversation(None, &turns),
            "user: look at this\n[Unsupported image]"
        );
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let turns = vec![ConversationTurn::user("hi  \n")];
        assert_eq!(flatten_conversation(None, &turns), "user: hi");
    }
}
