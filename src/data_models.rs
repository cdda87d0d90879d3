use serde::{Deserialize, Serialize};

/// One normalized organic search hit. Lives for a single request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub position: u32,
}

impl SearchResult {
    pub fn new(title: String, link: String, snippet: String, position: u32) -> SearchResult {
        SearchResult {
            title,
            link,
            snippet,
            position,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A typed fragment of a part-structured message. Only text is consumed;
/// anything else is carried through validation and then ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    Text(String),
    Other { kind: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> ConversationMessage {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> ConversationMessage {
        Self::new(Role::Assistant, content)
    }

    /// Joins the text parts of a part-structured message, skipping the rest.
    pub fn from_parts(role: Role, parts: &[MessagePart]) -> ConversationMessage {
        let content = parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text(t) => Some(t.as_str()),
                MessagePart::Other { .. } => None,
            })
            .collect::<Vec<&str>>()
            .join("");
        Self::new(role, content)
    }
}

#[test]
fn test_from_parts_keeps_only_text() {
    let parts = vec![
        MessagePart::Text("What is ".to_string()),
        MessagePart::Other {
            kind: "file".to_string(),
        },
        MessagePart::Text("Rust?".to_string()),
    ];
    let msg = ConversationMessage::from_parts(Role::User, &parts);
    assert_eq!(msg.content, "What is Rust?");
    assert_eq!(msg.role, Role::User);
}

#[test]
fn test_role_round_trips_through_str() {
    for role in [Role::User, Role::Assistant, Role::System] {
        assert_eq!(Role::parse(role.as_str()), Some(role));
    }
    assert_eq!(Role::parse("tool"), None);
}
