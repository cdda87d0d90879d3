//! Answer request bodies.
//!
//! Three shapes are accepted on the wire: a bare prompt, a flat list of
//! role/content messages, and a list of role/parts messages. Each shape has
//! its own validator that collects every violation instead of stopping at the
//! first, and all three reduce to a [`NormalizedInput`] before the pipeline
//! runs.

use serde_json::{Map, Value};

use crate::data_models::{ConversationMessage, MessagePart, Role};
use crate::error::{AppError, AppResult, ValidationIssue};

#[derive(Debug, Clone, PartialEq)]
pub struct PartsMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerRequest {
    Prompt(String),
    Messages(Vec<ConversationMessage>),
    PartsMessages(Vec<PartsMessage>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Prompt,
    Conversation,
}

/// What the pipeline actually consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
    pub query: String,
    pub history: Vec<ConversationMessage>,
    pub shape: InputShape,
}

/// Pulls a required non-empty string field (`query` or `prompt`) out of a
/// JSON body.
pub fn required_string(body: &Value, field: &str, summary: &str) -> AppResult<String> {
    let issue = match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => return Ok(s.clone()),
        Some(Value::String(_)) => ValidationIssue::new(field, "must not be empty"),
        Some(_) => ValidationIssue::new(field, "expected a string"),
        None if body.is_object() => ValidationIssue::new(field, "is required"),
        None => ValidationIssue::new("", "expected a JSON object"),
    };
    Err(AppError::invalid(summary, vec![issue]))
}

impl AnswerRequest {
    pub fn from_json(body: &Value) -> AppResult<AnswerRequest> {
        let Some(obj) = body.as_object() else {
            return Err(AppError::invalid(
                "Invalid request",
                vec![ValidationIssue::new("", "expected a JSON object")],
            ));
        };

        if let Some(messages) = obj.get("messages") {
            return validate_messages(messages);
        }
        if obj.contains_key("prompt") {
            return required_string(body, "prompt", "Prompt is required").map(AnswerRequest::Prompt);
        }
        Err(AppError::invalid(
            "Prompt is required",
            vec![ValidationIssue::new(
                "",
                "expected either a `prompt` string or a `messages` array",
            )],
        ))
    }

    /// Reduces any shape to `{query, history}`.
    ///
    /// For conversations the active query is the text of the final message,
    /// whatever its role.
    pub fn normalize(self) -> AppResult<NormalizedInput> {
        match self {
            AnswerRequest::Prompt(prompt) => Ok(NormalizedInput {
                query: prompt.clone(),
                history: vec![ConversationMessage::user(prompt)],
                shape: InputShape::Prompt,
            }),
            AnswerRequest::Messages(history) => conversation_input(history),
            AnswerRequest::PartsMessages(messages) => conversation_input(
                messages
                    .iter()
                    .map(|m| ConversationMessage::from_parts(m.role, &m.parts))
                    .collect(),
            ),
        }
    }
}

fn conversation_input(history: Vec<ConversationMessage>) -> AppResult<NormalizedInput> {
    let last_index = history.len().saturating_sub(1);
    let query = history
        .last()
        .map(|m| m.content.trim().to_string())
        .unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::invalid(
            "Invalid request",
            vec![ValidationIssue::new(
                format!("messages[{last_index}]"),
                "last message has no text content",
            )],
        ));
    }
    if let Some(last) = history.last().filter(|m| m.role != Role::User) {
        tracing::debug!(role = last.role.as_str(), "last message is not a user turn");
    }
    Ok(NormalizedInput {
        query,
        history,
        shape: InputShape::Conversation,
    })
}

fn validate_messages(messages: &Value) -> AppResult<AnswerRequest> {
    let Some(items) = messages.as_array() else {
        return Err(AppError::invalid(
            "Invalid request",
            vec![ValidationIssue::new("messages", "expected an array")],
        ));
    };
    if items.is_empty() {
        return Err(AppError::invalid(
            "Invalid request",
            vec![ValidationIssue::new("messages", "must contain at least one message")],
        ));
    }

    let parts_shaped = items
        .first()
        .and_then(Value::as_object)
        .is_some_and(|m| m.contains_key("parts"));

    let mut issues = Vec::new();
    let request = if parts_shaped {
        let parsed = items
            .iter()
            .enumerate()
            .filter_map(|(i, m)| validate_parts_message(i, m, &mut issues))
            .collect();
        AnswerRequest::PartsMessages(parsed)
    } else {
        let parsed = items
            .iter()
            .enumerate()
            .filter_map(|(i, m)| validate_flat_message(i, m, &mut issues))
            .collect();
        AnswerRequest::Messages(parsed)
    };

    if issues.is_empty() {
        Ok(request)
    } else {
        Err(AppError::invalid("Invalid request", issues))
    }
}

fn message_object<'a>(
    index: usize,
    message: &'a Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<(&'a Map<String, Value>, Option<Role>)> {
    let path = format!("messages[{index}]");
    let Some(obj) = message.as_object() else {
        issues.push(ValidationIssue::new(path, "expected an object"));
        return None;
    };
    let role = match obj.get("role") {
        Some(Value::String(raw)) => {
            let role = Role::parse(raw);
            if role.is_none() {
                issues.push(ValidationIssue::new(
                    format!("{path}.role"),
                    format!("unknown role `{raw}`, expected user, assistant or system"),
                ));
            }
            role
        }
        Some(_) => {
            issues.push(ValidationIssue::new(format!("{path}.role"), "expected a string"));
            None
        }
        None => {
            issues.push(ValidationIssue::new(format!("{path}.role"), "is required"));
            None
        }
    };
    Some((obj, role))
}

fn validate_flat_message(
    index: usize,
    message: &Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<ConversationMessage> {
    let (obj, role) = message_object(index, message, issues)?;
    let content = match obj.get("content") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(ValidationIssue::new(
                format!("messages[{index}].content"),
                "expected a string",
            ));
            None
        }
        None => {
            issues.push(ValidationIssue::new(
                format!("messages[{index}].content"),
                "is required",
            ));
            None
        }
    };
    Some(ConversationMessage::new(role?, content?))
}

fn validate_parts_message(
    index: usize,
    message: &Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<PartsMessage> {
    let (obj, role) = message_object(index, message, issues)?;
    let path = format!("messages[{index}].parts");
    let Some(raw_parts) = obj.get("parts") else {
        issues.push(ValidationIssue::new(path, "is required"));
        return None;
    };
    let Some(raw_parts) = raw_parts.as_array() else {
        issues.push(ValidationIssue::new(path, "expected an array"));
        return None;
    };

    let before = issues.len();
    let mut parts = Vec::with_capacity(raw_parts.len());
    for (p, part) in raw_parts.iter().enumerate() {
        let part_path = format!("{path}[{p}]");
        let kind = part.get("type").and_then(Value::as_str);
        match kind {
            Some("text") => match part.get("text") {
                Some(Value::String(text)) => parts.push(MessagePart::Text(text.clone())),
                _ => issues.push(ValidationIssue::new(
                    format!("{part_path}.text"),
                    "expected a string",
                )),
            },
            Some(other) => parts.push(MessagePart::Other {
                kind: other.to_string(),
            }),
            None => issues.push(ValidationIssue::new(
                format!("{part_path}.type"),
                "expected a string",
            )),
        }
    }
    if issues.len() > before {
        return None;
    }
    Some(PartsMessage { role: role?, parts })
}
