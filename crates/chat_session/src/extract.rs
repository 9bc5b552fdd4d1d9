//! Text extraction from assistant message content.
//!
//! The service has returned message content in several shapes over its
//! revisions. Each shape is handled by one extractor; they are tried in order
//! and the first that produces text wins.

use std::collections::HashSet;

use assistant_api::{MessageRole, ThreadMessage};
use serde_json::Value;
use tracing::warn;

/// Shown instead of a reply whose content matches no known shape.
pub const UNPARSEABLE_MESSAGE_SENTINEL: &str =
    "[The assistant replied in a format that could not be displayed.]";

pub type Extractor = fn(&Value) -> Option<String>;

/// Ordered from the current shape to the most defensive fallback.
pub const EXTRACTORS: &[(&str, Extractor)] = &[
    ("nested text value", nested_text_value),
    ("flat text", flat_text),
    ("nested text object", nested_text_object),
    ("plain string", plain_string),
    ("first part", first_part),
];

pub fn extract_text(content: &Value) -> String {
    EXTRACTORS
        .iter()
        .find_map(|(_, extractor)| extractor(content))
        .unwrap_or_else(|| {
            warn!(content = %content, "assistant message content matched no known shape");
            UNPARSEABLE_MESSAGE_SENTINEL.to_owned()
        })
}

/// Newest assistant message whose id is not in `known_ids`.
///
/// `messages` must be ordered newest first, as the service lists them.
pub fn select_new_assistant_message<'a>(
    messages: &'a [ThreadMessage],
    known_ids: &HashSet<&str>,
) -> Option<&'a ThreadMessage> {
    messages.iter().find(|message| {
        message.role == MessageRole::Assistant && !known_ids.contains(message.id.as_str())
    })
}

fn first_text_part(content: &Value) -> Option<&Value> {
    content.as_array()?.first()
}

// [{"type": "text", "text": {"value": "..."}}]
fn nested_text_value(content: &Value) -> Option<String> {
    let value = first_text_part(content)?.get("text")?.get("value")?.as_str()?;
    Some(value.to_owned())
}

// [{"type": "text", "text": "..."}]
fn flat_text(content: &Value) -> Option<String> {
    let text = first_text_part(content)?.get("text")?.as_str()?;
    Some(text.to_owned())
}

fn nested_text_object(content: &Value) -> Option<String> {
    let text = first_text_part(content)?.get("text")?;
    if text.is_null() {
        return None;
    }
    Some(text.to_string())
}

fn plain_string(content: &Value) -> Option<String> {
    content.as_str().map(str::to_owned)
}

fn first_part(content: &Value) -> Option<String> {
    let part = first_text_part(content)?;
    match part {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
