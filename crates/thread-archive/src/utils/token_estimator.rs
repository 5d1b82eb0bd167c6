//! Token cost estimation for messages.
//!
//! Model-reported usage wins when present. Otherwise every textual piece of
//! the message is counted, including serialized tool inputs and outputs, at a
//! fixed characters-per-token ratio. Pure and deterministic. Sums saturate at
//! `u64::MAX` instead of wrapping.

use crate::memory::{Message, MessagePart};

/// Characters per token for the length heuristic.
pub const CHARS_PER_TOKEN: u64 = 4;

pub fn estimate_message_tokens(message: &Message) -> u64 {
    if let Some(usage) = message.usage {
        let total = usage.total();
        if total > 0 {
            return total;
        }
    }
    sum_tokens(message.parts.iter().map(part_chars)).div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate_batch_tokens(messages: &[Message]) -> u64 {
    sum_tokens(messages.iter().map(estimate_message_tokens))
}

pub fn sum_tokens(costs: impl IntoIterator<Item = u64>) -> u64 {
    costs.into_iter().fold(0u64, |acc, cost| acc.saturating_add(cost))
}

fn part_chars(part: &MessagePart) -> u64 {
    match part {
        MessagePart::Text { text } | MessagePart::Reasoning { text } => text.chars().count() as u64,
        MessagePart::ToolCall { tool, input, output } => {
            let chars = (tool.chars().count() as u64).saturating_add(json_chars(input));
            chars.saturating_add(output.as_ref().map(json_chars).unwrap_or(0))
        }
        MessagePart::File { name, .. } => name.chars().count() as u64,
    }
}

fn json_chars(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Null => 0,
        // Bare strings are counted as text, not as their quoted JSON form.
        serde_json::Value::String(s) => s.chars().count() as u64,
        other => other.to_string().chars().count() as u64,
    }
}
