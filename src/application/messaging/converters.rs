//! Argument converters - Turn raw tokens into typed values

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{json, Value};

use crate::domain::entities::Converter;

static EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:([^:]+):$").expect("valid regex"));

static CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\*\*(.+)\*\*$").expect("valid regex"));

static CHANNEL_AND_TOPIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\*\*([^>]+)>(.+)\*\*$").expect("valid regex"));

static USER_WITH_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^@_?\*\*([^*`\\>"@]+)\|(\d+)\*\*$"#).expect("valid regex")
});

static USER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^@_?\*\*([^*`\\>"@]+)\*\*$"#).expect("valid regex"));

/// Any string
pub fn string() -> Converter {
    Converter::new("str", |raw| Ok(Value::String(raw.to_string())))
}

pub fn integer() -> Converter {
    Converter::new("int", |raw| {
        raw.trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("`{}` is not an integer: {}", raw, e))
    })
}

pub fn float() -> Converter {
    Converter::new("float", |raw| {
        let parsed = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("`{}` is not a number: {}", raw, e))?;
        serde_json::Number::from_f64(parsed)
            .map(Value::Number)
            .ok_or_else(|| format!("`{}` is not a finite number", raw))
    })
}

/// `:name:` to `name`
pub fn emoji() -> Converter {
    Converter::new("emoji", |raw| {
        extract_emoji(raw)
            .map(Value::from)
            .ok_or_else(|| format!("`{}` is not an emoji", raw))
    })
}

/// `#**name**` to `name`; bare names are accepted as they are
pub fn channel() -> Converter {
    Converter::new("channel", |raw| {
        extract_channel(raw)
            .map(Value::from)
            .ok_or_else(|| format!("`{}` is not a channel", raw))
    })
}

/// `#**chan>topic**` to `{"channel": .., "topic": ..}`
pub fn channel_and_topic() -> Converter {
    Converter::new("channel>topic", |raw| {
        extract_channel_and_topic(raw)
            .map(|(channel, topic)| json!({ "channel": channel, "topic": topic }))
            .ok_or_else(|| format!("`{}` is not a channel", raw))
    })
}

/// User mention to `{"name": .., "id": ..}`; `id` is null when not given
pub fn user() -> Converter {
    Converter::new("user", |raw| {
        extract_user(raw)
            .map(|(name, id)| json!({ "name": name, "id": id }))
            .ok_or_else(|| format!("`{}` is not a user mention", raw))
    })
}

/// Accept an empty value, yielding `default`; useful for options whose
/// parameter may be left out
pub fn or_default(inner: Converter, default: Value) -> Converter {
    let name = inner.name().to_string();
    Converter::new(name, move |raw| {
        if raw.is_empty() {
            Ok(default.clone())
        } else {
            inner.convert(raw)
        }
    })
}

pub fn extract_emoji(raw: &str) -> Option<String> {
    EMOJI
        .captures(raw.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_channel(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match CHANNEL.captures(raw) {
        Some(c) => c.get(1).map(|m| m.as_str().to_string()),
        None if raw.starts_with("#**") => None,
        None => Some(raw.to_string()),
    }
}

pub fn extract_channel_and_topic(raw: &str) -> Option<(String, Option<String>)> {
    let raw = raw.trim();
    if let Some(c) = CHANNEL_AND_TOPIC.captures(raw) {
        let channel = c.get(1)?.as_str().to_string();
        let topic = c.get(2)?.as_str().to_string();
        return Some((channel, Some(topic)));
    }
    extract_channel(raw).map(|channel| (channel, None))
}

pub fn extract_user(raw: &str) -> Option<(String, Option<u64>)> {
    let raw = raw.trim();
    if let Some(c) = USER_WITH_ID.captures(raw) {
        let name = c.get(1)?.as_str().to_string();
        let id = c.get(2)?.as_str().parse().ok();
        return Some((name, id));
    }
    USER.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| (m.as_str().to_string(), None))
}
