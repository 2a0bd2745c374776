//! Structured log events and the limits applied when they are built.
//!
//! A [`LogEvent`] is immutable once it sits in the [`EventStore`](crate::EventStore). Callers
//! describe what they want recorded with an [`Entry`]; the store turns it into an event,
//! enforcing the field caps:
//!
//! - at most [`MAX_FIELDS`] entries in `context` and in `info` (first ones win),
//! - every string value truncated to [`MAX_VALUE_CHARS`] characters.
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Maximum number of entries kept in an event's `context` or `info`.
pub const MAX_FIELDS: usize = 20;
/// Maximum length, in characters, of any stored string value.
pub const MAX_VALUE_CHARS: usize = 1000;
/// Prefix of values recorded in place of something that could not be rendered.
pub const DEGRADED_PREFIX: &str = "ERR# ";

/// Outcome recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogResult {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for LogResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogResult::Ok => "OK",
            LogResult::Warn => "WARN",
            LogResult::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Insertion-ordered string map, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    /// Collect pairs applying the entry cap and value truncation.
    ///
    /// A repeated key overwrites the earlier value in place. Returns the fields and how many
    /// distinct keys were dropped by the cap.
    pub(crate) fn capped<I>(pairs: I) -> (Self, usize)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut dropped = 0;
        for (key, value) in pairs {
            let value = truncate(value);
            if let Some(slot) = fields.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else if fields.len() < MAX_FIELDS {
                fields.push((key, value));
            } else {
                dropped += 1;
            }
        }
        (Self(fields), dropped)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One structured diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    result: LogResult,
    #[serde(serialize_with = "serialize_millis")]
    elapsed_time: Duration,
    context: Fields,
    info: Fields,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl LogEvent {
    pub(crate) fn build(entry: Entry, context: Fields) -> (Self, usize) {
        let (info, dropped) = Fields::capped(entry.info);
        let event = Self {
            timestamp: Utc::now(),
            result: entry.result,
            elapsed_time: entry.elapsed,
            context,
            info,
            action: entry.action,
            error_code: entry.error_code,
            error_message: entry.error_message.map(truncate),
        };
        (event, dropped)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn result(&self) -> LogResult {
        self.result
    }

    pub fn elapsed_time(&self) -> Duration {
        self.elapsed_time
    }

    pub fn context(&self) -> &Fields {
        &self.context
    }

    pub fn info(&self) -> &Fields {
        &self.info
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Description of an event to append.
///
/// Values are rendered when they are added, so a value whose `Display` fails is recorded as
/// `"ERR# ..."` instead of failing the append.
#[derive(Debug, Clone)]
pub struct Entry {
    result: LogResult,
    action: Option<String>,
    info: Vec<(String, String)>,
    error_code: Option<String>,
    error_message: Option<String>,
    elapsed: Duration,
}

impl Entry {
    pub fn new(result: LogResult) -> Self {
        Self {
            result,
            action: None,
            info: Vec::new(),
            error_code: None,
            error_message: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn ok() -> Self {
        Self::new(LogResult::Ok)
    }

    pub fn warn() -> Self {
        Self::new(LogResult::Warn)
    }

    pub fn error() -> Self {
        Self::new(LogResult::Error)
    }

    /// Identifier of the handler this event belongs to.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn info<V: fmt::Display + ?Sized>(mut self, key: impl Into<String>, value: &V) -> Self {
        self.info.push((key.into(), render(value)));
        self
    }

    /// Add a detail only when it is present; `None` is dropped.
    pub fn info_opt<V: fmt::Display>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.info(key, &v),
            None => self,
        }
    }

    pub fn info_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.info.extend(fields.into_iter().map(|(k, v)| (k.into(), render(&v))));
        self
    }

    pub fn failure(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Render a value for storage. Never fails: a broken `Display` degrades to `ERR# ...`.
pub(crate) fn render<V: fmt::Display + ?Sized>(value: &V) -> String {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut out = String::new();
        fmt::write(&mut out, format_args!("{}", value)).map(|()| out)
    }));
    match attempt {
        Ok(Ok(text)) => text,
        Ok(Err(fmt::Error)) => {
            tracing::warn!("event value failed to format; recording degraded value");
            degraded("value could not be formatted")
        }
        Err(payload) => {
            let reason = crate::error::panic_message(payload.as_ref());
            tracing::warn!(%reason, "event value panicked while formatting");
            degraded(&reason)
        }
    }
}

pub(crate) fn degraded(reason: &str) -> String {
    truncate(format!("{}{}", DEGRADED_PREFIX, reason))
}

/// Cut `value` to at most [`MAX_VALUE_CHARS`] characters.
pub(crate) fn truncate(mut value: String) -> String {
    if let Some((idx, _)) = value.char_indices().nth(MAX_VALUE_CHARS) {
        tracing::warn!(len = value.chars().count(), "truncating event value");
        value.truncate(idx);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let long = "é".repeat(MAX_VALUE_CHARS + 5);
        let cut = truncate(long);
        assert_eq!(cut.chars().count(), MAX_VALUE_CHARS);

        let short = "abc".to_string();
        assert_eq!(truncate(short), "abc");
    }

    #[test]
    fn capped_keeps_first_twenty_in_order() {
        let pairs = (0..25).map(|i| (format!("k{}", i), i.to_string()));
        let (fields, dropped) = Fields::capped(pairs);
        assert_eq!(fields.len(), MAX_FIELDS);
        assert_eq!(dropped, 5);
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.first(), Some(&"k0"));
        assert_eq!(keys.last(), Some(&"k19"));
        assert!(fields.get("k20").is_none());
    }

    #[test]
    fn capped_overwrites_repeated_keys() {
        let pairs = vec![("a".to_string(), "1".to_string()), ("a".to_string(), "2".to_string())];
        let (fields, dropped) = Fields::capped(pairs);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("a"), Some("2"));
        assert_eq!(dropped, 0);
    }

    #[test]
    fn broken_display_degrades() {
        let entry = Entry::ok().info("bad", &Broken);
        let (event, _) = LogEvent::build(entry, Fields::default());
        let value = event.info().get("bad").unwrap();
        assert!(value.starts_with(DEGRADED_PREFIX), "got {value}");
    }

    struct Exploding;

    impl fmt::Display for Exploding {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("cannot render order total")
        }
    }

    #[test]
    fn panicking_display_degrades_with_reason() {
        let entry = Entry::ok().info("total", &Exploding).info("items", &3);
        let (event, _) = LogEvent::build(entry, Fields::default());
        assert_eq!(
            event.info().get("total"),
            Some(format!("{}cannot render order total", DEGRADED_PREFIX).as_str())
        );
        assert_eq!(event.info().get("items"), Some("3"));
    }

    #[test]
    fn info_opt_drops_absent_values() {
        let entry = Entry::ok().info_opt("present", Some(1)).info_opt::<u8>("absent", None);
        let (event, _) = LogEvent::build(entry, Fields::default());
        assert_eq!(event.info().get("present"), Some("1"));
        assert!(event.info().get("absent").is_none());
    }

    #[test]
    fn serializes_camel_case_with_iso_timestamp() {
        let entry = Entry::error()
            .action("checkout")
            .failure("API_ERROR_500", "boom")
            .elapsed(Duration::from_millis(1500))
            .info("cart", &3);
        let (event, _) = LogEvent::build(entry, Fields::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["result"], "ERROR");
        assert_eq!(json["elapsedTime"], 1500);
        assert_eq!(json["action"], "checkout");
        assert_eq!(json["errorCode"], "API_ERROR_500");
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["info"]["cart"], "3");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok(), "not ISO-8601: {ts}");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let (event, _) = LogEvent::build(Entry::ok(), Fields::default());
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("action").is_none());
        assert!(json.get("errorCode").is_none());
        assert_eq!(json["elapsedTime"], 0);
    }

    #[test]
    fn error_message_is_truncated() {
        let entry = Entry::error().failure("X", "m".repeat(MAX_VALUE_CHARS * 2));
        let (event, _) = LogEvent::build(entry, Fields::default());
        assert_eq!(event.error_message().unwrap().chars().count(), MAX_VALUE_CHARS);
    }
}
