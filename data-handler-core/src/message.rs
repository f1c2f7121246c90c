//! Consumed broker records and their console rendering.

use crate::{HandlerError, HandlerResult, MessageRenderer};
use colored::Colorize;
use serde_json::Value;
use std::io::Write;

/// Read-only view over one broker record
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: Value,
}

impl ConsumedMessage {
    /// Build a message from raw key and payload bytes.
    ///
    /// The key is decoded as UTF-8. The payload is decoded as JSON; a payload that is
    /// not valid JSON is kept as a JSON string of its (lossy) UTF-8 text and an empty
    /// payload becomes `null`.
    pub fn from_raw(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
    ) -> Self {
        let key = key.map(|k| String::from_utf8_lossy(k).into_owned());
        let value = match payload {
            None | Some([]) => Value::Null,
            Some(bytes) => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        };

        Self {
            topic: topic.into(),
            partition,
            offset,
            key,
            value,
        }
    }

    /// Pretty-printed JSON value
    pub fn value_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap_or_else(|_| self.value.to_string())
    }

    /// Multi-line block shown for each message
    pub fn render_block(&self) -> String {
        let key = self.key.as_deref().unwrap_or("None");
        format!(
            "\n{}\n{} {}\n{} {}\n{} {}\n{} {} (record identifier)\n{} {}",
            "=".repeat(50).yellow(),
            "Topic:".green(),
            self.topic,
            "Partition:".green(),
            self.partition,
            "Offset:".green(),
            self.offset,
            "-- Key:".green(),
            key,
            "-- Value:".green(),
            self.value_pretty(),
        )
    }
}

/// Writes rendered blocks to a byte sink, stdout by default
pub struct ConsoleRenderer<W = std::io::Stdout> {
    out: W,
}

impl ConsoleRenderer {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MessageRenderer for ConsoleRenderer<W> {
    fn render(&mut self, message: &ConsumedMessage) -> HandlerResult<()> {
        writeln!(self.out, "{}", message.render_block())
            .and_then(|_| self.out.flush())
            .map_err(|e| HandlerError::stream_with_source("Failed to write message", e))
    }
}
