// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stage-local structured logs.
//!
//! Every pipeline stage returns its log entries as values alongside its
//! result; entries are concatenated at stage joins and flushed through
//! `tracing` in order. This keeps the per-run log stream ordered even
//! though providers are processed concurrently, and lets pure stages stay
//! pure.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn debug(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Debug, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into() }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warn, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into() }
    }
}

/// Flush entries through `tracing` in order.
pub fn flush(entries: &[LogEntry]) {
    for entry in entries {
        match entry.level {
            LogLevel::Debug => tracing::debug!("{}", entry.message),
            LogLevel::Info => tracing::info!("{}", entry.message),
            LogLevel::Warn => tracing::warn!("{}", entry.message),
            LogLevel::Error => tracing::error!("{}", entry.message),
        }
    }
}

/// Prefix every entry with a provider label, preserving levels. Used when
/// joining per-provider stages so interleaved origins stay readable.
pub fn prefixed(label: &str, entries: Vec<LogEntry>) -> Vec<LogEntry> {
    entries
        .into_iter()
        .map(|entry| LogEntry { level: entry.level, message: format!("[{label}] {}", entry.message) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixing_preserves_level_and_order() {
        let entries = vec![LogEntry::warn("low funds"), LogEntry::error("bad blob")];
        let prefixed = prefixed("ropsten/infura", entries);
        assert_eq!(prefixed[0].level, LogLevel::Warn);
        assert_eq!(prefixed[0].message, "[ropsten/infura] low funds");
        assert_eq!(prefixed[1].level, LogLevel::Error);
    }
}
