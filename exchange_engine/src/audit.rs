//! Append-only audit trail encoding.
//!
//! A transaction's history column holds a list of audit entries concatenated with the `%%%` record
//! separator. Two field-delimiter schemes exist in the wild: current entries use `$`, older rows use
//! `&`. New writes always use `$`; reads must accept both. Anything that fits neither scheme is
//! preserved verbatim as an opaque entry so that no legacy data is ever dropped.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Separates audit entries inside the history column.
pub const RECORD_SEPARATOR: &str = "%%%";
/// Field delimiter for newly written entries.
pub const FIELD_DELIMITER: char = '$';
/// Legacy field delimiter, accepted on read only.
pub const LEGACY_FIELD_DELIMITER: char = '&';

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEntry {
    Event {
        /// Naive Bali wall-clock time, second precision.
        timestamp: NaiveDateTime,
        /// Chat-facing handle of whoever triggered the change.
        actor: String,
        /// Event label, usually the target status name.
        event: String,
        /// Permalink to the chat message that triggered the change.
        permalink: String,
    },
    /// Legacy text that matched neither delimiter scheme. Kept as-is.
    Opaque(String),
}

impl AuditEntry {
    pub fn new<S1, S2, S3>(timestamp: NaiveDateTime, actor: S1, event: S2, permalink: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Event {
            timestamp,
            actor: actor.into(),
            event: event.into(),
            permalink: permalink.into(),
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, AuditEntry::Opaque(_))
    }

    pub fn event(&self) -> Option<&str> {
        match self {
            AuditEntry::Event { event, .. } => Some(event),
            AuditEntry::Opaque(_) => None,
        }
    }

    /// Encodes the entry with the current `$` scheme. Opaque entries are reproduced verbatim.
    pub fn encode(&self) -> String {
        match self {
            AuditEntry::Event { timestamp, actor, event, permalink } => {
                let d = FIELD_DELIMITER;
                format!("{}{d}{actor}{d}{event}{d}{permalink}", timestamp.format(TS_FORMAT))
            },
            AuditEntry::Opaque(raw) => raw.clone(),
        }
    }
}

fn decode_entry(raw: &str) -> AuditEntry {
    let delimiter = if raw.contains(FIELD_DELIMITER) {
        FIELD_DELIMITER
    } else if raw.contains(LEGACY_FIELD_DELIMITER) {
        LEGACY_FIELD_DELIMITER
    } else {
        return AuditEntry::Opaque(raw.to_string());
    };
    let parts: Vec<&str> = raw.splitn(4, delimiter).collect();
    if parts.len() < 4 {
        return AuditEntry::Opaque(raw.to_string());
    }
    match NaiveDateTime::parse_from_str(parts[0].trim(), TS_FORMAT) {
        Ok(timestamp) => AuditEntry::new(timestamp, parts[1].trim(), parts[2].trim(), parts[3].trim()),
        Err(_) => AuditEntry::Opaque(raw.to_string()),
    }
}

/// Decodes a full history column. Empty input yields an empty trail.
pub fn decode_history(history: &str) -> Vec<AuditEntry> {
    if history.is_empty() {
        return Vec::new();
    }
    history.split(RECORD_SEPARATOR).map(decode_entry).collect()
}

/// Appends one entry to an encoded history, inserting the record separator only when needed.
pub fn append_entry(history: &str, entry: &AuditEntry) -> String {
    if history.is_empty() {
        entry.encode()
    } else {
        format!("{history}{RECORD_SEPARATOR}{}", entry.encode())
    }
}
