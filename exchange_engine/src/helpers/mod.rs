//! Clock, numbering and permalink helpers shared by the lifecycle engine and the scheduler.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{ChatId, TxNumber};

/// The exchange desk operates on Bali wall-clock time (UTC+8, no DST).
pub const BALI_UTC_OFFSET_HOURS: i32 = 8;

pub fn bali_offset() -> FixedOffset {
    FixedOffset::east_opt(BALI_UTC_OFFSET_HOURS * 3600).expect("static offset is valid")
}

pub fn bali_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&bali_offset())
}

/// Naive Bali wall-clock timestamp, second precision. Every stored timestamp (order rows, audit
/// entries, the sweep cutoff) uses this one base.
pub fn bali_now_naive() -> NaiveDateTime {
    bali_now().naive_local().with_nanosecond(0).expect("zero nanoseconds is valid")
}

/// Allocates a transaction number from the Bali wall clock plus actor and message identifiers.
///
/// Format (16 digits): `DDMM` + last 3 digits of the actor id + `HHMM` + milliseconds (3 digits) +
/// last 2 digits of the message id. The actor and message digits keep concurrent same-millisecond
/// requests from different chats distinct. Part of the durable-state contract.
pub fn allocate_tx_number(now: DateTime<FixedOffset>, actor_id: i64, message_id: i64) -> TxNumber {
    let ms = now.timestamp_subsec_millis().min(999);
    let number = format!(
        "{}{}{}{:03}{}",
        now.format("%d%m"),
        last_digits(actor_id, 3),
        now.format("%H%M"),
        ms,
        last_digits(message_id, 2),
    );
    TxNumber(number)
}

fn last_digits(value: i64, count: usize) -> String {
    let digits = value.unsigned_abs().to_string();
    let tail = if digits.len() > count { &digits[digits.len() - count..] } else { &digits };
    format!("{tail:0>count$}")
}

//--------------------------------------      MessageRef     ---------------------------------------------------------
/// A permalink-capable reference to the chat message that carried an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: ChatId,
    /// Public chat handle, when the chat has one. Private chats link through the `/c/` form.
    pub chat_username: Option<String>,
    pub message_id: i64,
}

impl MessageRef {
    pub fn new(chat: ChatId, message_id: i64) -> Self {
        Self { chat, chat_username: None, message_id }
    }

    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.chat_username = Some(username.into());
        self
    }

    /// Builds the t.me permalink for this message. Private supergroup ids drop their `-100` prefix,
    /// other negative ids drop the sign, matching how the chat platform forms `/c/` links.
    pub fn permalink(&self) -> String {
        if let Some(username) = &self.chat_username {
            return format!("https://t.me/{username}/{}", self.message_id);
        }
        let chat = self.chat.0.to_string();
        let trimmed = chat.strip_prefix("-100").or_else(|| chat.strip_prefix('-')).unwrap_or(&chat);
        format!("https://t.me/c/{trimmed}/{}", self.message_id)
    }
}
