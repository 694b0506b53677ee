use std::fmt::Display;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use xge_common::{Idr, Rub};

use crate::audit::{decode_history, AuditEntry};

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------       TxNumber      ---------------------------------------------------------
/// Human-readable transaction number, derived from wall clock, actor id and message id at creation time.
/// The format is part of the durable-state contract and must never change:
/// `DDMM` + last 3 digits of the actor id + `HHMM` + milliseconds (3 digits) + last 2 digits of the message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TxNumber(pub String);

impl FromStr for TxNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TxNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TxNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TxNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        ChatId       ---------------------------------------------------------
/// Identifier of the partner chat a transaction originated from. Scopes reporting and the control counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ChatId(pub i64);

impl Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

//--------------------------------------   TransactionStatus  --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// A live order awaiting payment evidence.
    Created,
    /// Informational-only request taken outside shift hours. Terminal.
    Night,
    /// Payment evidence submitted, awaiting operator review.
    Control,
    /// Confirmed by an operator; eligible for the next invoice.
    Accept,
    /// Grouped into an invoice, awaiting payout.
    Bill,
    /// Paid out and reconciled. Terminal.
    Accounted,
    /// Archived by the shift sweep. Revivable.
    Timeout,
    /// Administratively cancelled. Terminal.
    Cancel,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Night => "night",
            TransactionStatus::Control => "control",
            TransactionStatus::Accept => "accept",
            TransactionStatus::Bill => "bill",
            TransactionStatus::Accounted => "accounted",
            TransactionStatus::Timeout => "timeout",
            TransactionStatus::Cancel => "cancel",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "night" => Ok(Self::Night),
            "control" => Ok(Self::Control),
            "accept" => Ok(Self::Accept),
            "bill" => Ok(Self::Bill),
            "accounted" => Ok(Self::Accounted),
            "timeout" => Ok(Self::Timeout),
            "cancel" => Ok(Self::Cancel),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl TransactionStatus {
    /// Terminal states admit no further transitions through the normal table.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Night | TransactionStatus::Accounted | TransactionStatus::Cancel)
    }

    /// The legal transition table. Callers must name the exact target; nothing is inferred.
    ///
    /// | From \ To | control | accept | bill | accounted | timeout | created | cancel |
    /// |-----------|---------|--------|------|-----------|---------|---------|--------|
    /// | created   | ✓       |        |      |           | ✓       |         | ✓      |
    /// | night     |         |        |      |           |         |         |        |
    /// | control   |         | ✓      |      |           |         |         | ✓      |
    /// | accept    |         |        | ✓    |           |         |         | ✓      |
    /// | bill      |         |        |      | ✓         |         |         | ✓      |
    /// | accounted |         |        |      |           |         |         |        |
    /// | timeout   |         | ✓      |      |           |         | ✓       | ✓      |
    /// | cancel    |         |        |      |           |         |         |        |
    ///
    /// `timeout → accept` covers the direct path for a swept order whose payment evidence turns
    /// up after the opening sweep.
    pub fn can_transition_to(&self, target: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (*self, target),
            (Created, Control | Timeout | Cancel) |
                (Control, Accept | Cancel) |
                (Accept, Bill | Cancel) |
                (Bill, Accounted | Cancel) |
                (Timeout, Created | Accept | Cancel)
        )
    }
}

//--------------------------------------        Role         ---------------------------------------------------------
/// Staff roles, in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Operator,
    Admin,
    SuperAdmin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Operator => "operator",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "operator" => Ok(Self::Operator),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::SuperAdmin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

impl Role {
    pub fn at_least(&self, required: Role) -> bool {
        *self >= required
    }
}

//--------------------------------------        Actor        ---------------------------------------------------------
/// The identity behind an inbound intent. The chat dispatcher owns the user registry; the engine only
/// trusts the role it is handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    /// Chat-facing handle, e.g. `@operator_nick`.
    pub display: String,
    pub role: Role,
}

impl Actor {
    pub fn new<S: Into<String>>(id: i64, display: S, role: Role) -> Self {
        Self { id, display: display.into(), role }
    }
}

//--------------------------------------     Transaction     ---------------------------------------------------------
/// Placeholder payout snapshot recorded on informational night requests.
pub const NIGHT_ACCOUNT_INFO: &str = "night request";
/// Placeholder snapshot recorded on refund orders, whose payout details arrive from the client later.
pub const REFUND_ACCOUNT_INFO: &str = "refund transfer";

/// A stored exchange order.
///
/// All naive timestamps on this row (`created_at`, `status_changed_at`, the audit trail) are Bali
/// wall-clock time, the same base the shift window and the sweep cutoff are expressed in.
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub transaction_number: TxNumber,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub idr_amount: Idr,
    pub rate_used: f64,
    pub rub_amount: Rub,
    pub note: Option<String>,
    /// Immutable snapshot of the payout/refund instructions quoted at creation.
    pub account_info: String,
    pub status: TransactionStatus,
    pub status_changed_at: NaiveDateTime,
    /// Encoded audit trail. Use [`Transaction::audit_trail`] rather than parsing this directly.
    pub history: String,
    pub source_chat: ChatId,
    pub crm_number: Option<String>,
}

impl Transaction {
    /// Decodes the append-only audit trail, accepting both legacy field-delimiter schemes.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        decode_history(&self.history)
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_number: TxNumber,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub idr_amount: Idr,
    pub rate_used: f64,
    pub rub_amount: Rub,
    pub account_info: String,
    pub status: TransactionStatus,
    pub history: String,
    pub source_chat: ChatId,
}

//--------------------------------------      RateTable      ---------------------------------------------------------
/// The published rate card: base rate, four ascending tier rates, the refund back-rate and the
/// special-account threshold. Exactly one row is `is_actual` at any time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RateTable {
    pub id: i64,
    pub main_rate: f64,
    pub rate1: f64,
    pub rate2: f64,
    pub rate3: f64,
    pub rate4: f64,
    pub rate_back: f64,
    /// RUB amount at or above which payouts switch to the special overflow account.
    pub special_threshold: Rub,
    pub is_actual: bool,
}

impl RateTable {
    /// Rates for tiers 1..=5, in ascending tier order. Tier 1 uses the base rate.
    pub fn tier_rates(&self) -> [f64; 5] {
        [self.main_rate, self.rate1, self.rate2, self.rate3, self.rate4]
    }
}

#[derive(Debug, Clone)]
pub struct NewRateTable {
    pub main_rate: f64,
    pub rate1: f64,
    pub rate2: f64,
    pub rate3: f64,
    pub rate4: f64,
    pub rate_back: f64,
    pub special_threshold: Rub,
}

//--------------------------------------      RateLimits     ---------------------------------------------------------
/// RUB-denominated upper bounds of the four lower tiers. Amounts beyond `tier4` price at the top rate.
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize)]
pub struct RateLimits {
    pub tier1: Rub,
    pub tier2: Rub,
    pub tier3: Rub,
    pub tier4: Rub,
}

impl RateLimits {
    pub fn bounds(&self) -> [Rub; 4] {
        [self.tier1, self.tier2, self.tier3, self.tier4]
    }
}

//--------------------------------------     BankAccount     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_number: i64,
    pub bank: String,
    pub card_number: String,
    pub recipient_name: String,
    pub sbp_phone: String,
    pub is_active: bool,
    /// The one primary payout account.
    pub is_actual: bool,
    /// The one overflow account used above the special threshold.
    pub is_special: bool,
}

impl BankAccount {
    pub fn summary(&self) -> String {
        format!("{} - {} - {} - {}", self.bank, self.card_number, self.recipient_name, self.sbp_phone)
    }
}

/// Builds the immutable `account_info` snapshot stored on a transaction at creation.
pub fn account_info_snapshot(accounts: &[BankAccount]) -> String {
    if accounts.is_empty() {
        return "-".to_string();
    }
    accounts.iter().map(BankAccount::summary).collect::<Vec<_>>().join(" | ")
}

#[derive(Debug, Clone)]
pub struct NewBankAccount {
    pub bank: String,
    pub card_number: String,
    pub recipient_name: String,
    pub sbp_phone: String,
    pub created_by: i64,
}

//--------------------------------------    ShiftSettings    ---------------------------------------------------------
/// The working-shift window, local wall-clock with no date. Re-read from the store on every scheduler
/// tick, so runtime edits take effect within a minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSettings {
    pub shift_start: NaiveTime,
    pub shift_end: NaiveTime,
}

impl ShiftSettings {
    /// Accepts both `%H:%M:%S` and `%H:%M`, matching what operators have historically stored.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConversionError> {
        Ok(Self { shift_start: parse_shift_time(start)?, shift_end: parse_shift_time(end)? })
    }

    /// True when `t` falls inside the working window `[shift_start, shift_end)`, handling windows
    /// that wrap past midnight.
    pub fn in_shift(&self, t: NaiveTime) -> bool {
        if self.shift_start <= self.shift_end {
            self.shift_start <= t && t < self.shift_end
        } else {
            t >= self.shift_start || t < self.shift_end
        }
    }

    pub fn is_night(&self, t: NaiveTime) -> bool {
        !self.in_shift(t)
    }
}

pub fn parse_shift_time(value: &str) -> Result<NaiveTime, ConversionError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M"))
        .map_err(|e| ConversionError(format!("Invalid shift time '{value}': {e}")))
}
