use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::achievements::{AchievementConfig, AchievementEvaluator, Badge};
use crate::error::{LedgerError, LedgerResult};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reason recorded on the synthesized entry that carries a pre-ledger score.
pub const OPENING_BALANCE_REASON: &str = "ยอดยกมา (opening balance)";

pub mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const ACCEPTED_FORMATS: [&str; 3] = [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        ACCEPTED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn serialize_option<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_some(&format(ts)),
            None => serializer.serialize_none(),
        }
    }
}

/// One signed score change. The JSON shape (`id`, `ts`, `reason`, `amount`,
/// `balance`) is what existing sheets store and must stay stable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "ts", with = "timestamp")]
    pub timestamp: NaiveDateTime,
    pub reason: String,
    pub amount: i64,
    #[serde(rename = "balance")]
    pub balance_after: i64,
}

/// A history row submitted for a power edit. `id` is kept when present.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "ts", alias = "timestamp", with = "timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub reason: String,
    pub amount: i64,
}

impl From<&Transaction> for HistoryEntry {
    fn from(tx: &Transaction) -> Self {
        HistoryEntry {
            id: Some(tx.id.clone()),
            timestamp: tx.timestamp,
            reason: tx.reason.clone(),
            amount: tx.amount,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GroupRecord {
    pub room: String,
    pub group_name: String,
    pub members: String,
    xp: i64,
    history: Vec<Transaction>,
    badges: BTreeSet<Badge>,
    #[serde(serialize_with = "timestamp::serialize_option")]
    pub last_updated: Option<NaiveDateTime>,
    /// Set when the opening entry was synthesized on load and badges have
    /// not been derived for it yet.
    #[serde(skip)]
    unsettled_opening: bool,
}

impl GroupRecord {
    pub fn new(room: &str, group_name: &str, members: &str, created_at: NaiveDateTime) -> Self {
        GroupRecord {
            room: room.to_string(),
            group_name: group_name.to_string(),
            members: members.to_string(),
            xp: 0,
            history: Vec::new(),
            badges: BTreeSet::new(),
            last_updated: Some(created_at),
            unsettled_opening: false,
        }
    }

    /// Rebuild a record from what a store adapter read back.
    ///
    /// `xp` is taken from the history sum. A row with a nonzero score but no
    /// history predates the ledger; its score becomes a single opening entry.
    pub fn from_stored(
        room: String,
        group_name: String,
        members: String,
        stored_xp: i64,
        mut history: Vec<Transaction>,
        badges: BTreeSet<Badge>,
        last_updated: Option<NaiveDateTime>,
    ) -> Self {
        let unsettled_opening = history.is_empty() && stored_xp != 0;
        if unsettled_opening {
            debug!(%room, %group_name, stored_xp, "synthesizing opening balance");
            history.push(Transaction {
                id: ulid::Ulid::new().to_string(),
                timestamp: last_updated.unwrap_or_default(),
                reason: OPENING_BALANCE_REASON.to_string(),
                amount: stored_xp,
                balance_after: stored_xp,
            });
        }

        let xp = history_sum(&history).unwrap_or_else(|| {
            warn!(%room, %group_name, "stored history overflows, saturating balance");
            history
                .iter()
                .fold(0i64, |acc, t| acc.saturating_add(t.amount))
        });
        if xp != stored_xp {
            warn!(%room, %group_name, stored_xp, xp, "stored score disagrees with history, using history");
        }

        GroupRecord {
            room,
            group_name,
            members,
            xp,
            history,
            badges,
            last_updated,
            unsettled_opening,
        }
    }

    pub fn xp(&self) -> i64 {
        self.xp
    }

    /// Newest first.
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub fn badges(&self) -> &BTreeSet<Badge> {
        &self.badges
    }

    pub fn is(&self, room: &str, group_name: &str) -> bool {
        self.room == room && self.group_name == group_name
    }
}

/// Sum of all amounts, or `None` if it does not fit in an `i64`.
pub fn history_sum(history: &[Transaction]) -> Option<i64> {
    history
        .iter()
        .try_fold(0i64, |acc, t| acc.checked_add(t.amount))
}

/// Local wall-clock time at the precision the sheet stores.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Keep balances from dropping below zero on `apply` (older behaviour).
    pub clamp_at_zero: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BatchUpdate {
    pub group_name: String,
    pub previous_xp: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub updated: Vec<BatchUpdate>,
    pub missing: Vec<String>,
}

impl BatchOutcome {
    pub fn updated_count(&self) -> usize {
        self.updated.len()
    }
}

/// Applies transactions to group records and re-derives balance and badges.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    evaluator: AchievementEvaluator,
}

impl Ledger {
    pub fn new(config: LedgerConfig, achievements: &AchievementConfig) -> Self {
        Ledger {
            config,
            evaluator: AchievementEvaluator::new(achievements),
        }
    }

    /// Derive badges for a record whose opening entry was synthesized on
    /// load. Other records come back unchanged.
    pub fn settle(&self, mut record: GroupRecord) -> GroupRecord {
        if record.unsettled_opening {
            record.badges = self.evaluator.evaluate(record.xp, &record.history);
            record.unsettled_opening = false;
        }
        record
    }

    pub fn apply(
        &self,
        record: &GroupRecord,
        amount: i64,
        reason: &str,
    ) -> LedgerResult<(i64, GroupRecord)> {
        self.apply_at(record, amount, reason, now())
    }

    pub fn apply_at(
        &self,
        record: &GroupRecord,
        amount: i64,
        reason: &str,
        at: NaiveDateTime,
    ) -> LedgerResult<(i64, GroupRecord)> {
        let out_of_range = || LedgerError::BalanceOutOfRange {
            group_name: record.group_name.clone(),
        };
        let before = history_sum(&record.history).ok_or_else(out_of_range)?;

        let amount = if self.config.clamp_at_zero {
            let target = before.checked_add(amount).ok_or_else(out_of_range)?.max(0);
            target.checked_sub(before).ok_or_else(out_of_range)?
        } else {
            amount
        };
        let balance = before.checked_add(amount).ok_or_else(out_of_range)?;

        let mut updated = record.clone();
        updated.history.insert(
            0,
            Transaction {
                id: ulid::Ulid::new().to_string(),
                timestamp: at,
                reason: reason.trim().to_string(),
                amount,
                balance_after: balance,
            },
        );
        updated.xp = balance;
        updated.badges = self.evaluator.evaluate(balance, &updated.history);
        updated.last_updated = Some(at);
        updated.unsettled_opening = false;

        debug!(
            room = %updated.room,
            group = %updated.group_name,
            amount,
            balance,
            "transaction applied"
        );
        Ok((balance, updated))
    }

    /// Apply one transaction to each named group of `room`. Names that do not
    /// resolve are reported in `missing`; the others are updated regardless.
    /// If any balance would go out of range, no record is touched.
    pub fn apply_batch(
        &self,
        records: &mut [GroupRecord],
        room: &str,
        group_names: &[String],
        amount: i64,
        reason: &str,
    ) -> LedgerResult<BatchOutcome> {
        self.apply_batch_at(records, room, group_names, amount, reason, now())
    }

    pub fn apply_batch_at(
        &self,
        records: &mut [GroupRecord],
        room: &str,
        group_names: &[String],
        amount: i64,
        reason: &str,
        at: NaiveDateTime,
    ) -> LedgerResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut staged = Vec::new();
        let mut seen = HashSet::new();

        for name in group_names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match records.iter().position(|r| r.is(room, name)) {
                Some(index) => {
                    let record = &records[index];
                    let previous_xp = record.xp;
                    let (balance, updated) = self.apply_at(record, amount, reason, at)?;
                    staged.push((index, updated));
                    outcome.updated.push(BatchUpdate {
                        group_name: name.clone(),
                        previous_xp,
                        balance,
                    });
                }
                None => outcome.missing.push(name.clone()),
            }
        }

        for (index, updated) in staged {
            records[index] = updated;
        }

        info!(
            room,
            amount,
            updated = outcome.updated_count(),
            missing = outcome.missing.len(),
            "batch applied"
        );
        Ok(outcome)
    }

    pub fn power_edit(
        &self,
        record: &GroupRecord,
        entries: Vec<HistoryEntry>,
    ) -> LedgerResult<GroupRecord> {
        self.power_edit_at(record, entries, now())
    }

    /// Replace the whole history. Entries are applied in timestamp order
    /// (stable, so equal timestamps keep their submitted order) and stored
    /// newest first.
    pub fn power_edit_at(
        &self,
        record: &GroupRecord,
        mut entries: Vec<HistoryEntry>,
        at: NaiveDateTime,
    ) -> LedgerResult<GroupRecord> {
        entries.sort_by_key(|e| e.timestamp);

        let mut seen_ids = HashSet::new();
        let mut running = 0i64;
        let mut history = Vec::with_capacity(entries.len());
        for entry in entries {
            running = running
                .checked_add(entry.amount)
                .ok_or_else(|| LedgerError::BalanceOutOfRange {
                    group_name: record.group_name.clone(),
                })?;
            let id = match entry.id {
                Some(id) if !id.trim().is_empty() && !seen_ids.contains(&id) => id,
                _ => ulid::Ulid::new().to_string(),
            };
            seen_ids.insert(id.clone());
            history.push(Transaction {
                id,
                timestamp: entry.timestamp,
                reason: entry.reason,
                amount: entry.amount,
                balance_after: running,
            });
        }
        history.reverse();

        let balance = running;
        let mut updated = record.clone();
        updated.history = history;
        updated.xp = balance;
        updated.badges = self.evaluator.evaluate(balance, &updated.history);
        updated.last_updated = Some(at);
        updated.unsettled_opening = false;

        info!(
            room = %updated.room,
            group = %updated.group_name,
            entries = updated.history.len(),
            balance,
            "history replaced"
        );
        Ok(updated)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new(LedgerConfig::default(), &AchievementConfig::default())
    }
}
