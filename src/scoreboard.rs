use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::database::GroupStore;
use crate::error::{LedgerError, StoreResult};
use crate::leaderboard::{ActivityItem, LeaderboardAnalyzer, RoomLeaderboard};
use crate::ledger::{now, GroupRecord, HistoryEntry, Ledger};
use crate::rank::{progress_to_next, resolve_rank, Progress, RankTier};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AwardedGroup {
    pub group_name: String,
    pub previous_xp: i64,
    pub balance: i64,
    pub tier: &'static str,
    pub promoted: bool,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct AwardReport {
    pub updated: usize,
    pub missing: Vec<String>,
    pub groups: Vec<AwardedGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    Awarded(AwardReport),
    /// Nothing was written because a balance would go out of range.
    Rejected(LedgerError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(GroupRecord),
    Duplicate,
    InvalidName,
    UnknownRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Edited(GroupRecord),
    NotFound,
    Rejected(LedgerError),
}

/// Entry point used by the presentation layer. Each mutation is one
/// fetch-modify-save cycle against the store followed by a re-read, so the
/// caller always sees what was actually persisted.
pub struct Scoreboard<S: GroupStore> {
    store: S,
    ledger: Ledger,
    analyzer: LeaderboardAnalyzer,
    rooms: Vec<String>,
    write_lock: Mutex<()>,
}

impl<S: GroupStore> Scoreboard<S> {
    pub fn new(store: S, ledger: Ledger, rooms: Vec<String>) -> Self {
        Scoreboard {
            store,
            ledger,
            analyzer: LeaderboardAnalyzer::new(),
            rooms,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(store: S, config: &AppConfig) -> Self {
        let ledger = Ledger::new(config.ledger.clone(), &config.achievements);
        Self::new(store, ledger, config.rooms.clone())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn list_groups(&self, room: &str) -> StoreResult<Vec<GroupRecord>> {
        Ok(self
            .fetch()?
            .into_iter()
            .filter(|r| r.room == room)
            .collect())
    }

    pub fn find_group(&self, room: &str, group_name: &str) -> StoreResult<Option<GroupRecord>> {
        Ok(self
            .fetch()?
            .into_iter()
            .find(|r| r.is(room, group_name)))
    }

    pub fn award(
        &self,
        room: &str,
        group_names: &[String],
        amount: i64,
        reason: &str,
    ) -> StoreResult<AwardOutcome> {
        let _guard = self.lock();

        let mut records = self.fetch()?;
        let outcome = match self
            .ledger
            .apply_batch(&mut records, room, group_names, amount, reason)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(room, amount, error = %e, "award rejected");
                return Ok(AwardOutcome::Rejected(e));
            }
        };

        if !outcome.missing.is_empty() {
            warn!(room, missing = ?outcome.missing, "award skipped unknown groups");
        }
        if outcome.updated.is_empty() {
            return Ok(AwardOutcome::Awarded(AwardReport {
                updated: 0,
                missing: outcome.missing,
                groups: Vec::new(),
            }));
        }

        self.store.save(&records)?;

        let reloaded = self.fetch()?;
        let groups = outcome
            .updated
            .iter()
            .map(|update| {
                let balance = reloaded
                    .iter()
                    .find(|r| r.is(room, &update.group_name))
                    .map(|r| r.xp())
                    .unwrap_or(update.balance);
                let old_tier = resolve_rank(update.previous_xp);
                let new_tier = resolve_rank(balance);
                AwardedGroup {
                    group_name: update.group_name.clone(),
                    previous_xp: update.previous_xp,
                    balance,
                    tier: new_tier.name,
                    promoted: new_tier.min_xp > old_tier.min_xp,
                }
            })
            .collect::<Vec<_>>();

        for group in groups.iter().filter(|g| g.promoted) {
            info!(room, group = %group.group_name, tier = group.tier, "group promoted");
        }
        info!(room, amount, reason, updated = groups.len(), "award saved");

        Ok(AwardOutcome::Awarded(AwardReport {
            updated: groups.len(),
            missing: outcome.missing,
            groups,
        }))
    }

    pub fn edit_history(
        &self,
        room: &str,
        group_name: &str,
        entries: Vec<HistoryEntry>,
    ) -> StoreResult<EditOutcome> {
        let _guard = self.lock();

        let mut records = self.fetch()?;
        let Some(record) = records.iter_mut().find(|r| r.is(room, group_name)) else {
            warn!(room, group = group_name, "history edit for unknown group");
            return Ok(EditOutcome::NotFound);
        };
        *record = match self.ledger.power_edit(record, entries) {
            Ok(edited) => edited,
            Err(e) => {
                warn!(room, group = group_name, error = %e, "history edit rejected");
                return Ok(EditOutcome::Rejected(e));
            }
        };
        self.store.save(&records)?;

        Ok(match self.reload(room, group_name)? {
            Some(record) => EditOutcome::Edited(record),
            None => EditOutcome::NotFound,
        })
    }

    pub fn create_group(&self, room: &str, group_name: &str, members: &str) -> StoreResult<CreateOutcome> {
        let group_name = group_name.trim();
        if group_name.is_empty() {
            return Ok(CreateOutcome::InvalidName);
        }
        if !self.rooms.iter().any(|r| r == room) {
            warn!(room, "group creation in unknown room");
            return Ok(CreateOutcome::UnknownRoom);
        }

        let _guard = self.lock();

        let mut records = self.fetch()?;
        if records.iter().any(|r| r.is(room, group_name)) {
            warn!(room, group = group_name, "duplicate group name rejected");
            return Ok(CreateOutcome::Duplicate);
        }
        let created = GroupRecord::new(room, group_name, members.trim(), now());
        records.push(created.clone());
        self.store.save(&records)?;
        info!(room, group = group_name, "group created");

        let record = self.reload(room, group_name)?.unwrap_or(created);
        Ok(CreateOutcome::Created(record))
    }

    pub fn delete_group(&self, room: &str, group_name: &str) -> StoreResult<DeleteOutcome> {
        let _guard = self.lock();

        let mut records = self.fetch()?;
        let before = records.len();
        records.retain(|r| !r.is(room, group_name));
        if records.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }
        self.store.save(&records)?;
        info!(room, group = group_name, "group deleted");

        if self.reload(room, group_name)?.is_some() {
            warn!(room, group = group_name, "group still present after delete");
        }
        Ok(DeleteOutcome::Deleted)
    }

    pub fn leaderboard(&self, room: &str) -> StoreResult<RoomLeaderboard> {
        let records = self.fetch()?;
        Ok(self.analyzer.generate_leaderboard(room, &records))
    }

    pub fn activity(&self, room: &str, limit: usize) -> StoreResult<Vec<ActivityItem>> {
        let records = self.fetch()?;
        Ok(self.analyzer.room_activity(room, &records, limit))
    }

    pub fn rank_of(&self, xp: i64) -> &'static RankTier {
        resolve_rank(xp)
    }

    pub fn progress_of(&self, xp: i64) -> Progress {
        progress_to_next(xp)
    }

    fn fetch(&self) -> StoreResult<Vec<GroupRecord>> {
        Ok(self
            .store
            .fetch_all()?
            .into_iter()
            .map(|record| self.ledger.settle(record))
            .collect())
    }

    fn reload(&self, room: &str, group_name: &str) -> StoreResult<Option<GroupRecord>> {
        self.find_group(room, group_name)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
