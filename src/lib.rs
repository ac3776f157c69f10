//! Classroom gamification scoreboard: per-group XP ledgers, rank tiers,
//! derived badges and a spreadsheet-style group store.

pub mod achievements;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod leaderboard;
pub mod ledger;
pub mod logging;
pub mod rank;
pub mod scoreboard;

pub use achievements::{AchievementConfig, AchievementEvaluator, Badge};
pub use database::{CsvGroupStore, GroupStore, MemoryGroupStore};
pub use error::{ApiError, LedgerError, StoreError, StoreResult};
pub use ledger::{BatchOutcome, GroupRecord, HistoryEntry, Ledger, LedgerConfig, Transaction};
pub use rank::{progress_to_next, resolve_rank, Progress, RankTier};
pub use scoreboard::{AwardOutcome, AwardReport, CreateOutcome, DeleteOutcome, EditOutcome, Scoreboard};
