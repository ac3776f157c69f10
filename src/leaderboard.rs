use serde::Serialize;
use std::cmp::Reverse;

use crate::achievements::Badge;
use crate::ledger::{GroupRecord, Transaction};
use crate::rank::{progress_to_next, resolve_rank, PROBATION, RANKS};

pub const PODIUM_SIZE: usize = 3;

#[derive(Serialize, Clone, Debug)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub group_name: String,
    pub members: String,
    pub xp: i64,
    pub tier: &'static str,
    pub tier_label: &'static str,
    pub perk: &'static str,
    pub color: &'static str,
    pub progress: f64,
    pub progress_label: String,
    pub badges: Vec<Badge>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TierCount {
    pub tier: &'static str,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct RoomSummary {
    pub total_groups: usize,
    pub total_xp: i64,
    pub average_xp: f64,
    pub on_probation: Vec<String>,
    pub tier_breakdown: Vec<TierCount>,
}

#[derive(Serialize, Clone, Debug)]
pub struct RoomLeaderboard {
    pub room: String,
    pub podium: Vec<String>,
    pub entries: Vec<LeaderboardEntry>,
    pub summary: RoomSummary,
}

#[derive(Serialize, Clone, Debug)]
pub struct ActivityItem {
    pub group_name: String,
    #[serde(flatten)]
    pub transaction: Transaction,
}

pub struct LeaderboardAnalyzer;

impl LeaderboardAnalyzer {
    pub fn new() -> Self {
        LeaderboardAnalyzer
    }

    pub fn generate_leaderboard(&self, room: &str, records: &[GroupRecord]) -> RoomLeaderboard {
        let mut ranked: Vec<&GroupRecord> = records.iter().filter(|r| r.room == room).collect();
        ranked.sort_by(|a, b| b.xp().cmp(&a.xp()).then_with(|| a.group_name.cmp(&b.group_name)));

        let entries: Vec<LeaderboardEntry> = ranked
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let tier = resolve_rank(record.xp());
                let progress = progress_to_next(record.xp());
                LeaderboardEntry {
                    position: i + 1,
                    group_name: record.group_name.clone(),
                    members: record.members.clone(),
                    xp: record.xp(),
                    tier: tier.name,
                    tier_label: tier.label,
                    perk: tier.perk,
                    color: tier.color,
                    progress: progress.fraction,
                    progress_label: progress.label,
                    badges: record.badges().iter().copied().collect(),
                }
            })
            .collect();

        let podium = entries
            .iter()
            .take(PODIUM_SIZE)
            .map(|e| e.group_name.clone())
            .collect();

        let summary = self.summarize(&ranked);

        RoomLeaderboard {
            room: room.to_string(),
            podium,
            entries,
            summary,
        }
    }

    /// Every transaction of the room, newest first, capped at `limit`.
    pub fn room_activity(&self, room: &str, records: &[GroupRecord], limit: usize) -> Vec<ActivityItem> {
        let mut items: Vec<ActivityItem> = records
            .iter()
            .filter(|r| r.room == room)
            .flat_map(|r| {
                r.history().iter().map(move |t| ActivityItem {
                    group_name: r.group_name.clone(),
                    transaction: t.clone(),
                })
            })
            .collect();

        items.sort_by_key(|item| Reverse(item.transaction.timestamp));
        items.truncate(limit);
        items
    }

    fn summarize(&self, ranked: &[&GroupRecord]) -> RoomSummary {
        let total_groups = ranked.len();
        let total_xp: i64 = ranked.iter().map(|r| r.xp()).sum();

        let on_probation = ranked
            .iter()
            .filter(|r| r.xp() < 0)
            .map(|r| r.group_name.clone())
            .collect();

        let tier_breakdown = RANKS
            .iter()
            .chain(std::iter::once(&PROBATION))
            .map(|tier| TierCount {
                tier: tier.name,
                label: tier.label,
                count: ranked.iter().filter(|r| resolve_rank(r.xp()) == tier).count(),
            })
            .collect();

        RoomSummary {
            total_groups,
            total_xp,
            average_xp: if total_groups > 0 { total_xp as f64 / total_groups as f64 } else { 0.0 },
            on_probation,
            tier_breakdown,
        }
    }
}

impl Default for LeaderboardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn scored(room: &str, name: &str, amounts: &[i64]) -> GroupRecord {
        let ledger = Ledger::default();
        let mut record = GroupRecord::new(room, name, "", at(0));
        for (i, amount) in amounts.iter().enumerate() {
            record = ledger.apply_at(&record, *amount, "test", at(i as u32 + 1)).unwrap().1;
        }
        record
    }

    #[test]
    fn test_sorted_by_xp_then_name() {
        let records = vec![
            scored("ม.1/1", "Bravo", &[100]),
            scored("ม.1/1", "Alpha", &[100]),
            scored("ม.1/1", "Charlie", &[700]),
            scored("ม.1/1", "Delta", &[-10]),
            scored("ม.1/2", "Other", &[5000]),
        ];

        let board = LeaderboardAnalyzer::new().generate_leaderboard("ม.1/1", &records);
        let names: Vec<&str> = board.entries.iter().map(|e| e.group_name.as_str()).collect();

        assert_eq!(names, vec!["Charlie", "Alpha", "Bravo", "Delta"]);
        assert_eq!(board.podium, vec!["Charlie", "Alpha", "Bravo"]);
        assert_eq!(board.entries[0].tier, "DIRECTOR");
        assert_eq!(board.entries[3].tier, "PROBATION");
        assert_eq!(board.entries[3].position, 4);
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            scored("ม.1/1", "A", &[150]),
            scored("ม.1/1", "B", &[50]),
            scored("ม.1/1", "C", &[-20]),
        ];

        let summary = LeaderboardAnalyzer::new().generate_leaderboard("ม.1/1", &records).summary;

        assert_eq!(summary.total_groups, 3);
        assert_eq!(summary.total_xp, 180);
        assert!((summary.average_xp - 60.0).abs() < 1e-9);
        assert_eq!(summary.on_probation, vec!["C".to_string()]);

        let count_of = |name: &str| {
            summary
                .tier_breakdown
                .iter()
                .find(|t| t.tier == name)
                .map(|t| t.count)
        };
        assert_eq!(count_of("EMPLOYEE"), Some(1));
        assert_eq!(count_of("INTERN"), Some(1));
        assert_eq!(count_of("PROBATION"), Some(1));
        assert_eq!(count_of("PRESIDENT"), Some(0));
    }

    #[test]
    fn test_empty_room() {
        let board = LeaderboardAnalyzer::new().generate_leaderboard("ม.1/10", &[]);
        assert!(board.entries.is_empty());
        assert!(board.podium.is_empty());
        assert_eq!(board.summary.average_xp, 0.0);
    }

    #[test]
    fn test_activity_is_newest_first_and_limited() {
        let records = vec![
            scored("ม.1/1", "A", &[10, 20]),
            scored("ม.1/1", "B", &[5, 5, 5]),
            scored("ม.1/2", "X", &[1]),
        ];

        let feed = LeaderboardAnalyzer::new().room_activity("ม.1/1", &records, 3);

        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].group_name, "B");
        assert_eq!(feed[0].transaction.timestamp, at(3));
        assert!(feed.windows(2).all(|w| w[0].transaction.timestamp >= w[1].transaction.timestamp));
    }
}
