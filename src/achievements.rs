use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ledger::Transaction;

pub const DEFAULT_WEALTHY_XP: i64 = 800;
pub const DEFAULT_BIG_SHOT_AMOUNT: i64 = 100;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    FirstBlood,
    Wealthy,
    Debtor,
    Sniper,
    Phoenix,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct BadgeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

impl Badge {
    pub const ALL: [Badge; 5] = [
        Badge::FirstBlood,
        Badge::Wealthy,
        Badge::Debtor,
        Badge::Sniper,
        Badge::Phoenix,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Badge::FirstBlood => "first_blood",
            Badge::Wealthy => "wealthy",
            Badge::Debtor => "debtor",
            Badge::Sniper => "sniper",
            Badge::Phoenix => "phoenix",
        }
    }

    pub fn info(self) -> BadgeInfo {
        match self {
            Badge::FirstBlood => BadgeInfo {
                name: "First Blood",
                description: "Received the first score entry",
                icon: "🩸",
            },
            Badge::Wealthy => BadgeInfo {
                name: "Wealthy",
                description: "Balance reached the wealthy threshold",
                icon: "💰",
            },
            Badge::Debtor => BadgeInfo {
                name: "Debtor",
                description: "Balance is below zero",
                icon: "💸",
            },
            Badge::Sniper => BadgeInfo {
                name: "Big Shot",
                description: "Earned a single large award in one go",
                icon: "🎯",
            },
            Badge::Phoenix => BadgeInfo {
                name: "Phoenix",
                description: "Recovered from a negative balance",
                icon: "🔥",
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AchievementConfig {
    pub wealthy_xp: i64,
    pub big_shot_amount: i64,
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            wealthy_xp: DEFAULT_WEALTHY_XP,
            big_shot_amount: DEFAULT_BIG_SHOT_AMOUNT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BadgeCondition {
    AnyHistory,
    BalanceAtLeast(i64),
    BalanceBelowZero,
    SingleAwardAtLeast(i64),
    RecoveredFromNegative,
}

/// Derives the badge set from a balance and its history. Holds no state
/// between calls, so the result depends only on the arguments.
#[derive(Debug, Clone)]
pub struct AchievementEvaluator {
    rules: Vec<(Badge, BadgeCondition)>,
}

impl AchievementEvaluator {
    pub fn new(config: &AchievementConfig) -> Self {
        let rules = vec![
            (Badge::FirstBlood, BadgeCondition::AnyHistory),
            (Badge::Wealthy, BadgeCondition::BalanceAtLeast(config.wealthy_xp)),
            (Badge::Debtor, BadgeCondition::BalanceBelowZero),
            (Badge::Sniper, BadgeCondition::SingleAwardAtLeast(config.big_shot_amount)),
            (Badge::Phoenix, BadgeCondition::RecoveredFromNegative),
        ];
        Self { rules }
    }

    pub fn evaluate(&self, xp: i64, history: &[Transaction]) -> BTreeSet<Badge> {
        self.rules
            .iter()
            .filter(|(_, condition)| match *condition {
                BadgeCondition::AnyHistory => !history.is_empty(),
                BadgeCondition::BalanceAtLeast(threshold) => xp >= threshold,
                BadgeCondition::BalanceBelowZero => xp < 0,
                BadgeCondition::SingleAwardAtLeast(amount) => {
                    history.iter().any(|t| t.amount >= amount)
                }
                BadgeCondition::RecoveredFromNegative => {
                    xp > 0 && history.iter().any(|t| t.balance_after < 0)
                }
            })
            .map(|(badge, _)| *badge)
            .collect()
    }
}

impl Default for AchievementEvaluator {
    fn default() -> Self {
        Self::new(&AchievementConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(amount: i64, balance_after: i64) -> Transaction {
        Transaction {
            id: ulid::Ulid::new().to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(8, 0, 0))
                .unwrap(),
            reason: "test".to_string(),
            amount,
            balance_after,
        }
    }

    #[test]
    fn test_empty_history_has_no_badges() {
        let evaluator = AchievementEvaluator::default();
        assert!(evaluator.evaluate(0, &[]).is_empty());
    }

    #[test]
    fn test_first_blood_and_sniper() {
        let evaluator = AchievementEvaluator::default();
        let badges = evaluator.evaluate(120, &[tx(120, 120)]);
        assert!(badges.contains(&Badge::FirstBlood));
        assert!(badges.contains(&Badge::Sniper));
        assert!(!badges.contains(&Badge::Wealthy));
    }

    #[test]
    fn test_wealthy_threshold_is_configurable() {
        let history = [tx(50, 500)];
        let default = AchievementEvaluator::default();
        assert!(!default.evaluate(500, &history).contains(&Badge::Wealthy));

        let lowered = AchievementEvaluator::new(&AchievementConfig {
            wealthy_xp: 500,
            ..AchievementConfig::default()
        });
        assert!(lowered.evaluate(500, &history).contains(&Badge::Wealthy));
    }

    #[test]
    fn test_debtor_and_phoenix_are_exclusive_on_balance_sign() {
        let evaluator = AchievementEvaluator::default();
        let history = [tx(50, 30), tx(-50, -20), tx(10, 30)];

        let recovered = evaluator.evaluate(30, &history);
        assert!(recovered.contains(&Badge::Phoenix));
        assert!(!recovered.contains(&Badge::Debtor));

        let still_negative = evaluator.evaluate(-20, &history[1..2]);
        assert!(still_negative.contains(&Badge::Debtor));
        assert!(!still_negative.contains(&Badge::Phoenix));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let evaluator = AchievementEvaluator::default();
        let history = [tx(200, 900), tx(150, 150), tx(150, 700)];
        assert_eq!(evaluator.evaluate(900, &history), evaluator.evaluate(900, &history));
        assert_eq!(evaluator.evaluate(900, &history).len(), 3);
    }

    #[test]
    fn test_badge_ids_match_serialized_form() {
        for badge in Badge::ALL {
            let json = serde_json::to_string(&badge).unwrap();
            assert_eq!(json, format!("\"{}\"", badge.id()));
        }
    }
}
