//! Rank tiers and progress toward the next tier.

use serde::Serialize;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RankTier {
    pub name: &'static str,
    pub min_xp: i64,
    pub label: &'static str,
    pub perk: &'static str,
    pub color: &'static str,
}

/// Tiers ordered by strictly descending `min_xp`. The last tier starts at 0.
pub static RANKS: &[RankTier] = &[
    RankTier {
        name: "PRESIDENT",
        min_xp: 1000,
        label: "👑 ประธาน (President)",
        perk: "🛡️ Immunity: ไม่ต้องทำงาน 3 ชิ้น + โบนัส",
        color: "#FFD700",
    },
    RankTier {
        name: "DIRECTOR",
        min_xp: 600,
        label: "💼 หัวหน้าฝ่าย (Director)",
        perk: "✂️ Workload Cut: ลดงาน 50% ได้เต็ม",
        color: "#9b59b6",
    },
    RankTier {
        name: "MANAGER",
        min_xp: 300,
        label: "👔 หัวหน้าแผนก (Manager)",
        perk: "🔄 Second Chance: สอบแก้ตัวได้",
        color: "#3498db",
    },
    RankTier {
        name: "EMPLOYEE",
        min_xp: 100,
        label: "👨‍💼 พนักงาน (Employee)",
        perk: "⏰ Time Extension: ส่งช้าได้ 1 สัปดาห์",
        color: "#2ecc71",
    },
    RankTier {
        name: "INTERN",
        min_xp: 0,
        label: "👶 เด็กฝึกงาน (Intern)",
        perk: "🔍 Check-up: ครูตรวจก่อนส่งจริง",
        color: "#95a5a6",
    },
];

/// Returned for any negative balance. Never part of the threshold scan.
pub static PROBATION: RankTier = RankTier {
    name: "PROBATION",
    min_xp: i64::MIN,
    label: "⚠️ ทัณฑ์บน (Probation)",
    perk: "📋 ต้องทำคะแนนให้กลับมาเป็นบวก",
    color: "#e74c3c",
};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Progress {
    pub fraction: f64,
    pub label: String,
}

pub fn resolve_rank(xp: i64) -> &'static RankTier {
    if xp < 0 {
        return &PROBATION;
    }
    RANKS
        .iter()
        .find(|tier| xp >= tier.min_xp)
        .unwrap_or(&RANKS[RANKS.len() - 1])
}

/// The lowest tier whose threshold is still above `xp`, if any.
pub fn next_tier(xp: i64) -> Option<&'static RankTier> {
    RANKS.iter().rev().find(|tier| tier.min_xp > xp)
}

pub fn progress_to_next(xp: i64) -> Progress {
    if xp < 0 {
        return Progress {
            fraction: 0.0,
            label: format!("ต้องมีคะแนนเป็นบวกก่อน ({} XP)", xp),
        };
    }

    match next_tier(xp) {
        None => Progress {
            fraction: 1.0,
            label: format!("ยศสูงสุดแล้ว ({} XP)", xp),
        },
        Some(next) => {
            // A zero threshold would mean the next tier is already reached.
            let fraction = if next.min_xp > 0 {
                (xp as f64 / next.min_xp as f64).min(1.0)
            } else {
                1.0
            };
            Progress {
                fraction,
                label: format!("{}/{} XP", xp, next.min_xp),
            }
        }
    }
}

/// Coerce a loosely-typed score (e.g. a spreadsheet cell read as float) to XP.
pub fn xp_from_f64(value: f64) -> i64 {
    if value.is_finite() {
        value.trunc() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_strictly_descending_and_ends_at_zero() {
        for pair in RANKS.windows(2) {
            assert!(pair[0].min_xp > pair[1].min_xp);
        }
        assert_eq!(RANKS.last().map(|t| t.min_xp), Some(0));
    }

    #[test]
    fn test_resolve_rank_boundaries() {
        assert_eq!(resolve_rank(0).name, "INTERN");
        assert_eq!(resolve_rank(99).name, "INTERN");
        assert_eq!(resolve_rank(100).name, "EMPLOYEE");
        assert_eq!(resolve_rank(599).name, "MANAGER");
        assert_eq!(resolve_rank(600).name, "DIRECTOR");
        assert_eq!(resolve_rank(1000).name, "PRESIDENT");
        assert_eq!(resolve_rank(50_000).name, "PRESIDENT");
    }

    #[test]
    fn test_negative_xp_is_probation() {
        for xp in [-1, -40, -10_000, i64::MIN] {
            assert_eq!(resolve_rank(xp), &PROBATION);
        }
    }

    #[test]
    fn test_progress_negative_and_max() {
        let p = progress_to_next(-5);
        assert_eq!(p.fraction, 0.0);
        assert!(p.label.contains("-5"));

        let p = progress_to_next(1200);
        assert_eq!(p.fraction, 1.0);
    }

    #[test]
    fn test_progress_uses_next_threshold() {
        let p = progress_to_next(150);
        assert!((p.fraction - 0.5).abs() < 1e-9);
        assert_eq!(p.label, "150/300 XP");

        assert_eq!(progress_to_next(0).fraction, 0.0);
    }

    #[test]
    fn test_progress_monotonic_within_tier() {
        let mut last = -1.0;
        for xp in 300..600 {
            let p = progress_to_next(xp).fraction;
            assert!(p >= last);
            assert!(p <= 1.0);
            last = p;
        }
    }

    #[test]
    fn test_xp_from_f64() {
        assert_eq!(xp_from_f64(42.9), 42);
        assert_eq!(xp_from_f64(-3.5), -3);
        assert_eq!(xp_from_f64(f64::NAN), 0);
        assert_eq!(xp_from_f64(f64::INFINITY), 0);
    }
}
