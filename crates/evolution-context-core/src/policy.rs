use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const DREAM_SPECIFIC_THRESHOLD: usize = 4;
pub const CROSS_DREAM_THRESHOLD: usize = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Unlimited,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Free, Self::Pro, Self::Unlimited];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "unlimited" => Some(Self::Unlimited),
            _ => None,
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    DreamSpecific,
    CrossDream,
}

impl ReportKind {
    pub const ALL: [Self; 2] = [Self::DreamSpecific, Self::CrossDream];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DreamSpecific => "dream_specific",
            Self::CrossDream => "cross_dream",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dream_specific" => Some(Self::DreamSpecific),
            "cross_dream" => Some(Self::CrossDream),
            _ => None,
        }
    }
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum reflection count and maximum context size for one tier/kind pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct PolicyEntry {
    pub threshold: usize,
    pub context_limit: usize,
}

impl PolicyEntry {
    /// A zero context limit disables the report kind for the tier.
    #[must_use]
    pub fn is_available(self) -> bool {
        self.context_limit > 0
    }
}

#[must_use]
pub fn threshold(kind: ReportKind) -> usize {
    match kind {
        ReportKind::DreamSpecific => DREAM_SPECIFIC_THRESHOLD,
        ReportKind::CrossDream => CROSS_DREAM_THRESHOLD,
    }
}

/// Maximum number of reflections a report of `kind` may use on `tier`.
///
/// A result of `0` means the report kind is unavailable for the tier and
/// selection should be skipped entirely.
#[must_use]
pub fn context_limit(tier: Tier, kind: ReportKind) -> usize {
    match (tier, kind) {
        (Tier::Free, ReportKind::DreamSpecific) => 4,
        (Tier::Pro, ReportKind::DreamSpecific) => 6,
        (Tier::Unlimited, ReportKind::DreamSpecific) => 12,
        (Tier::Free, ReportKind::CrossDream) => 0,
        (Tier::Pro, ReportKind::CrossDream) => 12,
        (Tier::Unlimited, ReportKind::CrossDream) => 30,
    }
}

#[must_use]
pub fn policy_entry(tier: Tier, kind: ReportKind) -> PolicyEntry {
    PolicyEntry { threshold: threshold(kind), context_limit: context_limit(tier, kind) }
}

/// All six tier/kind combinations, tiers ascending and dream-specific first.
#[must_use]
pub fn policy_table() -> Vec<(Tier, ReportKind, PolicyEntry)> {
    Tier::ALL
        .into_iter()
        .flat_map(|tier| {
            ReportKind::ALL.into_iter().map(move |kind| (tier, kind, policy_entry(tier, kind)))
        })
        .collect()
}

/// Whether `count` reflections are enough to attempt a report of `kind`.
///
/// Negative counts are never eligible.
#[must_use]
pub fn meets_threshold(count: i64, kind: ReportKind) -> bool {
    usize::try_from(count).is_ok_and(|count| count >= threshold(kind))
}

/// Converts a signed limit from an untrusted caller into a selection limit.
/// Negative values clamp to zero.
#[must_use]
pub fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 {
        return 0;
    }
    usize::try_from(limit).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_boundaries_follow_kind_threshold() {
        assert!(!meets_threshold(3, ReportKind::DreamSpecific));
        assert!(meets_threshold(4, ReportKind::DreamSpecific));
        assert!(!meets_threshold(11, ReportKind::CrossDream));
        assert!(meets_threshold(12, ReportKind::CrossDream));
        assert!(meets_threshold(500, ReportKind::CrossDream));
    }

    #[test]
    fn negative_counts_are_never_eligible() {
        assert!(!meets_threshold(-1, ReportKind::DreamSpecific));
        assert!(!meets_threshold(i64::MIN, ReportKind::CrossDream));
        assert!(!meets_threshold(0, ReportKind::DreamSpecific));
    }

    #[test]
    fn context_limits_match_policy_table() {
        let expected = [
            (Tier::Free, ReportKind::DreamSpecific, 4),
            (Tier::Pro, ReportKind::DreamSpecific, 6),
            (Tier::Unlimited, ReportKind::DreamSpecific, 12),
            (Tier::Free, ReportKind::CrossDream, 0),
            (Tier::Pro, ReportKind::CrossDream, 12),
            (Tier::Unlimited, ReportKind::CrossDream, 30),
        ];
        for (tier, kind, limit) in expected {
            assert_eq!(context_limit(tier, kind), limit, "limit for {tier}/{kind}");
        }
    }

    #[test]
    fn threshold_depends_only_on_kind() {
        for tier in Tier::ALL {
            assert_eq!(policy_entry(tier, ReportKind::DreamSpecific).threshold, 4);
            assert_eq!(policy_entry(tier, ReportKind::CrossDream).threshold, 12);
        }
    }

    #[test]
    fn policy_table_lists_every_combination_in_order() {
        let table = policy_table();
        assert_eq!(table.len(), 6);
        assert_eq!(table[0].0, Tier::Free);
        assert_eq!(table[0].1, ReportKind::DreamSpecific);
        assert_eq!(table[1].1, ReportKind::CrossDream);
        assert!(!table[1].2.is_available());
        assert_eq!(
            table[5],
            (Tier::Unlimited, ReportKind::CrossDream, PolicyEntry { threshold: 12, context_limit: 30 })
        );
        assert_eq!(table.iter().filter(|(_, _, entry)| !entry.is_available()).count(), 1);
    }

    #[test]
    fn enum_names_round_trip_through_parse() {
        for tier in Tier::ALL {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        for kind in ReportKind::ALL {
            assert_eq!(ReportKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(Tier::parse("enterprise"), None);
        assert_eq!(ReportKind::parse("dream-specific"), None);
    }

    #[test]
    fn clamp_limit_floors_negative_values_at_zero() {
        assert_eq!(clamp_limit(-5), 0);
        assert_eq!(clamp_limit(0), 0);
        assert_eq!(clamp_limit(9), 9);
    }
}
