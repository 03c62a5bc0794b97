//! Compliance scoring
//!
//! The compliance score is the share of a loan's covenants that are not
//! problematic, expressed as a whole percentage. Compliant, Waived and
//! Upcoming covenants count towards the score; At Risk and Breached do not.

use serde::{Deserialize, Serialize};

use crate::models::{Covenant, CovenantStatus};

/// Score reported for a loan that has no covenants
pub const FULL_COMPLIANCE: i32 = 100;

/// Compute the compliance score for a covenant set.
///
/// `round(100 * compliant_equivalent / total)` with halves rounded away from
/// zero, computed in integer arithmetic.
pub fn compliance_score(covenants: &[Covenant]) -> i32 {
    let total = covenants.len();
    if total == 0 {
        return FULL_COMPLIANCE;
    }

    let compliant = covenants
        .iter()
        .filter(|c| c.status.is_compliant_equivalent())
        .count();

    ((compliant * 200 + total) / (2 * total)) as i32
}

/// Covenant counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantBreakdown {
    pub total: usize,
    pub compliant: usize,
    pub at_risk: usize,
    pub breached: usize,
    pub upcoming: usize,
    pub waived: usize,
}

impl CovenantBreakdown {
    pub fn of(covenants: &[Covenant]) -> Self {
        covenants.iter().fold(Self::default(), |mut acc, covenant| {
            acc.total += 1;
            match covenant.status {
                CovenantStatus::Compliant => acc.compliant += 1,
                CovenantStatus::AtRisk => acc.at_risk += 1,
                CovenantStatus::Breached => acc.breached += 1,
                CovenantStatus::Upcoming => acc.upcoming += 1,
                CovenantStatus::Waived => acc.waived += 1,
            }
            acc
        })
    }

    /// At Risk plus Breached
    pub fn needing_attention(&self) -> usize {
        self.at_risk + self.breached
    }
}
