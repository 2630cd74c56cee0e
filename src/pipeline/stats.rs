//! Cluster statistics (§4.7): bias-distribution bucketing, percentage
//! reconciliation, blindspot detection, and representative image selection.

use crate::store::{Article, BiasDistribution, Blindspot, ClusterStats};

const BLINDSPOT_DOMINANT_THRESHOLD: f64 = 50.0;
const BLINDSPOT_ABSENT_THRESHOLD: f64 = 15.0;

pub struct StatsComputer;

impl StatsComputer {
    /// Computes the full [`ClusterStats`] for a set of member articles.
    /// Panics are impossible here; an empty member list yields all-zero
    /// stats and a `None` blindspot, which callers should treat as
    /// "not enough data" rather than act on directly.
    #[must_use]
    pub fn compute(members: &[Article]) -> ClusterStats {
        let mut left = 0_u32;
        let mut center = 0_u32;
        let mut right = 0_u32;

        for article in members {
            if article.bias_rating.is_left_leaning() {
                left += 1;
            } else if article.bias_rating.is_right_leaning() {
                right += 1;
            } else {
                center += 1;
            }
        }

        let total = members.len() as u32;
        let (left_pct, center_pct, right_pct) = reconcile_percentages(left, right, total);

        let blindspot = if right_pct < BLINDSPOT_ABSENT_THRESHOLD && left_pct > BLINDSPOT_DOMINANT_THRESHOLD {
            Blindspot::Right
        } else if left_pct < BLINDSPOT_ABSENT_THRESHOLD && right_pct > BLINDSPOT_DOMINANT_THRESHOLD {
            Blindspot::Left
        } else {
            Blindspot::None
        };

        ClusterStats {
            total_sources: total,
            bias_distribution: BiasDistribution { left, center, right },
            left_pct,
            center_pct,
            right_pct,
            blindspot,
        }
    }

    /// The image URL of the first member (in input order) that has one.
    #[must_use]
    pub fn main_image_url(members: &[Article]) -> Option<String> {
        members.iter().find_map(|a| a.image_url.clone())
    }
}

/// Rounds left and right to the nearest integer percentage, then derives
/// center as the remainder (`centerPct = 100 - leftPct - rightPct`) so the
/// three values always sum to exactly 100 (for a non-empty member set).
/// Center, not the largest bucket, absorbs all rounding drift.
fn reconcile_percentages(left: u32, right: u32, total: u32) -> (f64, f64, f64) {
    if total == 0 {
        return (0.0, 0.0, 0.0);
    }

    let raw_left = f64::from(left) / f64::from(total) * 100.0;
    let raw_right = f64::from(right) / f64::from(total) * 100.0;

    let left_pct = raw_left.round();
    let right_pct = raw_right.round();
    let center_pct = 100.0 - left_pct - right_pct;

    (left_pct, center_pct, right_pct)
}
