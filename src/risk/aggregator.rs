//! Risk Aggregator: per-user anomaly counts and current tiers

use super::tier::RiskTier;
use crate::data::{EventBatch, UserId};
use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated detector output for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnomalySummary {
    pub event_count: usize,
    pub anomaly_count: usize,
    pub tier: RiskTier,
}

/// Sums flags per user; `flags[i]` belongs to the `i`-th event of `batch.events()`
pub fn aggregate_anomalies(
    batch: &EventBatch,
    flags: &[bool],
) -> Result<BTreeMap<UserId, UserAnomalySummary>> {
    if flags.len() != batch.total_events() {
        return Err(RiskError::Data(format!(
            "{} anomaly flags for {} events",
            flags.len(),
            batch.total_events()
        )));
    }

    let mut offset = 0;
    let summaries = batch
        .by_user
        .iter()
        .map(|(user_id, events)| {
            let user_flags = &flags[offset..offset + events.len()];
            offset += events.len();

            let anomaly_count = user_flags.iter().filter(|&&f| f).count();
            let summary = UserAnomalySummary {
                event_count: events.len(),
                anomaly_count,
                tier: RiskTier::from_anomaly_count(anomaly_count),
            };
            (user_id.clone(), summary)
        })
        .collect();

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AccessEvent;
    use chrono::{TimeZone, Utc};

    fn events(user: &str, n: usize) -> Vec<AccessEvent> {
        (0..n)
            .map(|i| AccessEvent {
                user_id: UserId::from(user),
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 10, 0, 0)
                    .unwrap()
                    .fixed_offset(),
                ip: None,
                device: "laptop".into(),
                location: "tlalpan".into(),
                simulated_anomaly_flag: None,
            })
            .collect()
    }

    fn batch() -> EventBatch {
        let mut batch = EventBatch::default();
        batch.by_user.insert(UserId::from("a"), events("a", 5));
        batch.by_user.insert(UserId::from("b"), events("b", 3));
        batch
    }

    #[test]
    fn test_counts_per_user() {
        let flags = [false, true, false, true, false, true, true, true];
        let summaries = aggregate_anomalies(&batch(), &flags).unwrap();

        let a = summaries[&UserId::from("a")];
        assert_eq!((a.event_count, a.anomaly_count, a.tier), (5, 2, RiskTier::Medium));

        let b = summaries[&UserId::from("b")];
        assert_eq!((b.anomaly_count, b.tier), (3, RiskTier::High));
    }

    #[test]
    fn test_flag_length_mismatch() {
        assert!(matches!(
            aggregate_anomalies(&batch(), &[true, false]),
            Err(RiskError::Data(_))
        ));
    }
}
