use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};

use crate::data::AnalyticsStore;
use crate::types::{CampaignDimension, CampaignEventCounts, CampaignPerformance};

/// Derive the performance row for one campaign.
///
/// CTR and CPM are zero when there are no impressions.
pub fn campaign_performance(
    campaign_id: i64,
    bid_amount: f64,
    impressions: u64,
    clicks: u64,
) -> CampaignPerformance {
    let spend_amount = impressions as f64 * bid_amount;
    let (ctr, cpm) = if impressions > 0 {
        (
            clicks as f64 / impressions as f64,
            spend_amount / (impressions as f64 / 1000.0),
        )
    } else {
        (0.0, 0.0)
    };

    CampaignPerformance {
        campaign_id,
        impressions_count: impressions,
        clicks_count: clicks,
        spend_amount,
        ctr,
        cpm,
    }
}

/// Left-join the dimension to the event counts: every campaign gets a row,
/// campaigns without events get zero counts. Output is ordered by campaign id.
///
/// If the dimension holds several rows for one campaign, the most recently
/// updated one supplies the bid.
pub fn compute_metrics(
    dimension: &[CampaignDimension],
    counts: &[CampaignEventCounts],
) -> Vec<CampaignPerformance> {
    let mut campaigns: BTreeMap<i64, &CampaignDimension> = BTreeMap::new();
    for d in dimension {
        campaigns
            .entry(d.campaign_id)
            .and_modify(|cur| {
                if d.updated_at >= cur.updated_at {
                    *cur = d;
                }
            })
            .or_insert(d);
    }

    let by_campaign: HashMap<i64, &CampaignEventCounts> =
        counts.iter().map(|c| (c.campaign_id, c)).collect();

    campaigns
        .values()
        .map(|d| {
            let (impressions, clicks) = by_campaign
                .get(&d.campaign_id)
                .map_or((0, 0), |c| (c.impressions, c.clicks));
            campaign_performance(d.campaign_id, d.bid_amount, impressions, clicks)
        })
        .collect()
}

/// Recompute `daily_campaign_performance` from the event log and dimension,
/// replacing whatever it held before.
pub fn recompute_metrics(analytics: &mut dyn AnalyticsStore) -> Result<Vec<CampaignPerformance>> {
    let dimension = analytics
        .load_dimension()
        .context("failed to read campaign_dimension")?;
    let counts = analytics
        .event_counts()
        .context("failed to count ad_events")?;

    let rows = compute_metrics(&dimension, &counts);

    analytics
        .replace_metrics(&rows)
        .context("failed to write daily_campaign_performance")?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::ts;

    fn dim(campaign_id: i64, bid_amount: f64, updated_secs: i64) -> CampaignDimension {
        CampaignDimension {
            campaign_id,
            campaign_name: format!("c{}", campaign_id),
            advertiser_name: "Acme".to_string(),
            bid_amount,
            budget_amount: 1000.0,
            duration_days: 30,
            is_active: true,
            updated_at: ts(updated_secs),
        }
    }

    fn tally(campaign_id: i64, impressions: u64, clicks: u64) -> CampaignEventCounts {
        CampaignEventCounts {
            campaign_id,
            impressions,
            clicks,
        }
    }

    #[test]
    fn test_reference_campaign() {
        let m = campaign_performance(1, 0.02, 100, 5);
        assert_eq!(m.impressions_count, 100);
        assert_eq!(m.clicks_count, 5);
        assert!((m.spend_amount - 2.0).abs() < 1e-9);
        assert!((m.ctr - 0.05).abs() < 1e-9);
        assert!((m.cpm - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_impressions_are_safe() {
        let m = campaign_performance(1, 0.02, 0, 0);
        assert_eq!(m.spend_amount, 0.0);
        assert_eq!(m.ctr, 0.0);
        assert_eq!(m.cpm, 0.0);

        // Clicks without impressions still never divide by zero.
        let m = campaign_performance(1, 0.02, 0, 3);
        assert_eq!(m.ctr, 0.0);
        assert_eq!(m.cpm, 0.0);
    }

    #[test]
    fn test_left_join_keeps_campaigns_without_events() {
        let dimension = vec![dim(2, 0.5, 0), dim(1, 0.02, 0)];
        let counts = vec![
            tally(1, 100, 5),
            // Events for a campaign missing from the dimension are ignored.
            tally(99, 10, 1),
        ];

        let rows = compute_metrics(&dimension, &counts);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].campaign_id, 1);
        assert!((rows[0].cpm - 20.0).abs() < 1e-9);
        assert_eq!(rows[1].campaign_id, 2);
        assert_eq!(rows[1].impressions_count, 0);
        assert_eq!(rows[1].ctr, 0.0);
    }

    #[test]
    fn test_duplicate_dimension_rows_use_latest() {
        let dimension = vec![dim(1, 0.01, 0), dim(1, 0.03, 60)];
        let counts = vec![tally(1, 1000, 0)];

        let rows = compute_metrics(&dimension, &counts);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].spend_amount - 30.0).abs() < 1e-9);
    }
}
