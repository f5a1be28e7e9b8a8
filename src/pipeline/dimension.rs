use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::data::{AnalyticsStore, SourceStore};
use crate::types::{CampaignDimension, SourceCampaign};

/// Denormalize one source campaign as of `now`.
///
/// A campaign is active while its end date lies strictly in the future.
/// Duration counts calendar days between start and end.
pub fn build_dimension(c: &SourceCampaign, now: NaiveDateTime) -> CampaignDimension {
    CampaignDimension {
        campaign_id: c.id,
        campaign_name: c.name.clone(),
        advertiser_name: c.advertiser_name.clone(),
        bid_amount: c.bid,
        budget_amount: c.budget,
        duration_days: (c.end_date.date() - c.start_date.date()).num_days(),
        is_active: c.end_date > now,
        updated_at: c.updated_at,
    }
}

/// Snapshot every source campaign and atomically replace `campaign_dimension`.
/// Returns the number of rows written.
pub fn refresh_dimension(
    source: &mut dyn SourceStore,
    analytics: &mut dyn AnalyticsStore,
    now: NaiveDateTime,
) -> Result<usize> {
    let campaigns = source
        .fetch_campaigns()
        .context("failed to read source campaigns")?;

    let rows: Vec<CampaignDimension> = campaigns.iter().map(|c| build_dimension(c, now)).collect();

    analytics
        .replace_dimension(&rows)
        .context("failed to replace campaign_dimension")?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{seed_campaign, ts};
    use crate::data::SqliteStore;
    use crate::types::Table;

    const DAY: i64 = 86_400;

    fn campaign(start: NaiveDateTime, end: NaiveDateTime) -> SourceCampaign {
        SourceCampaign {
            id: 1,
            name: "Launch".to_string(),
            advertiser_name: "Acme".to_string(),
            bid: 0.02,
            budget: 500.0,
            start_date: start,
            end_date: end,
            updated_at: start,
        }
    }

    #[test]
    fn test_active_iff_end_after_now() {
        let c = campaign(ts(0), ts(10 * DAY));
        assert!(build_dimension(&c, ts(10 * DAY - 1)).is_active);
        assert!(!build_dimension(&c, ts(10 * DAY)).is_active);
        assert!(!build_dimension(&c, ts(11 * DAY)).is_active);
    }

    #[test]
    fn test_duration_in_days() {
        let c = campaign(ts(0), ts(30 * DAY));
        let d = build_dimension(&c, ts(0));
        assert_eq!(d.duration_days, 30);
        assert_eq!(d.advertiser_name, "Acme");
        assert!((d.bid_amount - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_refresh_matches_source_count() {
        let mut source = SqliteStore::in_memory().unwrap();
        source.init().unwrap();
        seed_campaign(&source, 1, "past", "Acme", 0.1, ts(0), ts(DAY));
        seed_campaign(&source, 2, "current", "Acme", 0.2, ts(0), ts(20 * DAY));
        seed_campaign(&source, 3, "other", "Globex", 0.3, ts(0), ts(30 * DAY));

        let mut analytics = SqliteStore::in_memory().unwrap();
        analytics.init().unwrap();

        let now = ts(10 * DAY);
        let n = refresh_dimension(&mut source, &mut analytics, now).unwrap();
        assert_eq!(n, 3);
        // Refreshing again must not accumulate rows.
        refresh_dimension(&mut source, &mut analytics, now).unwrap();
        assert_eq!(analytics.count_rows(Table::CampaignDimension).unwrap(), 3);

        let rows = analytics.load_dimension().unwrap();
        let active: Vec<bool> = rows.iter().map(|r| r.is_active).collect();
        assert_eq!(active, vec![false, true, true]);
        assert_eq!(rows[2].advertiser_name, "Globex");
    }
}
