//! Row types shared by the stores and the pipeline steps.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of ad event tracked in the unified event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Impression,
    Click,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::Impression, EventType::Click];

    /// Value stored in the `event_type` column.
    pub fn label(&self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
        }
    }

    /// Source table holding events of this type.
    pub fn source_table(&self) -> &'static str {
        match self {
            EventType::Impression => "impressions",
            EventType::Click => "clicks",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        match s {
            "impression" => Some(EventType::Impression),
            "click" => Some(EventType::Click),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Newest `(created_at, event_id)` logged for one event type.
///
/// Ordered by `created_at` first, then `event_id` as a tie-break, so two
/// rows sharing a timestamp are still strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub created_at: NaiveDateTime,
    pub event_id: i64,
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {})", self.created_at, self.event_id)
    }
}

/// One row pulled from `impressions` or `clicks`, tagged with its type.
///
/// Field order drives the derived ordering: extracted sets are sorted by
/// creation time, then type, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceEvent {
    pub created_at: NaiveDateTime,
    pub event_type: EventType,
    pub id: i64,
    pub campaign_id: i64,
}

/// A row of the analytical `ad_events` log.
#[derive(Debug, Clone, PartialEq)]
pub struct AdEvent {
    pub event_id: i64,
    pub campaign_id: i64,
    pub event_type: EventType,
    pub created_at: NaiveDateTime,
    /// Wall-clock time of the load that wrote this row.
    pub inserted_at: NaiveDateTime,
}

/// A campaign joined to its advertiser, as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCampaign {
    pub id: i64,
    pub name: String,
    pub advertiser_name: String,
    pub bid: f64,
    pub budget: f64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Denormalized row of `campaign_dimension`.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDimension {
    pub campaign_id: i64,
    pub campaign_name: String,
    pub advertiser_name: String,
    pub bid_amount: f64,
    pub budget_amount: f64,
    pub duration_days: i64,
    pub is_active: bool,
    pub updated_at: NaiveDateTime,
}

/// Per-campaign event tallies from the event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignEventCounts {
    pub campaign_id: i64,
    pub impressions: u64,
    pub clicks: u64,
}

/// Row of `daily_campaign_performance`. Always derived, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPerformance {
    pub campaign_id: i64,
    pub impressions_count: u64,
    pub clicks_count: u64,
    pub spend_amount: f64,
    pub ctr: f64,
    pub cpm: f64,
}

/// Analytical tables the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    AdEvents,
    CampaignDimension,
    DailyCampaignPerformance,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::AdEvents => "ad_events",
            Table::CampaignDimension => "campaign_dimension",
            Table::DailyCampaignPerformance => "daily_campaign_performance",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
