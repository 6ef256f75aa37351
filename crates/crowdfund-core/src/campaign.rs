use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::units::Wei;

/// Sequential campaign identifier assigned by the ledger, starting at 0.
pub type CampaignId = u64;

/// Campaign as the ledger's `campaigns(id)` getter reports it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignRecord {
    pub entrepreneur: Address,
    pub title: String,
    pub pledge_cost: Wei,
    pub pledges_needed: u64,
    pub pledges_count: u64,
    pub fulfilled: bool,
    pub cancelled: bool,
}

/// Lifecycle position of a campaign, derived once from the ledger flags.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Fulfilled,
    Cancelled,
}

impl CampaignStatus {
    /// `fulfilled` wins when the ledger reports both flags.
    pub fn classify(fulfilled: bool, cancelled: bool) -> Self {
        if !fulfilled && !cancelled {
            CampaignStatus::Active
        } else if fulfilled {
            CampaignStatus::Fulfilled
        } else {
            CampaignStatus::Cancelled
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Fulfilled => "fulfilled",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

/// Campaign enriched with the viewing account's own pledge count.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    pub id: CampaignId,
    pub entrepreneur: Address,
    pub title: String,
    pub pledge_cost: Wei,
    pub pledges_needed: u64,
    pub pledges_count: u64,
    pub status: CampaignStatus,
    pub viewer_pledge_count: u64,
}

impl Campaign {
    pub fn from_record(id: CampaignId, record: CampaignRecord, viewer_pledge_count: u64) -> Self {
        Self {
            id,
            status: CampaignStatus::classify(record.fulfilled, record.cancelled),
            entrepreneur: record.entrepreneur,
            title: record.title,
            pledge_cost: record.pledge_cost,
            pledges_needed: record.pledges_needed,
            pledges_count: record.pledges_count,
            viewer_pledge_count,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == CampaignStatus::Cancelled
    }

    pub fn goal_reached(&self) -> bool {
        self.pledges_count >= self.pledges_needed
    }

    pub fn pledges_left(&self) -> u64 {
        self.pledges_needed.saturating_sub(self.pledges_count)
    }
}
