//! Campaign catalog: fetch every campaign, classify it, keep the result.
//!
//! A refresh either replaces the held snapshot with a complete one or leaves
//! it exactly as it was. Per-campaign reads run concurrently but the
//! partitions are always assembled in id order.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::address::Address;
use crate::campaign::{Campaign, CampaignId, CampaignRecord, CampaignStatus};
use crate::error::CrowdfundError;
use crate::gateway::LedgerGateway;

/// Upper bound on campaign rows fetched at the same time.
pub const DEFAULT_READ_CONCURRENCY: usize = 8;

/// Campaigns partitioned by status, each partition ascending by id.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub viewer: Address,
    pub next_campaign_id: CampaignId,
    pub active: Vec<Campaign>,
    pub fulfilled: Vec<Campaign>,
    pub cancelled: Vec<Campaign>,
    /// Campaigns the ledger reported as both fulfilled and cancelled. They
    /// are filed under `fulfilled`.
    pub conflicting_flags: Vec<CampaignId>,
}

impl CatalogSnapshot {
    /// Build a snapshot from rows in id order, starting at id 0.
    pub fn assemble(
        viewer: Address,
        rows: impl IntoIterator<Item = (CampaignRecord, u64)>,
    ) -> Self {
        let mut snapshot = CatalogSnapshot {
            viewer,
            next_campaign_id: 0,
            active: Vec::new(),
            fulfilled: Vec::new(),
            cancelled: Vec::new(),
            conflicting_flags: Vec::new(),
        };
        for (id, (record, viewer_pledges)) in (0..).zip(rows) {
            if record.fulfilled && record.cancelled {
                snapshot.conflicting_flags.push(id);
            }
            let campaign = Campaign::from_record(id, record, viewer_pledges);
            match campaign.status {
                CampaignStatus::Active => snapshot.active.push(campaign),
                CampaignStatus::Fulfilled => snapshot.fulfilled.push(campaign),
                CampaignStatus::Cancelled => snapshot.cancelled.push(campaign),
            }
            snapshot.next_campaign_id = id + 1;
        }
        snapshot
    }

    pub fn partition(&self, status: CampaignStatus) -> &[Campaign] {
        match status {
            CampaignStatus::Active => &self.active,
            CampaignStatus::Fulfilled => &self.fulfilled,
            CampaignStatus::Cancelled => &self.cancelled,
        }
    }

    /// All campaigns, partition by partition.
    pub fn campaigns(&self) -> impl Iterator<Item = &Campaign> {
        self.active
            .iter()
            .chain(self.fulfilled.iter())
            .chain(self.cancelled.iter())
    }

    pub fn get(&self, id: CampaignId) -> Option<&Campaign> {
        self.campaigns().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.fulfilled.len() + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SHA-256 over the viewer and every campaign in partition order.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"catalog");
        hasher.update(self.viewer.as_bytes());
        hasher.update(self.next_campaign_id.to_le_bytes());
        for campaign in self.campaigns() {
            hasher.update(b"campaign");
            hasher.update(campaign.id.to_le_bytes());
            hasher.update([campaign.status as u8]);
            hasher.update(campaign.entrepreneur.as_bytes());
            hasher.update((campaign.title.len() as u64).to_le_bytes());
            hasher.update(campaign.title.as_bytes());
            hasher.update(campaign.pledge_cost.to_le_bytes());
            hasher.update(campaign.pledges_needed.to_le_bytes());
            hasher.update(campaign.pledges_count.to_le_bytes());
            hasher.update(campaign.viewer_pledge_count.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

async fn fetch_row<G: LedgerGateway + ?Sized>(
    gateway: &G,
    id: CampaignId,
    viewer: Address,
) -> Result<(CampaignRecord, u64), CrowdfundError> {
    futures::try_join!(
        async {
            gateway
                .campaign(id)
                .await
                .map_err(|e| CrowdfundError::read(format!("campaigns({id})"), e))
        },
        async {
            gateway
                .backer_shares(id, viewer)
                .await
                .map_err(|e| CrowdfundError::read(format!("getBackerShares({id})"), e))
        },
    )
}

/// Owner of the current [`CatalogSnapshot`].
pub struct CampaignCatalog<G> {
    gateway: Arc<G>,
    concurrency: usize,
    snapshot: Option<CatalogSnapshot>,
}

impl<G: LedgerGateway> CampaignCatalog<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            concurrency: DEFAULT_READ_CONCURRENCY,
            snapshot: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Last snapshot produced by a successful refresh.
    pub fn snapshot(&self) -> Option<&CatalogSnapshot> {
        self.snapshot.as_ref()
    }

    /// Re-read every campaign as seen by `viewer`.
    ///
    /// Reads may straddle concurrent ledger mutations; the result is a
    /// best-effort view of one load attempt, not an atomic ledger snapshot.
    #[instrument(skip_all, fields(viewer = %viewer))]
    pub async fn refresh(&mut self, viewer: Address) -> Result<&CatalogSnapshot, CrowdfundError> {
        let next_id = self
            .gateway
            .next_campaign_id()
            .await
            .map_err(|e| CrowdfundError::read("nextCampaignId", e))?;
        debug!(next_id, "fetching campaigns");

        let gateway = self.gateway.as_ref();
        let rows: Vec<(CampaignRecord, u64)> = stream::iter(0..next_id)
            .map(|id| fetch_row(gateway, id, viewer))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let snapshot = CatalogSnapshot::assemble(viewer, rows);
        if !snapshot.conflicting_flags.is_empty() {
            warn!(
                ids = ?snapshot.conflicting_flags,
                "ledger reports campaigns both fulfilled and cancelled; filed as fulfilled"
            );
        }
        info!(
            active = snapshot.active.len(),
            fulfilled = snapshot.fulfilled.len(),
            cancelled = snapshot.cancelled.len(),
            "catalog refreshed"
        );
        Ok(self.snapshot.insert(snapshot))
    }
}
