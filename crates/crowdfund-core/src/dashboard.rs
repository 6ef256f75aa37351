//! Component-owned client state: the account overview and the catalog.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{CampaignCatalog, CatalogSnapshot};
use crate::dispatcher::ReloadScope;
use crate::error::CrowdfundError;
use crate::gateway::{AccountProvider, LedgerGateway};
use crate::overview::AccountOverview;
use crate::permissions::PermissionView;

/// Holds the last successfully loaded [`AccountOverview`] and
/// [`CatalogSnapshot`]. Both are replaced only by a load that fully
/// succeeds.
pub struct Dashboard<G, A> {
    gateway: Arc<G>,
    accounts: Arc<A>,
    catalog: CampaignCatalog<G>,
    overview: Option<AccountOverview>,
}

impl<G: LedgerGateway, A: AccountProvider> Dashboard<G, A> {
    pub fn new(gateway: Arc<G>, accounts: Arc<A>) -> Self {
        Self {
            catalog: CampaignCatalog::new(Arc::clone(&gateway)),
            gateway,
            accounts,
            overview: None,
        }
    }

    pub fn with_read_concurrency(mut self, concurrency: usize) -> Self {
        self.catalog = self.catalog.with_concurrency(concurrency);
        self
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn overview(&self) -> Option<&AccountOverview> {
        self.overview.as_ref()
    }

    pub fn catalog(&self) -> &CampaignCatalog<G> {
        &self.catalog
    }

    pub fn snapshot(&self) -> Option<&CatalogSnapshot> {
        self.catalog.snapshot()
    }

    pub fn permissions(&self) -> Option<PermissionView> {
        self.overview.as_ref().map(AccountOverview::permissions)
    }

    /// Re-read the selected account, the overview and every campaign.
    ///
    /// The overview is kept only if the catalog refresh also succeeds.
    pub async fn reload(&mut self) -> Result<&AccountOverview, CrowdfundError> {
        let account = self
            .accounts
            .selected_account()
            .await
            .map_err(|e| CrowdfundError::read("selectedAccount", e))?;
        let overview = AccountOverview::load(self.gateway.as_ref(), account).await?;
        self.catalog.refresh(account).await?;
        info!(%account, owner = %overview.owner, "dashboard reloaded");
        Ok(self.overview.insert(overview))
    }

    /// Re-read the campaigns for the account of the current overview, or do
    /// a full reload if nothing is loaded yet.
    pub async fn refresh_campaigns(&mut self) -> Result<(), CrowdfundError> {
        match self.overview.as_ref().map(|o| o.account) {
            Some(account) => self.catalog.refresh(account).await.map(|_| ()),
            None => self.reload().await.map(|_| ()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.overview.is_some() && self.catalog.snapshot().is_some()
    }

    /// Load everything once; later calls are no-ops.
    pub async fn ensure_loaded(&mut self) -> Result<(), CrowdfundError> {
        if !self.is_loaded() {
            debug!("dashboard not loaded yet");
            self.reload().await?;
        }
        Ok(())
    }

    pub(crate) async fn reconcile(&mut self, scope: ReloadScope) -> Result<(), CrowdfundError> {
        match scope {
            ReloadScope::Campaigns => self.refresh_campaigns().await,
            ReloadScope::Full => self.reload().await.map(|_| ()),
        }
    }
}
