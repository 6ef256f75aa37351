//! Subcommand implementations. Each one connects, drives the core and prints
//! either the human view or JSON.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use crowdfund_core::gateway::RpcGateway;
use crowdfund_core::{
    AccountOverview, AccountProvider, ActionDispatcher, ActionKind, CampaignId, CampaignStatus,
    Dashboard, FixedAccount, Settlement, UnitConverter,
};
use serde::Serialize;
use tracing::info;

use crate::config::ClientConfig;
use crate::render;

pub struct Session {
    dashboard: Dashboard<RpcGateway, FixedAccount>,
    dispatcher: ActionDispatcher<RpcGateway>,
    units: UnitConverter,
    json: bool,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    overview: &'a AccountOverview,
    can_create: bool,
    admin_actions: Vec<ActionKind>,
}

impl Session {
    /// Build the JSON-RPC gateway and pin the account to act as.
    pub async fn connect(config: &ClientConfig, json: bool) -> Result<Self> {
        let gateway = RpcGateway::new(config.rpc_url.clone(), config.contract_address)
            .context("failed to set up the JSON-RPC client")?
            .with_poll_interval(config.poll_interval())
            .with_receipt_timeout(config.receipt_timeout());
        let gateway = Arc::new(gateway);
        let account = match config.account {
            Some(account) => account,
            None => gateway
                .selected_account()
                .await
                .context("node did not report an account; pass --account")?,
        };
        info!(%account, contract = %config.contract_address, rpc = %config.rpc_url, "connected");

        let dashboard = Dashboard::new(Arc::clone(&gateway), Arc::new(FixedAccount(account)))
            .with_read_concurrency(config.read_concurrency);
        Ok(Self {
            dashboard,
            dispatcher: ActionDispatcher::new(gateway),
            units: UnitConverter::ETHER,
            json,
        })
    }

    pub async fn status(&mut self) -> Result<()> {
        let overview = self
            .dashboard
            .reload()
            .await
            .context("failed to load the account overview")?;
        if self.json {
            let view = overview.permissions();
            return print_json(&StatusReport {
                overview,
                can_create: view.can_create(),
                admin_actions: view.admin_actions(),
            });
        }
        print!("{}", render::overview(overview, &self.units));
        Ok(())
    }

    pub async fn campaigns(&mut self, only: Option<CampaignStatus>) -> Result<()> {
        self.dashboard
            .reload()
            .await
            .context("failed to load campaigns")?;
        let (snapshot, view) = self
            .dashboard
            .snapshot()
            .zip(self.dashboard.permissions())
            .ok_or_else(|| anyhow!("campaigns are not loaded"))?;
        if self.json {
            return match only {
                Some(status) => print_json(&snapshot.partition(status)),
                None => print_json(snapshot),
            };
        }
        print!("{}", render::campaigns(snapshot, &view, &self.units, only));
        Ok(())
    }

    pub async fn create(
        &mut self,
        title: &str,
        pledge_cost: &str,
        pledges_needed: &str,
    ) -> Result<()> {
        let settlement = self
            .dispatcher
            .create_campaign(&mut self.dashboard, title, pledge_cost, pledges_needed)
            .await
            .context("createCampaign failed")?;
        self.report(&settlement)
    }

    /// Pledge one unit. Without `cost` the campaign's own pledge cost is
    /// paid.
    pub async fn pledge(&mut self, id: CampaignId, cost: Option<String>) -> Result<()> {
        let cost = match cost {
            Some(cost) => cost,
            None => {
                self.dashboard
                    .ensure_loaded()
                    .await
                    .context("failed to load campaigns")?;
                let campaign = self
                    .dashboard
                    .snapshot()
                    .and_then(|s| s.get(id))
                    .ok_or_else(|| anyhow!("unknown campaign {id}"))?;
                self.units.to_display_unit(campaign.pledge_cost)
            }
        };
        let settlement = self
            .dispatcher
            .pledge(&mut self.dashboard, id, &cost)
            .await
            .context("pledge failed")?;
        self.report(&settlement)
    }

    pub async fn campaign_action(&mut self, kind: ActionKind, id: CampaignId) -> Result<()> {
        let dashboard = &mut self.dashboard;
        let settlement = match kind {
            ActionKind::CancelCampaign => self.dispatcher.cancel_campaign(dashboard, id).await,
            ActionKind::CompleteCampaign => self.dispatcher.complete_campaign(dashboard, id).await,
            ActionKind::RefundInvestor => self.dispatcher.refund_investor(dashboard, id).await,
            other => return Err(anyhow!("{other} does not target a single campaign")),
        }
        .with_context(|| format!("{kind} failed"))?;
        self.report(&settlement)
    }

    pub async fn withdraw_fees(&mut self) -> Result<()> {
        let settlement = self
            .dispatcher
            .withdraw_fees(&mut self.dashboard)
            .await
            .context("withdrawFees failed")?;
        self.report(&settlement)
    }

    pub async fn change_owner(&mut self, new_owner: &str) -> Result<()> {
        let settlement = self
            .dispatcher
            .change_owner(&mut self.dashboard, new_owner)
            .await
            .context("changeOwner failed")?;
        self.report(&settlement)
    }

    pub async fn ban(&mut self, user: &str) -> Result<()> {
        let settlement = self
            .dispatcher
            .ban_user(&mut self.dashboard, user)
            .await
            .context("banUser failed")?;
        self.report(&settlement)
    }

    pub async fn deactivate(&mut self) -> Result<()> {
        let settlement = self
            .dispatcher
            .deactivate_contract(&mut self.dashboard)
            .await
            .context("deactivateContract failed")?;
        self.report(&settlement)
    }

    fn report(&self, settlement: &Settlement) -> Result<()> {
        if self.json {
            return print_json(settlement);
        }
        print!("{}", render::settlement(settlement));
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
