//! Turns user intents into ledger transactions.
//!
//! A dispatcher tracks one action at a time through
//! `Idle -> Pending -> {Succeeded | Failed}`. Inputs are validated and the
//! account's permission is checked before anything is submitted. After the
//! ledger accepts a transaction the dashboard is reloaded, so a `Succeeded`
//! state always follows a reload attempt.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::address::Address;
use crate::campaign::CampaignId;
use crate::dashboard::Dashboard;
use crate::error::{CrowdfundError, ErrorKind};
use crate::gateway::{AccountProvider, ContractCall, LedgerGateway, Transaction, TxReceipt};
use crate::units::{UnitConverter, Wei};

/// Every mutation the dispatcher can submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateCampaign,
    Pledge,
    CancelCampaign,
    CompleteCampaign,
    RefundInvestor,
    WithdrawFees,
    ChangeOwner,
    BanUser,
    DeactivateContract,
}

impl ActionKind {
    /// Contract function the action calls.
    pub fn call_name(&self) -> &'static str {
        match self {
            ActionKind::CreateCampaign => "createCampaign",
            ActionKind::Pledge => "pledge",
            ActionKind::CancelCampaign => "cancelCampaign",
            ActionKind::CompleteCampaign => "completeCampaign",
            ActionKind::RefundInvestor => "refundInvestor",
            ActionKind::WithdrawFees => "withdrawFees",
            ActionKind::ChangeOwner => "changeOwner",
            ActionKind::BanUser => "banUser",
            ActionKind::DeactivateContract => "deactivateContract",
        }
    }

    /// What has to be re-read once the action settles. Actions that move
    /// fees, ownership or account standing need the full reload.
    pub fn reload_scope(&self) -> ReloadScope {
        match self {
            ActionKind::CreateCampaign
            | ActionKind::Pledge
            | ActionKind::CancelCampaign
            | ActionKind::CompleteCampaign
            | ActionKind::RefundInvestor => ReloadScope::Campaigns,
            ActionKind::WithdrawFees
            | ActionKind::ChangeOwner
            | ActionKind::BanUser
            | ActionKind::DeactivateContract => ReloadScope::Full,
        }
    }

    pub fn targets_campaign(&self) -> bool {
        matches!(
            self,
            ActionKind::Pledge
                | ActionKind::CancelCampaign
                | ActionKind::CompleteCampaign
                | ActionKind::RefundInvestor
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.call_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadScope {
    /// Catalog only.
    Campaigns,
    /// Account, overview and catalog.
    Full,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    Idle,
    Pending {
        kind: ActionKind,
    },
    Succeeded {
        kind: ActionKind,
        tx_hash: String,
    },
    Failed {
        kind: ActionKind,
        cause: ErrorKind,
        reason: String,
    },
}

impl ActionState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActionState::Pending { .. })
    }
}

/// Outcome of an accepted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub kind: ActionKind,
    pub receipt: TxReceipt,
    /// Set when the transaction settled but the reload after it failed. The
    /// dashboard keeps its previous state in that case.
    pub reload_error: Option<String>,
}

pub struct ActionDispatcher<G> {
    gateway: Arc<G>,
    units: UnitConverter,
    state: ActionState,
}

impl<G: LedgerGateway> ActionDispatcher<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            units: UnitConverter::default(),
            state: ActionState::Idle,
        }
    }

    pub fn with_units(mut self, units: UnitConverter) -> Self {
        self.units = units;
        self
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Return to `Idle`. This is also the way out of a `Pending` state left
    /// behind by a dispatch whose future was dropped before it settled.
    pub fn reset(&mut self) {
        self.state = ActionState::Idle;
    }

    pub async fn create_campaign<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        title: &str,
        pledge_cost: &str,
        pledges_needed: &str,
    ) -> Result<Settlement, CrowdfundError> {
        let kind = ActionKind::CreateCampaign;
        self.begin(kind)?;
        let prepared = self
            .prepare_create(dashboard, title, pledge_cost, pledges_needed)
            .await;
        self.execute(dashboard, kind, prepared).await
    }

    /// Pledge one unit to campaign `id`, paying `pledge_cost` (display
    /// denomination).
    pub async fn pledge<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        id: CampaignId,
        pledge_cost: &str,
    ) -> Result<Settlement, CrowdfundError> {
        let kind = ActionKind::Pledge;
        self.begin(kind)?;
        let prepared = match self.positive_amount("pledge cost", pledge_cost) {
            Ok(value) => authorize(dashboard, kind, Some(id)).await.map(|from| Transaction {
                from,
                call: ContractCall::Pledge {
                    campaign_id: id,
                    count: 1,
                },
                value,
            }),
            Err(err) => Err(err),
        };
        self.execute(dashboard, kind, prepared).await
    }

    pub async fn cancel_campaign<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        id: CampaignId,
    ) -> Result<Settlement, CrowdfundError> {
        self.campaign_call(dashboard, ActionKind::CancelCampaign, id, |campaign_id| {
            ContractCall::CancelCampaign { campaign_id }
        })
        .await
    }

    pub async fn complete_campaign<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        id: CampaignId,
    ) -> Result<Settlement, CrowdfundError> {
        self.campaign_call(dashboard, ActionKind::CompleteCampaign, id, |campaign_id| {
            ContractCall::CompleteCampaign { campaign_id }
        })
        .await
    }

    pub async fn refund_investor<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        id: CampaignId,
    ) -> Result<Settlement, CrowdfundError> {
        self.campaign_call(dashboard, ActionKind::RefundInvestor, id, |campaign_id| {
            ContractCall::RefundInvestor { campaign_id }
        })
        .await
    }

    pub async fn withdraw_fees<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
    ) -> Result<Settlement, CrowdfundError> {
        self.admin_call(dashboard, ActionKind::WithdrawFees, Ok(ContractCall::WithdrawFees))
            .await
    }

    /// Hand the contract to `new_owner`. The address must be well-formed and
    /// non-zero.
    pub async fn change_owner<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        new_owner: &str,
    ) -> Result<Settlement, CrowdfundError> {
        let call = parse_address("new owner", new_owner).and_then(|new_owner| {
            if new_owner.is_zero() {
                Err(CrowdfundError::Validation(
                    "new owner cannot be the zero address".into(),
                ))
            } else {
                Ok(ContractCall::ChangeOwner { new_owner })
            }
        });
        self.admin_call(dashboard, ActionKind::ChangeOwner, call).await
    }

    pub async fn ban_user<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        user: &str,
    ) -> Result<Settlement, CrowdfundError> {
        let call = parse_address("user", user).map(|user| ContractCall::BanUser { user });
        self.admin_call(dashboard, ActionKind::BanUser, call).await
    }

    pub async fn deactivate_contract<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
    ) -> Result<Settlement, CrowdfundError> {
        self.admin_call(
            dashboard,
            ActionKind::DeactivateContract,
            Ok(ContractCall::DeactivateContract),
        )
        .await
    }

    async fn prepare_create<A: AccountProvider>(
        &self,
        dashboard: &mut Dashboard<G, A>,
        title: &str,
        pledge_cost: &str,
        pledges_needed: &str,
    ) -> Result<Transaction, CrowdfundError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CrowdfundError::Validation("title is required".into()));
        }
        let pledge_cost = self.positive_amount("pledge cost", pledge_cost)?;
        let pledges_needed = match pledges_needed.trim().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(CrowdfundError::Validation(format!(
                    "pledges needed must be a positive integer, got {pledges_needed:?}"
                )))
            }
        };

        let from = authorize(dashboard, ActionKind::CreateCampaign, None).await?;
        let fee = self
            .gateway
            .campaign_fee()
            .await
            .map_err(|e| CrowdfundError::read("campaignFee", e))?;
        Ok(Transaction {
            from,
            call: ContractCall::CreateCampaign {
                title: title.to_string(),
                pledge_cost,
                pledges_needed,
            },
            value: fee,
        })
    }

    async fn campaign_call<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        kind: ActionKind,
        id: CampaignId,
        call: impl FnOnce(CampaignId) -> ContractCall,
    ) -> Result<Settlement, CrowdfundError> {
        self.begin(kind)?;
        let prepared = authorize(dashboard, kind, Some(id))
            .await
            .map(|from| Transaction {
                from,
                call: call(id),
                value: 0,
            });
        self.execute(dashboard, kind, prepared).await
    }

    async fn admin_call<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        kind: ActionKind,
        call: Result<ContractCall, CrowdfundError>,
    ) -> Result<Settlement, CrowdfundError> {
        self.begin(kind)?;
        let prepared = match call {
            Ok(call) => authorize(dashboard, kind, None)
                .await
                .map(|from| Transaction {
                    from,
                    call,
                    value: 0,
                }),
            Err(err) => Err(err),
        };
        self.execute(dashboard, kind, prepared).await
    }

    fn positive_amount(&self, field: &str, display: &str) -> Result<Wei, CrowdfundError> {
        let amount = self.units.to_base_unit(display)?;
        if amount == 0 {
            return Err(CrowdfundError::Validation(format!(
                "{field} must be greater than zero"
            )));
        }
        Ok(amount)
    }

    fn begin(&mut self, kind: ActionKind) -> Result<(), CrowdfundError> {
        if let ActionState::Pending { kind: pending } = self.state {
            return Err(CrowdfundError::Busy(pending));
        }
        self.state = ActionState::Pending { kind };
        Ok(())
    }

    fn fail(&mut self, kind: ActionKind, err: CrowdfundError) -> CrowdfundError {
        warn!(action = %kind, error = %err, "action failed");
        self.state = ActionState::Failed {
            kind,
            cause: err.kind(),
            reason: err.to_string(),
        };
        err
    }

    async fn execute<A: AccountProvider>(
        &mut self,
        dashboard: &mut Dashboard<G, A>,
        kind: ActionKind,
        prepared: Result<Transaction, CrowdfundError>,
    ) -> Result<Settlement, CrowdfundError> {
        let tx = match prepared {
            Ok(tx) => tx,
            Err(err) => return Err(self.fail(kind, err)),
        };
        let receipt = match self.submit(tx).await {
            Ok(receipt) => receipt,
            Err(err) if err.is_unconfirmed_write() => {
                if let Err(reload) = dashboard.reconcile(kind.reload_scope()).await {
                    warn!(action = %kind, error = %reload, "reload after unconfirmed write failed");
                }
                return Err(self.fail(kind, err));
            }
            Err(err) => return Err(self.fail(kind, err)),
        };

        let reload_error = match dashboard.reconcile(kind.reload_scope()).await {
            Ok(()) => None,
            Err(err) => {
                warn!(action = %kind, error = %err, "reload after settlement failed");
                Some(err.to_string())
            }
        };
        info!(action = %kind, tx_hash = %receipt.tx_hash, "action settled");
        self.state = ActionState::Succeeded {
            kind,
            tx_hash: receipt.tx_hash.clone(),
        };
        Ok(Settlement {
            kind,
            receipt,
            reload_error,
        })
    }

    #[instrument(skip_all, fields(call = tx.call.function_name(), from = %tx.from))]
    async fn submit(&self, tx: Transaction) -> Result<TxReceipt, CrowdfundError> {
        debug!(value = tx.value, "submitting transaction");
        let call = tx.call.function_name();
        self.gateway
            .submit(tx)
            .await
            .map_err(|e| CrowdfundError::write(call, e))
    }
}

fn parse_address(field: &str, input: &str) -> Result<Address, CrowdfundError> {
    input
        .trim()
        .parse::<Address>()
        .map_err(|e| CrowdfundError::Validation(format!("{field}: {e}")))
}

/// Load the dashboard if needed and check that the selected account may
/// perform `kind`. Returns the account to send from.
/// Campaign actions are always checked against campaigns re-read from the
/// ledger.
async fn authorize<G: LedgerGateway, A: AccountProvider>(
    dashboard: &mut Dashboard<G, A>,
    kind: ActionKind,
    campaign_id: Option<CampaignId>,
) -> Result<Address, CrowdfundError> {
    if !dashboard.is_loaded() {
        dashboard.reload().await?;
    } else if campaign_id.is_some() {
        debug!(action = %kind, "refreshing campaigns before authorization");
        dashboard.refresh_campaigns().await?;
    }
    let view = dashboard
        .permissions()
        .ok_or_else(|| CrowdfundError::Validation("account overview is not loaded".into()))?;
    let campaign = match campaign_id {
        Some(id) => Some(
            dashboard
                .snapshot()
                .and_then(|s| s.get(id))
                .ok_or_else(|| CrowdfundError::Validation(format!("unknown campaign {id}")))?,
        ),
        None => None,
    };
    view.authorize(kind, campaign)?;
    Ok(view.account)
}
