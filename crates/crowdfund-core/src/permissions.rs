//! Which actions the current account may take.
//!
//! Everything here is a pure function of the account, the contract owner and
//! (for per-campaign actions) the campaign itself.

use serde::Serialize;

use crate::address::Address;
use crate::campaign::{Campaign, CampaignStatus};
use crate::dispatcher::ActionKind;
use crate::error::CrowdfundError;

/// Owner-only controls, in display order.
pub const ADMIN_ACTIONS: [ActionKind; 4] = [
    ActionKind::WithdrawFees,
    ActionKind::ChangeOwner,
    ActionKind::BanUser,
    ActionKind::DeactivateContract,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionView {
    pub account: Address,
    pub owner: Address,
}

impl PermissionView {
    pub fn new(account: Address, owner: Address) -> Self {
        Self { account, owner }
    }

    pub fn is_owner(&self) -> bool {
        self.account == self.owner
    }

    /// The account created the campaign or owns the contract.
    pub fn controls(&self, campaign: &Campaign) -> bool {
        self.account == campaign.entrepreneur || self.is_owner()
    }

    pub fn can_create(&self) -> bool {
        !self.is_owner()
    }

    pub fn can_cancel(&self, campaign: &Campaign) -> bool {
        self.controls(campaign)
    }

    pub fn can_fulfill(&self, campaign: &Campaign) -> bool {
        self.controls(campaign) && campaign.goal_reached()
    }

    pub fn can_refund(&self, campaign: &Campaign) -> bool {
        campaign.is_cancelled() && campaign.viewer_pledge_count > 0
    }

    pub fn can_administer(&self) -> bool {
        self.is_owner()
    }

    /// Actions to offer on a campaign row. Settled campaigns only ever offer
    /// a refund.
    pub fn campaign_actions(&self, campaign: &Campaign) -> Vec<ActionKind> {
        let mut actions = Vec::new();
        match campaign.status {
            CampaignStatus::Active => {
                actions.push(ActionKind::Pledge);
                if self.can_cancel(campaign) {
                    actions.push(ActionKind::CancelCampaign);
                }
                if self.can_fulfill(campaign) {
                    actions.push(ActionKind::CompleteCampaign);
                }
            }
            CampaignStatus::Cancelled => {
                if self.can_refund(campaign) {
                    actions.push(ActionKind::RefundInvestor);
                }
            }
            CampaignStatus::Fulfilled => {}
        }
        actions
    }

    /// Owner controls, empty for everyone else.
    pub fn admin_actions(&self) -> Vec<ActionKind> {
        if self.can_administer() {
            ADMIN_ACTIONS.to_vec()
        } else {
            Vec::new()
        }
    }

    /// Check `kind` against this view. `campaign` is required for the
    /// per-campaign actions and ignored otherwise.
    pub fn authorize(
        &self,
        kind: ActionKind,
        campaign: Option<&Campaign>,
    ) -> Result<(), CrowdfundError> {
        let allowed = match kind {
            ActionKind::CreateCampaign => self.can_create(),
            ActionKind::Pledge => true,
            ActionKind::CancelCampaign => campaign.is_some_and(|c| self.can_cancel(c)),
            ActionKind::CompleteCampaign => campaign.is_some_and(|c| self.can_fulfill(c)),
            ActionKind::RefundInvestor => campaign.is_some_and(|c| self.can_refund(c)),
            ActionKind::WithdrawFees
            | ActionKind::ChangeOwner
            | ActionKind::BanUser
            | ActionKind::DeactivateContract => self.can_administer(),
        };
        if allowed {
            return Ok(());
        }
        let reason = match (kind, campaign) {
            (ActionKind::CreateCampaign, _) => {
                format!("{} is the contract owner and cannot create campaigns", self.account)
            }
            (ActionKind::CompleteCampaign, Some(c)) if self.controls(c) => format!(
                "campaign {} has {} of {} pledges",
                c.id, c.pledges_count, c.pledges_needed
            ),
            (ActionKind::RefundInvestor, Some(c)) if !c.is_cancelled() => {
                format!("campaign {} is not cancelled", c.id)
            }
            (ActionKind::RefundInvestor, Some(c)) => {
                format!("{} holds no pledges in campaign {}", self.account, c.id)
            }
            (_, Some(c)) => format!("{} does not control campaign {}", self.account, c.id),
            (_, None) if kind.targets_campaign() => format!("{kind} requires a campaign"),
            (_, None) => format!("{kind} is reserved for the contract owner"),
        };
        Err(CrowdfundError::Permission(reason))
    }
}
