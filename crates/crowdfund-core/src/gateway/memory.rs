//! In-process ledger that applies the crowdfunding contract rules.
//!
//! Used by tests and demos in place of a node. Reads and writes can be made
//! to fail on demand to exercise the all-or-nothing paths of the catalog and
//! dispatcher.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::campaign::{CampaignId, CampaignRecord};
use crate::gateway::{
    ContractCall, ContractEvent, GatewayError, LedgerGateway, Transaction, TxReceipt,
};
use crate::units::Wei;

/// Read operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadFault {
    NextCampaignId,
    Campaign(CampaignId),
    BackerShares(CampaignId),
    Owner,
    CampaignFee,
    Fees,
    Balance,
    Status,
}

#[derive(Default)]
struct Faults {
    reads: BTreeSet<ReadFault>,
    next_write: Option<String>,
    lose_receipt: bool,
}

struct LedgerState {
    owner: Address,
    campaign_fee: Wei,
    active: bool,
    total_fees: Wei,
    held: Wei,
    campaigns: Vec<CampaignRecord>,
    shares: BTreeMap<(CampaignId, Address), u64>,
    banned: BTreeSet<Address>,
    balances: BTreeMap<Address, Wei>,
    events: Vec<ContractEvent>,
    height: u64,
}

fn revert(reason: &str) -> GatewayError {
    GatewayError::Reverted(reason.to_string())
}

impl LedgerState {
    fn credit(&mut self, account: Address, amount: Wei) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn debit(&mut self, account: Address, amount: Wei) -> Result<(), GatewayError> {
        let balance = self.balances.get(&account).copied().unwrap_or_default();
        if balance < amount {
            return Err(revert("insufficient funds"));
        }
        self.balances.insert(account, balance - amount);
        Ok(())
    }

    fn campaign_mut(&mut self, id: CampaignId) -> Result<&mut CampaignRecord, GatewayError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.campaigns.get_mut(idx))
            .ok_or_else(|| revert("campaign does not exist"))
    }

    fn require_owner(&self, from: Address) -> Result<(), GatewayError> {
        if from != self.owner {
            return Err(revert("caller is not the owner"));
        }
        Ok(())
    }

    /// Checks every precondition before touching any balance, so a revert
    /// leaves the state as it was.
    fn apply(&mut self, tx: &Transaction) -> Result<Vec<ContractEvent>, GatewayError> {
        if !self.active {
            return Err(revert("contract is deactivated"));
        }
        let from = tx.from;
        let payable = matches!(
            tx.call,
            ContractCall::CreateCampaign { .. } | ContractCall::Pledge { .. }
        );
        if !payable && tx.value != 0 {
            return Err(revert("function is not payable"));
        }

        match &tx.call {
            ContractCall::CreateCampaign {
                title,
                pledge_cost,
                pledges_needed,
            } => {
                if self.banned.contains(&from) {
                    return Err(revert("user is banned"));
                }
                if from == self.owner {
                    return Err(revert("owner cannot create campaigns"));
                }
                if tx.value != self.campaign_fee {
                    return Err(revert("incorrect campaign fee"));
                }
                if *pledge_cost == 0 || *pledges_needed == 0 {
                    return Err(revert("invalid campaign parameters"));
                }
                self.debit(from, tx.value)?;
                self.total_fees += tx.value;
                self.held += tx.value;
                let campaign_id = self.campaigns.len() as CampaignId;
                self.campaigns.push(CampaignRecord {
                    entrepreneur: from,
                    title: title.clone(),
                    pledge_cost: *pledge_cost,
                    pledges_needed: *pledges_needed,
                    pledges_count: 0,
                    fulfilled: false,
                    cancelled: false,
                });
                Ok(vec![ContractEvent::CampaignCreated {
                    campaign_id,
                    entrepreneur: from,
                    title: title.clone(),
                }])
            }
            ContractCall::Pledge { campaign_id, count } => {
                let campaign = self.campaign_mut(*campaign_id)?;
                if campaign.fulfilled || campaign.cancelled {
                    return Err(revert("campaign is not active"));
                }
                if *count == 0 {
                    return Err(revert("pledge count must be positive"));
                }
                let expected = campaign
                    .pledge_cost
                    .checked_mul(u128::from(*count))
                    .ok_or_else(|| revert("pledge value overflow"))?;
                if tx.value != expected {
                    return Err(revert("incorrect pledge value"));
                }
                self.debit(from, tx.value)?;
                self.held += tx.value;
                let campaign = self.campaign_mut(*campaign_id)?;
                campaign.pledges_count += count;
                *self.shares.entry((*campaign_id, from)).or_default() += count;
                Ok(vec![ContractEvent::PledgeMade {
                    campaign_id: *campaign_id,
                    backer: from,
                    amount: tx.value,
                }])
            }
            ContractCall::CancelCampaign { campaign_id } => {
                let owner = self.owner;
                let campaign = self.campaign_mut(*campaign_id)?;
                if from != campaign.entrepreneur && from != owner {
                    return Err(revert("not authorized"));
                }
                if campaign.fulfilled || campaign.cancelled {
                    return Err(revert("campaign is not active"));
                }
                campaign.cancelled = true;
                Ok(vec![ContractEvent::CampaignCancelled {
                    campaign_id: *campaign_id,
                }])
            }
            ContractCall::CompleteCampaign { campaign_id } => {
                let owner = self.owner;
                let campaign = self.campaign_mut(*campaign_id)?;
                if from != campaign.entrepreneur && from != owner {
                    return Err(revert("not authorized"));
                }
                if campaign.fulfilled || campaign.cancelled {
                    return Err(revert("campaign is not active"));
                }
                if campaign.pledges_count < campaign.pledges_needed {
                    return Err(revert("pledge goal not reached"));
                }
                campaign.fulfilled = true;
                let payout = campaign
                    .pledge_cost
                    .saturating_mul(u128::from(campaign.pledges_count));
                let entrepreneur = campaign.entrepreneur;
                self.held = self.held.saturating_sub(payout);
                self.credit(entrepreneur, payout);
                Ok(vec![ContractEvent::CampaignCompleted {
                    campaign_id: *campaign_id,
                }])
            }
            ContractCall::RefundInvestor { campaign_id } => {
                let campaign = self.campaign_mut(*campaign_id)?;
                if !campaign.cancelled {
                    return Err(revert("campaign is not cancelled"));
                }
                let pledge_cost = campaign.pledge_cost;
                let shares = self
                    .shares
                    .get(&(*campaign_id, from))
                    .copied()
                    .unwrap_or_default();
                if shares == 0 {
                    return Err(revert("nothing to refund"));
                }
                let amount = pledge_cost.saturating_mul(u128::from(shares));
                self.shares.remove(&(*campaign_id, from));
                self.held = self.held.saturating_sub(amount);
                self.credit(from, amount);
                Ok(vec![ContractEvent::InvestorRefunded {
                    campaign_id: *campaign_id,
                    investor: from,
                    amount,
                }])
            }
            ContractCall::WithdrawFees => {
                self.require_owner(from)?;
                let amount = std::mem::take(&mut self.total_fees);
                self.held = self.held.saturating_sub(amount);
                self.credit(from, amount);
                Ok(vec![ContractEvent::FundsWithdrawn { owner: from, amount }])
            }
            ContractCall::ChangeOwner { new_owner } => {
                self.require_owner(from)?;
                if new_owner.is_zero() {
                    return Err(revert("invalid owner address"));
                }
                let previous_owner = std::mem::replace(&mut self.owner, *new_owner);
                Ok(vec![ContractEvent::OwnershipTransferred {
                    previous_owner,
                    new_owner: *new_owner,
                }])
            }
            ContractCall::BanUser { user } => {
                self.require_owner(from)?;
                self.banned.insert(*user);
                Ok(vec![ContractEvent::UserBanned { user: *user }])
            }
            ContractCall::DeactivateContract => {
                self.require_owner(from)?;
                self.active = false;
                Ok(Vec::new())
            }
        }
    }
}

/// Ledger held entirely in memory.
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    faults: Mutex<Faults>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new(owner: Address, campaign_fee: Wei) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                owner,
                campaign_fee,
                active: true,
                total_fees: 0,
                held: 0,
                campaigns: Vec::new(),
                shares: BTreeMap::new(),
                banned: BTreeSet::new(),
                balances: BTreeMap::new(),
                events: Vec::new(),
                height: 0,
            }),
            faults: Mutex::new(Faults::default()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give `account` spendable funds.
    pub fn fund(&self, account: Address, amount: Wei) {
        self.state().credit(account, amount);
    }

    pub fn balance_of(&self, account: Address) -> Wei {
        self.state().balances.get(&account).copied().unwrap_or_default()
    }

    /// Every event emitted so far, oldest first.
    pub fn events(&self) -> Vec<ContractEvent> {
        self.state().events.clone()
    }

    /// Make `fault` fail until [`MemoryLedger::clear_faults`] is called.
    pub fn fail_read(&self, fault: ReadFault) {
        self.faults().reads.insert(fault);
    }

    /// Revert the next submitted transaction with `reason`.
    pub fn fail_next_write(&self, reason: impl Into<String>) {
        self.faults().next_write = Some(reason.into());
    }

    /// Apply the next submitted transaction but report its outcome as
    /// unknown, as a node that drops the connection after accepting it would.
    pub fn lose_next_receipt(&self) {
        self.faults().lose_receipt = true;
    }

    pub fn clear_faults(&self) {
        *self.faults() = Faults::default();
    }

    /// Overwrite the status flags of a stored campaign, bypassing the rules.
    /// Returns `false` if the campaign does not exist.
    pub fn force_flags(&self, id: CampaignId, fulfilled: bool, cancelled: bool) -> bool {
        match self.state().campaign_mut(id) {
            Ok(campaign) => {
                campaign.fulfilled = fulfilled;
                campaign.cancelled = cancelled;
                true
            }
            Err(_) => false,
        }
    }

    /// Number of read calls served, including failed ones.
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of transactions submitted, including reverted ones.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self, fault: ReadFault) -> Result<(), GatewayError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.faults().reads.contains(&fault) {
            return Err(GatewayError::Transport(format!(
                "injected read fault: {fault:?}"
            )));
        }
        Ok(())
    }
}

fn tx_hash(height: u64, tx: &Transaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tx");
    hasher.update(height.to_le_bytes());
    hasher.update(tx.from.as_bytes());
    hasher.update(tx.call.function_name().as_bytes());
    hasher.update(tx.value.to_le_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn owner(&self) -> Result<Address, GatewayError> {
        self.check_read(ReadFault::Owner)?;
        Ok(self.state().owner)
    }

    async fn campaign_fee(&self) -> Result<Wei, GatewayError> {
        self.check_read(ReadFault::CampaignFee)?;
        Ok(self.state().campaign_fee)
    }

    async fn total_fees_accumulated(&self) -> Result<Wei, GatewayError> {
        self.check_read(ReadFault::Fees)?;
        Ok(self.state().total_fees)
    }

    async fn contract_balance(&self) -> Result<Wei, GatewayError> {
        self.check_read(ReadFault::Balance)?;
        Ok(self.state().held)
    }

    async fn next_campaign_id(&self) -> Result<CampaignId, GatewayError> {
        self.check_read(ReadFault::NextCampaignId)?;
        Ok(self.state().campaigns.len() as CampaignId)
    }

    async fn campaign(&self, id: CampaignId) -> Result<CampaignRecord, GatewayError> {
        self.check_read(ReadFault::Campaign(id))?;
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.state().campaigns.get(idx).cloned())
            .ok_or_else(|| revert("campaign does not exist"))
    }

    async fn backer_shares(&self, id: CampaignId, backer: Address) -> Result<u64, GatewayError> {
        self.check_read(ReadFault::BackerShares(id))?;
        Ok(self
            .state()
            .shares
            .get(&(id, backer))
            .copied()
            .unwrap_or_default())
    }

    async fn is_banned(&self, account: Address) -> Result<bool, GatewayError> {
        self.check_read(ReadFault::Status)?;
        Ok(self.state().banned.contains(&account))
    }

    async fn is_active(&self) -> Result<bool, GatewayError> {
        self.check_read(ReadFault::Status)?;
        Ok(self.state().active)
    }

    async fn submit(&self, tx: Transaction) -> Result<TxReceipt, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let lose_receipt = {
            let mut faults = self.faults();
            if let Some(reason) = faults.next_write.take() {
                return Err(GatewayError::Reverted(reason));
            }
            std::mem::take(&mut faults.lose_receipt)
        };
        let mut state = self.state();
        let events = state.apply(&tx)?;
        state.height += 1;
        let height = state.height;
        state.events.extend(events.iter().cloned());
        let tx_hash = tx_hash(height, &tx);
        if lose_receipt {
            return Err(GatewayError::Unconfirmed {
                tx_hash,
                reason: "injected receipt loss".into(),
            });
        }
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(height),
            events,
        })
    }
}
