//! Typed surface of the crowdfunding contract.
//!
//! [`LedgerGateway`] is the only way the rest of the crate talks to the
//! ledger. Every method is a suspension point and none of them retry.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::address::Address;
use crate::campaign::{CampaignId, CampaignRecord};
use crate::units::Wei;

pub(crate) mod abi;
pub mod memory;
pub mod rpc;

pub use memory::{MemoryLedger, ReadFault};
pub use rpc::RpcGateway;

/// Failure reported by a gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The node could not be reached or the HTTP exchange failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error.
    #[error("node error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The contract rejected the call.
    #[error("reverted: {0}")]
    Reverted(String),

    /// The signer refused to sign or submit.
    #[error("rejected by signer: {0}")]
    Rejected(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The transaction was sent but its receipt could not be obtained. It
    /// may still be mined.
    #[error("transaction {tx_hash} was submitted but its outcome is unknown: {reason}")]
    Unconfirmed { tx_hash: String, reason: String },
}

/// State-changing contract functions.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ContractCall {
    CreateCampaign {
        title: String,
        pledge_cost: Wei,
        pledges_needed: u64,
    },
    Pledge {
        campaign_id: CampaignId,
        count: u64,
    },
    CancelCampaign {
        campaign_id: CampaignId,
    },
    CompleteCampaign {
        campaign_id: CampaignId,
    },
    RefundInvestor {
        campaign_id: CampaignId,
    },
    WithdrawFees,
    ChangeOwner {
        new_owner: Address,
    },
    BanUser {
        user: Address,
    },
    DeactivateContract,
}

impl ContractCall {
    /// Contract function name, as it appears in the ABI.
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::CreateCampaign { .. } => "createCampaign",
            ContractCall::Pledge { .. } => "pledge",
            ContractCall::CancelCampaign { .. } => "cancelCampaign",
            ContractCall::CompleteCampaign { .. } => "completeCampaign",
            ContractCall::RefundInvestor { .. } => "refundInvestor",
            ContractCall::WithdrawFees => "withdrawFees",
            ContractCall::ChangeOwner { .. } => "changeOwner",
            ContractCall::BanUser { .. } => "banUser",
            ContractCall::DeactivateContract => "deactivateContract",
        }
    }
}

/// A contract call to be signed and submitted on behalf of `from`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub call: ContractCall,
    /// Native value attached to the call; only payable functions accept it.
    pub value: Wei,
}

/// Events the contract emits. Informational only.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContractEvent {
    CampaignCreated {
        campaign_id: CampaignId,
        entrepreneur: Address,
        title: String,
    },
    CampaignCancelled {
        campaign_id: CampaignId,
    },
    CampaignCompleted {
        campaign_id: CampaignId,
    },
    PledgeMade {
        campaign_id: CampaignId,
        backer: Address,
        amount: Wei,
    },
    InvestorRefunded {
        campaign_id: CampaignId,
        investor: Address,
        amount: Wei,
    },
    FundsWithdrawn {
        owner: Address,
        amount: Wei,
    },
    UserBanned {
        user: Address,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

/// Settled transaction.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub events: Vec<ContractEvent>,
}

/// Read and write calls against the fixed contract ABI.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn owner(&self) -> Result<Address, GatewayError>;

    /// Fee that must accompany `createCampaign`.
    async fn campaign_fee(&self) -> Result<Wei, GatewayError>;

    async fn total_fees_accumulated(&self) -> Result<Wei, GatewayError>;

    /// Native balance held by the contract.
    async fn contract_balance(&self) -> Result<Wei, GatewayError>;

    /// Number of campaigns ever created; ids are `0..next_campaign_id`.
    async fn next_campaign_id(&self) -> Result<CampaignId, GatewayError>;

    async fn campaign(&self, id: CampaignId) -> Result<CampaignRecord, GatewayError>;

    /// Pledges `backer` holds in campaign `id` (`getBackerShares`).
    async fn backer_shares(&self, id: CampaignId, backer: Address) -> Result<u64, GatewayError>;

    async fn is_banned(&self, account: Address) -> Result<bool, GatewayError>;

    async fn is_active(&self) -> Result<bool, GatewayError>;

    /// Submit a transaction and wait until it settles.
    async fn submit(&self, tx: Transaction) -> Result<TxReceipt, GatewayError>;
}

/// Supplies the account transactions are sent from. Key material stays with
/// the provider.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn selected_account(&self) -> Result<Address, GatewayError>;
}

/// Account provider pinned to one address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedAccount(pub Address);

#[async_trait]
impl AccountProvider for FixedAccount {
    async fn selected_account(&self) -> Result<Address, GatewayError> {
        Ok(self.0)
    }
}
