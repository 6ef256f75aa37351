//! Core of the crowdfunding client.
//!
//! The crate keeps a categorized view of the campaigns held by a ledger
//! contract and turns user intents into ledger transactions:
//!
//! * [`units`]: lossless conversion between the base unit and the display
//!   denomination.
//! * [`gateway`]: the typed read/write surface of the contract, with a
//!   JSON-RPC implementation and an in-memory one.
//! * [`catalog`]: all-or-nothing refresh of the campaign set into the
//!   active / fulfilled / cancelled partitions.
//! * [`permissions`]: which actions the current account may take.
//! * [`dispatcher`]: lifecycle of one outstanding mutation and the reload
//!   that follows it.
//!
//! Nothing here runs a background loop; callers drive every refresh and
//! dispatch explicitly.

pub mod address;
pub mod campaign;
pub mod catalog;
pub mod dashboard;
pub mod dispatcher;
pub mod gateway;
pub mod overview;
pub mod permissions;
pub mod units;

mod error;

pub use address::{Address, AddressParseError};
pub use campaign::{Campaign, CampaignId, CampaignRecord, CampaignStatus};
pub use catalog::{CampaignCatalog, CatalogSnapshot};
pub use dashboard::Dashboard;
pub use dispatcher::{ActionDispatcher, ActionKind, ActionState, ReloadScope, Settlement};
pub use error::{CrowdfundError, ErrorKind};
pub use gateway::{
    AccountProvider, ContractCall, ContractEvent, FixedAccount, GatewayError, LedgerGateway,
    Transaction, TxReceipt,
};
pub use overview::AccountOverview;
pub use permissions::PermissionView;
pub use units::{InvalidAmount, UnitConverter, Wei};
