//! crowdfund: browse campaigns held by the crowdfunding contract and submit
//! pledges, campaign updates and owner actions through a JSON-RPC node.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use crowdfund_core::{ActionKind, Address, CampaignId, CampaignStatus};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::Session;
use config::{ClientConfig, Overrides};

#[derive(Parser)]
#[command(name = "crowdfund")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "CROWDFUND_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the node
    #[arg(long, global = true, env = "CROWDFUND_RPC_URL")]
    rpc_url: Option<String>,

    /// Address of the crowdfunding contract
    #[arg(long, global = true, env = "CROWDFUND_CONTRACT")]
    contract: Option<Address>,

    /// Account to act as (defaults to the node's first account)
    #[arg(long, global = true, env = "CROWDFUND_ACCOUNT")]
    account: Option<Address>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account, the contract owner, balances and available actions
    Status,

    /// List campaigns by status
    Campaigns {
        /// Only show one partition
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },

    /// Create a campaign; the contract's campaign fee is attached
    Create {
        title: String,
        /// Price of one pledge, in ETH
        pledge_cost: String,
        /// Pledges required before the campaign can be fulfilled
        pledges_needed: String,
    },

    /// Pledge one unit to a campaign
    Pledge {
        id: CampaignId,
        /// Amount to pay, in ETH (defaults to the campaign's pledge cost)
        #[arg(long)]
        cost: Option<String>,
    },

    /// Cancel a campaign you created (or any campaign, as owner)
    Cancel { id: CampaignId },

    /// Complete a campaign whose pledge goal is reached
    Fulfill { id: CampaignId },

    /// Claim back your pledges in a cancelled campaign
    Refund { id: CampaignId },

    /// Owner-only controls
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Transfer the collected campaign fees to the owner
    WithdrawFees,
    /// Hand the contract to a new owner
    ChangeOwner { new_owner: String },
    /// Stop an address from creating campaigns
    Ban { user: String },
    /// Permanently disable the contract
    Deactivate,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Active,
    Fulfilled,
    Cancelled,
}

impl From<StatusFilter> for CampaignStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Active => CampaignStatus::Active,
            StatusFilter::Fulfilled => CampaignStatus::Fulfilled,
            StatusFilter::Cancelled => CampaignStatus::Cancelled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load(cli.config.as_deref())?.apply(Overrides {
        rpc_url: cli.rpc_url,
        contract: cli.contract,
        account: cli.account,
    });
    config.validate()?;

    let mut session = Session::connect(&config, cli.json).await?;
    match cli.command {
        Commands::Status => session.status().await,
        Commands::Campaigns { status } => session.campaigns(status.map(Into::into)).await,
        Commands::Create {
            title,
            pledge_cost,
            pledges_needed,
        } => session.create(&title, &pledge_cost, &pledges_needed).await,
        Commands::Pledge { id, cost } => session.pledge(id, cost).await,
        Commands::Cancel { id } => session.campaign_action(ActionKind::CancelCampaign, id).await,
        Commands::Fulfill { id } => session.campaign_action(ActionKind::CompleteCampaign, id).await,
        Commands::Refund { id } => session.campaign_action(ActionKind::RefundInvestor, id).await,
        Commands::Admin { action } => match action {
            AdminCommands::WithdrawFees => session.withdraw_fees().await,
            AdminCommands::ChangeOwner { new_owner } => session.change_owner(&new_owner).await,
            AdminCommands::Ban { user } => session.ban(&user).await,
            AdminCommands::Deactivate => session.deactivate().await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_pledge_with_global_flags() {
        let cli = Cli::try_parse_from([
            "crowdfund",
            "pledge",
            "3",
            "--cost",
            "0.5",
            "--json",
            "--account",
            "0x0101010101010101010101010101010101010101",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.account.is_some());
        assert!(matches!(
            cli.command,
            Commands::Pledge { id: 3, cost: Some(ref c) } if c == "0.5"
        ));
    }

    #[test]
    fn rejects_malformed_contract_address() {
        assert!(Cli::try_parse_from(["crowdfund", "--contract", "0x12", "status"]).is_err());
    }
}
