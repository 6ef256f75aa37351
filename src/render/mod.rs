//! Human-readable output. Every function returns a `String` so the command
//! layer decides where it goes.

use std::fmt::Write as _;

use crowdfund_core::{
    AccountOverview, ActionKind, Campaign, CampaignStatus, CatalogSnapshot, PermissionView,
    Settlement, UnitConverter,
};

/// Button label for an action, as shown next to a campaign or in the
/// control panel.
pub fn action_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::CreateCampaign => "create",
        ActionKind::Pledge => "pledge",
        ActionKind::CancelCampaign => "cancel",
        ActionKind::CompleteCampaign => "fulfill",
        ActionKind::RefundInvestor => "refund",
        ActionKind::WithdrawFees => "withdraw-fees",
        ActionKind::ChangeOwner => "change-owner",
        ActionKind::BanUser => "ban",
        ActionKind::DeactivateContract => "deactivate",
    }
}

fn section_title(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Active => "Live campaigns",
        CampaignStatus::Fulfilled => "Fulfilled campaigns",
        CampaignStatus::Cancelled => "Cancelled campaigns",
    }
}

pub fn overview(overview: &AccountOverview, units: &UnitConverter) -> String {
    let view = overview.permissions();
    let mut out = String::new();
    let _ = writeln!(out, "Current address  {}", overview.account);
    let _ = writeln!(out, "Owner's address  {}", overview.owner);
    let _ = writeln!(out, "Balance          {}", units.format(overview.contract_balance));
    let _ = writeln!(out, "Collected fees   {}", units.format(overview.collected_fees));
    let _ = writeln!(out, "Campaign fee     {}", units.format(overview.campaign_fee));
    if !overview.contract_active {
        let _ = writeln!(out, "Contract is deactivated");
    }
    if overview.account_banned {
        let _ = writeln!(out, "This account is banned");
    }
    if view.can_create() {
        let _ = writeln!(out, "\nYou can create campaigns (`crowdfund create`).");
    }
    let admin = view.admin_actions();
    if !admin.is_empty() {
        let labels: Vec<&str> = admin.into_iter().map(action_label).collect();
        let _ = writeln!(out, "\nControl panel (owner only): {}", labels.join(", "));
    }
    out
}

fn campaign_row(
    out: &mut String,
    campaign: &Campaign,
    view: &PermissionView,
    units: &UnitConverter,
) {
    let actions: Vec<&str> = view
        .campaign_actions(campaign)
        .into_iter()
        .map(action_label)
        .collect();
    let _ = writeln!(
        out,
        "{:>4}  {}  {:<24}  {} | {} | {} | {}  {}",
        campaign.id,
        campaign.entrepreneur,
        campaign.title,
        units.format(campaign.pledge_cost),
        campaign.pledges_count,
        campaign.pledges_left(),
        campaign.viewer_pledge_count,
        actions.join(" "),
    );
}

/// Campaign tables, one per partition, or a single partition when
/// `only` is given.
pub fn campaigns(
    snapshot: &CatalogSnapshot,
    view: &PermissionView,
    units: &UnitConverter,
    only: Option<CampaignStatus>,
) -> String {
    let statuses = match only {
        Some(status) => vec![status],
        None => vec![
            CampaignStatus::Active,
            CampaignStatus::Fulfilled,
            CampaignStatus::Cancelled,
        ],
    };
    let mut out = String::new();
    for (i, status) in statuses.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let partition = snapshot.partition(status);
        let _ = writeln!(out, "{} ({})", section_title(status), partition.len());
        if partition.is_empty() {
            let _ = writeln!(out, "  none");
            continue;
        }
        let _ = writeln!(
            out,
            "{:>4}  {:<42}  {:<24}  price | backers | pledges left | your pledges  actions",
            "id", "entrepreneur", "title"
        );
        for campaign in partition {
            campaign_row(&mut out, campaign, view, units);
        }
    }
    if !snapshot.conflicting_flags.is_empty() {
        let ids: Vec<String> = snapshot
            .conflicting_flags
            .iter()
            .map(|id| id.to_string())
            .collect();
        let _ = writeln!(
            out,
            "\nwarning: ledger reports campaigns {} as both fulfilled and cancelled",
            ids.join(", ")
        );
    }
    out
}

pub fn settlement(settlement: &Settlement) -> String {
    let mut out = format!(
        "{} settled in {}",
        settlement.kind, settlement.receipt.tx_hash
    );
    if let Some(block) = settlement.receipt.block_number {
        let _ = write!(out, " (block {block})");
    }
    out.push('\n');
    if let Some(err) = &settlement.reload_error {
        let _ = writeln!(out, "warning: view not refreshed: {err}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdfund_core::{Address, CampaignRecord, TxReceipt};

    const OWNER: Address = Address::new([0xaa; 20]);
    const ALICE: Address = Address::new([0x01; 20]);
    const ETH: u128 = 1_000_000_000_000_000_000;

    fn snapshot() -> CatalogSnapshot {
        let record = |fulfilled, cancelled, count| CampaignRecord {
            entrepreneur: ALICE,
            title: "Telescope".into(),
            pledge_cost: ETH / 4,
            pledges_needed: 4,
            pledges_count: count,
            fulfilled,
            cancelled,
        };
        CatalogSnapshot::assemble(
            ALICE,
            vec![
                (record(false, false, 4), 0),
                (record(false, true, 1), 1),
            ],
        )
    }

    #[test]
    fn rows_show_price_progress_and_actions() {
        let view = PermissionView::new(ALICE, OWNER);
        let text = campaigns(&snapshot(), &view, &UnitConverter::ETHER, None);
        assert!(text.contains("Live campaigns (1)"));
        assert!(text.contains("0.25 ETH | 4 | 0 | 0  pledge cancel fulfill"));
        assert!(text.contains("Fulfilled campaigns (0)\n  none"));
        assert!(text.contains("0.25 ETH | 1 | 3 | 1  refund"));
    }

    #[test]
    fn filter_limits_output_to_one_partition() {
        let view = PermissionView::new(ALICE, OWNER);
        let text = campaigns(
            &snapshot(),
            &view,
            &UnitConverter::ETHER,
            Some(CampaignStatus::Cancelled),
        );
        assert!(text.starts_with("Cancelled campaigns (1)"));
        assert!(!text.contains("Live campaigns"));
    }

    #[test]
    fn owner_overview_lists_control_panel() {
        let overview = AccountOverview {
            account: OWNER,
            owner: OWNER,
            contract_balance: 3 * ETH / 2,
            collected_fees: ETH / 100,
            campaign_fee: ETH / 100,
            contract_active: true,
            account_banned: false,
        };
        let text = super::overview(&overview, &UnitConverter::ETHER);
        assert!(text.contains("Balance          1.5 ETH"));
        assert!(text.contains("withdraw-fees, change-owner, ban, deactivate"));
        assert!(!text.contains("create campaigns"));
    }

    #[test]
    fn settlement_mentions_failed_reload() {
        let text = settlement(&Settlement {
            kind: ActionKind::Pledge,
            receipt: TxReceipt {
                tx_hash: "0xabc".into(),
                block_number: Some(7),
                events: Vec::new(),
            },
            reload_error: Some("ledger read `owner` failed".into()),
        });
        assert_eq!(
            text,
            "pledge settled in 0xabc (block 7)\nwarning: view not refreshed: ledger read `owner` failed\n"
        );
    }
}
