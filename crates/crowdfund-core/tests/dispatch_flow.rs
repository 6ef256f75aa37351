use std::sync::Arc;

use crowdfund_core::gateway::{MemoryLedger, ReadFault};
use crowdfund_core::permissions::ADMIN_ACTIONS;
use crowdfund_core::{
    ActionDispatcher, ActionKind, ActionState, Address, ContractEvent, Dashboard, ErrorKind,
    FixedAccount, LedgerGateway, UnitConverter,
};

const OWNER: Address = Address::new([0xaa; 20]);
const ALICE: Address = Address::new([0x01; 20]);
const BOB: Address = Address::new([0x02; 20]);
const ETH: u128 = 1_000_000_000_000_000_000;
const FEE: u128 = ETH / 100;

struct Client {
    dashboard: Dashboard<MemoryLedger, FixedAccount>,
    dispatcher: ActionDispatcher<MemoryLedger>,
}

impl Client {
    fn new(ledger: &Arc<MemoryLedger>, account: Address) -> Self {
        Self {
            dashboard: Dashboard::new(Arc::clone(ledger), Arc::new(FixedAccount(account))),
            dispatcher: ActionDispatcher::new(Arc::clone(ledger)),
        }
    }
}

fn ledger() -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new(OWNER, FEE));
    ledger.fund(ALICE, 10 * ETH);
    ledger.fund(BOB, 10 * ETH);
    ledger
}

#[tokio::test]
async fn campaign_lifecycle_from_creation_to_payout() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    let mut bob = Client::new(&ledger, BOB);

    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Community oven", "0.25", "2")
        .await
        .unwrap();

    for _ in 0..2 {
        bob.dispatcher
            .pledge(&mut bob.dashboard, 0, "0.25")
            .await
            .unwrap();
    }
    let campaign = bob.dashboard.snapshot().and_then(|s| s.get(0)).cloned().unwrap();
    assert_eq!(campaign.viewer_pledge_count, 2);
    assert_eq!(campaign.pledges_left(), 0);

    alice.dashboard.refresh_campaigns().await.unwrap();
    let view = alice.dashboard.permissions().unwrap();
    let campaign = alice.dashboard.snapshot().and_then(|s| s.get(0)).cloned().unwrap();
    assert_eq!(
        view.campaign_actions(&campaign),
        vec![
            ActionKind::Pledge,
            ActionKind::CancelCampaign,
            ActionKind::CompleteCampaign
        ]
    );

    let settlement = alice
        .dispatcher
        .complete_campaign(&mut alice.dashboard, 0)
        .await
        .unwrap();
    assert_eq!(
        settlement.receipt.events,
        vec![ContractEvent::CampaignCompleted { campaign_id: 0 }]
    );
    assert_eq!(ledger.balance_of(ALICE), 10 * ETH - FEE + ETH / 2);
    let snapshot = alice.dashboard.snapshot().unwrap();
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.fulfilled.len(), 1);
}

#[tokio::test]
async fn campaign_actions_see_changes_made_by_other_accounts() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    let mut bob = Client::new(&ledger, BOB);
    alice.dashboard.reload().await.unwrap();
    bob.dashboard.reload().await.unwrap();

    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Bike repair stand", "1", "1")
        .await
        .unwrap();
    assert_eq!(bob.dashboard.snapshot().map(|s| s.len()), Some(0));

    bob.dispatcher
        .pledge(&mut bob.dashboard, 0, "1")
        .await
        .unwrap();
    let campaign = alice.dashboard.snapshot().and_then(|s| s.get(0)).cloned().unwrap();
    assert!(!campaign.goal_reached());

    alice
        .dispatcher
        .complete_campaign(&mut alice.dashboard, 0)
        .await
        .unwrap();
    assert_eq!(ledger.balance_of(ALICE), 10 * ETH - FEE + ETH);
    assert_eq!(alice.dashboard.snapshot().map(|s| s.fulfilled.len()), Some(1));
}

#[tokio::test]
async fn reverted_pledge_leaves_snapshot_untouched() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Tool library", "1", "5")
        .await
        .unwrap();

    let mut bob = Client::new(&ledger, BOB);
    bob.dashboard.reload().await.unwrap();
    let before = bob.dashboard.snapshot().cloned().unwrap();

    ledger.fail_next_write("execution reverted: out of gas");
    let err = bob
        .dispatcher
        .pledge(&mut bob.dashboard, 0, "1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayWrite);
    match bob.dispatcher.state() {
        ActionState::Failed { kind, cause, reason } => {
            assert_eq!(*kind, ActionKind::Pledge);
            assert_eq!(*cause, ErrorKind::GatewayWrite);
            assert!(reason.contains("out of gas"));
        }
        other => panic!("unexpected state {other:?}"),
    }
    let after = bob.dashboard.snapshot().unwrap();
    assert_eq!(after, &before);
    assert_eq!(after.digest(), before.digest());
}

#[tokio::test]
async fn wrong_pledge_value_is_reverted_by_the_ledger() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Choir robes", "1", "5")
        .await
        .unwrap();

    let mut bob = Client::new(&ledger, BOB);
    let err = bob
        .dispatcher
        .pledge(&mut bob.dashboard, 0, "0.5")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("incorrect pledge value"));
    assert_eq!(ledger.balance_of(BOB), 10 * ETH);
}

#[tokio::test]
async fn empty_title_is_rejected_before_any_gateway_call() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    let err = alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "", "1", "5")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger.read_calls(), 0);
    assert_eq!(ledger.write_calls(), 0);
    assert!(alice.dashboard.snapshot().is_none());
}

#[tokio::test]
async fn owner_sees_controls_instead_of_creation() {
    let ledger = ledger();
    let mut owner = Client::new(&ledger, OWNER);
    owner.dashboard.reload().await.unwrap();
    let view = owner.dashboard.permissions().unwrap();
    assert!(view.is_owner());
    assert!(!view.can_create());
    assert_eq!(view.admin_actions(), ADMIN_ACTIONS.to_vec());

    let err = owner
        .dispatcher
        .create_campaign(&mut owner.dashboard, "Owner's own", "1", "1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(ledger.write_calls(), 0);
}

#[tokio::test]
async fn cancelled_campaign_refunds_backers() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    let mut bob = Client::new(&ledger, BOB);
    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Bee hives", "2", "10")
        .await
        .unwrap();
    bob.dispatcher
        .pledge(&mut bob.dashboard, 0, "2")
        .await
        .unwrap();

    let err = bob
        .dispatcher
        .cancel_campaign(&mut bob.dashboard, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    alice
        .dispatcher
        .cancel_campaign(&mut alice.dashboard, 0)
        .await
        .unwrap();

    bob.dispatcher
        .refund_investor(&mut bob.dashboard, 0)
        .await
        .unwrap();
    assert_eq!(ledger.balance_of(BOB), 10 * ETH);
    let campaign = bob.dashboard.snapshot().and_then(|s| s.get(0)).cloned().unwrap();
    assert!(campaign.is_cancelled());
    assert_eq!(campaign.viewer_pledge_count, 0);
    let view = bob.dashboard.permissions().unwrap();
    assert!(view.campaign_actions(&campaign).is_empty());
}

#[tokio::test]
async fn owner_withdraws_fees_with_a_full_reload() {
    let ledger = ledger();
    let mut alice = Client::new(&ledger, ALICE);
    alice
        .dispatcher
        .create_campaign(&mut alice.dashboard, "Mural", "1", "3")
        .await
        .unwrap();

    let mut owner = Client::new(&ledger, OWNER);
    owner.dashboard.reload().await.unwrap();
    assert_eq!(owner.dashboard.overview().map(|o| o.collected_fees), Some(FEE));

    owner
        .dispatcher
        .withdraw_fees(&mut owner.dashboard)
        .await
        .unwrap();
    let overview = owner.dashboard.overview().unwrap();
    assert_eq!(overview.collected_fees, 0);
    assert_eq!(overview.contract_balance, 0);
    assert_eq!(ledger.balance_of(OWNER), FEE);
    assert_eq!(
        UnitConverter::ETHER.to_display_unit(ledger.balance_of(OWNER)),
        "0.01"
    );
}

#[tokio::test]
async fn failed_reload_after_settlement_is_reported_not_raised() {
    let ledger = ledger();
    let mut owner = Client::new(&ledger, OWNER);
    owner.dashboard.reload().await.unwrap();

    ledger.fail_read(ReadFault::Fees);
    let settlement = owner
        .dispatcher
        .ban_user(&mut owner.dashboard, "0x0202020202020202020202020202020202020202")
        .await
        .unwrap();
    assert!(settlement.reload_error.is_some());
    assert!(matches!(
        owner.dispatcher.state(),
        ActionState::Succeeded {
            kind: ActionKind::BanUser,
            ..
        }
    ));
    ledger.clear_faults();
    assert!(ledger.is_banned(BOB).await.unwrap());
}
