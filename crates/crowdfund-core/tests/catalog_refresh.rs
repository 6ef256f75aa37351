use std::sync::Arc;

use crowdfund_core::gateway::{MemoryLedger, ReadFault};
use crowdfund_core::{
    Address, Campaign, CampaignCatalog, CampaignStatus, ContractCall, ErrorKind, LedgerGateway,
    Transaction,
};

const OWNER: Address = Address::new([0xaa; 20]);
const ALICE: Address = Address::new([0x01; 20]);
const BOB: Address = Address::new([0x02; 20]);
const FEE: u128 = 10;

async fn send(ledger: &MemoryLedger, from: Address, call: ContractCall, value: u128) {
    ledger
        .submit(Transaction { from, call, value })
        .await
        .expect("transaction should settle");
}

async fn create(ledger: &MemoryLedger, title: &str, needed: u64) {
    let call = ContractCall::CreateCampaign {
        title: title.into(),
        pledge_cost: 100,
        pledges_needed: needed,
    };
    send(ledger, ALICE, call, FEE).await;
}

/// Campaign 0 active, 1 fulfilled, 2 cancelled; Bob backs 1 and 2.
async fn three_campaigns() -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new(OWNER, FEE));
    ledger.fund(ALICE, 1_000);
    ledger.fund(BOB, 1_000);
    create(&ledger, "Open", 5).await;
    create(&ledger, "Done", 1).await;
    create(&ledger, "Dropped", 5).await;
    for campaign_id in [1, 2] {
        send(&ledger, BOB, ContractCall::Pledge { campaign_id, count: 1 }, 100).await;
    }
    send(&ledger, ALICE, ContractCall::CompleteCampaign { campaign_id: 1 }, 0).await;
    send(&ledger, OWNER, ContractCall::CancelCampaign { campaign_id: 2 }, 0).await;
    ledger
}

fn ids(campaigns: &[Campaign]) -> Vec<u64> {
    campaigns.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn partitions_follow_ledger_flags() {
    let ledger = three_campaigns().await;
    let mut catalog = CampaignCatalog::new(Arc::clone(&ledger));
    let snapshot = catalog.refresh(BOB).await.unwrap();

    assert_eq!(snapshot.next_campaign_id, 3);
    assert_eq!(ids(&snapshot.active), vec![0]);
    assert_eq!(ids(&snapshot.fulfilled), vec![1]);
    assert_eq!(ids(&snapshot.cancelled), vec![2]);
    assert_eq!(snapshot.get(2).map(|c| c.viewer_pledge_count), Some(1));
    assert_eq!(snapshot.get(0).map(|c| c.viewer_pledge_count), Some(0));
    assert_eq!(snapshot.get(1).map(|c| c.status), Some(CampaignStatus::Fulfilled));
}

#[tokio::test]
async fn every_id_lands_in_exactly_one_partition() {
    let ledger = Arc::new(MemoryLedger::new(OWNER, FEE));
    ledger.fund(ALICE, 10_000);
    for n in 0..12 {
        create(&ledger, &format!("Campaign {n}"), 1).await;
    }
    for id in (0..12).step_by(3) {
        ledger.force_flags(id, true, false);
    }
    for id in (1..12).step_by(3) {
        ledger.force_flags(id, false, true);
    }

    let mut catalog = CampaignCatalog::new(Arc::clone(&ledger)).with_concurrency(3);
    let snapshot = catalog.refresh(ALICE).await.unwrap();
    let mut seen: Vec<u64> = snapshot.campaigns().map(|c| c.id).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..12).collect::<Vec<_>>());
    for status in [
        CampaignStatus::Active,
        CampaignStatus::Fulfilled,
        CampaignStatus::Cancelled,
    ] {
        let partition = ids(snapshot.partition(status));
        assert!(partition.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(partition.len(), 4);
    }
}

#[tokio::test]
async fn failed_read_keeps_previous_snapshot() {
    let ledger = three_campaigns().await;
    let mut catalog = CampaignCatalog::new(Arc::clone(&ledger));
    let digest = catalog.refresh(BOB).await.unwrap().digest();
    let before = catalog.snapshot().cloned();

    create(&ledger, "Late", 2).await;
    ledger.fail_read(ReadFault::BackerShares(3));
    let err = catalog.refresh(BOB).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayRead);
    assert!(err.to_string().contains("getBackerShares(3)"));
    assert_eq!(catalog.snapshot().cloned(), before);
    assert_eq!(catalog.snapshot().map(|s| s.digest()), Some(digest));

    ledger.clear_faults();
    let snapshot = catalog.refresh(BOB).await.unwrap();
    assert_eq!(ids(&snapshot.active), vec![0, 3]);
    assert_ne!(snapshot.digest(), digest);
}

#[tokio::test]
async fn inconsistent_flags_are_reported() {
    let ledger = three_campaigns().await;
    assert!(ledger.force_flags(0, true, true));
    let mut catalog = CampaignCatalog::new(Arc::clone(&ledger));
    let snapshot = catalog.refresh(ALICE).await.unwrap();
    assert_eq!(snapshot.conflicting_flags, vec![0]);
    assert_eq!(ids(&snapshot.fulfilled), vec![0, 1]);
    assert!(snapshot.active.is_empty());
}
