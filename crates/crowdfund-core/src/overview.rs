use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::error::CrowdfundError;
use crate::gateway::LedgerGateway;
use crate::permissions::PermissionView;
use crate::units::Wei;

/// Account-level view of the contract: who owns it, what it holds, what it
/// charges, and where the current account stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountOverview {
    pub account: Address,
    pub owner: Address,
    pub contract_balance: Wei,
    pub collected_fees: Wei,
    pub campaign_fee: Wei,
    pub contract_active: bool,
    pub account_banned: bool,
}

impl AccountOverview {
    /// Read every field; fails as a whole if any read fails.
    pub async fn load<G: LedgerGateway + ?Sized>(
        gateway: &G,
        account: Address,
    ) -> Result<Self, CrowdfundError> {
        let (owner, balance, fees, fee, active, banned) = futures::try_join!(
            async { gateway.owner().await.map_err(|e| CrowdfundError::read("owner", e)) },
            async {
                gateway
                    .contract_balance()
                    .await
                    .map_err(|e| CrowdfundError::read("getBalance", e))
            },
            async {
                gateway
                    .total_fees_accumulated()
                    .await
                    .map_err(|e| CrowdfundError::read("totalFeesAccumulated", e))
            },
            async {
                gateway
                    .campaign_fee()
                    .await
                    .map_err(|e| CrowdfundError::read("campaignFee", e))
            },
            async {
                gateway
                    .is_active()
                    .await
                    .map_err(|e| CrowdfundError::read("isActive", e))
            },
            async {
                gateway
                    .is_banned(account)
                    .await
                    .map_err(|e| CrowdfundError::read("banned", e))
            },
        )?;
        debug!(%account, %owner, balance, fees, "overview loaded");
        Ok(Self {
            account,
            owner,
            contract_balance: balance,
            collected_fees: fees,
            campaign_fee: fee,
            contract_active: active,
            account_banned: banned,
        })
    }

    pub fn permissions(&self) -> PermissionView {
        PermissionView::new(self.account, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::{MemoryLedger, ReadFault};

    const OWNER: Address = Address::new([0xaa; 20]);
    const ALICE: Address = Address::new([0x01; 20]);

    #[tokio::test]
    async fn loads_owner_fees_and_status() {
        let ledger = MemoryLedger::new(OWNER, 25);
        let overview = AccountOverview::load(&ledger, ALICE).await.unwrap();
        assert_eq!(overview.owner, OWNER);
        assert_eq!(overview.campaign_fee, 25);
        assert_eq!(overview.collected_fees, 0);
        assert!(overview.contract_active);
        assert!(!overview.account_banned);
        assert!(overview.permissions().can_create());
    }

    #[tokio::test]
    async fn any_failed_read_fails_the_load() {
        let ledger = MemoryLedger::new(OWNER, 25);
        ledger.fail_read(ReadFault::Fees);
        let err = AccountOverview::load(&ledger, ALICE).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayRead);
        assert!(err.to_string().contains("totalFeesAccumulated"));
    }
}
