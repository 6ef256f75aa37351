//! JSON-RPC gateway for an Ethereum-style node.
//!
//! Reads go through `eth_call`; writes go through `eth_sendTransaction`, so
//! signing stays with the node or the wallet behind it. After submission the
//! receipt is polled until it appears or the timeout elapses.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::abi::{self, selector, Decoder, Token};
use crate::address::Address;
use crate::campaign::{CampaignId, CampaignRecord};
use crate::gateway::{
    AccountProvider, ContractEvent, GatewayError, LedgerGateway, Transaction, TxReceipt,
};
use crate::units::Wei;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// EIP-1193 "user rejected request".
const USER_REJECTED: i64 = 4001;

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

/// Gateway bound to one contract on one node.
pub struct RpcGateway {
    client: reqwest::Client,
    endpoint: String,
    contract: Address,
    poll_interval: Duration,
    receipt_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcGateway {
    pub fn new(endpoint: impl Into<String>, contract: Address) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            contract,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Issue one JSON-RPC request. A `null` result is returned as `None`.
    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(classify_rpc_error(err.code, err.message));
        }
        Ok(envelope.result)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, GatewayError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| GatewayError::Decode(format!("{method} returned no result")))
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, GatewayError> {
        let params = json!([
            { "to": self.contract.to_string(), "data": hex_data(&data) },
            "latest"
        ]);
        let raw: String = self.request("eth_call", params).await?;
        decode_hex_data(&raw)
    }

    async fn read_call(
        &self,
        selector: [u8; 4],
        tokens: &[Token],
    ) -> Result<Vec<u8>, GatewayError> {
        self.call(abi::encode(selector, tokens)).await
    }

    #[instrument(skip(self))]
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, GatewayError> {
        let receipt = poll_receipt(tx_hash, self.poll_interval, self.receipt_timeout, move || {
            self.request_optional::<RpcReceipt>("eth_getTransactionReceipt", json!([tx_hash]))
        })
        .await?;
        self.settle(receipt)
    }

    fn settle(&self, receipt: RpcReceipt) -> Result<TxReceipt, GatewayError> {
        if receipt.status.as_deref().map(parse_quantity).transpose()? == Some(0) {
            return Err(GatewayError::Reverted(format!(
                "transaction {} failed",
                receipt.transaction_hash
            )));
        }
        let block_number = receipt
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .map(|n| {
                u64::try_from(n).map_err(|_| GatewayError::Decode("block number out of range".into()))
            })
            .transpose()?;
        let mut events = Vec::new();
        for log in &receipt.logs {
            if let Some(event) = self.decode_log(log)? {
                events.push(event);
            }
        }
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
            events,
        })
    }

    fn decode_log(&self, log: &RpcLog) -> Result<Option<ContractEvent>, GatewayError> {
        let emitter: Address = log
            .address
            .parse()
            .map_err(|e: crate::address::AddressParseError| GatewayError::Decode(e.to_string()))?;
        if emitter != self.contract {
            return Ok(None);
        }
        let topics = log
            .topics
            .iter()
            .map(|t| {
                let bytes = decode_hex_data(t)?;
                <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| GatewayError::Decode("log topic is not 32 bytes".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        abi::decode_event(&topics, &decode_hex_data(&log.data)?)
    }
}

/// Poll `fetch` until it yields a receipt for the already submitted
/// `tx_hash`.
///
/// Transport errors are retried until `timeout` elapses. Any other failure,
/// and the timeout itself, is reported as [`GatewayError::Unconfirmed`].
async fn poll_receipt<T, F, Fut>(
    tx_hash: &str,
    interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, GatewayError>>,
{
    let unconfirmed = |reason: String| GatewayError::Unconfirmed {
        tx_hash: tx_hash.to_string(),
        reason,
    };
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let last = match fetch().await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {
                debug!("receipt not available yet");
                "no receipt before the timeout".to_string()
            }
            Err(GatewayError::Transport(reason)) => {
                warn!(%reason, "receipt poll failed, retrying");
                reason
            }
            Err(err) => return Err(unconfirmed(err.to_string())),
        };
        if tokio::time::Instant::now() >= deadline {
            return Err(unconfirmed(last));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Map a JSON-RPC error object onto the gateway taxonomy.
pub(crate) fn classify_rpc_error(code: i64, message: String) -> GatewayError {
    if code == USER_REJECTED {
        GatewayError::Rejected(message)
    } else if message.to_ascii_lowercase().contains("revert") {
        GatewayError::Reverted(message)
    } else {
        GatewayError::Rpc { code, message }
    }
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn hex_quantity(value: u128) -> String {
    format!("{value:#x}")
}

fn decode_hex_data(raw: &str) -> Result<Vec<u8>, GatewayError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| GatewayError::Decode(format!("bad hex data: {e}")))
}

fn parse_quantity(raw: &str) -> Result<u128, GatewayError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Err(GatewayError::Decode("empty quantity".into()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| GatewayError::Decode(format!("bad quantity {raw:?}: {e}")))
}

#[async_trait]
impl LedgerGateway for RpcGateway {
    async fn owner(&self) -> Result<Address, GatewayError> {
        let data = self.read_call(selector::OWNER, &[]).await?;
        Decoder::new(&data).address(0)
    }

    async fn campaign_fee(&self) -> Result<Wei, GatewayError> {
        let data = self.read_call(selector::CAMPAIGN_FEE, &[]).await?;
        Decoder::new(&data).uint(0)
    }

    async fn total_fees_accumulated(&self) -> Result<Wei, GatewayError> {
        let data = self.read_call(selector::TOTAL_FEES_ACCUMULATED, &[]).await?;
        Decoder::new(&data).uint(0)
    }

    async fn contract_balance(&self) -> Result<Wei, GatewayError> {
        let raw: String = self
            .request("eth_getBalance", json!([self.contract.to_string(), "latest"]))
            .await?;
        parse_quantity(&raw)
    }

    async fn next_campaign_id(&self) -> Result<CampaignId, GatewayError> {
        let data = self.read_call(selector::NEXT_CAMPAIGN_ID, &[]).await?;
        Decoder::new(&data).uint_u64(0)
    }

    async fn campaign(&self, id: CampaignId) -> Result<CampaignRecord, GatewayError> {
        let data = self
            .read_call(selector::CAMPAIGNS, &[Token::Uint(u128::from(id))])
            .await?;
        abi::decode_campaign(&data)
    }

    async fn backer_shares(&self, id: CampaignId, backer: Address) -> Result<u64, GatewayError> {
        let data = self
            .read_call(
                selector::GET_BACKER_SHARES,
                &[Token::Uint(u128::from(id)), Token::Address(backer)],
            )
            .await?;
        Decoder::new(&data).uint_u64(0)
    }

    async fn is_banned(&self, account: Address) -> Result<bool, GatewayError> {
        let data = self
            .read_call(selector::BANNED, &[Token::Address(account)])
            .await?;
        Decoder::new(&data).boolean(0)
    }

    async fn is_active(&self) -> Result<bool, GatewayError> {
        let data = self.read_call(selector::IS_ACTIVE, &[]).await?;
        Decoder::new(&data).boolean(0)
    }

    #[instrument(skip_all, fields(call = tx.call.function_name(), from = %tx.from))]
    async fn submit(&self, tx: Transaction) -> Result<TxReceipt, GatewayError> {
        let params = json!([{
            "from": tx.from.to_string(),
            "to": self.contract.to_string(),
            "data": hex_data(&abi::encode_call(&tx.call)),
            "value": hex_quantity(tx.value),
        }]);
        let tx_hash: String = self.request("eth_sendTransaction", params).await?;
        debug!(%tx_hash, "transaction submitted");
        self.wait_for_receipt(&tx_hash).await
    }
}

#[async_trait]
impl AccountProvider for RpcGateway {
    async fn selected_account(&self) -> Result<Address, GatewayError> {
        let accounts: Vec<String> = self.request("eth_accounts", json!([])).await?;
        let first = accounts
            .first()
            .ok_or_else(|| GatewayError::Rejected("no account is available".into()))?;
        first
            .parse()
            .map_err(|e: crate::address::AddressParseError| GatewayError::Decode(e.to_string()))
    }
}
