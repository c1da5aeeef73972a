//! Signs the flash call and gets it on chain, either as a private bundle sent
//! to every known block builder relay, or as a plain raw transaction.

use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use eyre::{eyre, Result};
use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::json;
use url::Url;

use super::{Broadcaster, Dispatch};
use crate::arb::execution::GasPlan;
use crate::arb::flash_loan::FlashCall;

/// How long to wait for the transaction to be mined
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay between receipt lookups
const RECEIPT_POLL: Duration = Duration::from_secs(2);
/// Bundles target this many blocks after the current one
const TARGET_BLOCKS: [u64; 2] = [1, 2];

/// Where signed transactions are sent
#[derive(Clone, Debug)]
pub enum Route {
    /// `eth_sendBundle` to each relay
    Relays(Vec<Url>),
    /// `eth_sendRawTransaction` to an execution endpoint
    Direct(RootProvider<Ethereum>),
}

/// [`Broadcaster`] signing with a local key
#[derive(Clone, Debug)]
pub struct RelayBroadcaster {
    /// Reads nonces and receipts
    provider: RootProvider<Ethereum>,
    route: Route,
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
    flash_contract: Address,
    chain_id: u64,
    client: reqwest::Client,
}

/// `eth_sendBundle` request body for one signed transaction
#[must_use]
pub fn bundle_request(raw: &Bytes, block: u64) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": [raw.to_string()],
            "blockNumber": format!("0x{block:x}"),
        }]
    })
}

impl RelayBroadcaster {
    /// Builds a broadcaster for the key in `private_key`
    ///
    /// # Errors
    /// * Invalid private key
    /// * Chain id lookup failed
    pub async fn new(
        provider: RootProvider<Ethereum>,
        route: Route,
        private_key: &str,
        flash_contract: Address,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse()?;
        let chain_id = provider.get_chain_id().await?;
        Ok(Self {
            provider,
            route,
            wallet: EthereumWallet::from(signer.clone()),
            signer,
            flash_contract,
            chain_id,
            client: reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    /// Address of the signing key
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// `X-Flashbots-Signature` header value: the signer address and its
    /// signature of the hex encoded body hash
    async fn signature_header(&self, body: &str) -> Result<String> {
        let digest = keccak256(body.as_bytes()).to_string();
        let signature = self.signer.sign_message(digest.as_bytes()).await?;
        Ok(format!(
            "{}:{}",
            self.signer.address(),
            format!("0x{}", hex::encode(signature.as_bytes()))
        ))
    }

    async fn send_bundle(&self, relay: &Url, raw: &Bytes, block: u64) -> String {
        let result: Result<String> = async {
            let body = bundle_request(raw, block).to_string();
            let response = self
                .client
                .post(relay.clone())
                .header("Content-Type", "application/json")
                .header("X-Flashbots-Signature", self.signature_header(&body).await?)
                .body(body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            Ok(format!("{status} {text}"))
        }
        .await;

        match result {
            Ok(response) => format!("{relay} block {block}: {response}"),
            Err(e) => {
                warn!("chain::relay: {relay} block {block}: {e}");
                format!("{relay} block {block}: error {e}")
            }
        }
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<bool> {
        let wait = async {
            loop {
                if let Some(receipt) = self.provider.get_transaction_receipt(hash).await? {
                    return Ok::<bool, eyre::Report>(receipt.status());
                }
                tokio::time::sleep(RECEIPT_POLL).await;
            }
        };
        tokio::time::timeout(RECEIPT_TIMEOUT, wait)
            .await
            .unwrap_or_else(|_| Err(eyre!("No receipt for {hash} after {RECEIPT_TIMEOUT:?}")))
    }
}

impl Broadcaster for RelayBroadcaster {
    async fn dispatch(&self, call: &FlashCall, plan: &GasPlan, block: u64) -> Result<Dispatch> {
        let nonce = self.provider.get_transaction_count(self.signer.address()).await?;
        let request = TransactionRequest::default()
            .with_to(self.flash_contract)
            .with_input(call.calldata())
            .with_value(U256::ZERO)
            .with_gas_limit(plan.gas_limit)
            .with_gas_price(plan.gas_price.saturating_to::<u128>())
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let envelope = request.build(&self.wallet).await?;
        let hash = *envelope.tx_hash();
        let raw: Bytes = envelope.encoded_2718().into();
        info!("chain::relay: sending {hash} with nonce {nonce}");

        let mut debug = match &self.route {
            Route::Relays(relays) => {
                let raw = &raw;
                let sends = relays.iter().flat_map(|relay| {
                    TARGET_BLOCKS
                        .iter()
                        .map(move |offset| self.send_bundle(relay, raw, block + offset))
                });
                join_all(sends).await
            }
            Route::Direct(execution) => match execution.send_raw_transaction(&raw).await {
                Ok(pending) => vec![format!("sent {}", pending.tx_hash())],
                Err(e) => vec![format!("send failed: {e}")],
            },
        };

        let success = match self.wait_for_receipt(hash).await {
            Ok(success) => success,
            Err(e) => {
                debug!("chain::relay: {e}");
                debug.push(e.to_string());
                false
            }
        };

        Ok(Dispatch {
            success,
            tx_hash: Some(hash),
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_request() {
        let raw = Bytes::from(vec![0xde, 0xad]);
        let request = bundle_request(&raw, 255);
        assert_eq!(request["method"], "eth_sendBundle");
        assert_eq!(request["params"][0]["txs"][0], "0xdead");
        assert_eq!(request["params"][0]["blockNumber"], "0xff");
    }
}
