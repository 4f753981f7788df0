//! Esplora REST client.
//!
//! API docs: https://github.com/Blockstream/esplora/blob/master/API.md
//! Default base URL: https://blockstream.info/liquid/api
//! Auth: none.
//!
//! Liquid outputs may be confidential, in which case `value` and `asset`
//! are replaced by commitments. Confidential unspents cannot be counted
//! towards funding and are dropped.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ChainClient, ChainError};
use crate::types::{Prevout, TxHistoryEntry, Utxo};

pub const DEFAULT_BASE_URL: &str = "https://blockstream.info/liquid/api";

// ---------------------------------------------------------------------------
// API response types (Esplora JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    #[serde(default)]
    value: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EsploraTxOut {
    #[serde(default)]
    scriptpubkey: String,
    #[serde(default)]
    value: Option<u64>,
    #[serde(default)]
    asset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    #[serde(default)]
    vout: Vec<EsploraTxOut>,
}

#[derive(Debug, Default, Deserialize)]
struct EsploraTxStatus {
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    block_hash: Option<String>,
    #[serde(default)]
    block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EsploraTxSummary {
    txid: String,
    #[serde(default)]
    status: EsploraTxStatus,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EsploraClient {
    http: Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swapwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Esplora request");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChainError::Status { status, body });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ChainClient for EsploraClient {
    async fn fetch_unspents(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        let raw: Vec<EsploraUtxo> = self
            .get_json(&format!("/address/{}/utxo", urlencoding::encode(address)))
            .await?;

        let total = raw.len();
        let utxos: Vec<Utxo> = raw
            .into_iter()
            .filter_map(|u| {
                u.value.map(|value| Utxo {
                    txid: u.txid,
                    vout: u.vout,
                    value,
                    prevout: None,
                })
            })
            .collect();

        if utxos.len() < total {
            debug!(
                address,
                skipped = total - utxos.len(),
                "Ignoring confidential unspents"
            );
        }
        Ok(utxos)
    }

    async fn fetch_prevout(&self, txid: &str, vout: u32) -> Result<Prevout, ChainError> {
        let tx: EsploraTx = self
            .get_json(&format!("/tx/{}", urlencoding::encode(txid)))
            .await?;

        let out = tx
            .vout
            .into_iter()
            .nth(vout as usize)
            .ok_or_else(|| ChainError::OutputNotFound {
                txid: txid.to_string(),
                vout,
            })?;

        Ok(Prevout {
            script_pubkey: out.scriptpubkey,
            value: out.value,
            asset: out.asset,
        })
    }

    async fn fetch_transaction_history(&self, address: &str) -> Result<Vec<TxHistoryEntry>, ChainError> {
        let txs: Vec<EsploraTxSummary> = self
            .get_json(&format!("/address/{}/txs", urlencoding::encode(address)))
            .await?;

        Ok(txs
            .into_iter()
            .map(|tx| TxHistoryEntry {
                txid: tx.txid,
                confirmed: tx.status.confirmed,
                block_hash: tx.status.block_hash,
                block_time: tx.status.block_time,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> EsploraClient {
        EsploraClient::new(&format!("{}/", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_unspents_skips_confidential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/address/ex1qaddr/utxo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"txid": "aa", "vout": 0, "value": 30000, "asset": "6f02",
                     "status": {"confirmed": true, "block_height": 10}},
                    {"txid": "bb", "vout": 2, "valuecommitment": "08ff",
                     "status": {"confirmed": false}},
                    {"txid": "cc", "vout": 1, "value": 20000,
                     "status": {"confirmed": false}}
                ]"#,
            )
            .create_async()
            .await;

        let utxos = client(&server).fetch_unspents("ex1qaddr").await.unwrap();
        mock.assert_async().await;

        assert_eq!(utxos.len(), 2);
        assert_eq!((utxos[0].txid.as_str(), utxos[0].vout, utxos[0].value), ("aa", 0, 30_000));
        assert_eq!((utxos[1].txid.as_str(), utxos[1].vout, utxos[1].value), ("cc", 1, 20_000));
        assert!(utxos.iter().all(|u| u.prevout.is_none()));
    }

    #[tokio::test]
    async fn test_fetch_prevout_picks_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tx/aa")
            .with_status(200)
            .with_body(
                r#"{"txid": "aa", "vout": [
                    {"scriptpubkey": "0014aaaa", "value": 1, "asset": "x"},
                    {"scriptpubkey": "0014bbbb", "value": 50000, "asset": "6f02"}
                ]}"#,
            )
            .create_async()
            .await;

        let c = client(&server);
        let prevout = c.fetch_prevout("aa", 1).await.unwrap();
        assert_eq!(prevout.script_pubkey, "0014bbbb");
        assert_eq!(prevout.value, Some(50_000));
        assert_eq!(prevout.asset.as_deref(), Some("6f02"));

        let missing = c.fetch_prevout("aa", 5).await.unwrap_err();
        assert!(matches!(missing, ChainError::OutputNotFound { vout: 5, .. }));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/address/bad/utxo")
            .with_status(400)
            .with_body("Invalid Bitcoin address")
            .create_async()
            .await;

        let err = client(&server).fetch_unspents("bad").await.unwrap_err();
        match err {
            ChainError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Invalid Bitcoin address");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transaction_history() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/address/ex1qaddr/txs")
            .with_status(200)
            .with_body(
                r#"[
                    {"txid": "t1", "status": {"confirmed": true, "block_hash": "bh", "block_time": 1700000000}},
                    {"txid": "t2", "status": {"confirmed": false}}
                ]"#,
            )
            .create_async()
            .await;

        let history = client(&server).fetch_transaction_history("ex1qaddr").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].confirmed);
        assert_eq!(history[0].block_hash.as_deref(), Some("bh"));
        assert_eq!(history[0].block_time, Some(1_700_000_000));
        assert!(!history[1].confirmed);
        assert_eq!(history[1].block_time, None);
    }
}
