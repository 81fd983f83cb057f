//! EVM log fetcher.
//!
//! Uses JSON-RPC `eth_blockNumber` and `eth_getLogs` to pull the contract's
//! logs one block range at a time, then turns the hex-encoded wire form into
//! [`LogRecord`]s in canonical chain order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use alloy_primitives::{Address, Bytes, B256};
use marketindex_core::error::IndexerError;
use marketindex_core::types::{BlockRange, LogRecord};

use crate::rpc::HttpRpcClient;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(rename = "data")]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "removed", default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    /// Decode the hex fields into a [`LogRecord`].
    pub fn to_record(&self) -> Result<LogRecord, IndexerError> {
        let address: Address = self
            .address
            .parse()
            .map_err(|e| malformed("address", &self.address, e))?;
        let topics = self
            .topics
            .iter()
            .map(|t| t.parse::<B256>().map_err(|e| malformed("topic", t, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let data = hex::decode(self.data.strip_prefix("0x").unwrap_or(&self.data))
            .map_err(|e| malformed("data", &self.data, e))?;
        let tx_hash: B256 = self
            .tx_hash
            .parse()
            .map_err(|e| malformed("transactionHash", &self.tx_hash, e))?;
        let log_index = u32::try_from(parse_hex_u64(&self.log_index)?)
            .map_err(|e| malformed("logIndex", &self.log_index, e))?;

        Ok(LogRecord {
            address,
            topics,
            data: Bytes::from(data),
            tx_hash,
            block_number: parse_hex_u64(&self.block_number)?,
            log_index,
        })
    }
}

fn malformed(field: &str, value: &str, err: impl std::fmt::Display) -> IndexerError {
    IndexerError::Rpc(format!("malformed log {field} '{value}': {err}"))
}

/// Trait for fetching EVM data from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    /// Current chain head.
    async fn get_block_number(&self) -> Result<u64, IndexerError>;

    /// Every log emitted by `address` in the inclusive range `[from, to]`.
    async fn get_logs(&self, address: &str, from: u64, to: u64)
        -> Result<Vec<RawLog>, IndexerError>;
}

#[async_trait]
impl EvmRpcClient for HttpRpcClient {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| IndexerError::Rpc(format!("eth_blockNumber returned {result}")))?;
        parse_hex_u64(hex)
    }

    async fn get_logs(
        &self,
        address: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let filter = json!({
            "address": address,
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        let result = self.call("eth_getLogs", vec![filter]).await?;
        logs_from_json(result)
    }
}

/// Deserialize an `eth_getLogs` result array.
pub fn logs_from_json(v: Value) -> Result<Vec<RawLog>, IndexerError> {
    if v.is_null() {
        return Ok(vec![]);
    }
    serde_json::from_value(v).map_err(|e| IndexerError::Rpc(format!("eth_getLogs: {e}")))
}

/// EVM fetcher bound to one contract address.
pub struct EvmFetcher<C> {
    client: C,
    contract: String,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C, contract: impl Into<String>) -> Self {
        Self {
            client,
            contract: contract.into(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, IndexerError> {
        self.client.get_block_number().await
    }

    /// Fetch every log in `range`, dropping reorged-out entries and sorting
    /// by `(block_number, log_index)`.
    pub async fn logs(&self, range: BlockRange) -> Result<Vec<LogRecord>, IndexerError> {
        let raw = self
            .client
            .get_logs(&self.contract, range.from, range.to)
            .await?;

        let total = raw.len();
        let mut records = raw
            .iter()
            .filter(|log| !log.is_removed())
            .map(RawLog::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        if records.len() < total {
            tracing::debug!(
                %range,
                removed = total - records.len(),
                "dropped removed logs"
            );
        }

        records.sort_by_key(LogRecord::position);
        Ok(records)
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| malformed("quantity", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(block: &str, index: &str, removed: Option<bool>) -> RawLog {
        RawLog {
            address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".into(),
            topics: vec![format!("0x{}", "11".repeat(32))],
            data: "0x".into(),
            block_number: block.into(),
            block_hash: None,
            tx_hash: format!("0x{}", "22".repeat(32)),
            log_index: index.into(),
            removed,
        }
    }

    struct Canned(Vec<RawLog>);

    #[async_trait]
    impl EvmRpcClient for Canned {
        async fn get_block_number(&self) -> Result<u64, IndexerError> {
            Ok(100)
        }
        async fn get_logs(&self, _: &str, _: u64, _: u64) -> Result<Vec<RawLog>, IndexerError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn raw_log_converts() {
        let mut log = raw("0x12a05f200", "0x5", None); // 5_000_000_000
        log.data = format!("0x{}", "00".repeat(31) + "2a");
        let record = log.to_record().unwrap();
        assert_eq!(record.block_number, 5_000_000_000);
        assert_eq!(record.log_index, 5);
        assert_eq!(record.word_count(), 1);
        assert_eq!(record.data[31], 0x2a);
        assert_eq!(record.topics[0], B256::repeat_byte(0x11));
    }

    #[test]
    fn bad_topic_is_an_rpc_error() {
        let mut log = raw("0x1", "0x0", None);
        log.topics = vec!["0x1234".into()];
        assert!(matches!(log.to_record(), Err(IndexerError::Rpc(_))));
    }

    #[test]
    fn deserializes_node_json() {
        let v = json!([{
            "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x10",
            "blockHash": "0xabc",
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "transactionIndex": "0x0",
            "logIndex": "0x3",
            "removed": false
        }]);
        let logs = logs_from_json(v).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].is_removed());
        assert!(logs_from_json(Value::Null).unwrap().is_empty());
    }

    #[tokio::test]
    async fn logs_sorted_and_removed_dropped() {
        let fetcher = EvmFetcher::new(
            Canned(vec![
                raw("0xb", "0x0", None),
                raw("0xa", "0x2", None),
                raw("0xa", "0x1", Some(true)),
                raw("0xa", "0x0", Some(false)),
            ]),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        );
        let logs = fetcher.logs(BlockRange::new(10, 11)).await.unwrap();
        let positions: Vec<_> = logs.iter().map(LogRecord::position).collect();
        assert_eq!(positions, vec![(10, 0), (10, 2), (11, 0)]);
    }
}
