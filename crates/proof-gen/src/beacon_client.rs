//! Beacon API HTTP Client
//!
//! Fetches headers, blocks, and SSZ-encoded states from an ordered list of
//! beacon nodes. Every call walks the endpoint list and retries with a
//! fixed backoff; a 404 on a slot id is surfaced as `SlotSkipped` so the
//! caller can advance to the next slot.

use crate::beacon_state::{BeaconBlockHeader, BeaconStateView, ForkName};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Response header carrying the fork of an SSZ state payload.
const CONSENSUS_VERSION_HEADER: &str = "Eth-Consensus-Version";

/// Errors from beacon API operations.
#[derive(Debug, Error)]
pub enum BeaconClientError {
    /// All endpoints and retries exhausted (5xx, timeouts, empty bodies).
    #[error("beacon transport failed after {attempts} attempts: {message}")]
    TransportExhausted { attempts: u32, message: String },

    /// 404 for a block/state id — the slot has no canonical block.
    #[error("no block at {0}")]
    SlotSkipped(String),

    /// The skip-slot walk ran out of attempts.
    #[error("no available block within {attempts} slots from {start}")]
    NoAvailableSlot { start: u64, attempts: u32 },

    /// Fork name outside the supported set.
    #[error("unsupported consensus fork {0:?}")]
    UnsupportedFork(String),

    /// SSZ state bytes did not parse under the fork's schema.
    #[error("state deserialization failed: {0}")]
    StateDeserialization(String),

    #[error("invalid beacon response: {0}")]
    InvalidResponse(String),
}

/// Block/state identifier accepted by the beacon API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Head,
    Finalized,
    Slot(u64),
    Root([u8; 32]),
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Finalized => f.write_str("finalized"),
            Self::Slot(slot) => write!(f, "{slot}"),
            Self::Root(root) => write!(f, "0x{}", hex::encode(root)),
        }
    }
}

/// A block header together with its root, as returned by the headers API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconHeaderInfo {
    pub root: [u8; 32],
    pub header: BeaconBlockHeader,
}

/// The slice of a beacon block this service consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub slot: u64,
    pub execution_block_hash: [u8; 32],
}

/// Chain genesis data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisInfo {
    pub genesis_time: u64,
}

/// The spec constants this service consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpecInfo {
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub slots_per_historical_root: u64,
    pub capella_fork_epoch: u64,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct BeaconClientConfig {
    /// Ordered failover list, e.g. `["http://localhost:5052"]`.
    pub endpoints: Vec<String>,
    /// Attempts across the whole endpoint list.
    pub max_retries: u32,
    /// Fixed backoff between retry rounds.
    pub retry_delay: Duration,
    /// Per-request response timeout.
    pub response_timeout: Duration,
    /// Fork assumed when the response does not name one.
    pub default_fork: ForkName,
}

/// Client for the beacon node REST API.
#[derive(Debug, Clone)]
pub struct BeaconClient {
    http: Client,
    config: BeaconClientConfig,
}

impl BeaconClient {
    /// Create a client over the configured endpoint list.
    pub fn new(config: BeaconClientConfig) -> Result<Self, BeaconClientError> {
        if config.endpoints.is_empty() {
            return Err(BeaconClientError::InvalidResponse(
                "no beacon endpoints configured".into(),
            ));
        }
        let http = Client::builder()
            .timeout(config.response_timeout)
            .build()
            .map_err(|e| BeaconClientError::InvalidResponse(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// GET with endpoint failover and fixed-backoff retries. Empty bodies
    /// count as transport failures and force the next endpoint.
    async fn get_bytes(
        &self,
        path: &str,
        accept: &str,
    ) -> Result<(Vec<u8>, Option<String>), BeaconClientError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::from("no endpoints tried");

        for round in 0..attempts {
            for endpoint in &self.config.endpoints {
                let url = format!("{}{path}", endpoint.trim_end_matches('/'));
                let response = match self.http.get(&url).header("Accept", accept).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        last_error = format!("{url}: {e}");
                        continue;
                    }
                };

                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Err(BeaconClientError::SlotSkipped(path.to_string()));
                }
                if !status.is_success() {
                    last_error = format!("{url}: status {status}");
                    continue;
                }

                let fork_header = response
                    .headers()
                    .get(CONSENSUS_VERSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) => {
                        last_error = format!("{url}: {e}");
                        continue;
                    }
                };
                if body.is_empty() {
                    last_error = format!("{url}: empty body");
                    continue;
                }
                return Ok((body.to_vec(), fork_header));
            }
            if round + 1 < attempts {
                debug!(round, error = %last_error, "beacon request retrying");
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(BeaconClientError::TransportExhausted {
            attempts,
            message: last_error,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, BeaconClientError> {
        let (body, _) = self.get_bytes(path, "application/json").await?;
        serde_json::from_slice(&body)
            .map_err(|e| BeaconClientError::InvalidResponse(format!("{path}: {e}")))
    }

    /// Fetch a block header with its root.
    #[instrument(skip(self))]
    pub async fn get_beacon_header(
        &self,
        id: BlockId,
    ) -> Result<BeaconHeaderInfo, BeaconClientError> {
        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            root: String,
            header: Signed,
        }
        #[derive(Deserialize)]
        struct Signed {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            slot: String,
            proposer_index: String,
            parent_root: String,
            state_root: String,
            body_root: String,
        }

        let response: Response = self.get_json(&format!("/eth/v1/beacon/headers/{id}")).await?;
        let msg = response.data.header.message;
        Ok(BeaconHeaderInfo {
            root: parse_hex32(&response.data.root)?,
            header: BeaconBlockHeader {
                slot: parse_u64(&msg.slot, "slot")?,
                proposer_index: parse_u64(&msg.proposer_index, "proposer_index")?,
                parent_root: parse_hex32(&msg.parent_root)?,
                state_root: parse_hex32(&msg.state_root)?,
                body_root: parse_hex32(&msg.body_root)?,
            },
        })
    }

    /// Fetch the slice of a block this service needs: its slot and the
    /// execution payload's block hash.
    #[instrument(skip(self))]
    pub async fn get_block_info(&self, id: BlockId) -> Result<BlockInfo, BeaconClientError> {
        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            slot: String,
            body: Body,
        }
        #[derive(Deserialize)]
        struct Body {
            execution_payload: ExecutionPayload,
        }
        #[derive(Deserialize)]
        struct ExecutionPayload {
            block_hash: String,
        }

        let response: Response = self.get_json(&format!("/eth/v2/beacon/blocks/{id}")).await?;
        Ok(BlockInfo {
            slot: parse_u64(&response.data.message.slot, "slot")?,
            execution_block_hash: parse_hex32(
                &response.data.message.body.execution_payload.block_hash,
            )?,
        })
    }

    /// Download the SSZ-encoded state and the fork it belongs to.
    #[instrument(skip(self))]
    pub async fn get_state_ssz(
        &self,
        id: BlockId,
    ) -> Result<(Vec<u8>, ForkName), BeaconClientError> {
        let (body, fork_header) = self
            .get_bytes(
                &format!("/eth/v2/debug/beacon/states/{id}"),
                "application/octet-stream",
            )
            .await?;
        let fork = match fork_header {
            Some(name) => ForkName::parse(&name)
                .ok_or(BeaconClientError::UnsupportedFork(name))?,
            None => self.config.default_fork,
        };
        Ok((body, fork))
    }

    /// Download and deserialize a state. Parse failures are
    /// `StateDeserialization`, which callers treat as beacon-node data
    /// corruption rather than a program bug.
    #[instrument(skip(self))]
    pub async fn get_state_view(
        &self,
        id: BlockId,
    ) -> Result<BeaconStateView, BeaconClientError> {
        let (bytes, fork) = self.get_state_ssz(id).await?;
        debug!(%id, %fork, size = bytes.len(), "deserializing beacon state");
        BeaconStateView::decode(fork, &bytes)
            .map_err(|e| BeaconClientError::StateDeserialization(format!("{id} ({fork}): {e}")))
    }

    /// Fetch genesis data.
    #[instrument(skip(self))]
    pub async fn get_genesis(&self) -> Result<GenesisInfo, BeaconClientError> {
        #[derive(Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(Deserialize)]
        struct Data {
            genesis_time: String,
        }

        let response: Response = self.get_json("/eth/v1/beacon/genesis").await?;
        Ok(GenesisInfo {
            genesis_time: parse_u64(&response.data.genesis_time, "genesis_time")?,
        })
    }

    /// Fetch the spec constants this service consumes.
    #[instrument(skip(self))]
    pub async fn get_spec(&self) -> Result<ChainSpecInfo, BeaconClientError> {
        #[derive(Deserialize)]
        struct Response {
            data: serde_json::Value,
        }

        let response: Response = self.get_json("/eth/v1/config/spec").await?;
        let lookup = |key: &str| -> Result<u64, BeaconClientError> {
            let value = response.data.get(key).ok_or_else(|| {
                BeaconClientError::InvalidResponse(format!("spec is missing {key}"))
            })?;
            let text = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
            parse_u64(&text, key)
        };

        Ok(ChainSpecInfo {
            seconds_per_slot: lookup("SECONDS_PER_SLOT")?,
            slots_per_epoch: lookup("SLOTS_PER_EPOCH")?,
            slots_per_historical_root: lookup("SLOTS_PER_HISTORICAL_ROOT")?,
            capella_fork_epoch: lookup("CAPELLA_FORK_EPOCH")?,
        })
    }

    /// Walk forward from `start_slot`, skipping slots with no block, until
    /// a header is found or `max_attempts` slots have been tried. The
    /// returned slot may differ from the requested one; callers recompute
    /// timestamps from the actual slot.
    #[instrument(skip(self))]
    pub async fn find_next_available_slot(
        &self,
        start_slot: u64,
        max_attempts: u32,
    ) -> Result<(u64, BeaconHeaderInfo), BeaconClientError> {
        let mut slot = start_slot;
        for _ in 0..max_attempts {
            match self.get_beacon_header(BlockId::Slot(slot)).await {
                Ok(info) => return Ok((slot, info)),
                Err(BeaconClientError::SlotSkipped(_)) => {
                    warn!(slot, "slot skipped, advancing");
                    slot += 1;
                }
                Err(other) => return Err(other),
            }
        }
        Err(BeaconClientError::NoAvailableSlot {
            start: start_slot,
            attempts: max_attempts,
        })
    }
}

fn parse_u64(s: &str, field: &str) -> Result<u64, BeaconClientError> {
    s.trim_matches('"')
        .parse()
        .map_err(|e| BeaconClientError::InvalidResponse(format!("invalid {field} {s:?}: {e}")))
}

fn parse_hex32(s: &str) -> Result<[u8; 32], BeaconClientError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| BeaconClientError::InvalidResponse(format!("invalid hex {s:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| BeaconClientError::InvalidResponse(format!("expected 32 bytes in {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_display() {
        assert_eq!(BlockId::Head.to_string(), "head");
        assert_eq!(BlockId::Finalized.to_string(), "finalized");
        assert_eq!(BlockId::Slot(12345).to_string(), "12345");
        let root = BlockId::Root([0xab; 32]);
        assert_eq!(
            root.to_string(),
            format!("0x{}", "ab".repeat(32))
        );
    }

    #[test]
    fn parse_hex32_roundtrip() {
        let hex = "0x0102030405060708091011121314151617181920212223242526272829303132";
        let parsed = parse_hex32(hex).unwrap();
        assert_eq!(parsed[0], 0x01);
        assert_eq!(parsed[31], 0x32);

        // Also without the prefix.
        assert_eq!(parse_hex32(&hex[2..]).unwrap(), parsed);
    }

    #[test]
    fn parse_hex32_rejects_short_input() {
        assert!(parse_hex32("0x0102").is_err());
        assert!(parse_hex32("zz").is_err());
    }

    #[test]
    fn parse_u64_accepts_quoted_numbers() {
        assert_eq!(parse_u64("12", "x").unwrap(), 12);
        assert_eq!(parse_u64("\"12\"", "x").unwrap(), 12);
        assert!(parse_u64("-1", "x").is_err());
    }

    #[test]
    fn client_rejects_empty_endpoint_list() {
        let config = BeaconClientConfig {
            endpoints: vec![],
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            response_timeout: Duration::from_secs(10),
            default_fork: ForkName::Electra,
        };
        assert!(BeaconClient::new(config).is_err());
    }
}
