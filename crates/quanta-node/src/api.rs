//! Public API service.
//!
//! Projects the node context into serializable response objects. Requests
//! arrive as JSON documents (`{"method": "...", "params": {...}}`) and every
//! handler is also callable directly.

use quanta_core::{BlockId, ChainError, ChainObject, NodeContext, SubmitOutcome};
use quanta_storage::TxLocation;
use quanta_types::{Address, AddressState, Block, Hash, PublicKey, Signature, Transaction, TransactionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Upper bound on blocks returned by one `get_latest_blocks` call.
pub const MAX_LATEST_BLOCKS: usize = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Status code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidAddress(_) | ChainError::MalformedTransaction(_) => {
                ApiError::InvalidArgument(e.to_string())
            }
            ChainError::ChainInconsistency(_) => ApiError::Unavailable(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfoResponse {
    pub version: String,
    pub state: String,
    pub num_connections: usize,
    pub num_known_peers: usize,
    pub uptime: u64,
    pub block_height: u64,
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStateResponse {
    pub info: NodeInfoResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsResponse {
    pub node_info: NodeInfoResponse,
    pub epoch: u64,
    /// Seconds between genesis and the tip timestamp
    pub uptime_network: u64,
    pub stakers_count: usize,
    pub block_last_reward: u64,
    pub block_time_mean: f64,
    pub block_time_sd: f64,
    pub coins_total_supply: u64,
    pub coins_emitted: u64,
    pub coins_atstake: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerResponse {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownPeersResponse {
    pub node_info: NodeInfoResponse,
    pub known_peers: Vec<PeerResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressStateResponse {
    pub address: Address,
    pub nonce: u64,
    pub balance: u64,
    pub pubhashes: Vec<Hash>,
    pub transaction_hashes: Vec<Hash>,
}

impl AddressStateResponse {
    fn new(address: Address, state: AddressState) -> Self {
        Self {
            address,
            nonce: state.nonce,
            balance: state.balance,
            pubhashes: state.used_pubkey_hashes,
            transaction_hashes: state.tx_hashes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResponse {
    pub addr_to: Address,
    pub amount: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeResponse {
    pub activation_epoch: u64,
    pub amount: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionResponse {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub addr_from: Address,
    pub public_key: PublicKey,
    pub transaction_hash: Hash,
    pub ots_key: u64,
    pub signature: Signature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake: Option<StakeResponse>,
    /// Unset while the transaction is only pooled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl TransactionResponse {
    fn new(tx: &Transaction, location: Option<TxLocation>) -> Self {
        let (transfer, stake) = match &tx.kind {
            TransactionKind::Transfer { addr_to, amount } => (
                Some(TransferResponse {
                    addr_to: *addr_to,
                    amount: *amount,
                    fee: tx.fee,
                }),
                None,
            ),
            TransactionKind::Stake {
                activation_epoch,
                amount,
            } => (
                None,
                Some(StakeResponse {
                    activation_epoch: *activation_epoch,
                    amount: *amount,
                    fee: tx.fee,
                }),
            ),
            TransactionKind::Destake | TransactionKind::CoinBase => (None, None),
        };
        Self {
            tx_type: tx.kind.tx_type().to_string(),
            addr_from: tx.addr_from,
            public_key: tx.public_key,
            transaction_hash: tx.txhash(),
            ots_key: tx.ots_key_index,
            signature: tx.signature,
            transfer,
            stake,
            block_hash: location.map(|l| l.block_hash),
            block_number: location.map(|l| l.height),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeaderResponse {
    pub hash: Hash,
    pub parent_hash: Hash,
    pub height: u64,
    pub timestamp: u64,
    pub producer: Address,
    pub block_reward: u64,
    pub tx_root: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockResponse {
    pub header: BlockHeaderResponse,
    pub transactions: Vec<TransactionResponse>,
}

impl BlockResponse {
    fn new(block: &Block) -> Self {
        let hash = block.hash();
        let transactions = block
            .transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| {
                let location = TxLocation {
                    block_hash: hash,
                    height: block.height(),
                    index: index as u32,
                };
                TransactionResponse::new(tx, Some(location))
            })
            .collect();
        Self {
            header: BlockHeaderResponse {
                hash,
                parent_hash: block.parent_hash(),
                height: block.height(),
                timestamp: block.header.timestamp,
                producer: block.producer(),
                block_reward: block.header.block_reward,
                tx_root: block.header.tx_root,
            },
            transactions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectResult {
    AddressState(AddressStateResponse),
    Transaction(TransactionResponse),
    Block(BlockResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ObjectResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatestBlocksResponse {
    pub blocks: Vec<BlockHeaderResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushTransactionResponse {
    pub accepted: bool,
    pub transaction_hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A request envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ApiRequest {
    GetNodeState,
    GetStats,
    GetKnownPeers,
    GetAddressState { address: String },
    GetObject { query: String },
    GetLatestBlocks {
        #[serde(default)]
        offset: u64,
        count: usize,
    },
    PushTransaction { transaction: Transaction },
}

/// Query and submission facade over a running node.
#[derive(Clone)]
pub struct PublicApiService {
    node: Arc<NodeContext>,
}

impl PublicApiService {
    pub fn new(node: Arc<NodeContext>) -> Self {
        Self { node }
    }

    pub fn get_node_state(&self) -> NodeStateResponse {
        NodeStateResponse {
            info: self.node_info(),
        }
    }

    pub fn get_stats(&self) -> ApiResult<StatsResponse> {
        let stats = self.node.get_stats()?;
        let view = self.node.view();
        let genesis_time = self
            .node
            .get_block(BlockId::Height(0))?
            .map(|b| b.header.timestamp)
            .unwrap_or(view.tip_timestamp);

        Ok(StatsResponse {
            node_info: self.node_info(),
            epoch: stats.epoch,
            uptime_network: view.tip_timestamp.saturating_sub(genesis_time),
            stakers_count: stats.stakers_count,
            block_last_reward: stats.block_last_reward,
            block_time_mean: stats.block_time_mean,
            block_time_sd: stats.block_time_sd,
            coins_total_supply: stats.coins_total_supply,
            coins_emitted: stats.coins_emitted,
            coins_atstake: stats.coins_at_stake,
        })
    }

    pub fn get_known_peers(&self) -> KnownPeersResponse {
        KnownPeersResponse {
            node_info: self.node_info(),
            known_peers: self
                .node
                .get_known_peers()
                .into_iter()
                .map(|p| PeerResponse {
                    ip: p.ip,
                    port: p.port,
                })
                .collect(),
        }
    }

    pub fn get_address_state(&self, address: &str) -> ApiResult<AddressStateResponse> {
        let parsed: Address = address
            .trim()
            .parse()
            .map_err(|e| ApiError::InvalidArgument(format!("Invalid address: {}", e)))?;
        let state = self.node.get_address_state(address.trim())?;
        Ok(AddressStateResponse::new(parsed, state))
    }

    /// Resolve a free-form query. Anything unresolvable is `found = false`.
    pub fn get_object(&self, query: &str) -> ApiResult<ObjectResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(ObjectResponse {
                found: false,
                result: None,
            });
        }

        let result = match self.node.get_object(query) {
            Ok(found) => found.map(|object| match object {
                ChainObject::Address { address, state } => {
                    ObjectResult::AddressState(AddressStateResponse::new(address, state))
                }
                ChainObject::Transaction { tx, location } => {
                    ObjectResult::Transaction(TransactionResponse::new(&tx, location))
                }
                ChainObject::Block(block) => ObjectResult::Block(BlockResponse::new(&block)),
            }),
            Err(ChainError::InvalidAddress(_)) | Err(ChainError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(ObjectResponse {
            found: result.is_some(),
            result,
        })
    }

    /// Headers of up to `count` blocks, newest first, skipping `offset`
    /// blocks below the tip.
    pub fn get_latest_blocks(&self, offset: u64, count: usize) -> ApiResult<LatestBlocksResponse> {
        let count = count.min(MAX_LATEST_BLOCKS);
        let blocks = self.node.get_latest_blocks(offset, count)?;
        Ok(LatestBlocksResponse {
            blocks: blocks.iter().map(|b| BlockResponse::new(b).header).collect(),
        })
    }

    pub fn push_transaction(&self, tx: Transaction) -> ApiResult<PushTransactionResponse> {
        let transaction_hash = tx.txhash();
        let response = match self.node.submit_transaction(tx)? {
            SubmitOutcome::Accepted(_) => PushTransactionResponse {
                accepted: true,
                transaction_hash,
                error: None,
            },
            SubmitOutcome::Rejected(reason) => PushTransactionResponse {
                accepted: false,
                transaction_hash,
                error: Some(reason.to_string()),
            },
        };
        Ok(response)
    }

    /// Dispatch one request and serialize the reply.
    pub fn handle(&self, request: ApiRequest) -> ApiResult<serde_json::Value> {
        let value = match request {
            ApiRequest::GetNodeState => to_value(self.get_node_state())?,
            ApiRequest::GetStats => to_value(self.get_stats()?)?,
            ApiRequest::GetKnownPeers => to_value(self.get_known_peers())?,
            ApiRequest::GetAddressState { address } => to_value(self.get_address_state(&address)?)?,
            ApiRequest::GetObject { query } => to_value(self.get_object(&query)?)?,
            ApiRequest::GetLatestBlocks { offset, count } => {
                to_value(self.get_latest_blocks(offset, count)?)?
            }
            ApiRequest::PushTransaction { transaction } => to_value(self.push_transaction(transaction)?)?,
        };
        Ok(value)
    }

    /// Handle one JSON request line; errors are reported in-band.
    pub fn handle_json(&self, line: &str) -> String {
        let reply = serde_json::from_str::<ApiRequest>(line)
            .map_err(|e| ApiError::InvalidArgument(format!("Bad request: {}", e)))
            .and_then(|request| self.handle(request));

        let value = match reply {
            Ok(result) => serde_json::json!({ "ok": true, "result": result }),
            Err(e) => {
                debug!(code = e.code(), error = %e, "API request failed");
                serde_json::json!({ "ok": false, "code": e.code(), "error": e.to_string() })
            }
        };
        value.to_string()
    }

    fn node_info(&self) -> NodeInfoResponse {
        let info = self.node.node_info();
        NodeInfoResponse {
            version: info.version,
            state: info.state.to_string(),
            num_connections: info.num_connections,
            num_known_peers: info.num_known_peers,
            uptime: info.uptime_secs,
            block_height: info.block_height,
            network_id: info.network_id,
        }
    }
}

fn to_value<T: Serialize>(value: T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}
