//! Quanta Core - ledger and chain logic.
//!
//! Transactions are validated and applied through a speculative
//! [`StateOverlay`]; [`BufferedChain`] decides which blocks become final,
//! reorganizing onto heavier branches; [`NodeContext`] exposes the query
//! and ingestion surfaces the rest of the node talks to.

pub mod block_builder;
pub mod buffered_chain;
pub mod emission;
pub mod error;
pub mod executor;
pub mod node;
pub mod overlay;
pub mod txpool;

pub use block_builder::BlockBuilder;
pub use buffered_chain::{AcceptOutcome, BufferedChain, ChainEvent, ChainView};
pub use emission::EmissionSchedule;
pub use error::ChainError;
pub use executor::{
    apply_block, apply_genesis, apply_transaction, begin_block, rollback_block, validate_transaction,
    ApplyOutcome, BlockContext, UndoEntry, UndoRecord,
};
pub use node::{
    BlockId, ChainObject, ChainStats, NetworkFactory, NodeContext, NodeInfo, OfflineNetwork,
    PeerDirectory, PeerInfo, StaticPeers, SubmitOutcome, SyncState,
};
pub use overlay::StateOverlay;
pub use txpool::{PoolConfig, TransactionPool};
