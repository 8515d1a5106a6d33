use thiserror::Error;

/// Errors produced while applying a single transaction to a [`crate::consensus::State`].
///
/// Not fatal: callers (block validation, the miner) catch these and move on.
#[derive(Error, Debug, Clone)]
pub enum TxError {
    #[error("duplicate input coin")]
    DupCoin,

    #[error("input coin not found")]
    CoinNotFound,

    #[error("invalid signature")]
    InvalidSig,

    #[error("transaction is unbalanced")]
    Unbalance,
}

/// Errors produced while applying a block to an [`crate::consensus::ExtendedState`].
///
/// The coin set is always restored to its pre-block snapshot before one of
/// these is raised, so the state remains usable after the error propagates.
#[derive(Error, Debug, Clone)]
pub enum BlockError {
    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("invalid nonce")]
    InvalidNonce,

    #[error("invalid prev_id")]
    InvalidPrevId,

    #[error("too many transactions")]
    InvalidTxCount,

    #[error("invalid transaction at index {index}: {source}")]
    InvalidTx { index: usize, #[source] source: TxError },

    #[error("block is unbalanced")]
    Unbalance,
}

/// Errors produced by [`crate::structures::Pool`].
#[derive(Error, Debug, Clone, Copy)]
pub enum PoolError {
    #[error("object not found in pool")]
    NotFound,
}

/// Crate-wide error type. Network/IO failures are locally fatal to a
/// connection; block/tx errors are recoverable and logged by the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("data directory is corrupt: {0}")]
    CorruptDataDir(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
