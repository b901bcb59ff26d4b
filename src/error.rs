use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum CoinError {
    // Address handling
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // Chain lifecycle
    #[error("blockchain not initialized: {0}")]
    ChainNotInitialized(String),
    #[error("blockchain already exists: {0}")]
    ChainAlreadyExists(String),

    // Transaction construction and validation
    #[error("not enough funds")]
    InsufficientFunds,
    #[error("referenced transaction not found: {0}")]
    MissingPrevTx(String),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("refusing to mine a block with no transactions")]
    EmptyBlock,

    // Peer protocol
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("network error: {0}")]
    Network(String),

    // Serialization
    #[error("block serialization error: {0}")]
    BlockSerialization(String),
    #[error("block deserialization error: {0}")]
    BlockDeserialization(String),
    #[error("transaction serialization error: {0}")]
    TxSerialization(String),
    #[error("transaction deserialization error: {0}")]
    TxDeserialization(String),
    #[error("transaction id hex decoding error: {0}")]
    TxIdHexDecoding(String),

    // Key and signature handling
    #[error("key pair error: {0}")]
    KeyPair(String),
    #[error("signing error: {0}")]
    Signature(String),

    // Store access
    #[error("store connection error: {0}")]
    StoreConnection(String),
    #[error("store read error: {0}")]
    StoreRead(String),
    #[error("store write error: {0}")]
    StoreWrite(String),
    #[error("chain tip error: {0}")]
    TipHash(String),

    // Wallet file
    #[error("wallet not found: {0}")]
    WalletNotFound(String),
    #[error("wallet file error: {0}")]
    WalletIo(String),
    #[error("wallet serialization error: {0}")]
    WalletSerialization(String),
    #[error("wallet deserialization error: {0}")]
    WalletDeserialization(String),

    // Process state
    #[error("poisoned lock: {0}")]
    LockPoisoned(String),
    #[error("node configuration error: {0}")]
    NodeConfig(String),
}

pub type Result<T> = std::result::Result<T, CoinError>;
