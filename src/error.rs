//! Error types for swapdesk.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Market gateway error: {0}")]
    Market(#[from] MarketError),

    #[error("Chain gateway error: {0}")]
    Chain(#[from] ChainError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Profile store errors.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("No profile for user {0}")]
    NotFound(i64),

    #[error("Token {address} is already configured for the other side of the pair")]
    TokenPairConflict { address: String },

    #[error("Profile storage failed: {0}")]
    Storage(String),
}

/// Wallet derivation and signing errors.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Master seed is empty")]
    EmptyMasterSeed,

    #[error("Key derivation failed for index {index}: {message}")]
    Derivation { index: u32, message: String },

    #[error("Invalid private key material: {0}")]
    InvalidKey(String),
}

/// Liquidity-aggregator gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("Request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Amount out of range: {0}")]
    AmountRange(String),
}

/// Chain RPC gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("No RPC endpoint configured for chain {0}")]
    UnknownChain(u64),

    #[error("RPC transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("No receipt for {tx_hash} after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: String, attempts: u32 },
}

/// Channel/transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Terminal IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line editor failed: {0}")]
    Readline(String),
}
