//! swapdesk: a conversational agent for custodial token swaps and
//! withdrawals.
//!
//! The agent walks users through configuration (network, slippage, trading
//! pair) and trading (buy, sell, withdraw) one message at a time, holding a
//! per-user derived wallet and executing through a liquidity-aggregator API
//! plus JSON-RPC chain access.

pub mod agent;
pub mod chain;
pub mod channels;
pub mod config;
pub mod error;
pub mod market;
pub mod networks;
pub mod profile;
pub mod session;
pub mod wallet;
