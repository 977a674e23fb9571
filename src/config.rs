//! Configuration for swapdesk.
//!
//! Settings come from environment variables (a `.env` file is loaded via
//! dotenvy early in startup). Required keys fail fast with a named
//! `ConfigError`; everything else has a conservative default.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use url::Url;

use crate::chain::PollPolicy;
use crate::error::ConfigError;
use crate::networks;

const DEFAULT_AGGREGATOR_BASE_URL: &str = "https://api.1inch.dev";
const DEFAULT_SLIPPAGE_PCT: &str = "1";
const DEFAULT_SESSION_TTL_SECS: u64 = 15 * 60;

/// Main configuration for the agent.
#[derive(Debug, Clone)]
pub struct Settings {
    pub aggregator: AggregatorConfig,
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub trade: TradeConfig,
}

/// Liquidity-aggregation API access.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

/// JSON-RPC endpoints, keyed by chain id.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub endpoints: HashMap<u64, String>,
}

/// Custodial wallet derivation material.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub master_seed: SecretString,
}

/// Trading and orchestration knobs.
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Slippage stored on new profiles.
    pub default_slippage_pct: Decimal,
    /// Slippage actually sent with swap call-data requests. The aggregator's
    /// bounds for this parameter are not pinned down, so it is supplied as
    /// configuration rather than derived from the profile.
    pub swap_slippage_pct: Decimal,
    /// Receipt polling budget for approvals, swaps and withdrawals.
    pub confirmation: PollPolicy,
    /// Idle sessions older than this are dropped.
    pub session_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = optional_env("AGGREGATOR_BASE_URL")
            .unwrap_or_else(|| DEFAULT_AGGREGATOR_BASE_URL.to_string());
        Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "AGGREGATOR_BASE_URL".to_string(),
            message: e.to_string(),
        })?;
        let aggregator = AggregatorConfig {
            base_url,
            api_key: SecretString::from(required_env("ONEINCH_API_KEY")?),
        };

        let rpc = RpcConfig::resolve()?;

        let wallet = WalletConfig {
            master_seed: SecretString::from(required_env("DERIVATION_MASTER_KEY")?),
        };

        let trade = TradeConfig {
            default_slippage_pct: parse_env("DEFAULT_SLIPPAGE_PCT", DEFAULT_SLIPPAGE_PCT)?,
            swap_slippage_pct: parse_env("SWAP_SLIPPAGE_PCT", DEFAULT_SLIPPAGE_PCT)?,
            confirmation: PollPolicy {
                max_attempts: parse_env("CONFIRMATION_MAX_ATTEMPTS", "60")?,
                interval: Duration::from_secs(parse_env("CONFIRMATION_INTERVAL_SECS", "1")?),
            },
            session_ttl: Duration::from_secs(
                optional_env("SESSION_TTL_SECS")
                    .map(|raw| parse_value("SESSION_TTL_SECS", &raw))
                    .transpose()?
                    .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
        };

        if trade.swap_slippage_pct <= Decimal::ZERO || trade.swap_slippage_pct > Decimal::from(50) {
            return Err(ConfigError::InvalidValue {
                key: "SWAP_SLIPPAGE_PCT".to_string(),
                message: "must be in (0, 50]".to_string(),
            });
        }

        Ok(Self {
            aggregator,
            rpc,
            wallet,
            trade,
        })
    }
}

impl RpcConfig {
    /// Per-chain RPC URLs: `RPC_URL_<chain_id>` overrides win, otherwise the
    /// network table's Alchemy host plus `ALCHEMY_API_KEY`.
    fn resolve() -> Result<Self, ConfigError> {
        let alchemy_key = optional_env("ALCHEMY_API_KEY");
        let mut endpoints = HashMap::new();

        for network in networks::SUPPORTED {
            let override_key = format!("RPC_URL_{}", network.chain_id);
            if let Some(url) = optional_env(&override_key) {
                endpoints.insert(network.chain_id, url);
            } else if let Some(key) = alchemy_key.as_deref() {
                endpoints.insert(network.chain_id, network.rpc_url(key));
            }
        }

        if endpoints.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "ALCHEMY_API_KEY (or RPC_URL_<chain_id> overrides)".to_string(),
            ));
        }

        Ok(Self { endpoints })
    }
}

pub(crate) fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn required_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = optional_env(key).unwrap_or_else(|| default.to_string());
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{raw}': {e}"),
    })
}
