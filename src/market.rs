//! Liquidity-aggregation API gateway.
//!
//! Wraps a 1inch-shaped HTTP API: token metadata, wallet balances, quotes and
//! approval/swap call-data construction. The routing itself is opaque; the
//! desk only consumes the call contracts.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::chain::TxPayload;
use crate::config::AggregatorConfig;
use crate::error::MarketError;

/// Resolved token metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
}

/// One historical price sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PricePoint {
    pub time: i64,
    pub value: f64,
}

/// Chart lookback window supported by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartPeriod {
    #[default]
    Day,
    Week,
    Year,
    AllTime,
}

impl ChartPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "24H",
            Self::Week => "1W",
            Self::Year => "1Y",
            Self::AllTime => "AllTime",
        }
    }
}

#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Resolve a token address to metadata. `None` means the address is not a
    /// usable token on this chain.
    async fn token_info(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenInfo>, MarketError>;

    /// All token balances for a wallet, base units as decimal strings, keyed
    /// by lowercase token address.
    async fn balances(
        &self,
        chain_id: u64,
        wallet: &str,
    ) -> Result<HashMap<String, String>, MarketError>;

    /// How much `dst` the given base-unit amount of `src` converts to.
    async fn quote(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: u128,
    ) -> Result<u128, MarketError>;

    /// Call-data approving the aggregator's router to spend `amount` of
    /// `token`.
    async fn approval_calldata(
        &self,
        chain_id: u64,
        token: &str,
        amount: u128,
    ) -> Result<TxPayload, MarketError>;

    /// Call-data executing the swap itself.
    async fn swap_calldata(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: u128,
        wallet: &str,
        slippage_pct: Decimal,
    ) -> Result<TxPayload, MarketError>;

    async fn price_history(
        &self,
        chain_id: u64,
        token0: &str,
        token1: &str,
        period: ChartPeriod,
    ) -> Result<Vec<PricePoint>, MarketError>;
}

/// HTTP client for the aggregator API, bearer-token authenticated.
pub struct AggregatorClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|source| MarketError::Http {
                endpoint: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| MarketError::Decode {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenDto {
    address: String,
    #[serde(default)]
    symbol: String,
    decimals: u32,
}

#[derive(Debug, Deserialize)]
struct QuoteDto {
    #[serde(rename = "dstAmount")]
    dst_amount: String,
}

#[derive(Debug, Deserialize)]
struct TxDto {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, rename = "gasPrice")]
    gas_price: Option<String>,
    #[serde(default)]
    gas: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SwapDto {
    tx: TxDto,
}

#[derive(Debug, Deserialize)]
struct ChartDto {
    data: Vec<PricePoint>,
}

fn payload_from_dto(endpoint: &str, dto: TxDto) -> Result<TxPayload, MarketError> {
    let gas_price = dto
        .gas_price
        .map(|raw| {
            raw.parse::<u128>().map_err(|e| MarketError::Decode {
                endpoint: endpoint.to_string(),
                message: format!("gasPrice '{raw}': {e}"),
            })
        })
        .transpose()?;

    Ok(TxPayload {
        to: dto.to.to_lowercase(),
        data: dto.data,
        value: dto.value.unwrap_or_else(|| "0".to_string()),
        gas: dto.gas,
        gas_price,
    })
}

#[async_trait]
impl MarketGateway for AggregatorClient {
    async fn token_info(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenInfo>, MarketError> {
        let path = format!("/token/v1.2/{chain_id}/search");
        let tokens: Vec<TokenDto> = self
            .get_json(
                &path,
                &[
                    ("query", address.to_string()),
                    ("only_positive_rating", "false".to_string()),
                ],
            )
            .await?;

        Ok(tokens
            .into_iter()
            .find(|t| t.address.eq_ignore_ascii_case(address) && !t.symbol.trim().is_empty())
            .map(|t| TokenInfo {
                symbol: t.symbol,
                decimals: t.decimals,
            }))
    }

    async fn balances(
        &self,
        chain_id: u64,
        wallet: &str,
    ) -> Result<HashMap<String, String>, MarketError> {
        let path = format!("/balance/v1.2/{chain_id}/balances/{wallet}");
        let raw: HashMap<String, String> = self.get_json(&path, &[]).await?;
        Ok(raw
            .into_iter()
            .map(|(address, balance)| (address.to_lowercase(), balance))
            .collect())
    }

    async fn quote(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: u128,
    ) -> Result<u128, MarketError> {
        let path = format!("/swap/v6.0/{chain_id}/quote");
        let quote: QuoteDto = self
            .get_json(
                &path,
                &[
                    ("src", src.to_string()),
                    ("dst", dst.to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await?;
        quote
            .dst_amount
            .parse()
            .map_err(|e| MarketError::Decode {
                endpoint: path,
                message: format!("dstAmount '{}': {e}", quote.dst_amount),
            })
    }

    async fn approval_calldata(
        &self,
        chain_id: u64,
        token: &str,
        amount: u128,
    ) -> Result<TxPayload, MarketError> {
        let path = format!("/swap/v6.0/{chain_id}/approve/transaction");
        let dto: TxDto = self
            .get_json(
                &path,
                &[
                    ("tokenAddress", token.to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await?;
        payload_from_dto(&path, dto)
    }

    async fn swap_calldata(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: u128,
        wallet: &str,
        slippage_pct: Decimal,
    ) -> Result<TxPayload, MarketError> {
        let path = format!("/swap/v6.0/{chain_id}/swap");
        let dto: SwapDto = self
            .get_json(
                &path,
                &[
                    ("src", src.to_string()),
                    ("dst", dst.to_string()),
                    ("amount", amount.to_string()),
                    ("from", wallet.to_string()),
                    ("origin", wallet.to_string()),
                    ("slippage", slippage_pct.normalize().to_string()),
                    ("includeGas", "true".to_string()),
                    ("disableEstimate", "false".to_string()),
                ],
            )
            .await?;
        payload_from_dto(&path, dto.tx)
    }

    async fn price_history(
        &self,
        chain_id: u64,
        token0: &str,
        token1: &str,
        period: ChartPeriod,
    ) -> Result<Vec<PricePoint>, MarketError> {
        let path = format!(
            "/charts/v1.0/chart/line/{token0}/{token1}/{}/{chain_id}",
            period.as_str()
        );
        let chart: ChartDto = self.get_json(&path, &[]).await?;
        Ok(chart.data)
    }
}

/// Convert base units to a display amount.
pub fn to_display_amount(raw: u128, decimals: u32) -> Result<Decimal, MarketError> {
    let raw = i128::try_from(raw)
        .map_err(|_| MarketError::AmountRange(format!("{raw} exceeds representable range")))?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map_err(|e| MarketError::AmountRange(e.to_string()))
}

/// Convert a user-entered display amount to base units, truncating dust
/// beyond the token's precision.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, MarketError> {
    if amount.is_sign_negative() {
        return Err(MarketError::AmountRange("amount must be positive".to_string()));
    }
    let scale = 10i128.checked_pow(decimals).ok_or_else(|| {
        MarketError::AmountRange(format!("{decimals} decimals exceeds supported precision"))
    })?;
    let factor = Decimal::try_from_i128_with_scale(scale, 0)
        .map_err(|e| MarketError::AmountRange(e.to_string()))?;
    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(|| MarketError::AmountRange(format!("{amount} overflows at {decimals} decimals")))?;
    scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| MarketError::AmountRange(format!("{amount} is not representable in base units")))
}

/// Whole-number percentage of a base-unit balance, overflow-safe.
pub fn percentage_of(balance: u128, pct: u8) -> u128 {
    let pct = u128::from(pct);
    (balance / 100) * pct + (balance % 100) * pct / 100
}
