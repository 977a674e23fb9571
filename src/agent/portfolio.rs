//! Read-only USD-equivalent portfolio aggregation.
//!
//! One info lookup plus one balance entry per held token, and at most one
//! quote call per token that is not the chain's stable-reference token. No
//! on-chain effects.

use rust_decimal::Decimal;

use crate::error::MarketError;
use crate::market::{to_display_amount, MarketGateway};
use crate::networks::Network;

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub amount: Decimal,
    pub usd: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub holdings: Vec<Holding>,
    pub total_usd: Decimal,
}

/// Aggregate every nonzero token balance of `wallet` into a USD-equivalent
/// overview, using the network's stable token as the reference unit.
pub async fn usd_overview(
    market: &dyn MarketGateway,
    network: &Network,
    wallet: &str,
) -> Result<PortfolioSummary, MarketError> {
    let balances = market.balances(network.chain_id, wallet).await?;

    let mut holdings = Vec::new();
    let mut total_usd = Decimal::ZERO;

    for (address, raw_balance) in balances {
        let Ok(raw) = raw_balance.parse::<u128>() else {
            tracing::warn!(%address, raw_balance, "unparseable balance, skipping");
            continue;
        };
        if raw == 0 {
            continue;
        }

        let Some(info) = market.token_info(network.chain_id, &address).await? else {
            tracing::debug!(%address, "no token metadata, skipping");
            continue;
        };

        let amount = to_display_amount(raw, info.decimals)?;
        let usd = if address.eq_ignore_ascii_case(network.stable_token) {
            amount
        } else {
            let quoted = market
                .quote(network.chain_id, &address, network.stable_token, raw)
                .await?;
            to_display_amount(quoted, network.stable_decimals)?
        };

        total_usd += usd;
        holdings.push(Holding {
            symbol: info.symbol,
            amount,
            usd,
        });
    }

    holdings.sort_by(|a, b| b.usd.cmp(&a.usd).then_with(|| a.symbol.cmp(&b.symbol)));
    Ok(PortfolioSummary {
        holdings,
        total_usd,
    })
}

pub fn render(summary: &PortfolioSummary) -> String {
    if summary.holdings.is_empty() {
        return "No token balances.".to_string();
    }

    let mut lines: Vec<String> = summary
        .holdings
        .iter()
        .map(|h| {
            format!(
                "{}: {} (≈ ${})",
                h.symbol,
                h.amount.normalize(),
                h.usd.round_dp(2).normalize()
            )
        })
        .collect();
    lines.push(format!(
        "Total: ≈ ${}",
        summary.total_usd.round_dp(2).normalize()
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn render_lists_holdings_and_total() {
        let summary = PortfolioSummary {
            holdings: vec![
                Holding {
                    symbol: "USDC".to_string(),
                    amount: dec!(12.5),
                    usd: dec!(12.5),
                },
                Holding {
                    symbol: "WETH".to_string(),
                    amount: dec!(0.25),
                    usd: dec!(800),
                },
            ],
            total_usd: dec!(812.5),
        };
        let text = render(&summary);
        assert!(text.contains("USDC: 12.5"));
        assert!(text.contains("Total: ≈ $812.5"));
    }

    #[test]
    fn render_empty() {
        let summary = PortfolioSummary {
            holdings: vec![],
            total_usd: dec!(0),
        };
        assert_eq!(render(&summary), "No token balances.");
    }
}
