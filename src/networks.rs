//! Supported networks and their chain-scoped constants.
//!
//! Token addresses are chain-scoped, which is why switching networks
//! invalidates a configured trading pair.

/// Address the aggregator uses for a chain's native asset (MATIC on Polygon,
/// ETH on Base, and so on).
pub const NATIVE_TOKEN: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// A network the desk can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: &'static str,
    /// Alchemy RPC host; the full URL is assembled with the API key.
    pub rpc_host: &'static str,
    /// Stable-reference token used for USD-equivalent aggregation.
    pub stable_token: &'static str,
    pub stable_symbol: &'static str,
    pub stable_decimals: u32,
}

impl Network {
    pub fn rpc_url(&self, api_key: &str) -> String {
        format!("https://{}/v2/{}", self.rpc_host, api_key)
    }
}

pub const SUPPORTED: &[Network] = &[
    Network {
        chain_id: 137,
        name: "Polygon",
        rpc_host: "polygon-mainnet.g.alchemy.com",
        stable_token: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
        stable_symbol: "USDC",
        stable_decimals: 6,
    },
    Network {
        chain_id: 8453,
        name: "Base",
        rpc_host: "base-mainnet.g.alchemy.com",
        stable_token: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
        stable_symbol: "USDC",
        stable_decimals: 6,
    },
];

pub fn by_chain_id(chain_id: u64) -> Option<&'static Network> {
    SUPPORTED.iter().find(|n| n.chain_id == chain_id)
}

/// One-line list of supported networks for prompts.
pub fn supported_summary() -> String {
    SUPPORTED
        .iter()
        .map(|n| format!("{} ({})", n.name, n.chain_id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chains_resolve() {
        assert_eq!(by_chain_id(137).map(|n| n.name), Some("Polygon"));
        assert_eq!(by_chain_id(8453).map(|n| n.name), Some("Base"));
        assert!(by_chain_id(1).is_none());
    }

    #[test]
    fn stable_tokens_are_lowercase() {
        for network in SUPPORTED {
            assert_eq!(
                network.stable_token,
                network.stable_token.to_lowercase(),
                "stable token for {} must be stored lowercase",
                network.name
            );
        }
    }

    #[test]
    fn summary_lists_all_networks() {
        let summary = supported_summary();
        assert!(summary.contains("Polygon (137)"));
        assert!(summary.contains("Base (8453)"));
    }
}
