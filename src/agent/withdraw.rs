//! Withdrawal orchestration: token listing, transfer construction, confirm.

use rust_decimal::Decimal;

use crate::agent::router::{Agent, Reply};
use crate::chain::{TxPayload, TxStatus};
use crate::error::Error;
use crate::market::to_base_units;
use crate::networks::NATIVE_TOKEN;
use crate::profile::Profile;

const TRANSACTION_FAILED: &str = "Transaction Failed.";

/// ERC-20 `transfer(address,uint256)` selector.
const TRANSFER_SELECTOR: &str = "a9059cbb";

const NATIVE_DECIMALS: u32 = 18;

/// Tokens with a nonzero balance in the user's wallet, as a prompt plus the
/// lowercase addresses the next stage will accept.
pub(super) async fn list_tokens(
    agent: &Agent,
    profile: &Profile,
    chain_id: u64,
) -> Result<(String, Vec<String>), Error> {
    let wallet = agent.vault.derive(profile.derivation_index)?;
    let balances = agent.market.balances(chain_id, &wallet.address).await?;

    let mut held: Vec<(String, String)> = balances.into_iter().collect();
    held.sort();

    let mut offered = Vec::new();
    let mut lines = vec!["Select a token to withdraw (reply with its address):".to_string()];
    for (address, raw) in held {
        if raw.parse::<u128>().map(|b| b == 0).unwrap_or(true) {
            continue;
        }
        let symbol = if address.eq_ignore_ascii_case(NATIVE_TOKEN) {
            "native".to_string()
        } else {
            match agent.market.token_info(chain_id, &address).await? {
                Some(info) => info.symbol,
                None => continue,
            }
        };
        lines.push(format!("{address} ({symbol})"));
        offered.push(address);
    }

    Ok((lines.join("\n"), offered))
}

/// Loose shape check for an EVM address: 0x plus 40 hex digits.
pub(super) fn is_address(raw: &str) -> bool {
    raw.len() == 42
        && raw.starts_with("0x")
        && raw[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

pub(super) async fn execute(
    agent: &Agent,
    profile: &Profile,
    token: &str,
    destination: &str,
    amount: Decimal,
) -> Reply {
    match run(agent, profile, token, destination, amount).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(user_id = profile.user_id, error = %e, "withdrawal aborted");
            Reply::text(TRANSACTION_FAILED)
        }
    }
}

async fn run(
    agent: &Agent,
    profile: &Profile,
    token: &str,
    destination: &str,
    amount: Decimal,
) -> Result<Reply, Error> {
    let Some(chain_id) = profile.chain_id else {
        tracing::warn!(user_id = profile.user_id, "withdrawal without a chain");
        return Ok(Reply::text(TRANSACTION_FAILED));
    };
    let wallet = agent.vault.derive(profile.derivation_index)?;

    // The amount is sized in display units; the token's own precision decides
    // the base-unit value. The node rejects anything the balance cannot
    // cover.
    let payload = if token.eq_ignore_ascii_case(NATIVE_TOKEN) {
        let value = to_base_units(amount, NATIVE_DECIMALS)?;
        TxPayload {
            to: destination.to_string(),
            data: "0x".to_string(),
            value: value.to_string(),
            gas: None,
            gas_price: None,
        }
    } else {
        let decimals = match agent.market.token_info(chain_id, token).await? {
            Some(info) => info.decimals,
            None => {
                tracing::warn!(user_id = profile.user_id, token, "token vanished from listing");
                return Ok(Reply::text(TRANSACTION_FAILED));
            }
        };
        let value = to_base_units(amount, decimals)?;
        TxPayload {
            to: token.to_string(),
            data: transfer_calldata(destination, value),
            value: "0".to_string(),
            gas: None,
            gas_price: None,
        }
    };

    let signed = agent.chain.sign(chain_id, &payload, &wallet.secret).await?;
    let tx_hash = agent.chain.broadcast(chain_id, &signed).await?;
    tracing::info!(user_id = profile.user_id, tx = %tx_hash, "withdrawal broadcast");
    match agent
        .chain
        .poll_receipt(chain_id, &tx_hash, &agent.trade.confirmation)
        .await?
    {
        TxStatus::Confirmed => Ok(Reply::text(format!("Withdrawal confirmed.\nTx: {tx_hash}"))),
        TxStatus::Reverted => {
            tracing::warn!(user_id = profile.user_id, tx = %tx_hash, "withdrawal reverted");
            Ok(Reply::text(TRANSACTION_FAILED))
        }
    }
}

fn transfer_calldata(destination: &str, amount: u128) -> String {
    let dest = destination.trim_start_matches("0x").to_lowercase();
    format!("0x{TRANSFER_SELECTOR}{dest:0>64}{amount:064x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_calldata_is_abi_encoded() {
        let data = transfer_calldata("0x3535353535353535353535353535353535353535", 1_500_000);
        assert_eq!(
            data,
            "0xa9059cbb\
             0000000000000000000000003535353535353535353535353535353535353535\
             000000000000000000000000000000000000000000000000000000000016e360"
        );
    }

    #[test]
    fn address_shape_check() {
        assert!(is_address("0x3535353535353535353535353535353535353535"));
        assert!(!is_address("0x35"));
        assert!(!is_address("3535353535353535353535353535353535353535ab"));
        assert!(!is_address("0xzz35353535353535353535353535353535353535"));
    }
}
