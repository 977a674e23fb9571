//! Swap orchestration: quote-free balance sizing, approval, swap, confirm.
//!
//! Approval and swap are two independent on-chain transactions. The approval
//! must reach a successful receipt before swap call-data is even requested;
//! any failure in the chain aborts the remaining steps and reports a single
//! failure to the user. The caller clears the session either way.

use crate::agent::router::{Agent, Reply};
use crate::chain::TxStatus;
use crate::error::Error;
use crate::market::percentage_of;
use crate::profile::Profile;
use crate::session::SwapDirection;

const NOT_ENOUGH_FUNDS: &str = "Not enough funds.";
const TRANSACTION_FAILED: &str = "Transaction Failed.";

pub(super) async fn execute(
    agent: &Agent,
    profile: &Profile,
    direction: SwapDirection,
    pct: u8,
) -> Reply {
    match run(agent, profile, direction, pct).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(user_id = profile.user_id, error = %e, "swap aborted");
            Reply::text(TRANSACTION_FAILED)
        }
    }
}

async fn run(
    agent: &Agent,
    profile: &Profile,
    direction: SwapDirection,
    pct: u8,
) -> Result<Reply, Error> {
    // Menu gating guarantees these, but the session may outlive a profile
    // edit; bail to the failure path rather than panic.
    let (chain_id, (buy, sell)) = match (profile.chain_id, profile.pair()) {
        (Some(chain_id), Some(pair)) => (chain_id, pair),
        _ => {
            tracing::warn!(user_id = profile.user_id, "swap without chain or pair");
            return Ok(Reply::text(TRANSACTION_FAILED));
        }
    };
    let (src, dst) = match direction {
        SwapDirection::Buy => (sell, buy),
        SwapDirection::Sell => (buy, sell),
    };

    let wallet = agent.vault.derive(profile.derivation_index)?;

    // Balance is fetched fresh at execution time, never cached from an
    // earlier stage.
    let balances = agent.market.balances(chain_id, &wallet.address).await?;
    let balance: u128 = balances
        .get(&src.address)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let amount = percentage_of(balance, pct);
    if amount == 0 {
        tracing::info!(
            user_id = profile.user_id,
            token = %src.symbol,
            "swap aborted before any transaction: empty balance"
        );
        return Ok(Reply::text(NOT_ENOUGH_FUNDS));
    }

    let approval = agent
        .market
        .approval_calldata(chain_id, &src.address, amount)
        .await?;
    let signed = agent.chain.sign(chain_id, &approval, &wallet.secret).await?;
    let approval_hash = agent.chain.broadcast(chain_id, &signed).await?;
    tracing::info!(user_id = profile.user_id, tx = %approval_hash, "approval broadcast");
    match agent
        .chain
        .poll_receipt(chain_id, &approval_hash, &agent.trade.confirmation)
        .await?
    {
        TxStatus::Confirmed => {}
        TxStatus::Reverted => {
            tracing::warn!(user_id = profile.user_id, tx = %approval_hash, "approval reverted");
            return Ok(Reply::text(TRANSACTION_FAILED));
        }
    }

    let swap = agent
        .market
        .swap_calldata(
            chain_id,
            &src.address,
            &dst.address,
            amount,
            &wallet.address,
            agent.trade.swap_slippage_pct,
        )
        .await?;
    let signed = agent.chain.sign(chain_id, &swap, &wallet.secret).await?;
    let swap_hash = agent.chain.broadcast(chain_id, &signed).await?;
    tracing::info!(user_id = profile.user_id, tx = %swap_hash, "swap broadcast");
    match agent
        .chain
        .poll_receipt(chain_id, &swap_hash, &agent.trade.confirmation)
        .await?
    {
        TxStatus::Confirmed => Ok(Reply::text(format!(
            "{} confirmed: swapped {}% of your {} balance into {}.\nTx: {}",
            direction.label(),
            pct,
            src.symbol,
            dst.symbol,
            swap_hash
        ))),
        TxStatus::Reverted => {
            tracing::warn!(user_id = profile.user_id, tx = %swap_hash, "swap reverted");
            Ok(Reply::text(TRANSACTION_FAILED))
        }
    }
}
