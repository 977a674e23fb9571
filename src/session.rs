//! Per-user conversational session state.
//!
//! A user is inside at most one multi-stage command at a time. The state is a
//! tagged union: each variant carries exactly the data collected so far, so a
//! later stage can never read a field an earlier stage did not set. Entering a
//! new top-level command replaces whatever was in progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::profile::UserId;

/// Which side of the configured pair a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSlot {
    Buy,
    Sell,
}

impl TokenSlot {
    pub fn label(self) -> &'static str {
        match self {
            Self::Buy => "buy token",
            Self::Sell => "sell token",
        }
    }
}

/// Direction of a swap relative to the configured pair.
///
/// `Buy` spends the sell token to acquire the buy token; `Sell` is the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    Buy,
    Sell,
}

impl SwapDirection {
    pub fn label(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

/// Stage progression of a withdrawal. Each stage owns the fields gathered by
/// the stages before it; the draft only exists complete at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawStage {
    /// Waiting for the user to pick one of the offered token addresses
    /// (lowercase).
    AwaitingToken { offered: Vec<String> },
    /// Token chosen; waiting for a destination address.
    AwaitingDestination { token: String },
    /// Token and destination chosen; waiting for an amount.
    AwaitingAmount { token: String, destination: String },
}

/// The command a user is currently inside, and where in it they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandState {
    AwaitingChainId,
    AwaitingSlippage,
    AwaitingTokenAddress(TokenSlot),
    AwaitingSwapPercentage(SwapDirection),
    Withdraw(WithdrawStage),
}

#[derive(Debug)]
struct Slot {
    state: CommandState,
    touched: Instant,
}

/// In-memory session map with a TTL so abandoned commands do not accumulate.
#[derive(Debug)]
pub struct SessionStore {
    slots: RwLock<HashMap<UserId, Slot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Current state for a user, if any. Expired entries are dropped here
    /// rather than by a background task.
    pub async fn get(&self, user_id: UserId) -> Option<CommandState> {
        let mut slots = self.slots.write().await;
        match slots.get(&user_id) {
            Some(slot) if slot.touched.elapsed() <= self.ttl => Some(slot.state.clone()),
            Some(_) => {
                slots.remove(&user_id);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, user_id: UserId, state: CommandState) {
        let mut slots = self.slots.write().await;
        slots.insert(
            user_id,
            Slot {
                state,
                touched: Instant::now(),
            },
        );
    }

    pub async fn clear(&self, user_id: UserId) {
        self.slots.write().await.remove(&user_id);
    }

    /// Drop every expired session, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.touched.elapsed() <= self.ttl);
        before - slots.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

/// Per-user serialization: two events for the same user must never interleave
/// mid-command, while events for different users proceed independently.
#[derive(Debug, Default)]
pub struct UserGates {
    gates: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate for one user, waiting if an event for that user is
    /// already being handled.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(user_id).or_default())
        };
        gate.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn set_get_clear_roundtrip() {
        let sessions = store();
        sessions.set(1, CommandState::AwaitingChainId).await;
        assert_eq!(sessions.get(1).await, Some(CommandState::AwaitingChainId));

        sessions.clear(1).await;
        assert_eq!(sessions.get(1).await, None);
    }

    #[tokio::test]
    async fn one_state_per_user() {
        let sessions = store();
        sessions.set(1, CommandState::AwaitingChainId).await;
        sessions
            .set(1, CommandState::AwaitingTokenAddress(TokenSlot::Buy))
            .await;

        assert_eq!(
            sessions.get(1).await,
            Some(CommandState::AwaitingTokenAddress(TokenSlot::Buy))
        );
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_on_access() {
        let sessions = SessionStore::new(Duration::ZERO);
        sessions.set(7, CommandState::AwaitingSlippage).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(sessions.get(7).await, None);
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let sessions = SessionStore::new(Duration::from_millis(20));
        sessions.set(1, CommandState::AwaitingChainId).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        sessions.set(2, CommandState::AwaitingSlippage).await;

        assert_eq!(sessions.purge_expired().await, 1);
        assert!(sessions.get(2).await.is_some());
    }

    #[tokio::test]
    async fn gates_serialize_same_user() {
        let gates = Arc::new(UserGates::new());
        let held = gates.acquire(1).await;

        let contender = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                let _guard = gates.acquire(1).await;
            })
        };
        // Other users are not blocked while user 1 is held.
        let _other = gates.acquire(2).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
    }
}
