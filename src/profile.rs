//! Persistent per-user profile and its store.
//!
//! The profile is the only durable state the desk keeps: which network the
//! user trades on, their slippage setting, the configured pair, and the
//! derivation index of their custodial wallet. All mutation goes through a
//! single `update` contract so the chain-switch and pair-distinctness
//! invariants hold atomically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::error::ProfileError;
use crate::session::TokenSlot;

pub type UserId = i64;

/// A configured token: address (lowercase) plus the symbol it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub address: String,
    pub symbol: String,
}

impl TokenRef {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address: address.into().to_lowercase(),
            symbol: symbol.into(),
        }
    }
}

/// Durable per-user record. Created on first contact, never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: UserId,
    /// Index used to derive this user's wallet from the master seed.
    pub derivation_index: u32,
    pub chain_id: Option<u64>,
    pub slippage_pct: Decimal,
    pub buy_token: Option<TokenRef>,
    pub sell_token: Option<TokenRef>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn token(&self, slot: TokenSlot) -> Option<&TokenRef> {
        match slot {
            TokenSlot::Buy => self.buy_token.as_ref(),
            TokenSlot::Sell => self.sell_token.as_ref(),
        }
    }

    /// Both sides of the pair, if configured.
    pub fn pair(&self) -> Option<(&TokenRef, &TokenRef)> {
        Some((self.buy_token.as_ref()?, self.sell_token.as_ref()?))
    }
}

/// A single profile mutation. Invariants live in the application of the
/// update, not in call sites.
#[derive(Debug, Clone)]
pub enum ProfileUpdate {
    /// Switch networks. Token addresses are chain-scoped, so this also clears
    /// both sides of the pair.
    Chain(u64),
    Slippage(Decimal),
    Token { slot: TokenSlot, token: TokenRef },
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create a profile with defaults, or return the existing one.
    async fn create(&self, user_id: UserId) -> Result<Profile, ProfileError>;

    async fn get(&self, user_id: UserId) -> Result<Option<Profile>, ProfileError>;

    /// Apply one update atomically and return the resulting profile.
    async fn update(&self, user_id: UserId, update: ProfileUpdate)
        -> Result<Profile, ProfileError>;
}

/// In-memory store. Derivation indices are allocated monotonically so no two
/// users ever share a wallet.
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<UserId, Profile>>,
    next_index: AtomicU32,
    default_slippage_pct: Decimal,
}

impl InMemoryProfileStore {
    pub fn new(default_slippage_pct: Decimal) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            next_index: AtomicU32::new(0),
            default_slippage_pct,
        }
    }
}

fn apply(profile: &mut Profile, update: ProfileUpdate) -> Result<(), ProfileError> {
    match update {
        ProfileUpdate::Chain(chain_id) => {
            profile.chain_id = Some(chain_id);
            profile.buy_token = None;
            profile.sell_token = None;
        }
        ProfileUpdate::Slippage(pct) => {
            profile.slippage_pct = pct;
        }
        ProfileUpdate::Token { slot, token } => {
            let other = match slot {
                TokenSlot::Buy => profile.sell_token.as_ref(),
                TokenSlot::Sell => profile.buy_token.as_ref(),
            };
            if let Some(other) = other {
                if other.address.eq_ignore_ascii_case(&token.address) {
                    return Err(ProfileError::TokenPairConflict {
                        address: token.address,
                    });
                }
            }
            match slot {
                TokenSlot::Buy => profile.buy_token = Some(token),
                TokenSlot::Sell => profile.sell_token = Some(token),
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create(&self, user_id: UserId) -> Result<Profile, ProfileError> {
        let mut profiles = self.profiles.write().await;
        if let Some(existing) = profiles.get(&user_id) {
            return Ok(existing.clone());
        }

        let profile = Profile {
            user_id,
            derivation_index: self.next_index.fetch_add(1, Ordering::SeqCst),
            chain_id: None,
            slippage_pct: self.default_slippage_pct,
            buy_token: None,
            sell_token: None,
            created_at: Utc::now(),
        };
        profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<Profile>, ProfileError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn update(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, ProfileError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&user_id)
            .ok_or(ProfileError::NotFound(user_id))?;
        apply(profile, update)?;
        Ok(profile.clone())
    }
}
