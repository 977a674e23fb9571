//! Event routing and stage handling.
//!
//! Every inbound event is serialized per user, resolved against the session
//! store, and answered with exactly one reply. Invalid input re-prompts
//! without losing the session; a gateway failure clears the session and
//! reports a generic error, never a half-advanced command.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::agent::menu::{Menu, MenuCommand};
use crate::agent::{chart, portfolio, swap, withdraw};
use crate::chain::ChainGateway;
use crate::config::TradeConfig;
use crate::error::{Error, ProfileError};
use crate::market::{ChartPeriod, MarketGateway};
use crate::networks;
use crate::profile::{Profile, ProfileStore, ProfileUpdate, TokenRef, UserId};
use crate::session::{
    CommandState, SessionStore, SwapDirection, TokenSlot, UserGates, WithdrawStage,
};
use crate::wallet::WalletVault;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
const WELCOME: &str = "Welcome to swapdesk. What would you like to do today?";
const SWAP_PERCENTAGES: [u8; 4] = [25, 50, 75, 100];

/// One inbound user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user_id: UserId,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// First contact, and the universal escape hatch: always lands the user
    /// back on the main menu.
    Initialize,
    Menu(MenuCommand),
    Text(String),
}

/// The agent's answer to one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub chart_svg: Option<String>,
    /// Present when the user is back at the main menu, absent mid-command.
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chart_svg: None,
            menu: None,
        }
    }

    fn with_chart(mut self, svg: String) -> Self {
        self.chart_svg = Some(svg);
        self
    }

    fn with_chart_opt(mut self, svg: Option<String>) -> Self {
        if self.chart_svg.is_none() {
            self.chart_svg = svg;
        }
        self
    }
}

/// Where a handled stage leaves the user.
enum Outcome {
    /// Store this state and wait for the user's next message.
    Enter(CommandState, Reply),
    /// Command over; back to the menu.
    Finish(Reply),
}

/// Stage handler failure modes.
enum StageError {
    /// The input was unusable; re-prompt and keep the session.
    Invalid(String),
    /// A dependency failed; abandon the command.
    Gateway(Error),
}

impl From<ProfileError> for StageError {
    fn from(e: ProfileError) -> Self {
        Self::Gateway(e.into())
    }
}

impl From<crate::error::MarketError> for StageError {
    fn from(e: crate::error::MarketError) -> Self {
        Self::Gateway(e.into())
    }
}

impl From<crate::error::WalletError> for StageError {
    fn from(e: crate::error::WalletError) -> Self {
        Self::Gateway(e.into())
    }
}

impl From<Error> for StageError {
    fn from(e: Error) -> Self {
        Self::Gateway(e)
    }
}

/// The conversational core, shared across channels.
pub struct Agent {
    pub(crate) sessions: SessionStore,
    pub(crate) gates: UserGates,
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) market: Arc<dyn MarketGateway>,
    pub(crate) chain: Arc<dyn ChainGateway>,
    pub(crate) vault: Arc<dyn WalletVault>,
    pub(crate) trade: TradeConfig,
}

impl Agent {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        market: Arc<dyn MarketGateway>,
        chain: Arc<dyn ChainGateway>,
        vault: Arc<dyn WalletVault>,
        trade: TradeConfig,
    ) -> Self {
        Self {
            sessions: SessionStore::new(trade.session_ttl),
            gates: UserGates::new(),
            profiles,
            market,
            chain,
            vault,
            trade,
        }
    }

    /// Handle one event, serialized against other events for the same user.
    pub async fn handle(&self, event: Event) -> Reply {
        let _gate = self.gates.acquire(event.user_id).await;
        let purged = self.sessions.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "dropped expired sessions");
        }

        let user_id = event.user_id;
        match event.kind {
            EventKind::Initialize => self.initialize(user_id).await,
            EventKind::Menu(command) => self.menu_command(user_id, command).await,
            EventKind::Text(text) => self.text(user_id, text).await,
        }
    }

    async fn initialize(&self, user_id: UserId) -> Reply {
        self.sessions.clear(user_id).await;
        match self.profiles.create(user_id).await {
            Ok(profile) => self.at_menu(&profile, WELCOME.to_string()),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "profile creation failed");
                Reply::text(GENERIC_FAILURE)
            }
        }
    }

    async fn menu_command(&self, user_id: UserId, command: MenuCommand) -> Reply {
        let Some(profile) = self.profile_or_prompt(user_id).await else {
            return Reply::text("Please send /start first.");
        };
        // A menu selection abandons whatever command was in progress.
        self.sessions.clear(user_id).await;

        if !Menu::for_profile(&profile).offers(command) {
            tracing::warn!(user_id, command = command.tag(), "command not offered");
            return self.at_menu(&profile, "That action is not available yet.".to_string());
        }

        let outcome = self.start_command(&profile, command).await;
        self.settle(user_id, outcome).await
    }

    async fn text(&self, user_id: UserId, text: String) -> Reply {
        let Some(profile) = self.profile_or_prompt(user_id).await else {
            return Reply::text("Please send /start first.");
        };

        let Some(state) = self.sessions.get(user_id).await else {
            return self.at_menu(&profile, "Choose an action from the menu.".to_string());
        };

        let outcome = self.advance(&profile, state, text.trim()).await;
        self.settle(user_id, outcome).await
    }

    async fn profile_or_prompt(&self, user_id: UserId) -> Option<Profile> {
        match self.profiles.get(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "profile lookup failed");
                None
            }
        }
    }

    async fn settle(&self, user_id: UserId, outcome: Result<Outcome, StageError>) -> Reply {
        match outcome {
            Ok(Outcome::Enter(state, reply)) => {
                self.sessions.set(user_id, state).await;
                reply
            }
            Ok(Outcome::Finish(reply)) => {
                self.sessions.clear(user_id).await;
                // Re-read the profile: the finished command may have changed
                // it, and the menu must reflect the new state.
                match self.profiles.get(user_id).await {
                    Ok(Some(profile)) => {
                        let chart = reply.chart_svg;
                        self.at_menu(&profile, reply.text).with_chart_opt(chart)
                    }
                    _ => reply,
                }
            }
            Err(StageError::Invalid(message)) => Reply::text(message),
            Err(StageError::Gateway(e)) => {
                tracing::warn!(user_id, error = %e, "command abandoned on gateway failure");
                self.sessions.clear(user_id).await;
                match self.profiles.get(user_id).await {
                    Ok(Some(profile)) => self.at_menu(&profile, GENERIC_FAILURE.to_string()),
                    _ => Reply::text(GENERIC_FAILURE),
                }
            }
        }
    }

    /// Menu-anchored reply: the message plus a profile summary line and the
    /// actions currently available.
    fn at_menu(&self, profile: &Profile, text: String) -> Reply {
        Reply {
            text: format!("{text}\n\n{}", profile_summary(profile)),
            chart_svg: None,
            menu: Some(Menu::for_profile(profile)),
        }
    }

    async fn start_command(
        &self,
        profile: &Profile,
        command: MenuCommand,
    ) -> Result<Outcome, StageError> {
        match command {
            MenuCommand::Wallet => self.show_wallet(profile).await,
            MenuCommand::SetChain => Ok(Outcome::Enter(
                CommandState::AwaitingChainId,
                Reply::text(format!(
                    "Which network? Reply with a chain id: {}",
                    networks::supported_summary()
                )),
            )),
            MenuCommand::SetSlippage => Ok(Outcome::Enter(
                CommandState::AwaitingSlippage,
                Reply::text("Enter your default slippage in percent (for example 1):"),
            )),
            MenuCommand::SetBuyToken => Ok(enter_token_stage(TokenSlot::Buy)),
            MenuCommand::SetSellToken => Ok(enter_token_stage(TokenSlot::Sell)),
            MenuCommand::ShowBuyChart => self.show_chart(profile, TokenSlot::Buy).await,
            MenuCommand::ShowSellChart => self.show_chart(profile, TokenSlot::Sell).await,
            MenuCommand::Withdraw => self.start_withdraw(profile).await,
            MenuCommand::Buy => start_swap(profile, SwapDirection::Buy),
            MenuCommand::Sell => start_swap(profile, SwapDirection::Sell),
        }
    }

    async fn show_wallet(&self, profile: &Profile) -> Result<Outcome, StageError> {
        let keys = self.vault.derive(profile.derivation_index)?;

        let text = match profile.chain_id.and_then(networks::by_chain_id) {
            Some(network) => {
                let summary =
                    portfolio::usd_overview(self.market.as_ref(), network, &keys.address).await?;
                format!(
                    "Your wallet on {}:\n{}\n\n{}",
                    network.name,
                    keys.address,
                    portfolio::render(&summary)
                )
            }
            None => format!(
                "Your wallet address:\n{}\n\nSet a network to see balances.",
                keys.address
            ),
        };
        Ok(Outcome::Finish(Reply::text(text)))
    }

    async fn show_chart(&self, profile: &Profile, slot: TokenSlot) -> Result<Outcome, StageError> {
        let (chain_id, (buy, sell)) = chain_and_pair(profile)?;
        let (base, quote) = match slot {
            TokenSlot::Buy => (buy, sell),
            TokenSlot::Sell => (sell, buy),
        };

        let period = ChartPeriod::Day;
        let points = self
            .market
            .price_history(chain_id, &base.address, &quote.address, period)
            .await?;
        let title = format!("{}/{} {}", base.symbol, quote.symbol, period.as_str());
        let svg = chart::render_line_chart(&title, &points);

        Ok(Outcome::Finish(
            Reply::text(format!("Price chart: {title}")).with_chart(svg),
        ))
    }

    async fn start_withdraw(&self, profile: &Profile) -> Result<Outcome, StageError> {
        let chain_id = profile
            .chain_id
            .ok_or_else(|| StageError::Invalid("Set a network first.".to_string()))?;

        let (prompt, offered) = withdraw::list_tokens(self, profile, chain_id).await?;
        if offered.is_empty() {
            return Ok(Outcome::Finish(Reply::text(
                "No tokens available to withdraw.",
            )));
        }
        Ok(Outcome::Enter(
            CommandState::Withdraw(WithdrawStage::AwaitingToken { offered }),
            Reply::text(prompt),
        ))
    }

    async fn advance(
        &self,
        profile: &Profile,
        state: CommandState,
        text: &str,
    ) -> Result<Outcome, StageError> {
        match state {
            CommandState::AwaitingChainId => self.set_chain(profile, text).await,
            CommandState::AwaitingSlippage => self.set_slippage(profile, text).await,
            CommandState::AwaitingTokenAddress(slot) => self.set_token(profile, slot, text).await,
            CommandState::AwaitingSwapPercentage(direction) => {
                let pct = parse_percentage(text)?;
                Ok(Outcome::Finish(
                    swap::execute(self, profile, direction, pct).await,
                ))
            }
            CommandState::Withdraw(stage) => self.advance_withdraw(profile, stage, text).await,
        }
    }

    async fn set_chain(&self, profile: &Profile, text: &str) -> Result<Outcome, StageError> {
        let chain_id: u64 = text.parse().map_err(|_| {
            StageError::Invalid(format!(
                "That is not a chain id. Supported: {}",
                networks::supported_summary()
            ))
        })?;
        let network = networks::by_chain_id(chain_id).ok_or_else(|| {
            StageError::Invalid(format!(
                "Unsupported network. Supported: {}",
                networks::supported_summary()
            ))
        })?;

        self.profiles
            .update(profile.user_id, ProfileUpdate::Chain(chain_id))
            .await?;
        Ok(Outcome::Finish(Reply::text(format!(
            "Network set to {}. Your trading pair was reset.",
            network.name
        ))))
    }

    async fn set_slippage(&self, profile: &Profile, text: &str) -> Result<Outcome, StageError> {
        let pct: Decimal = text
            .parse()
            .map_err(|_| StageError::Invalid("Enter slippage as a number, e.g. 1.".to_string()))?;
        if pct <= Decimal::ZERO || pct > Decimal::from(50) {
            return Err(StageError::Invalid(
                "Slippage must be above 0 and at most 50.".to_string(),
            ));
        }

        self.profiles
            .update(profile.user_id, ProfileUpdate::Slippage(pct))
            .await?;
        Ok(Outcome::Finish(Reply::text(format!(
            "Slippage set to {}%.",
            pct.normalize()
        ))))
    }

    async fn set_token(
        &self,
        profile: &Profile,
        slot: TokenSlot,
        text: &str,
    ) -> Result<Outcome, StageError> {
        let chain_id = profile
            .chain_id
            .ok_or_else(|| StageError::Invalid("Set a network first.".to_string()))?;
        let address = text.to_lowercase();
        if !withdraw::is_address(&address) {
            return Err(StageError::Invalid(
                "That does not look like a token address. Send a 0x-prefixed address.".to_string(),
            ));
        }

        let info = self
            .market
            .token_info(chain_id, &address)
            .await?
            .ok_or_else(|| {
                StageError::Invalid("Token not found on this network. Try another address.".to_string())
            })?;

        let update = ProfileUpdate::Token {
            slot,
            token: TokenRef::new(address, info.symbol.clone()),
        };
        match self.profiles.update(profile.user_id, update).await {
            Ok(_) => Ok(Outcome::Finish(Reply::text(format!(
                "{} set to {}.",
                capitalize(slot.label()),
                info.symbol
            )))),
            Err(ProfileError::TokenPairConflict { .. }) => Err(StageError::Invalid(
                "Buy and sell tokens cannot be the same address. Pick a different one."
                    .to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn advance_withdraw(
        &self,
        profile: &Profile,
        stage: WithdrawStage,
        text: &str,
    ) -> Result<Outcome, StageError> {
        match stage {
            WithdrawStage::AwaitingToken { offered } => {
                let token = text.to_lowercase();
                if !offered.contains(&token) {
                    return Err(StageError::Invalid(
                        "Pick one of the listed token addresses.".to_string(),
                    ));
                }
                Ok(Outcome::Enter(
                    CommandState::Withdraw(WithdrawStage::AwaitingDestination { token }),
                    Reply::text("Destination address:"),
                ))
            }
            WithdrawStage::AwaitingDestination { token } => {
                if !withdraw::is_address(text) {
                    return Err(StageError::Invalid(
                        "That does not look like an address. Send a 0x-prefixed address."
                            .to_string(),
                    ));
                }
                Ok(Outcome::Enter(
                    CommandState::Withdraw(WithdrawStage::AwaitingAmount {
                        token,
                        destination: text.to_string(),
                    }),
                    Reply::text("Amount to withdraw:"),
                ))
            }
            WithdrawStage::AwaitingAmount { token, destination } => {
                let amount: Decimal = text.parse().map_err(|_| {
                    StageError::Invalid("Enter the amount as a number, e.g. 1.5.".to_string())
                })?;
                if amount <= Decimal::ZERO {
                    return Err(StageError::Invalid("Enter a positive amount.".to_string()));
                }
                Ok(Outcome::Finish(
                    withdraw::execute(self, profile, &token, &destination, amount).await,
                ))
            }
        }
    }
}

fn enter_token_stage(slot: TokenSlot) -> Outcome {
    Outcome::Enter(
        CommandState::AwaitingTokenAddress(slot),
        Reply::text(format!("Send the {} contract address:", slot.label())),
    )
}

fn start_swap(profile: &Profile, direction: SwapDirection) -> Result<Outcome, StageError> {
    let (_, (buy, sell)) = chain_and_pair(profile)?;
    let spend = match direction {
        SwapDirection::Buy => sell,
        SwapDirection::Sell => buy,
    };
    Ok(Outcome::Enter(
        CommandState::AwaitingSwapPercentage(direction),
        Reply::text(format!(
            "What percentage of your {} balance? (25, 50, 75 or 100)",
            spend.symbol
        )),
    ))
}

fn chain_and_pair(profile: &Profile) -> Result<(u64, (&TokenRef, &TokenRef)), StageError> {
    let chain_id = profile
        .chain_id
        .ok_or_else(|| StageError::Invalid("Set a network first.".to_string()))?;
    let pair = profile
        .pair()
        .ok_or_else(|| StageError::Invalid("Configure both tokens of your pair first.".to_string()))?;
    Ok((chain_id, pair))
}

fn parse_percentage(text: &str) -> Result<u8, StageError> {
    let pct: u8 = text.parse().map_err(|_| invalid_percentage())?;
    if !SWAP_PERCENTAGES.contains(&pct) {
        return Err(invalid_percentage());
    }
    Ok(pct)
}

fn invalid_percentage() -> StageError {
    StageError::Invalid("Reply with 25, 50, 75 or 100.".to_string())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn profile_summary(profile: &Profile) -> String {
    let network = profile
        .chain_id
        .and_then(networks::by_chain_id)
        .map(|n| n.name.to_string())
        .unwrap_or_else(|| "not set".to_string());
    let pair = match profile.pair() {
        Some((buy, sell)) => format!("{}/{}", buy.symbol, sell.symbol),
        None => "not set".to_string(),
    };
    format!(
        "Network: {network} · Slippage: {}% · Pair: {pair}",
        profile.slippage_pct.normalize()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn profile() -> Profile {
        Profile {
            user_id: 1,
            derivation_index: 0,
            chain_id: Some(137),
            slippage_pct: dec!(1),
            buy_token: Some(TokenRef::new("0xaaa", "FOO")),
            sell_token: Some(TokenRef::new("0xbbb", "BAR")),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_includes_network_slippage_and_pair() {
        let summary = profile_summary(&profile());
        assert!(summary.contains("Network: Polygon"));
        assert!(summary.contains("Slippage: 1%"));
        assert!(summary.contains("Pair: FOO/BAR"));
    }

    #[test]
    fn summary_for_fresh_profile() {
        let mut p = profile();
        p.chain_id = None;
        p.buy_token = None;
        p.sell_token = None;
        assert!(profile_summary(&p).contains("Network: not set"));
        assert!(profile_summary(&p).contains("Pair: not set"));
    }

    #[test]
    fn percentages_are_restricted() {
        assert!(parse_percentage("25").is_ok());
        assert!(parse_percentage("100").is_ok());
        assert!(parse_percentage("33").is_err());
        assert!(parse_percentage("0").is_err());
        assert!(parse_percentage("all of it").is_err());
    }
}
