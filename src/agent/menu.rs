//! Main-menu commands and profile-derived menu rendering.
//!
//! Which actions the menu offers is computed from the profile on every
//! render: trading and withdrawal need a network, the pair actions need both
//! tokens. This is presentation only, not session state.

use crate::profile::Profile;

/// Top-level commands a user can select from the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Wallet,
    SetChain,
    SetSlippage,
    SetBuyToken,
    SetSellToken,
    ShowBuyChart,
    ShowSellChart,
    Withdraw,
    Buy,
    Sell,
}

impl MenuCommand {
    pub fn label(self) -> &'static str {
        match self {
            Self::Wallet => "Wallet",
            Self::SetChain => "Set Chain",
            Self::SetSlippage => "Set Slippage",
            Self::SetBuyToken => "Set Buy Token",
            Self::SetSellToken => "Set Sell Token",
            Self::ShowBuyChart => "Show Buy Chart",
            Self::ShowSellChart => "Show Sell Chart",
            Self::Withdraw => "Withdraw",
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }

    /// Stable tag for transports that round-trip commands as strings.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Wallet => "WALLET",
            Self::SetChain => "SET_CHAIN",
            Self::SetSlippage => "SET_SLIPPAGE",
            Self::SetBuyToken => "SET_BUY_TOKEN",
            Self::SetSellToken => "SET_SELL_TOKEN",
            Self::ShowBuyChart => "SHOW_BUY_CHART",
            Self::ShowSellChart => "SHOW_SELL_CHART",
            Self::Withdraw => "WITHDRAW",
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "WALLET" => Self::Wallet,
            "SET_CHAIN" => Self::SetChain,
            "SET_SLIPPAGE" => Self::SetSlippage,
            "SET_BUY_TOKEN" => Self::SetBuyToken,
            "SET_SELL_TOKEN" => Self::SetSellToken,
            "SHOW_BUY_CHART" => Self::ShowBuyChart,
            "SHOW_SELL_CHART" => Self::ShowSellChart,
            "WITHDRAW" => Self::Withdraw,
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            _ => return None,
        })
    }
}

/// The rendered main menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub commands: Vec<MenuCommand>,
}

impl Menu {
    pub fn for_profile(profile: &Profile) -> Self {
        let mut commands = vec![
            MenuCommand::Wallet,
            MenuCommand::SetChain,
            MenuCommand::SetSlippage,
        ];

        if profile.chain_id.is_some() {
            commands.push(MenuCommand::SetBuyToken);
            commands.push(MenuCommand::SetSellToken);
            commands.push(MenuCommand::Withdraw);
        }
        if profile.pair().is_some() {
            commands.push(MenuCommand::ShowBuyChart);
            commands.push(MenuCommand::ShowSellChart);
            commands.push(MenuCommand::Buy);
            commands.push(MenuCommand::Sell);
        }

        Self { commands }
    }

    pub fn offers(&self, command: MenuCommand) -> bool {
        self.commands.contains(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TokenRef;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn profile() -> Profile {
        Profile {
            user_id: 1,
            derivation_index: 0,
            chain_id: None,
            slippage_pct: dec!(1),
            buy_token: None,
            sell_token: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_profile_gets_config_actions_only() {
        let menu = Menu::for_profile(&profile());
        assert!(menu.offers(MenuCommand::SetChain));
        assert!(!menu.offers(MenuCommand::Withdraw));
        assert!(!menu.offers(MenuCommand::Buy));
    }

    #[test]
    fn chain_unlocks_tokens_and_withdraw() {
        let mut p = profile();
        p.chain_id = Some(137);
        let menu = Menu::for_profile(&p);
        assert!(menu.offers(MenuCommand::SetBuyToken));
        assert!(menu.offers(MenuCommand::Withdraw));
        assert!(!menu.offers(MenuCommand::Buy));
    }

    #[test]
    fn full_pair_unlocks_trading_and_charts() {
        let mut p = profile();
        p.chain_id = Some(137);
        p.buy_token = Some(TokenRef::new("0xaaa", "FOO"));
        p.sell_token = Some(TokenRef::new("0xbbb", "BAR"));
        let menu = Menu::for_profile(&p);
        assert!(menu.offers(MenuCommand::Buy));
        assert!(menu.offers(MenuCommand::Sell));
        assert!(menu.offers(MenuCommand::ShowBuyChart));
    }

    #[test]
    fn tags_roundtrip() {
        for command in [
            MenuCommand::Wallet,
            MenuCommand::SetChain,
            MenuCommand::SetSlippage,
            MenuCommand::SetBuyToken,
            MenuCommand::SetSellToken,
            MenuCommand::ShowBuyChart,
            MenuCommand::ShowSellChart,
            MenuCommand::Withdraw,
            MenuCommand::Buy,
            MenuCommand::Sell,
        ] {
            assert_eq!(MenuCommand::from_tag(command.tag()), Some(command));
        }
        assert_eq!(MenuCommand::from_tag("NOPE"), None);
    }
}
