//! Interactive terminal channel with line editing.
//!
//! Menus are printed as numbered lists; a bare number picks the matching
//! action, `/start` resets to the main menu, anything else is passed through
//! as text for whatever stage the user is in. Charts are written to a file in
//! the system temp directory and the path is printed.

use std::sync::Arc;

use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::agent::{Agent, Event, EventKind, Menu, MenuCommand, Reply};
use crate::error::ChannelError;
use crate::profile::UserId;

/// The single local identity a terminal session maps to.
const REPL_USER_ID: UserId = 1;

pub struct ReplChannel {
    agent: Arc<Agent>,
    user_id: UserId,
}

impl ReplChannel {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            user_id: REPL_USER_ID,
        }
    }

    pub async fn run(&self) -> Result<(), ChannelError> {
        let (tx, mut rx) = mpsc::channel::<String>(32);

        std::thread::spawn(move || {
            if let Err(e) = read_lines(tx) {
                eprintln!("Input error: {e}");
            }
        });

        println!("\x1b[1mswapdesk\x1b[0m  /start to reset, /quit to exit");
        println!();

        // Greet immediately instead of waiting for a first line.
        let mut menu = self
            .deliver(Event {
                user_id: self.user_id,
                kind: EventKind::Initialize,
            })
            .await?;

        while let Some(line) = rx.recv().await {
            let kind = if line == "/start" {
                EventKind::Initialize
            } else {
                interpret(&line, menu.as_ref())
            };
            menu = self
                .deliver(Event {
                    user_id: self.user_id,
                    kind,
                })
                .await?;
        }

        Ok(())
    }

    async fn deliver(&self, event: Event) -> Result<Option<Menu>, ChannelError> {
        let reply = self.agent.handle(event).await;
        print_reply(&reply)?;
        Ok(reply.menu)
    }
}

/// Blocking rustyline loop on its own thread; lines flow to the async side
/// over the channel.
fn read_lines(tx: mpsc::Sender<String>) -> Result<(), ChannelError> {
    let config = Config::builder()
        .history_ignore_dups(true)
        .map_err(|e| ChannelError::Readline(e.to_string()))?
        .auto_add_history(true)
        .build();
    let mut rl =
        DefaultEditor::with_config(config).map_err(|e| ChannelError::Readline(e.to_string()))?;

    let history = history_path();
    if let Some(parent) = history.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.load_history(&history);

    loop {
        match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" || line == "/exit" {
                    break;
                }
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                let _ = rl.save_history(&history);
                return Err(ChannelError::Readline(e.to_string()));
            }
        }
    }

    let _ = rl.save_history(&history);
    Ok(())
}

/// Map a line to an event: a number or tag picks from the current menu,
/// everything else is stage input.
fn interpret(line: &str, menu: Option<&Menu>) -> EventKind {
    if let Some(menu) = menu {
        if let Ok(choice) = line.parse::<usize>() {
            if let Some(command) = choice
                .checked_sub(1)
                .and_then(|i| menu.commands.get(i))
            {
                return EventKind::Menu(*command);
            }
        }
        if let Some(command) = MenuCommand::from_tag(&line.to_uppercase()) {
            if menu.offers(command) {
                return EventKind::Menu(command);
            }
        }
    }
    EventKind::Text(line.to_string())
}

fn print_reply(reply: &Reply) -> Result<(), ChannelError> {
    println!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(40));
    println!("{}", reply.text);

    if let Some(svg) = &reply.chart_svg {
        let path = std::env::temp_dir().join(format!(
            "swapdesk-chart-{}.svg",
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::write(&path, svg)?;
        println!("\x1b[90mchart written to {}\x1b[0m", path.display());
    }

    if let Some(menu) = &reply.menu {
        println!();
        for (i, command) in menu.commands.iter().enumerate() {
            println!("  \x1b[1;36m{}\x1b[0m  {}", i + 1, command.label());
        }
    }
    println!();
    Ok(())
}

fn history_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".swapdesk")
        .join("history")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> Menu {
        Menu {
            commands: vec![
                MenuCommand::Wallet,
                MenuCommand::SetChain,
                MenuCommand::SetSlippage,
            ],
        }
    }

    #[test]
    fn numbers_select_from_the_menu() {
        assert_eq!(
            interpret("2", Some(&menu())),
            EventKind::Menu(MenuCommand::SetChain)
        );
        // Out of range falls through to text.
        assert_eq!(
            interpret("9", Some(&menu())),
            EventKind::Text("9".to_string())
        );
    }

    #[test]
    fn tags_select_only_offered_commands() {
        assert_eq!(
            interpret("wallet", Some(&menu())),
            EventKind::Menu(MenuCommand::Wallet)
        );
        assert_eq!(
            interpret("buy", Some(&menu())),
            EventKind::Text("buy".to_string())
        );
    }

    #[test]
    fn without_a_menu_everything_is_text() {
        assert_eq!(interpret("1", None), EventKind::Text("1".to_string()));
    }
}
