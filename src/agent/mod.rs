//! The conversational core: routing, stage handling and orchestration.

pub mod chart;
pub mod menu;
pub mod portfolio;
pub mod router;
mod swap;
mod withdraw;

pub use menu::{Menu, MenuCommand};
pub use router::{Agent, Event, EventKind, Reply};
