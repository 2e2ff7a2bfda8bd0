//! Operator interface.
//!
//! ```text
//!   "rc retry * -force-all"  ──► command::parse ──► handlers::run ──► Dispatcher
//! ```
//!
//! Policy changes made here are live but not persisted; `dump setup` shows
//! them as INI text that can be saved as the configuration file.

mod command;
mod handlers;

pub use command::{
    parse, AdminCommand, AdminLine, DumpCommand, MaxCommand, RcCommand, SetCommand, SuspendMode,
    WarningCommand, XrcCommand,
};
pub use handlers::{execute, run, AdminOutput, OPERATOR_INTERVENTION};
