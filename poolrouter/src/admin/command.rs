//! Operator command grammar.
//!
//! Commands arrive as single text lines such as
//! `rc retry 0001@lan-dcap-3 -update-si` or `rc suspend on -all`. Options
//! use the single-dash long form; they are rewritten to clap's double-dash
//! form before parsing.

use crate::container::OnError;
use crate::error::AdminError;
use crate::location::SameHostPolicy;
use clap::{Parser, Subcommand, ValueEnum};

/// One parsed command line.
#[derive(Debug, Parser)]
#[command(name = "admin", no_binary_name = true, disable_help_subcommand = true)]
pub struct AdminLine {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Request container commands
    #[command(subcommand)]
    Rc(RcCommand),

    /// Structured request listing
    #[command(subcommand)]
    Xrc(XrcCommand),

    /// Replicate a file for a client host
    Replicate {
        /// File to replicate
        file: String,
        /// Client host the replica is meant for
        host: String,
    },

    /// Show controller settings and counters
    Info,

    /// Dump configuration
    #[command(subcommand)]
    Dump(DumpCommand),
}

#[derive(Debug, Subcommand)]
pub enum RcCommand {
    /// Change a container setting
    #[command(subcommand)]
    Set(SetCommand),

    /// List, inject or remove forced outcomes
    Select {
        file: Option<String>,
        /// Return code of the forced outcome (default 1)
        code: Option<i32>,
        /// Message of the forced outcome (default `Failed-<code>`)
        message: Option<String>,
        #[arg(long)]
        remove: bool,
    },

    /// Suspend or resume staging, and incoming requests with -all
    Suspend {
        mode: Option<SuspendMode>,
        #[arg(long)]
        all: bool,
    },

    /// What to do once retries are exhausted
    Onerror { policy: OnError },

    /// Retry one request, or all failed requests with `*`
    Retry {
        target: String,
        /// With `*`: retry every request regardless of its state
        #[arg(long)]
        force_all: bool,
        /// Refetch the storage descriptor first
        #[arg(long)]
        update_si: bool,
    },

    /// Answer all clients of a request with an error
    Failed {
        name: String,
        code: Option<i32>,
        message: Option<String>,
    },

    /// Remove a request without answering it
    Destroy { name: String },

    /// List requests, or pending pool messages with -w
    Ls {
        pattern: Option<String>,
        #[arg(short = 'w')]
        waiting: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    #[command(subcommand)]
    Max(MaxCommand),

    /// Same-host policy for pool-to-pool copies
    #[command(name = "sameHostCopy")]
    SameHostCopy { policy: SameHostPolicy },

    /// Same-host policy for stage retries
    #[command(name = "sameHostRetry")]
    SameHostRetry { policy: SameHostPolicy },

    #[command(subcommand)]
    Warning(WarningCommand),

    /// Liveness check interval in seconds (0 disables)
    Poolpingtimer { seconds: u64 },

    /// Retry timer in seconds
    Retry { seconds: u64 },
}

#[derive(Debug, Subcommand)]
pub enum MaxCommand {
    /// Concurrently running requests (0 = unlimited)
    Threads { count: usize },

    /// Concurrent stage requests, or `unlimited`
    Restore {
        #[arg(allow_hyphen_values = true)]
        limit: String,
    },

    /// Attempts before the on-error policy applies
    Retries { count: u32 },
}

#[derive(Debug, Subcommand)]
pub enum WarningCommand {
    /// Show or set the warning destination
    Path { destination: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum XrcCommand {
    Ls,
}

#[derive(Debug, Subcommand)]
pub enum DumpCommand {
    /// Current settings as INI text
    Setup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuspendMode {
    On,
    Off,
}

/// Splits a command line into words. Double quotes group words.
fn tokenize(line: &str) -> Result<Vec<String>, AdminError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err(AdminError::Parse("Unterminated quote".to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// `-update-si` → `--update-si`; short flags and negative numbers stay.
fn normalize_option(word: String) -> String {
    let is_long_option = word.len() > 2
        && word.starts_with('-')
        && !word.starts_with("--")
        && word[1..].starts_with(|c: char| c.is_ascii_alphabetic());
    if is_long_option {
        format!("-{}", word)
    } else {
        word
    }
}

/// Parses one command line.
pub fn parse(line: &str) -> Result<AdminCommand, AdminError> {
    let words: Vec<String> = tokenize(line)?
        .into_iter()
        .map(normalize_option)
        .collect();
    AdminLine::try_parse_from(words)
        .map(|parsed| parsed.command)
        .map_err(|e| AdminError::Parse(e.to_string()))
}
