//! Execution of parsed operator commands against a [`Dispatcher`].

use super::command::{
    parse, AdminCommand, DumpCommand, MaxCommand, RcCommand, SetCommand, SuspendMode,
    WarningCommand, XrcCommand,
};
use crate::config::parse_limit;
use crate::container::{Dispatcher, RequestSummary};
use crate::error::{codes, AdminError, RequestError};
use crate::location::FileId;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Default message of operator-failed requests.
pub const OPERATOR_INTERVENTION: &str = "Operator Intervention";

/// Result of an operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminOutput {
    Text(String),
    /// Structured listing, as returned by `xrc ls`.
    Requests(Vec<RequestSummary>),
}

impl AdminOutput {
    fn empty() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for AdminOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Requests(requests) => {
                for r in requests {
                    writeln!(
                        f,
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        r.name,
                        r.queued,
                        r.retry_count,
                        r.started.format("%Y-%m-%d %H:%M:%S"),
                        r.candidate,
                        r.status,
                        r.error_code,
                        r.error_message
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Parses and executes one command line.
pub async fn execute(dispatcher: &Dispatcher, line: &str) -> Result<AdminOutput, AdminError> {
    let command = parse(line)?;
    info!(command = line, "Operator command");
    run(dispatcher, command).await
}

/// Executes a parsed command.
pub async fn run(dispatcher: &Dispatcher, command: AdminCommand) -> Result<AdminOutput, AdminError> {
    match command {
        AdminCommand::Rc(rc) => run_rc(dispatcher, rc),
        AdminCommand::Xrc(XrcCommand::Ls) => Ok(AdminOutput::Requests(dispatcher.list(None))),
        AdminCommand::Replicate { file, host } => {
            // The answer goes nowhere; the copy itself is what the operator wants.
            let _answer = dispatcher.replicate(FileId::new(file), &host).await?;
            Ok(AdminOutput::Text("Replication initiated...".to_string()))
        }
        AdminCommand::Info => Ok(AdminOutput::Text(dispatcher.info())),
        AdminCommand::Dump(DumpCommand::Setup) => Ok(AdminOutput::Text(dispatcher.dump_setup())),
    }
}

fn run_rc(dispatcher: &Dispatcher, command: RcCommand) -> Result<AdminOutput, AdminError> {
    match command {
        RcCommand::Set(set) => run_set(dispatcher, set),
        RcCommand::Select {
            file,
            code,
            message,
            remove,
        } => select(dispatcher, file, code, message, remove),
        RcCommand::Suspend { mode, all } => {
            let on = mode.unwrap_or(SuspendMode::On) == SuspendMode::On;
            dispatcher.update_policy(|p| {
                if all {
                    p.suspend_incoming = on;
                }
                p.suspend_staging = on;
            });
            Ok(AdminOutput::empty())
        }
        RcCommand::Onerror { policy } => {
            dispatcher.update_policy(|p| p.on_error = policy);
            Ok(AdminOutput::Text(format!("onerror {}", policy)))
        }
        RcCommand::Retry {
            target,
            force_all,
            update_si,
        } => {
            if target == "*" {
                let retried = dispatcher.retry_all(force_all, update_si);
                Ok(AdminOutput::Text(format!("{} request(s) retried", retried)))
            } else {
                dispatcher.retry(&target, update_si)?;
                Ok(AdminOutput::empty())
            }
        }
        RcCommand::Failed {
            name,
            code,
            message,
        } => {
            let code = code.unwrap_or(codes::GENERIC);
            let message = message.unwrap_or_else(|| OPERATOR_INTERVENTION.to_string());
            dispatcher.fail(&name, code, &message)?;
            Ok(AdminOutput::empty())
        }
        RcCommand::Destroy { name } => {
            dispatcher.destroy(&name)?;
            Ok(AdminOutput::empty())
        }
        RcCommand::Ls { pattern, waiting } => list(dispatcher, pattern.as_deref(), waiting),
    }
}

fn run_set(dispatcher: &Dispatcher, command: SetCommand) -> Result<AdminOutput, AdminError> {
    match command {
        SetCommand::Max(MaxCommand::Threads { count }) => {
            dispatcher.set_max_workers(count);
            Ok(AdminOutput::Text(format!("New max thread count : {}", count)))
        }
        SetCommand::Max(MaxCommand::Restore { limit }) => {
            if limit.starts_with('-') {
                return Err(AdminError::InvalidArgument("must be >=0".to_string()));
            }
            let limit = parse_limit(&limit).map_err(AdminError::InvalidArgument)?;
            dispatcher.update_policy(|p| p.max_restore = limit);
            Ok(AdminOutput::empty())
        }
        SetCommand::Max(MaxCommand::Retries { count }) => {
            dispatcher.update_policy(|p| p.max_retries = count);
            Ok(AdminOutput::empty())
        }
        SetCommand::SameHostCopy { policy } => {
            dispatcher.update_parameters(|p| p.same_host_copy = policy);
            Ok(AdminOutput::empty())
        }
        SetCommand::SameHostRetry { policy } => {
            dispatcher.update_policy(|p| p.same_host_retry = policy);
            Ok(AdminOutput::empty())
        }
        SetCommand::Warning(WarningCommand::Path { destination }) => {
            if let Some(destination) = destination {
                dispatcher.update_policy(|p| p.warning_path = destination);
            }
            Ok(AdminOutput::Text(dispatcher.policy().warning_path.clone()))
        }
        SetCommand::Poolpingtimer { seconds } => {
            dispatcher.update_policy(|p| p.ping_interval = Duration::from_secs(seconds));
            Ok(AdminOutput::empty())
        }
        SetCommand::Retry { seconds } => {
            dispatcher.update_policy(|p| p.retry_timer = Duration::from_secs(seconds));
            Ok(AdminOutput::empty())
        }
    }
}

fn select(
    dispatcher: &Dispatcher,
    file: Option<String>,
    code: Option<i32>,
    message: Option<String>,
    remove: bool,
) -> Result<AdminOutput, AdminError> {
    let Some(file) = file else {
        let text: String = dispatcher
            .forced_outcomes()
            .iter()
            .map(|(file, error)| format!("{}  {}\n", file, error))
            .collect();
        return Ok(AdminOutput::Text(text));
    };

    let file = FileId::new(file);
    if remove {
        dispatcher.clear_forced_outcome(&file);
        return Ok(AdminOutput::empty());
    }

    let code = code.unwrap_or(codes::GENERIC);
    let message = message.unwrap_or_else(|| format!("Failed-{}", code));
    dispatcher.set_forced_outcome(file, RequestError::new(code, message));
    Ok(AdminOutput::empty())
}

/// `rc ls`: the pattern must match the whole line.
fn list(
    dispatcher: &Dispatcher,
    pattern: Option<&str>,
    waiting: bool,
) -> Result<AdminOutput, AdminError> {
    let filter = pattern
        .map(|p| Regex::new(&format!("^(?:{})$", p)))
        .transpose()
        .map_err(|e| AdminError::InvalidArgument(e.to_string()))?;

    let lines: Vec<String> = if waiting {
        dispatcher
            .pending()
            .iter()
            .map(|p| p.to_string())
            .filter(|line| filter.as_ref().map_or(true, |re| re.is_match(line)))
            .collect()
    } else {
        dispatcher
            .list(filter.as_ref())
            .iter()
            .map(|s| s.to_string())
            .collect()
    };

    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(AdminOutput::Text(text))
}
