//! Pure parsing and validation behind the CLI commands.
//!
//! These functions take plain strings and can be unit-tested without a
//! server or a terminal.

use std::net::IpAddr;

use crate::api::SettingsUpdate;
use crate::config;
use crate::core::{AuditAction, AuditFilter, FlowFilter, FlowStatus, StatusAction};
use crate::error::AppError;

/// One line typed into the interactive `watch` session.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Block { ip: String, reason: String },
    Release { ip: String, note: String },
    Note { ip: String, text: String },
    Search(Option<String>),
    StatusFilter(Option<FlowStatus>),
    Select(String),
    VerificationNote { ip: String, note: String },
    Verify { ip: Option<String>, action: StatusAction },
    Candidates,
    Clear,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  block <ip> [reason]         block an IP (reason defaults to manual)
  release <ip> [note]         release an IP
  note <ip> <text>            attach a note to an IP
  search [text]               filter rows by IP substring (no text clears)
  status <status|all>         filter rows by status
  select <ip>                 toggle an IP in the verification selection
  vnote <ip> [text]           note recorded when a verification block succeeds
  verify <block|release> [ip] decide one candidate, or every selected one
  candidates                  list IPs awaiting verification
  clear                       drop every tracked flow
  help                        show this help
  quit                        leave the session";

/// Parse one session line. Blank lines yield `None`.
pub fn parse_operator_command(line: &str) -> Result<Option<OperatorCommand>, AppError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = split_word(line);
    let command = match word.to_ascii_lowercase().as_str() {
        "block" | "b" => {
            let (ip, reason) = require_ip(rest, "block")?;
            OperatorCommand::Block {
                ip,
                reason: non_empty(reason).unwrap_or_else(|| config::MANUAL_BLOCK_REASON.to_string()),
            }
        }
        "release" | "r" => {
            let (ip, note) = require_ip(rest, "release")?;
            OperatorCommand::Release {
                ip,
                note: non_empty(note).unwrap_or_else(|| config::MANUAL_RELEASE_NOTE.to_string()),
            }
        }
        "note" | "n" => {
            let (ip, text) = require_ip(rest, "note")?;
            let text = non_empty(text).ok_or_else(|| AppError::InvalidInput("Please enter a note".into()))?;
            OperatorCommand::Note { ip, text }
        }
        "search" | "/" => OperatorCommand::Search(non_empty(rest)),
        "status" => match rest.trim() {
            "" | "all" | "*" => OperatorCommand::StatusFilter(None),
            s => OperatorCommand::StatusFilter(Some(s.parse()?)),
        },
        "select" | "s" => OperatorCommand::Select(require_ip(rest, "select")?.0),
        "vnote" => {
            let (ip, note) = require_ip(rest, "vnote")?;
            OperatorCommand::VerificationNote {
                ip,
                note: note.trim().to_string(),
            }
        }
        "verify" | "v" => {
            let (action, rest) = split_word(rest);
            let action = parse_action(action)?;
            let ip = match split_word(rest).0 {
                "" => None,
                ip => Some(validate_ip(ip)?),
            };
            OperatorCommand::Verify { ip, action }
        }
        "candidates" => OperatorCommand::Candidates,
        "clear" => OperatorCommand::Clear,
        "help" | "?" => OperatorCommand::Help,
        "quit" | "exit" | "q" => OperatorCommand::Quit,
        other => {
            return Err(AppError::InvalidInput(format!(
                "unknown command {other:?}; type help for a list"
            )))
        }
    };
    Ok(Some(command))
}

/// Apply a search or status command to the current table filter.
pub fn apply_filter_change(filter: &mut FlowFilter, command: &OperatorCommand) -> bool {
    match command {
        OperatorCommand::Search(text) => {
            filter.ip_substring = text.clone();
            true
        }
        OperatorCommand::StatusFilter(status) => {
            filter.status = *status;
            true
        }
        _ => false,
    }
}

/// Check that `ip` is a literal IPv4 or IPv6 address and return it trimmed.
pub fn validate_ip(ip: &str) -> Result<String, AppError> {
    let ip = ip.trim();
    ip.parse::<IpAddr>()
        .map(|_| ip.to_string())
        .map_err(|_| AppError::InvalidInput(format!("{ip:?} is not an IP address")))
}

pub fn parse_action(word: &str) -> Result<StatusAction, AppError> {
    match word.trim().to_ascii_lowercase().as_str() {
        "block" => Ok(StatusAction::Block),
        "release" => Ok(StatusAction::Release),
        other => Err(AppError::InvalidInput(format!(
            "expected block or release, got {other:?}"
        ))),
    }
}

/// Build a settings update from CLI flags. The threshold is given in percent.
pub fn settings_update(auto_block: Option<bool>, threshold_percent: Option<f64>) -> SettingsUpdate {
    SettingsUpdate {
        auto_block,
        threshold: threshold_percent.map(|p| p / 100.0),
    }
}

pub fn audit_filter(ip: Option<String>, action: Option<&str>) -> Result<AuditFilter, AppError> {
    let action = match action {
        Some(a) => Some(a.parse::<AuditAction>()?),
        None => None,
    };
    Ok(AuditFilter {
        ip_substring: ip.and_then(|s| non_empty(&s)),
        action,
    })
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn require_ip<'a>(rest: &'a str, command: &str) -> Result<(String, &'a str), AppError> {
    let (ip, tail) = split_word(rest);
    if ip.is_empty() {
        return Err(AppError::InvalidInput(format!("usage: {command} <ip> ...")));
    }
    Ok((validate_ip(ip)?, tail))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
