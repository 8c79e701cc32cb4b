//! Structured snooze command strings.
//!
//! Commands arrive as single tokens, typically from a mobile action button:
//!
//! ```text
//! PREFIX_<SNOOZE|SILENCE|NORMAL>_<EVERYONE|USER>_<TYPE>[_<id>][_<ttlSeconds>]
//! ```
//!
//! `TYPE` is one of `EVERYTHING`, `NONCRITICAL` (no id) or `DELIVERY`,
//! `TRANSPORT`, `PRIORITY`, `MOBILE`, `CAMERA` (id required). The id may
//! contain underscores. For `SNOOZE` a trailing all-digit segment is the
//! TTL; `SILENCE` and `NORMAL` take no TTL, so every segment is the id.

use std::time::Duration;

use super::SnoozeTarget;
use crate::notification::Priority;
use crate::{Error, Result};

/// What a command does to the matching snooze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeAction {
    Snooze,
    Silence,
    Normal,
}

/// Who a command applies to, before issuers are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Everyone,
    User,
}

/// A parsed snooze command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeCommand {
    pub action: SnoozeAction,
    pub scope: CommandScope,
    pub target: SnoozeTarget,
    pub ttl: Option<Duration>,
}

/// Parse a command string.
pub fn parse_command(prefix: &str, command: &str) -> Result<SnoozeCommand> {
    let command = command.trim();
    let rest = strip_prefix_ignore_case(command, prefix)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or_else(|| Error::validation(format!("Missing '{prefix}_' prefix: {command}")))?;

    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() < 3 {
        return Err(Error::validation(format!(
            "Snooze command needs action, scope and type: {command}"
        )));
    }

    let action = match parts[0].to_ascii_uppercase().as_str() {
        "SNOOZE" => SnoozeAction::Snooze,
        "SILENCE" => SnoozeAction::Silence,
        "NORMAL" => SnoozeAction::Normal,
        other => return Err(Error::validation(format!("Unknown snooze action: {other}"))),
    };

    let scope = match parts[1].to_ascii_uppercase().as_str() {
        "EVERYONE" => CommandScope::Everyone,
        "USER" => CommandScope::User,
        other => return Err(Error::validation(format!("Unknown snooze scope: {other}"))),
    };

    let mut remaining = &parts[3..];
    let mut ttl = None;
    if let (SnoozeAction::Snooze, Some(last)) = (action, remaining.last()) {
        if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
            let secs: u64 = last
                .parse()
                .map_err(|_| Error::validation(format!("Invalid snooze TTL: {last}")))?;
            ttl = Some(Duration::from_secs(secs));
            remaining = &remaining[..remaining.len() - 1];
        }
    }
    let id = remaining.join("_");

    let target = match parts[2].to_ascii_uppercase().as_str() {
        "EVERYTHING" => global(SnoozeTarget::Everything, &id)?,
        "NONCRITICAL" => global(SnoozeTarget::NonCritical, &id)?,
        "DELIVERY" => SnoozeTarget::Delivery(required(&id, "DELIVERY")?),
        "TRANSPORT" => SnoozeTarget::Transport(required(&id, "TRANSPORT")?),
        "PRIORITY" => SnoozeTarget::Priority(required(&id, "PRIORITY")?.parse::<Priority>()?),
        "MOBILE" => SnoozeTarget::Mobile(required(&id, "MOBILE")?),
        "CAMERA" => SnoozeTarget::Camera(required(&id, "CAMERA")?),
        other => return Err(Error::validation(format!("Unknown snooze type: {other}"))),
    };

    Ok(SnoozeCommand {
        action,
        scope,
        target,
        ttl,
    })
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

fn global(target: SnoozeTarget, id: &str) -> Result<SnoozeTarget> {
    if id.is_empty() {
        Ok(target)
    } else {
        Err(Error::validation(format!(
            "Global snooze type takes no id, got '{id}'"
        )))
    }
}

fn required(id: &str, kind: &str) -> Result<String> {
    if id.is_empty() {
        Err(Error::validation(format!("Snooze type {kind} needs an id")))
    } else {
        Ok(id.to_string())
    }
}
