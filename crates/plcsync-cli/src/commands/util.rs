//! Shared helpers for command handlers.

use chrono::NaiveDateTime;

use plcsync_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config from `--config` or the platform default path.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let config = match &global.config {
        Some(path) => plcsync_config::load_config_from(path)?,
        None => plcsync_config::load_config()?,
    };
    Ok(config)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Parse a `--at` value in local time.
pub fn parse_local(raw: &str) -> Result<NaiveDateTime, CliError> {
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| CliError::Validation {
            field: "at".into(),
            reason: format!("expected YYYY-MM-DD HH:MM, got {raw:?}"),
        })
}
