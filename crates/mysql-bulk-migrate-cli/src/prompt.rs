//! Interactive prompts: administrator credentials and file overwrite checks.

use dialoguer::{Confirm, Input, Password};
use mysql_bulk_migrate::{AdminConfig, AdminCredential, MigrateError};
use std::io::IsTerminal;
use std::path::Path;

/// Environment variable consulted for the admin password before prompting.
pub const ADMIN_PASSWORD_ENV: &str = "MYSQL_ADMIN_PASSWORD";

fn prompt_error(e: dialoguer::Error) -> MigrateError {
    MigrateError::Io(std::io::Error::other(e.to_string()))
}

/// Resolve the administrator account for an import.
///
/// Host and user come from the flags, then the config file, then the
/// defaults (`localhost` / `root`). The password comes from the config file
/// or `MYSQL_ADMIN_PASSWORD`; otherwise all three are asked for on the
/// terminal.
pub fn admin_credential(
    config: Option<&AdminConfig>,
    host: Option<String>,
    user: Option<String>,
) -> Result<AdminCredential, MigrateError> {
    let mut admin = config.cloned().unwrap_or_default();
    if let Some(host) = host {
        admin.host = host;
    }
    if let Some(user) = user {
        admin.user = user;
    }
    if admin.password.is_none() {
        admin.password = std::env::var(ADMIN_PASSWORD_ENV).ok();
    }
    if let Some(credential) = AdminCredential::from_config(&admin) {
        return credential;
    }
    let AdminConfig { host, user, .. } = admin;

    if !std::io::stdin().is_terminal() {
        return Err(MigrateError::Config(format!(
            "Administrator password required: set admin.password in the config file or {}",
            ADMIN_PASSWORD_ENV
        )));
    }

    eprintln!();
    eprintln!("MySQL Administrator Credentials Required");
    eprintln!("----------------------------------------");
    eprintln!("Creating databases and users needs an administrative MySQL account.");

    let host: String = Input::new()
        .with_prompt("  Admin host")
        .default(host)
        .interact_text()
        .map_err(prompt_error)?;

    let user: String = Input::new()
        .with_prompt("  Admin user")
        .default(user)
        .interact_text()
        .map_err(prompt_error)?;

    let password: String = Password::new()
        .with_prompt("  Admin password")
        .allow_empty_password(true)
        .interact()
        .map_err(prompt_error)?;

    AdminCredential::new(host.trim(), user.trim(), password)
}

/// Make sure writing `path` is allowed: always with `force`, after
/// confirmation on a terminal, never otherwise.
pub fn confirm_overwrite(path: &Path, force: bool) -> Result<(), MigrateError> {
    if force || !path.exists() {
        return Ok(());
    }

    if !std::io::stdin().is_terminal() {
        return Err(MigrateError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let overwrite = Confirm::new()
        .with_prompt(format!("{} already exists. Overwrite?", path.display()))
        .default(false)
        .interact()
        .map_err(prompt_error)?;

    if overwrite {
        Ok(())
    } else {
        Err(MigrateError::Cancelled)
    }
}
