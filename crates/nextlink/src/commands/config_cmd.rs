//! Config subcommand handlers.

use std::io::BufRead;

use nextlink_config::{Config, SecretKind, load_config_from, store_secret};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config_file;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "***";

/// Copy of `cfg` with plaintext secrets masked.
fn redact(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for account in &mut cfg.accounts {
        if account.password.is_some() {
            account.password = Some(REDACTED.into());
        }
        if account.token.is_some() {
            account.token = Some(REDACTED.into());
        }
    }
    cfg
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global);
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = redact(&load_config_from(&path)?);
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("error: {e}")),
                |c| {
                    c.accounts
                        .iter()
                        .map(|a| a.id.to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ConfigCommand::SetSecret { id, token } => {
            let cfg = load_config_from(&path)?;
            if cfg.account(id).is_none() {
                return Err(CliError::UnknownAccount {
                    id,
                    available: cfg
                        .accounts
                        .iter()
                        .map(|a| a.id.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }

            let mut secret = String::new();
            std::io::stdin().lock().read_line(&mut secret)?;
            let secret = secret.trim_end_matches(['\r', '\n']);
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "secret".into(),
                    reason: "nothing read from stdin".into(),
                });
            }

            let kind = if token {
                SecretKind::Token
            } else {
                SecretKind::Password
            };
            store_secret(id, kind, secret)?;
            if !global.quiet {
                eprintln!("Stored {kind:?} for account {id} in the system keyring");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_plaintext_secrets() {
        let cfg: Config = toml::from_str(
            r#"
            [[accounts]]
            id = 1
            server_url = "https://cloud.example.com"
            username = "alice"
            password = "hunter2"
            "#,
        )
        .unwrap();
        let shown = redact(&cfg);
        assert_eq!(shown.accounts[0].password.as_deref(), Some(REDACTED));
        assert!(shown.accounts[0].token.is_none());
    }
}
