//! Config subcommand handlers.

use std::io::BufRead;
use std::path::PathBuf;

use aqiwatch_config::{Config, KEYRING_SECRET_ACCOUNT, KEYRING_SERVICE};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn target_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(aqiwatch_config::config_path)
}

/// Copy of `cfg` that is safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    if shown.backend.secret.is_some() {
        shown.backend.secret = Some("********".into());
    }
    shown
}

fn keyring_err(e: impl std::fmt::Display) -> CliError {
    CliError::Keyring {
        reason: e.to_string(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&target_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&commands::resolve_config(global)?);
            if let Err(e) = aqiwatch_config::validate(&cfg) {
                tracing::warn!(error = %e, "resolved configuration is not usable as-is");
            }
            let rendered = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("# unprintable: {e}")),
                |c| target_path(global).display().to_string() + "\t" + &c.backend.api_url,
            );
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = target_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            aqiwatch_config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "wrote default config");
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetSecret { value } => {
            let secret = match value {
                Some(v) => v,
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line.trim_end_matches(['\r', '\n']).to_owned()
                }
            };
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "secret".into(),
                    reason: "must not be empty".into(),
                });
            }

            let entry =
                keyring::Entry::new(KEYRING_SERVICE, KEYRING_SECRET_ACCOUNT).map_err(keyring_err)?;
            entry.set_password(&secret).map_err(keyring_err)?;

            if !global.quiet {
                eprintln!("Secret stored in the system keyring ({KEYRING_SERVICE}).");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_plaintext_secret() {
        let mut cfg = Config::default();
        cfg.backend.secret = Some("hunter2".into());
        let shown = redacted(&cfg);
        assert_eq!(shown.backend.secret.as_deref(), Some("********"));
        assert_eq!(redacted(&Config::default()).backend.secret, None);
    }
}
