use {
    anyhow::Result,
    clap::Subcommand,
    lorebot_config::{Diagnostic, LorebotConfig, Severity},
    lorebot_dialogs::i18n::MessageKey,
    lorebot_telegram::TelegramAccountConfig,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors and warnings.
    Check,
    /// Print the effective configuration with secrets redacted.
    Show,
}

pub fn handle_config(action: ConfigAction, config: &LorebotConfig) -> Result<()> {
    match action {
        ConfigAction::Check => {
            if check(config) > 0 {
                std::process::exit(1);
            }
            Ok(())
        },
        ConfigAction::Show => {
            println!("{}", show(config)?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Schema checks plus a parse of every telegram account block.
fn diagnostics(config: &LorebotConfig) -> Vec<Diagnostic> {
    let ids: Vec<&str> = MessageKey::ALL.iter().map(|k| k.id()).collect();
    let mut out = lorebot_config::validate(config, &ids);
    for (account_id, value) in &config.channels.telegram {
        if let Err(e) = TelegramAccountConfig::from_value(account_id, value) {
            out.push(Diagnostic {
                severity: Severity::Error,
                path: format!("channels.telegram.{account_id}"),
                message: e.to_string(),
            });
        }
    }
    out
}

/// Print diagnostics; returns the error count.
fn check(config: &LorebotConfig) -> usize {
    let diags = diagnostics(config);
    for d in &diags {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = diags.iter().filter(|d| d.severity == Severity::Error).count();
    let warnings = diags.len() - errors;
    if diags.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }
    errors
}

fn show(config: &LorebotConfig) -> Result<String> {
    let mut redacted = config.clone();
    for value in redacted.channels.telegram.values_mut() {
        if let Some(token) = value.get_mut("token") {
            *token = serde_json::Value::String("[REDACTED]".into());
        }
    }
    Ok(toml::to_string_pretty(&redacted)?)
}
