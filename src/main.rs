// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use otsh::{
    batch::{run_batch, BatchItem, BatchOptions},
    cli::{Cli, Commands},
    config::Config,
    robot::{Deck, DeckConfig},
    session::{Session, SessionMode, SessionSettings},
    transport::SshTransport,
    utils::init_logging,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(success: bool, label: &str) {
    if success {
        eprintln!("{} {}", "●".green(), label.bold());
    } else {
        eprintln!("{} {}", "●".red(), label.bold().red());
    }
}

/// Pick the host alias: the flag, or the only configured host.
fn resolve_alias(config: &Config, requested: Option<&str>) -> Result<String> {
    if let Some(alias) = requested {
        return Ok(alias.to_string());
    }
    let mut aliases = config.hosts.keys();
    match (aliases.next(), aliases.next()) {
        (Some(only), None) => Ok(only.clone()),
        (None, _) => anyhow::bail!("No hosts configured; add one under 'hosts:' in the config file"),
        _ => anyhow::bail!("Several hosts configured; choose one with -H <alias>"),
    }
}

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn list_hosts(config: &Config) {
    if config.hosts.is_empty() {
        println!("No hosts configured");
        return;
    }
    let mut aliases: Vec<&String> = config.hosts.keys().collect();
    aliases.sort();
    for alias in aliases {
        if let Ok(identity) = config.identity(alias) {
            println!("  {} {}", alias.bold(), identity.to_string().dimmed());
        }
    }
}

async fn run(cli: Cli, session: &Session<SshTransport>, defaults_delay: Duration) -> Result<bool> {
    match cli.command {
        Commands::Exec {
            command,
            shell,
            timeout,
        } => {
            let mode = if shell {
                SessionMode::Shell
            } else {
                SessionMode::Interpreter
            };
            session.ensure_mode(mode).await?;
            let outcome = session
                .execute(&command.join(" "), mode, Cli::timeout_secs(timeout))
                .await?;
            print_json(&outcome)?;
            report(outcome.is_ok(), &outcome.summary());
            Ok(outcome.is_ok())
        }
        Commands::Batch {
            file,
            shell,
            stop_on_error,
            delay_ms,
            timeout,
        } => {
            let items: Vec<BatchItem> = read_yaml(&file).await?;
            let mode = if shell {
                SessionMode::Shell
            } else {
                SessionMode::Interpreter
            };
            let options = BatchOptions {
                delay_between: delay_ms.map(Duration::from_millis).unwrap_or(defaults_delay),
                stop_on_error,
                timeout: Cli::timeout_secs(timeout),
            };
            let results = run_batch(session, mode, &items, &options).await?;
            print_json(&results)?;
            let failed = results.iter().filter(|r| !r.success).count();
            report(
                failed == 0 && results.len() == items.len(),
                &format!("{} of {} items succeeded", results.len() - failed, items.len()),
            );
            Ok(failed == 0)
        }
        Commands::Block {
            file,
            description,
            timeout,
        } => {
            let code = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let description = description.unwrap_or_else(|| file.display().to_string());
            let result = session
                .send_code_block(&code, &description, Cli::timeout_secs(timeout))
                .await;
            print_json(&result)?;
            report(result.success, &description);
            Ok(result.success)
        }
        Commands::Deck { file } => {
            let layout: DeckConfig = read_yaml(&file).await?;
            let deck = Deck::from_config(layout)?;
            let results = deck.load(session, defaults_delay).await?;
            print_json(&results)?;
            let success = results.iter().all(|r| r.success);
            report(success, "deck loaded");
            Ok(success)
        }
        Commands::Ping => {
            let ok = session.ping().await;
            report(ok, if ok { "pong" } else { "no reply" });
            Ok(ok)
        }
        Commands::Status => {
            let status = session.status().await;
            print_json(&status)?;
            Ok(status.can_ping)
        }
        Commands::Hosts => Ok(true),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_with_priority(cli.config.as_deref()).await?;
    if matches!(cli.command, Commands::Hosts) {
        list_hosts(&config);
        return Ok(());
    }

    let alias = resolve_alias(&config, cli.host.as_deref())?;
    let mut settings = SessionSettings::from(&config.defaults);
    if let Some(retries) = cli.retries {
        settings.retry.max_retries = retries;
    }
    let delay_between = Duration::from_millis(config.defaults.delay_between_ms);

    let transport = SshTransport::from_config(&config, &alias, None, cli.password).await?;
    let session = Session::new(transport, settings);
    session
        .connect()
        .await
        .with_context(|| format!("Failed to connect to '{alias}'"))?;

    let result = run(cli, &session, delay_between).await;
    if let Err(e) = session.close().await {
        tracing::debug!("Error while closing: {}", e);
    }

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => Err(e),
    }
}
