//! checknotify - deliver check results to customer notification channels.

use anyhow::{anyhow, bail, Context, Result};
use checknotify::{
    cli::{Cli, Command},
    config::Config,
    core::{CheckNotifications, Event, Notification},
    services::Services,
};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load_from_cli(cli.clone()).context("Failed to load configuration")?;

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        database = %config.database.path.display(),
        public_host = %config.public_host,
        deadline_seconds = config.dispatch.deadline_seconds,
        "checknotify starting"
    );

    let services = Services::from_config(&config)?;
    if let Err(e) = run(cli.command, &config, &services).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, config: &Config, services: &Services) -> Result<()> {
    match command {
        Command::Dispatch { event } => {
            let event: Event = read_json(&event)?;
            let report = services.manager.dispatch(&event).await?;
            info!(summary = %report.summary(), "Dispatch finished");
            print_json(&report)?;
            if !report.is_complete() {
                bail!("{}", report.summary());
            }
        }
        Command::Test {
            customer,
            check,
            kind,
            value,
        } => {
            let notification = Notification::new(&customer, 0, &check, kind, &value);
            services.manager.send_test(&notification).await?;
            info!(channel = %kind, "Test notification sent");
        }
        Command::Subscribe {
            customer,
            user,
            check,
            file,
        } => {
            let mut batch = CheckNotifications::new(&check, read_json(&file)?);
            batch.assign_owner(&customer, user);
            let stored = services
                .store
                .replace_for_check(&customer, &check, &batch.notifications)?;
            print_json(&stored)?;
        }
        Command::Unsubscribe { customer, check } => {
            let removed = services.store.delete_by_check_id(&customer, &check)?;
            info!(removed, "Removed subscriptions");
        }
        Command::List { customer, check } => {
            let notifications = match check {
                Some(check) => services.store.get_by_check_id(&customer, &check)?,
                None => services.store.get(&customer)?,
            };
            print_json(&notifications)?;
        }
        Command::Connect {
            customer,
            code,
            redirect_uri,
        } => {
            let (client_id, client_secret) = config
                .chat
                .client_id
                .as_deref()
                .zip(config.chat.client_secret.as_deref())
                .ok_or_else(|| anyhow!("chat.client_id and chat.client_secret must be configured"))?;
            let credential = services
                .chat
                .oauth_access(client_id, client_secret, &code, &redirect_uri)
                .await?;
            services.store.put_oauth_credential(&customer, &credential)?;
            info!(team_id = %credential.team_id, "Stored chat credential");
        }
        Command::Verify { customer } => {
            let credential = services
                .credentials
                .verify(&customer, services.chat.as_ref())
                .await?;
            print_json(&serde_json::json!({
                "active": true,
                "team_id": credential.team_id,
                "team_name": credential.team_name,
            }))?;
        }
        Command::Channels { customer } => {
            let channels = services
                .credentials
                .channels(&customer, services.chat.as_ref())
                .await?;
            print_json(&channels)?;
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
