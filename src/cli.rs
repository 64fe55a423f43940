//! Command-Line Interface (CLI) argument parsing.
//!
//! The global flags are merged over the configuration file and environment
//! variables; the subcommand selects what the process does.

use crate::core::NotificationType;
use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Dispatches check results to customer notification channels.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database holding subscriptions.
    #[arg(long, value_name = "FILE", global = true)]
    pub database: Option<PathBuf>,

    /// Log filter, e.g. `info` or `checknotify=debug`.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Base URL used to build links back to the application.
    #[arg(long, value_name = "URL", global = true)]
    pub public_host: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Deliver a JSON event file to every subscription of its check.
    Dispatch {
        #[arg(long, value_name = "FILE")]
        event: PathBuf,
    },
    /// Send a sample failing event to a single destination.
    Test {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        check: String,
        #[arg(long = "type", value_name = "TYPE")]
        kind: NotificationType,
        #[arg(long)]
        value: String,
    },
    /// Replace the subscriptions of a check with those in a JSON file.
    Subscribe {
        #[arg(long)]
        customer: String,
        #[arg(long, default_value_t = 0)]
        user: i64,
        #[arg(long)]
        check: String,
        /// JSON array of `{"type": ..., "value": ...}` objects.
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Remove every subscription of a check.
    Unsubscribe {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        check: String,
    },
    /// Print stored subscriptions as JSON.
    List {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        check: Option<String>,
    },
    /// Exchange a chat OAuth code and store the resulting credential.
    Connect {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        code: String,
        #[arg(long, value_name = "URL")]
        redirect_uri: String,
    },
    /// Check that the stored chat credential is still accepted.
    Verify {
        #[arg(long)]
        customer: String,
    },
    /// List the chat channels the customer's bot can post to.
    Channels {
        #[arg(long)]
        customer: String,
    },
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(host) = &self.public_host {
            dict.insert("public_host".into(), Value::from(host.clone()));
        }

        if let Some(path) = &self.database {
            let mut database = Dict::new();
            database.insert(
                "path".into(),
                Value::from(path.to_string_lossy().into_owned()),
            );
            dict.insert("database".into(), Value::Dict(Tag::Default, database));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
