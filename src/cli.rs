// Command line surface: argument parsing, logging setup and dispatch.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::auth;
use crate::config::Config;
use crate::publish::Publisher;
use crate::ui;
use crate::upload::UploadOptions;
use crate::workspace::Workspace;

#[derive(Parser, Debug)]
#[command(name = "storefront-publisher", version, about = "Publish packages to the asset storefront")]
pub struct Cli {
    /// Path to config.json (defaults to ./config.json, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Per-request timeout in seconds; unbounded when unset
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update the package in packages/<NAME>.json, submitting it if requested
    Save { name: String },
    /// Save every package in packages/ and write a log under logs/
    SaveAll,
    /// Submit the draft version of packages/<NAME>.json
    Submit { name: String },
    /// Show a package
    Package { id: String },
    /// Show a package version
    Version { id: String },
    /// Delete a draft package version
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Deprecate a published package
    Deprecate {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Set up a launch discount for packages
    Launch {
        /// Comma separated package ids
        #[arg(long, value_delimiter = ',', required = true)]
        packages: Vec<u64>,
        /// Discount in percent
        #[arg(long)]
        discount: u32,
        /// Duration in days
        #[arg(long)]
        duration: u32,
    },
    /// List store categories
    Categories,
    /// List supported Unity versions
    Unity,
    /// Show the publishing API limits of the account
    Limit,
    /// Upload a unitypackage into a package version in slices
    Upload {
        path: PathBuf,
        #[arg(long)]
        version_id: String,
        #[arg(long)]
        unity_version: String,
        /// Number of slices; derived from the max slice size when unset
        #[arg(long)]
        slices: Option<NonZeroUsize>,
        /// Concurrent upload workers
        #[arg(long, default_value = "1")]
        workers: NonZeroUsize,
    },
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let workspace = Workspace::new(config.workspace_dir());
    workspace.ensure_layout()?;

    let timeout = cli.timeout.map(Duration::from_secs).or(config.request_timeout());
    let mut api = ApiClient::new(&config.host, timeout)?;
    let password = match &config.password {
        Some(p) => p.clone(),
        None => ui::prompt_password(&config.username)?,
    };

    let spinner = ui::spinner("Logging in...");
    let login = auth::authenticate(&mut api, &config.username, &password, &workspace.keys_dir());
    spinner.finish_and_clear();
    let login = login?;
    println!(
        "Logged in as user {}, publisher {}.",
        login.user_id, login.publisher_id
    );

    let upload = UploadOptions {
        max_slice_size: config.max_slice_size(),
        staging_dir: config.staging_dir.clone(),
        ..UploadOptions::default()
    };
    let publisher = Publisher::new(&api, &workspace, upload);

    match cli.command {
        Command::Save { name } => {
            publisher.save_named(&name)?;
        }
        Command::SaveAll => {
            let summary = publisher.save_all()?;
            println!("Saved {} packages, {} failed.", summary.saved, summary.failed.len());
            if !summary.failed.is_empty() {
                bail!("Failed packages: {}", summary.failed.join(", "));
            }
        }
        Command::Submit { name } => publisher.submit_named(&name)?,
        Command::Package { id } => ui::print_json(&api.get_package::<Value>(&id)?)?,
        Command::Version { id } => ui::print_json(&api.get_package_version::<Value>(&id)?)?,
        Command::Delete { id, yes } => {
            if yes || ui::confirm(&format!("Delete draft version {id}?"))? {
                api.delete_package_version(&id)
                    .with_context(|| format!("Failed to delete version {id}"))?;
                println!("Deleted draft version {id}.");
            }
        }
        Command::Deprecate { id, yes } => {
            if yes || ui::confirm(&format!("Deprecate package {id}?"))? {
                api.deprecate_package(&id)
                    .with_context(|| format!("Failed to deprecate package {id}"))?;
                println!("Deprecated package {id}.");
            }
        }
        Command::Launch {
            packages,
            discount,
            duration,
        } => {
            api.setup_launch_discount(&packages, discount, duration)
                .context("Failed to set up launch discount")?;
            println!(
                "Set up launch discount for {} packages: {:?}.",
                packages.len(),
                packages
            );
        }
        Command::Categories => ui::print_json(&api.categories()?)?,
        Command::Unity => ui::print_json(&api.unity_versions()?)?,
        Command::Limit => ui::print_json(&api.publishing_limit()?)?,
        Command::Upload {
            path,
            version_id,
            unity_version,
            slices,
            workers,
        } => {
            publisher.upload_unitypackage(
                &version_id,
                &unity_version,
                &path,
                slices.map(NonZeroUsize::get),
                Some(workers.get()),
            )?;
        }
    }
    Ok(())
}
