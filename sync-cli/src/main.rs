//! # syncview
//!
//! CLI for exercising the syncview client core against local files.
//!
//! ## Commands
//!
//! - `view`: Materialize a filtered, grouped view of a shared-data dataset
//! - `defaults`: Stage default permission profiles and optionally commit them
//!
//! ## Example
//!
//! ```bash
//! # Everything tagged "ab" that carries pose data, grouped by code
//! syncview view --dataset shared.json --text ab --require pose --group-by code
//!
//! # Reset every non-sticky peer to its default profile and commit
//! syncview defaults --permissions peers.json --commit
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use syncview_core::{Grouping, OrderKey};
use syncview_types::{MetadataAttribute, PeerUid};

mod commands;
mod local;

use commands::{defaults, view};

/// CLI for exercising the syncview client core.
#[derive(Parser, Debug)]
#[command(name = "syncview")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default permissions, persisted filters, view)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Materialize and print a filtered view of a dataset
    View {
        /// Dataset JSON: version, entries and per-entry metadata
        #[arg(long, short)]
        dataset: PathBuf,

        /// Free-text filter (overrides the persisted one)
        #[arg(long, short)]
        text: Option<String>,

        /// Required metadata attribute (repeatable)
        #[arg(long = "require", short = 'r')]
        required: Vec<MetadataAttribute>,

        /// Only show favorites
        #[arg(long)]
        favorites: bool,

        /// Grouping key
        #[arg(long, value_parser = parse_grouping)]
        group_by: Option<Grouping>,

        /// Ordering inside each group
        #[arg(long, value_parser = parse_order)]
        order: Option<OrderKey>,

        /// Persist the resulting filter toggles to the config file
        #[arg(long)]
        save: bool,
    },

    /// Stage default permission profiles
    Defaults {
        /// Peer permissions JSON: uid, alias, relationship, local and remote flags
        #[arg(long, short)]
        permissions: PathBuf,

        /// Reset only this peer (otherwise every non-sticky peer)
        #[arg(long)]
        peer: Option<PeerUid>,

        /// Commit the staged changes
        #[arg(long)]
        commit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::View {
            dataset,
            text,
            required,
            favorites,
            group_by,
            order,
            save,
        } => {
            let args = view::ViewArgs {
                dataset,
                text,
                required,
                favorites,
                group_by,
                order,
                save,
            };
            view::run(&config_path, args).await?;
        }
        Commands::Defaults {
            permissions,
            peer,
            commit,
        } => {
            defaults::run(&config_path, &permissions, peer.as_ref(), commit).await?;
        }
    }

    Ok(())
}

fn parse_grouping(s: &str) -> Result<Grouping, String> {
    match s {
        "owner" => Ok(Grouping::Owner),
        "code" => Ok(Grouping::Code),
        other => Err(format!("unknown grouping '{other}' (expected owner or code)")),
    }
}

fn parse_order(s: &str) -> Result<OrderKey, String> {
    match s {
        "description" => Ok(OrderKey::Description),
        "code" => Ok(OrderKey::Code),
        "owner_alias" | "owner-alias" => Ok(OrderKey::OwnerAlias),
        other => Err(format!(
            "unknown order '{other}' (expected description, code or owner_alias)"
        )),
    }
}

/// Get the default configuration path for syncview.
fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "syncview", "syncview")
        .context("Could not determine home directory")?;
    Ok(dirs.config_dir().join("syncview.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_view_flags() {
        let cli = Cli::try_parse_from([
            "syncview",
            "view",
            "--dataset",
            "shared.json",
            "--text",
            "ab",
            "--require",
            "pose",
            "-r",
            "world_data",
            "--group-by",
            "code",
            "--order",
            "owner-alias",
        ])
        .unwrap();

        match cli.command {
            Commands::View {
                text,
                required,
                group_by,
                order,
                favorites,
                ..
            } => {
                assert_eq!(text.as_deref(), Some("ab"));
                assert_eq!(
                    required,
                    vec![MetadataAttribute::Pose, MetadataAttribute::WorldData]
                );
                assert_eq!(group_by, Some(Grouping::Code));
                assert_eq!(order, Some(OrderKey::OwnerAlias));
                assert!(!favorites);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_attribute() {
        let result = Cli::try_parse_from([
            "syncview",
            "view",
            "--dataset",
            "shared.json",
            "--require",
            "sparkles",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_defaults_with_global_config() {
        let cli = Cli::try_parse_from([
            "syncview",
            "defaults",
            "--permissions",
            "peers.json",
            "--peer",
            "abc",
            "--commit",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Defaults { peer, commit, .. } => {
                assert_eq!(peer, Some(PeerUid::new("abc")));
                assert!(commit);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
