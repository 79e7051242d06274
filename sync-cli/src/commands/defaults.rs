//! Stage default permission profiles and optionally commit them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use syncview_client::{
    CommitOutcome, ConfigStore, InMemoryPeerDirectory, PeerDirectory, PermissionReconciler,
    TomlConfigStore,
};
use syncview_core::{changed_flags, effective_permissions, PeerPermissionState};
use syncview_types::{PeerUid, PermissionFlag, PermissionSet, Relationship};

use crate::local::LocalApiClient;

/// One peer in the permissions file.
#[derive(Debug, Deserialize)]
struct PeerRecord {
    uid: PeerUid,
    #[serde(default)]
    alias: Option<String>,
    relationship: Relationship,
    #[serde(default)]
    local: PermissionSet,
    #[serde(default)]
    remote: PermissionSet,
}

/// Permissions file layout.
#[derive(Debug, Deserialize)]
struct PermissionsFile {
    peers: Vec<PeerRecord>,
}

/// Run the defaults command.
pub async fn run(
    config_path: &Path,
    permissions: &Path,
    peer: Option<&PeerUid>,
    commit: bool,
) -> Result<()> {
    let store = TomlConfigStore::open_or_default(config_path)?;
    let defaults = store.default_permissions();

    let contents = tokio::fs::read_to_string(permissions)
        .await
        .with_context(|| format!("Failed to read permissions {}", permissions.display()))?;
    let file: PermissionsFile =
        serde_json::from_str(&contents).context("Invalid permissions file")?;

    let directory = Arc::new(InMemoryPeerDirectory::new());
    for record in &file.peers {
        let alias = record
            .alias
            .clone()
            .unwrap_or_else(|| record.uid.to_string());
        directory.insert(record.uid.clone(), alias, record.relationship);
    }

    let reconciler = PermissionReconciler::new(LocalApiClient::default(), Arc::clone(&directory));
    reconciler.load_committed(
        file.peers
            .iter()
            .map(|r| (r.uid.clone(), PeerPermissionState::new(r.local, r.remote))),
    );

    match peer {
        Some(uid) => {
            if reconciler.committed_state(uid).is_none() {
                anyhow::bail!("Unknown peer: {}", uid);
            }
            reconciler.reset_to_default_for(uid, &defaults);
        }
        None => {
            let targets = reconciler.stage_bulk_defaults(&defaults);
            println!("Staged defaults for {} peer(s) (sticky peers skipped)", targets.len());
        }
    }

    let pending = reconciler.pending_edits();
    if pending.is_empty() {
        println!("No changes: every targeted peer already matches its defaults.");
        return Ok(());
    }

    for (uid, working) in &pending {
        let state = reconciler.committed_state(uid).unwrap_or_default();
        println!("{} ({}):", directory.display_name(uid), uid);
        for change in changed_flags(working, &state.local) {
            println!("  {:<20} {} -> {}", change.flag.name(), change.from, change.to);
        }
        let effective = effective_permissions(&PeerPermissionState::new(*working, state.remote));
        println!("  effective: {}", describe(&effective));
    }

    if !commit {
        println!();
        println!("Dry run. Pass --commit to apply.");
        return Ok(());
    }

    match reconciler.commit_pending().await? {
        CommitOutcome::NothingToCommit => println!("Nothing to commit."),
        CommitOutcome::Committed { peers } => println!("Committed {} peer(s).", peers.len()),
    }

    Ok(())
}

/// Comma-separated names of the set flags, or "none".
fn describe(set: &PermissionSet) -> String {
    let names: Vec<&str> = PermissionFlag::ALL
        .into_iter()
        .filter(|&flag| set.get(flag))
        .map(|flag| flag.name())
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
