//! Materialize a filtered view of a dataset.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use syncview_client::{
    ConfigStore, FilterConfig, FilteredViewMaterializer, MetadataMap, TomlConfigStore,
};
use syncview_core::{FilteredSnapshot, Grouping, OrderKey};
use syncview_types::{MetadataAttribute, SharedEntry, Version};
use tokio::runtime::Handle;

use crate::local::LocalApiClient;

/// Command-line overrides for the view command.
#[derive(Debug, Default)]
pub struct ViewArgs {
    /// Dataset file.
    pub dataset: PathBuf,
    /// Replaces the persisted text filter.
    pub text: Option<String>,
    /// Added to the persisted required attributes.
    pub required: Vec<MetadataAttribute>,
    /// Turns on favorites-only.
    pub favorites: bool,
    /// Replaces the persisted grouping.
    pub group_by: Option<Grouping>,
    /// Replaces the persisted ordering.
    pub order: Option<OrderKey>,
    /// Write the merged toggles back to the config file.
    pub save: bool,
}

/// Dataset file layout.
#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default = "first_version")]
    version: Version,
    entries: Vec<SharedEntry>,
    #[serde(default)]
    metadata: MetadataMap,
}

fn first_version() -> Version {
    Version::new(1)
}

/// Run the view command.
pub async fn run(config_path: &Path, args: ViewArgs) -> Result<()> {
    let store = TomlConfigStore::open_or_default(config_path)?;
    let filters = merge_filters(store.filters(), &args);
    let mut view = store.view();
    if let Some(grouping) = args.group_by {
        view.grouping = grouping;
    }
    if args.order.is_some() {
        view.order = args.order;
    }

    let contents = tokio::fs::read_to_string(&args.dataset)
        .await
        .with_context(|| format!("Failed to read dataset {}", args.dataset.display()))?;
    let dataset: Dataset = serde_json::from_str(&contents).context("Invalid dataset")?;
    let version = dataset.version;

    let materializer =
        FilteredViewMaterializer::new(LocalApiClient::new(dataset.metadata), Handle::current());
    materializer.set_source(version, dataset.entries);
    materializer.set_criteria(filters.to_criteria());
    materializer.set_view(view);
    materializer
        .request_recompute(version)
        .await
        .context("Recompute task failed")?;

    print!("{}", render(&materializer.current()));

    if args.save {
        store.set_filters(filters)?;
        println!("Saved filters to {}", store.path().display());
    }

    Ok(())
}

/// Apply command-line overrides on top of the persisted toggles.
fn merge_filters(mut filters: FilterConfig, args: &ViewArgs) -> FilterConfig {
    if let Some(text) = &args.text {
        filters.text = text.clone();
    }
    for attribute in &args.required {
        if !filters.required.contains(attribute) {
            filters.required.push(*attribute);
        }
    }
    filters.favorites_only |= args.favorites;
    filters
}

fn render(snapshot: &FilteredSnapshot) -> String {
    if snapshot.is_empty() {
        return "No matching entries.\n".to_string();
    }

    let mut out = String::new();
    for group in snapshot.groups() {
        out.push_str(&format!("{} ({})\n", group.key, group.entries.len()));
        for entry in &group.entries {
            let star = if entry.favorite { "*" } else { " " };
            out.push_str(&format!(
                "  {} {:<12} {:<16} {}\n",
                star, entry.code, entry.owner_alias, entry.description
            ));
        }
    }
    out.push_str(&format!(
        "{} entries in {} groups (source version {})\n",
        snapshot.entry_count(),
        snapshot.group_count(),
        snapshot.source_version()
    ));
    out
}
