//! Record contract and record type conventions.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Filename of the per-type staleness marker.
pub const MARKER_FILENAME: &str = "last-modified.json";

/// A persisted record the cache engine can manage.
///
/// The payload is opaque to the engine beyond its id and last-modified
/// instant. Implementations must be `Clone`, `Serialize` and
/// `DeserializeOwned` so the codec can move them to and from bytes.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique identifier within the record type.
    fn id(&self) -> &str;

    /// Last modification instant; `None` before the first write.
    fn last_modified(&self) -> Option<Timestamp>;

    /// Stamp the record with the remote store's modification instant.
    fn set_last_modified(&mut self, at: Timestamp);
}

/// Storage conventions for one logical namespace of records.
///
/// A record type is a configuration value: the folder its records live
/// under and the filename that marks a blob as a record rather than an
/// incidental file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType {
    /// Logical name, used in logs and errors.
    pub name: String,
    /// Folder (key prefix) owned by this type.
    pub folder: String,
    /// Filename of each record's blob inside its id folder.
    pub metadata_filename: String,
}

impl RecordType {
    pub fn new(
        name: impl Into<String>,
        folder: impl Into<String>,
        metadata_filename: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            metadata_filename: metadata_filename.into(),
        }
    }

    pub fn applications() -> Self {
        Self::new("application", "applications", "application-metadata.json")
    }

    pub fn application_permissions() -> Self {
        Self::new("application_permission", "permissions", "permission.json")
    }

    pub fn service_accounts() -> Self {
        Self::new("service_account", "serviceAccounts", "serviceAccount-metadata.json")
    }

    pub fn projects() -> Self {
        Self::new("project", "projects", "project-metadata.json")
    }

    pub fn notifications() -> Self {
        Self::new("notification", "notifications", "notification-metadata.json")
    }

    pub fn pipeline_strategies() -> Self {
        Self::new(
            "pipeline_strategy",
            "pipeline-strategies",
            "pipeline-strategy-metadata.json",
        )
    }

    pub fn pipelines() -> Self {
        Self::new("pipeline", "pipelines", "pipeline-metadata.json")
    }

    pub fn pipeline_templates() -> Self {
        Self::new(
            "pipeline_template",
            "pipeline-templates",
            "pipeline-template-metadata.json",
        )
    }

    pub fn snapshots() -> Self {
        Self::new("snapshot", "snapshots", "snapshot.json")
    }

    pub fn delivery_configs() -> Self {
        Self::new("delivery_config", "delivery", "delivery-metadata.json")
    }

    pub fn plugin_info() -> Self {
        Self::new("plugin_info", "pluginInfo", "plugin-metadata.json")
    }

    pub fn entity_tags() -> Self {
        Self::new("entity_tags", "tags", "entity-tags-metadata.json")
    }

    /// All well-known record types.
    pub fn well_known() -> Vec<Self> {
        vec![
            Self::applications(),
            Self::application_permissions(),
            Self::service_accounts(),
            Self::projects(),
            Self::notifications(),
            Self::pipeline_strategies(),
            Self::pipelines(),
            Self::pipeline_templates(),
            Self::snapshots(),
            Self::delivery_configs(),
            Self::plugin_info(),
            Self::entity_tags(),
        ]
    }

    /// Look up a well-known record type by its logical name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::well_known().into_iter().find(|t| t.name == name)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
