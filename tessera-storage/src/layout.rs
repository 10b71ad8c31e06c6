//! Key layout for record types.
//!
//! Each record lives at `<root>/<folder>/<lowercased-id>/<metadata-filename>`
//! and the staleness marker at `<root>/<folder>/last-modified.json`.

use tessera_core::{RecordType, MARKER_FILENAME};

/// Maps record ids to store keys for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    record_type: RecordType,
    prefix: String,
}

impl KeyLayout {
    pub fn new(record_type: RecordType, root_folder: Option<&str>) -> Self {
        let root = root_folder
            .map(|r| r.trim_matches('/'))
            .filter(|r| !r.is_empty());
        let folder = record_type.folder.trim_matches('/');
        let prefix = match root {
            Some(root) => format!("{root}/{folder}/"),
            None => format!("{folder}/"),
        };
        Self {
            record_type,
            prefix,
        }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Listing prefix for every key owned by this type, with trailing slash.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Cache identity of a record id.
    pub fn normalize_id(id: &str) -> String {
        id.to_lowercase()
    }

    pub fn record_key(&self, id: &str) -> String {
        format!(
            "{}{}/{}",
            self.prefix,
            Self::normalize_id(id),
            self.record_type.metadata_filename
        )
    }

    pub fn marker_key(&self) -> String {
        format!("{}{}", self.prefix, MARKER_FILENAME)
    }

    /// Recover the record id from a listed key.
    ///
    /// Returns `None` for incidental files that do not follow the
    /// metadata-file convention, including the marker itself.
    pub fn id_from_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&self.prefix)?;
        let id = rest
            .strip_suffix(&self.record_type.metadata_filename)?
            .strip_suffix('/')?;
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_lowercases_id() {
        let layout = KeyLayout::new(RecordType::pipelines(), None);
        assert_eq!(
            layout.record_key("Deploy-Prod"),
            "pipelines/deploy-prod/pipeline-metadata.json"
        );
        assert_eq!(layout.marker_key(), "pipelines/last-modified.json");
    }

    #[test]
    fn test_root_folder_is_prepended() {
        let layout = KeyLayout::new(RecordType::applications(), Some("/front50/"));
        assert_eq!(layout.prefix(), "front50/applications/");
        assert_eq!(
            layout.record_key("web"),
            "front50/applications/web/application-metadata.json"
        );
    }

    #[test]
    fn test_id_from_key() {
        let layout = KeyLayout::new(RecordType::pipelines(), Some("root"));
        assert_eq!(
            layout.id_from_key("root/pipelines/abc/pipeline-metadata.json"),
            Some("abc".to_string())
        );
        assert_eq!(layout.id_from_key("root/pipelines/last-modified.json"), None);
        assert_eq!(layout.id_from_key("root/pipelines/abc/notes.txt"), None);
        assert_eq!(layout.id_from_key("root/pipelines/pipeline-metadata.json"), None);
        assert_eq!(
            layout.id_from_key("root/applications/abc/pipeline-metadata.json"),
            None
        );
    }
}
