//! Assembles a text index from a configuration node.
//!
//! The assembler decides where an index keeps its data: the reserved `"mem"`
//! literal selects a shared in-memory directory looked up through the
//! [`DirectoryCache`], any other location is a filesystem path that is opened
//! fresh on every call and never cached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::caching::DirectoryCache;
use crate::directory::{Directory, FsDirectory};
use crate::index::{IndexCache, IndexError, IndexSettings, TextIndex};
use crate::node::{ConfigError, ConfigNode, Property, PropertyValue};

/// Reserved literal for the `directory` property selecting a shared in-memory
/// directory.
pub const MEM_DIRECTORY: &str = "mem";

/// An error opening a declared index.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open index directory `{}`", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Opens text indexes declared by configuration nodes.
pub struct IndexAssembler {
    directories: Arc<DirectoryCache>,
    indexes: Arc<IndexCache>,
}

impl IndexAssembler {
    pub fn new(directories: Arc<DirectoryCache>, indexes: Arc<IndexCache>) -> Self {
        Self {
            directories,
            indexes,
        }
    }

    /// Opens the index declared by `node`.
    ///
    /// The node must carry exactly one `directory` property. Errors surface to
    /// the caller; no cache entry is ever installed on a failure path.
    pub fn open(&self, node: &ConfigNode) -> Result<Arc<TextIndex>, OpenError> {
        let location = node.exactly_one(Property::Directory)?;
        // Settings are validated before the cache is touched, so a
        // configuration error never installs an entry.
        let settings = IndexSettings::from_node(node)?;

        let directory = match location {
            PropertyValue::Literal(value) if value == MEM_DIRECTORY => {
                // One in-memory directory per node, not one per open call.
                Directory::Memory(self.directories.get_or_open(node))
            }
            PropertyValue::Literal(path) => open_fs(Path::new(path))?,
            PropertyValue::Resource(iri) => open_fs(&file_iri_to_path(iri)?)?,
        };

        // The eviction hook is tied to the index instance, so it is
        // registered at creation time only; a cache hit must not grow the
        // handler list of the shared index.
        let index = match &directory {
            Directory::Memory(memory) => {
                let directories = Arc::clone(&self.directories);
                let node_id = node.id();
                let memory = Arc::clone(memory);
                self.indexes
                    .open_with(directory.clone(), settings, move |index| {
                        index.on_closed(move |_| {
                            // Scoped to this directory instance: a late close
                            // event must not evict a newer directory installed
                            // under the same node.
                            directories.remove_instance(node_id, &memory);
                        });
                    })?
            }
            Directory::Filesystem(_) => self.indexes.open(directory.clone(), settings)?,
        };

        tracing::debug!(
            node = %node.id(),
            directory = index.directory().kind(),
            "opened text index"
        );
        Ok(index)
    }
}

fn open_fs(path: &Path) -> Result<Directory, OpenError> {
    let directory = FsDirectory::open(path).map_err(|source| OpenError::Directory {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Directory::Filesystem(Arc::new(directory)))
}

fn file_iri_to_path(iri: &str) -> Result<PathBuf, ConfigError> {
    let path = iri
        .strip_prefix("file://")
        .or_else(|| iri.strip_prefix("file:"))
        .filter(|path| !path.is_empty())
        .ok_or_else(|| ConfigError::UnresolvableDirectory(iri.to_owned()))?;
    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::MemDirectory;
    use crate::index::{Analyzer, DEFAULT_FIELD, Entry};
    use crate::services::SharedServices;

    fn mem_node() -> ConfigNode {
        ConfigNode::new(vec![(
            Property::Directory,
            PropertyValue::Literal(MEM_DIRECTORY.into()),
        )])
    }

    fn fs_node(path: &Path) -> ConfigNode {
        ConfigNode::new(vec![(
            Property::Directory,
            PropertyValue::Literal(path.to_string_lossy().into_owned()),
        )])
    }

    fn services() -> SharedServices {
        textindex_test::setup();
        SharedServices::new(Config::default())
    }

    fn entry(uri: &str, text: &str) -> Entry {
        Entry {
            uri: uri.to_owned(),
            field: DEFAULT_FIELD.to_owned(),
            text: text.to_owned(),
            lang: None,
        }
    }

    #[test]
    fn test_missing_directory_property() {
        let services = services();
        let node = ConfigNode::new(vec![]);
        assert!(matches!(
            services.assembler.open(&node),
            Err(OpenError::Config(ConfigError::MissingProperty { .. }))
        ));
        assert!(services.directories.is_empty());
    }

    #[test]
    fn test_duplicate_directory_property() {
        let services = services();
        let node = ConfigNode::new(vec![
            (Property::Directory, PropertyValue::Literal("mem".into())),
            (Property::Directory, PropertyValue::Literal("mem".into())),
        ]);
        assert!(matches!(
            services.assembler.open(&node),
            Err(OpenError::Config(ConfigError::DuplicateProperty { .. }))
        ));
        assert!(services.directories.is_empty());
    }

    #[test]
    fn test_malformed_boolean_toggle() {
        let services = services();
        let node = ConfigNode::new(vec![
            (Property::Directory, PropertyValue::Literal("mem".into())),
            (Property::StoreValues, PropertyValue::Literal("yes".into())),
        ]);
        assert!(matches!(
            services.assembler.open(&node),
            Err(OpenError::Config(ConfigError::NotBoolean { .. }))
        ));
    }

    #[test]
    fn test_query_analyzer_property() {
        let services = services();
        let node = ConfigNode::new(vec![
            (Property::Directory, PropertyValue::Literal("mem".into())),
            (Property::Analyzer, PropertyValue::Literal("keyword".into())),
            (
                Property::QueryAnalyzer,
                PropertyValue::Literal("lowercase".into()),
            ),
        ]);
        let index = services.assembler.open(&node).unwrap();
        assert_eq!(index.settings().analyzer, Analyzer::Keyword);
        assert_eq!(index.settings().query_analyzer, Analyzer::Lowercase);
    }

    #[test]
    fn test_non_file_iri_is_rejected() {
        let services = services();
        let node = ConfigNode::new(vec![(
            Property::Directory,
            PropertyValue::Resource("http://example.com/index".into()),
        )]);
        assert!(matches!(
            services.assembler.open(&node),
            Err(OpenError::Config(ConfigError::UnresolvableDirectory(_)))
        ));
    }

    #[test]
    fn test_file_iri_resolves_to_path() {
        let services = services();
        let tmp = textindex_test::tempdir();
        let node = ConfigNode::new(vec![(
            Property::Directory,
            PropertyValue::Resource(format!("file://{}", tmp.path().join("idx").display())),
        )]);
        let index = services.assembler.open(&node).unwrap();
        assert_eq!(index.directory().kind(), "filesystem");
        assert!(services.directories.is_empty());
    }

    #[test]
    fn test_mem_opens_share_one_directory_and_index() {
        let services = services();
        let node = mem_node();
        let first = services.assembler.open(&node).unwrap();
        let second = services.assembler.open(&node).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(services.directories.len(), 1);

        first.add_entry(&entry("urn:a", "shared")).unwrap();
        assert_eq!(second.doc_count().unwrap(), 1);
    }

    #[test]
    fn test_fs_opens_are_never_cached() {
        let services = services();
        let tmp = textindex_test::tempdir();
        let node = fs_node(&tmp.path().join("index"));

        let first = services.assembler.open(&node).unwrap();
        let second = services.assembler.open(&node).unwrap();
        // Two sequential opens with the same path are independent instances.
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(services.directories.is_empty());

        // The backing store itself provides durability across opens.
        first.add_entry(&entry("urn:a", "durable")).unwrap();
        let third = services.assembler.open(&node).unwrap();
        assert_eq!(third.doc_count().unwrap(), 1);
    }

    #[test]
    fn test_close_evicts_the_directory_deterministically() {
        let services = services();
        let node = mem_node();
        let index = services.assembler.open(&node).unwrap();
        index.add_entry(&entry("urn:a", "ephemeral")).unwrap();
        assert_eq!(services.directories.len(), 1);

        index.close();
        // Eviction is synchronous with the close event, not deferred until
        // the instance becomes unreachable.
        assert!(services.directories.is_empty());

        let reopened = services.assembler.open(&node).unwrap();
        assert!(!Arc::ptr_eq(&index, &reopened));
        assert_eq!(reopened.doc_count().unwrap(), 0);
    }

    #[test]
    fn test_late_close_does_not_evict_newer_generation() {
        let services = services();
        let node = mem_node();
        let old_index = services.assembler.open(&node).unwrap();

        // A newer directory takes over the slot while the old index is still
        // open, as happens when a close event races a reopen.
        let new_directory = Arc::new(MemDirectory::new());
        services.directories.put(node.id(), &new_directory);

        old_index.close();
        let current = services.directories.get(&node).unwrap();
        assert!(Arc::ptr_eq(&current, &new_directory));
    }

    #[test]
    fn test_reclaimed_directory_is_reopened_fresh() {
        let services = services();
        let node = mem_node();

        let index = services.assembler.open(&node).unwrap();
        index.add_entry(&entry("urn:a", "first generation")).unwrap();
        drop(index);

        // All strong references are gone, so the next open starts over.
        let reopened = services.assembler.open(&node).unwrap();
        assert_eq!(reopened.doc_count().unwrap(), 0);
        assert_eq!(services.directories.len(), 1);
    }
}
