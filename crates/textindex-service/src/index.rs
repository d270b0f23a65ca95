//! Text indexes built over a [`Directory`], and the registry that shares them.
//!
//! Tokenization and scoring are not this crate's business; the index stores
//! entries as JSON documents inside its directory and answers exact-term
//! lookups after a per-analyzer normalization. What matters here is the
//! lifecycle: an index emits a one-shot "closed" event that the caches hook
//! into for deterministic eviction.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caching::WeakValueCache;
use crate::directory::{Directory, DirectoryId};
use crate::node::{ConfigError, ConfigNode, Property, PropertyValue};

/// The field queries run against when the configuration does not name one.
pub const DEFAULT_FIELD: &str = "label";

/// Term normalization applied to stored text and queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Analyzer {
    /// Whitespace tokenization, punctuation stripping, lowercasing.
    #[default]
    Standard,
    /// The whole string, lowercased.
    Lowercase,
    /// The whole string, verbatim.
    Keyword,
}

impl FromStr for Analyzer {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Analyzer::Standard),
            "lowercase" => Ok(Analyzer::Lowercase),
            "keyword" => Ok(Analyzer::Keyword),
            other => Err(ConfigError::UnknownAnalyzer(other.to_owned())),
        }
    }
}

impl Analyzer {
    fn normalize(&self, text: &str) -> Vec<String> {
        match self {
            Analyzer::Keyword => vec![text.to_owned()],
            Analyzer::Lowercase => vec![text.to_lowercase()],
            Analyzer::Standard => text
                .split_whitespace()
                .map(|token| {
                    token
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase()
                })
                .filter(|token| !token.is_empty())
                .collect(),
        }
    }
}

/// Feature toggles consumed by the index, parsed off a configuration node.
#[derive(Clone, Debug)]
pub struct IndexSettings {
    pub analyzer: Analyzer,
    /// Normalization applied to queries. Defaults to the index analyzer.
    pub query_analyzer: Analyzer,
    pub default_field: String,
    pub multilingual: bool,
    pub store_values: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            analyzer: Analyzer::default(),
            query_analyzer: Analyzer::default(),
            default_field: DEFAULT_FIELD.to_owned(),
            multilingual: false,
            store_values: false,
        }
    }
}

impl IndexSettings {
    pub fn from_node(node: &ConfigNode) -> Result<Self, ConfigError> {
        let analyzer = match node.property(Property::Analyzer) {
            None => Analyzer::default(),
            Some(PropertyValue::Literal(name)) => name.parse()?,
            Some(PropertyValue::Resource(iri)) => {
                return Err(ConfigError::NotLiteral {
                    property: Property::Analyzer,
                    value: iri.clone(),
                });
            }
        };
        let query_analyzer = match node.property(Property::QueryAnalyzer) {
            None => analyzer,
            Some(PropertyValue::Literal(name)) => name.parse()?,
            Some(PropertyValue::Resource(iri)) => {
                return Err(ConfigError::NotLiteral {
                    property: Property::QueryAnalyzer,
                    value: iri.clone(),
                });
            }
        };
        let default_field = match node.property(Property::EntityMap) {
            None => DEFAULT_FIELD.to_owned(),
            Some(PropertyValue::Literal(field)) => field.clone(),
            Some(PropertyValue::Resource(iri)) => {
                return Err(ConfigError::NotLiteral {
                    property: Property::EntityMap,
                    value: iri.clone(),
                });
            }
        };
        Ok(Self {
            analyzer,
            query_analyzer,
            default_field,
            multilingual: node.boolean(Property::MultilingualSupport)?.unwrap_or(false),
            store_values: node.boolean(Property::StoreValues)?.unwrap_or(false),
        })
    }
}

/// One indexed statement: a subject, the field it was indexed under, and the
/// literal text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub uri: String,
    pub field: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// A lookup result. `text` is populated only when the index stores values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hit {
    pub uri: String,
    pub text: Option<String>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed index entry `{name}`")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

type ClosedHandler = Box<dyn FnOnce(&TextIndex) + Send>;

/// A queryable text index over a [`Directory`].
///
/// The index emits a one-shot "closed" event. Handlers registered through
/// [`on_closed`](Self::on_closed) run exactly once, on the first
/// [`close`](Self::close) call; a second close is a no-op.
pub struct TextIndex {
    directory: Directory,
    settings: IndexSettings,
    next_doc: AtomicU64,
    closed: AtomicBool,
    closed_handlers: Mutex<Vec<ClosedHandler>>,
}

impl fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextIndex")
            .field("directory", &self.directory)
            .field("settings", &self.settings)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TextIndex {
    pub fn new(directory: Directory, settings: IndexSettings) -> Result<Self, IndexError> {
        // Resume numbering after the highest surviving document when
        // reopening a filesystem directory; gaps left by external deletion
        // must not make fresh documents collide with existing ones.
        let next_doc = directory
            .file_names()?
            .iter()
            .filter_map(|name| {
                name.strip_prefix("doc-")?
                    .strip_suffix(".json")?
                    .parse::<u64>()
                    .ok()
            })
            .max()
            .map_or(0, |seq| seq + 1);
        Ok(Self {
            directory,
            settings,
            next_doc: AtomicU64::new(next_doc),
            closed: AtomicBool::new(false),
            closed_handlers: Mutex::new(Vec::new()),
        })
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn add_entry(&self, entry: &Entry) -> Result<(), IndexError> {
        if self.is_closed() {
            return Err(IndexError::Closed);
        }
        let mut stored = entry.clone();
        if !self.settings.multilingual {
            // Language tags are only kept with multilingual support enabled.
            stored.lang = None;
        }
        let seq = self.next_doc.fetch_add(1, Ordering::Relaxed);
        let name = format!("doc-{seq:08}.json");
        let contents = serde_json::to_vec(&stored).map_err(|source| IndexError::Malformed {
            name: name.clone(),
            source,
        })?;
        self.directory.write_file(&name, &contents)?;
        Ok(())
    }

    pub fn doc_count(&self) -> Result<usize, IndexError> {
        Ok(self.entries()?.len())
    }

    /// Returns all entries in `field` matching every normalized query term.
    pub fn lookup(&self, field: &str, query: &str) -> Result<Vec<Hit>, IndexError> {
        if self.is_closed() {
            return Err(IndexError::Closed);
        }
        let terms = self.settings.query_analyzer.normalize(query);
        let mut hits = Vec::new();
        for entry in self.entries()? {
            if entry.field != field {
                continue;
            }
            let tokens = self.settings.analyzer.normalize(&entry.text);
            if terms.iter().all(|term| tokens.contains(term)) {
                hits.push(Hit {
                    uri: entry.uri,
                    text: self.settings.store_values.then_some(entry.text),
                });
            }
        }
        Ok(hits)
    }

    fn entries(&self) -> Result<Vec<Entry>, IndexError> {
        let mut names = self.directory.file_names()?;
        names.retain(|name| name.starts_with("doc-") && name.ends_with(".json"));
        names.sort();
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            // A file may disappear between listing and reading on the
            // filesystem flavor.
            let Some(contents) = self.directory.read_file(&name)? else {
                continue;
            };
            let entry = serde_json::from_slice(&contents)
                .map_err(|source| IndexError::Malformed { name, source })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Subscribes a one-shot handler to the "closed" event.
    ///
    /// If the event already fired, the handler runs immediately; it is never
    /// silently lost.
    pub fn on_closed(&self, handler: impl FnOnce(&TextIndex) + Send + 'static) {
        let mut handlers = self.closed_handlers.lock().unwrap();
        if self.is_closed() {
            drop(handlers);
            handler(self);
            return;
        }
        handlers.push(Box::new(handler));
    }

    /// Closes the index and fires the "closed" event.
    ///
    /// Only the first call has any effect; handlers run exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(directory = %self.directory.id(), "closing text index");
        let handlers = std::mem::take(&mut *self.closed_handlers.lock().unwrap());
        for handler in handlers {
            handler(self);
        }
    }
}

/// The process-wide registry of open indexes, keyed by directory instance.
///
/// Two opens over the same directory instance must share one index object,
/// otherwise their views of the data diverge. Like the directory cache, the
/// registry observes its values weakly and additionally evicts eagerly when
/// the index closes.
pub struct IndexCache {
    entries: WeakValueCache<DirectoryId, TextIndex>,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self {
            entries: WeakValueCache::new(),
        }
    }
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared index over `directory`, creating it on miss.
    pub fn open(
        self: &Arc<Self>,
        directory: Directory,
        settings: IndexSettings,
    ) -> Result<Arc<TextIndex>, IndexError> {
        self.open_with(directory, settings, |_| {})
    }

    /// Like [`open`](Self::open), additionally invoking `on_create` when this
    /// call actually creates the index.
    ///
    /// Per-instance setup such as eviction hooks goes through here, so it
    /// runs once per index object rather than once per open call.
    pub fn open_with(
        self: &Arc<Self>,
        directory: Directory,
        settings: IndexSettings,
        on_create: impl FnOnce(&Arc<TextIndex>),
    ) -> Result<Arc<TextIndex>, IndexError> {
        let id = directory.id();
        let cache = Arc::clone(self);
        // An index that was closed but not yet evicted must never be handed
        // out; it counts as a miss and its entry is replaced.
        self.entries.get_or_try_insert_where(
            id,
            |index| !index.is_closed(),
            move || {
                let index = Arc::new(TextIndex::new(directory, settings)?);
                index.on_closed(move |index| {
                    cache.entries.remove_if(&id, index);
                });
                on_create(&index);
                Ok(index)
            },
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
