//! # Shared directory caching
//!
//! Opening the same declared index twice must yield the same in-memory
//! directory, otherwise two backends silently diverge. At the same time the
//! cache must never be the reason a directory stays alive: once every index
//! built on top of it is gone, the directory has to be reclaimable.
//!
//! This module provides both halves of that contract:
//!
//! - [`WeakValueCache`] is a generic map from a key to a weakly held value.
//!   Entries do not keep their value alive; an entry whose value has already
//!   been dropped behaves as absent and is swept out on the next access to
//!   that key.
//! - [`DirectoryCache`] specializes it for in-memory index directories, keyed
//!   by the *identity* of the configuration node that declared the index.
//!   Identity keying is deliberate: two nodes with textually equal properties
//!   denote two different indexes and must not share a directory.
//!
//! On top of lazy staleness detection, entries are evicted eagerly when an
//! index signals that it has been closed. That eviction is scoped to the
//! directory instance the index was built over, so a close event for a
//! superseded instance can never purge a newer, still-live entry under the
//! same key.

mod directory;
mod weak;

pub use directory::DirectoryCache;
pub use weak::WeakValueCache;
