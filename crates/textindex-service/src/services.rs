//! Provides the internal shared services and a way to initialize them.
//!
//! One [`SharedServices`] instance is constructed at process start and lives
//! until process exit. It owns the process-wide caches and hands them to the
//! assembler by shared ownership; nothing here goes through ambient global
//! state, so tests construct their own instance in isolation.

use std::sync::Arc;

use crate::assembler::IndexAssembler;
use crate::caching::DirectoryCache;
use crate::config::Config;
use crate::index::IndexCache;

pub struct SharedServices {
    pub config: Config,
    pub directories: Arc<DirectoryCache>,
    pub indexes: Arc<IndexCache>,
    pub assembler: IndexAssembler,
}

impl SharedServices {
    pub fn new(config: Config) -> Self {
        let directories = Arc::new(DirectoryCache::new());
        let indexes = Arc::new(IndexCache::new());
        let assembler = IndexAssembler::new(Arc::clone(&directories), Arc::clone(&indexes));

        Self {
            config,
            directories,
            indexes,
            assembler,
        }
    }
}
