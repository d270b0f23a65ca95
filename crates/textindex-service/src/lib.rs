pub mod assembler;
pub mod caching;
pub mod config;
pub mod directory;
pub mod index;
pub mod logging;
pub mod node;
pub mod services;
