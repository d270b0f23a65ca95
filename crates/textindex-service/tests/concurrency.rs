//! Concurrent open/close behavior of the shared directory cache.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use textindex_service::config::Config;
use textindex_service::directory::DirectoryId;
use textindex_service::index::{DEFAULT_FIELD, Entry};
use textindex_service::node::{ConfigNode, Property, PropertyValue};
use textindex_service::services::SharedServices;

fn mem_node() -> ConfigNode {
    ConfigNode::new(vec![(
        Property::Directory,
        PropertyValue::Literal("mem".into()),
    )])
}

fn entry(uri: String, text: String) -> Entry {
    Entry {
        uri,
        field: DEFAULT_FIELD.to_owned(),
        text,
        lang: None,
    }
}

/// 8 workers repeatedly open the same declared index, use it, and drop their
/// handle again. Dropped handles make the directory reclaimable at arbitrary
/// points between opens; every open must still hand out a usable index.
#[test]
fn test_concurrent_opens_of_one_node() {
    textindex_test::setup();
    let services = SharedServices::new(Config::default());
    let node = mem_node();

    thread::scope(|s| {
        for worker in 0..8 {
            let services = &services;
            let node = &node;
            s.spawn(move || {
                for i in 0..1000 {
                    let index = services.assembler.open(node).unwrap();
                    assert!(!index.is_closed());

                    let uri = format!("urn:worker{worker}:doc{i}");
                    index.add_entry(&entry(uri, format!("term{i}"))).unwrap();
                    assert!(index.doc_count().unwrap() > 0);
                    // The handle drops here; once no worker holds one, the
                    // directory is reclaimed and the next open starts fresh.
                }
            });
        }
    });

    // The cache must not keep the last directory alive on its own.
    assert!(services.directories.get(&node).is_none());
    assert!(services.directories.is_empty());
}

/// Opens that overlap in time must converge on a single directory instance.
#[test]
fn test_overlapping_opens_converge() {
    textindex_test::setup();
    let services = SharedServices::new(Config::default());
    let node = mem_node();
    let barrier = Barrier::new(8);
    let seen = Mutex::new(Vec::<DirectoryId>::new());

    thread::scope(|s| {
        for _ in 0..8 {
            let services = &services;
            let node = &node;
            let barrier = &barrier;
            let seen = &seen;
            s.spawn(move || {
                let index = services.assembler.open(node).unwrap();
                // Hold the handle until everyone has opened, so all open
                // intervals overlap.
                barrier.wait();
                seen.lock().unwrap().push(index.directory().id());
            });
        }
    });

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 8);
    assert!(seen.iter().all(|id| *id == seen[0]));
}

/// A close on one handle is a close of the shared index; late duplicate close
/// signals must neither fail nor evict a newer generation.
#[test]
fn test_close_then_reopen_generations() {
    textindex_test::setup();
    let services = SharedServices::new(Config::default());
    let node = mem_node();

    let first = services.assembler.open(&node).unwrap();
    let first_id = first.directory().id();
    first.close();
    assert!(services.directories.is_empty());

    let second = services.assembler.open(&node).unwrap();
    assert_ne!(second.directory().id(), first_id);

    // Duplicated close signal for the superseded instance.
    first.close();
    let current = services.directories.get(&node).unwrap();
    assert_eq!(current.id(), second.directory().id());
}
