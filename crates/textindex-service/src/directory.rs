//! Index directories: the backing storage an index is built over.
//!
//! A directory is a flat namespace of named byte files. The in-memory flavor is
//! the expensive shared resource managed by [`DirectoryCache`]; the filesystem
//! flavor is opened fresh on every request and never cached, since the
//! filesystem itself provides durability and safe concurrent opens.
//!
//! Every opened directory carries a [`DirectoryId`] identifying that particular
//! instance. Two opens of the same filesystem path yield two ids; the id is
//! what the index registry keys on.
//!
//! [`DirectoryCache`]: crate::caching::DirectoryCache

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

static NEXT_DIRECTORY_ID: AtomicU64 = AtomicU64::new(0);

/// The identity of one opened directory instance. Never reused in a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirectoryId(u64);

impl DirectoryId {
    fn next() -> Self {
        DirectoryId(NEXT_DIRECTORY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

/// An in-memory directory.
///
/// Constructed only by the open path; ownership is shared between the indexes
/// built on top of it, while the cache observes it weakly.
#[derive(Debug)]
pub struct MemDirectory {
    id: DirectoryId,
    files: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl Default for MemDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDirectory {
    pub fn new() -> Self {
        Self {
            id: DirectoryId::next(),
            files: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn id(&self) -> DirectoryId {
        self.id
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) {
        self.files
            .write()
            .unwrap()
            .insert(name.to_owned(), contents.to_vec());
    }

    pub fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A filesystem-backed directory rooted at a path.
#[derive(Debug)]
pub struct FsDirectory {
    id: DirectoryId,
    root: PathBuf,
}

impl FsDirectory {
    /// Opens the directory, creating the path if it does not exist yet.
    pub fn open(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            id: DirectoryId::next(),
            root: root.to_path_buf(),
        })
    }

    pub fn id(&self) -> DirectoryId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        std::fs::write(self.root.join(name), contents)
    }

    pub fn read_file(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.root.join(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn file_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// A cheaply cloneable handle to either directory flavor.
#[derive(Clone, Debug)]
pub enum Directory {
    Memory(Arc<MemDirectory>),
    Filesystem(Arc<FsDirectory>),
}

impl Directory {
    pub fn id(&self) -> DirectoryId {
        match self {
            Directory::Memory(directory) => directory.id(),
            Directory::Filesystem(directory) => directory.id(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Directory::Memory(_) => "memory",
            Directory::Filesystem(_) => "filesystem",
        }
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        match self {
            Directory::Memory(directory) => {
                directory.write_file(name, contents);
                Ok(())
            }
            Directory::Filesystem(directory) => directory.write_file(name, contents),
        }
    }

    pub fn read_file(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match self {
            Directory::Memory(directory) => Ok(directory.read_file(name)),
            Directory::Filesystem(directory) => directory.read_file(name),
        }
    }

    pub fn file_names(&self) -> io::Result<Vec<String>> {
        match self {
            Directory::Memory(directory) => Ok(directory.file_names()),
            Directory::Filesystem(directory) => directory.file_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_directory_read_write() {
        let directory = MemDirectory::new();
        assert!(directory.is_empty());
        directory.write_file("a.txt", b"hello");
        assert_eq!(directory.read_file("a.txt").unwrap(), b"hello");
        assert_eq!(directory.read_file("b.txt"), None);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_fs_directory_read_write() {
        let tmp = textindex_test::tempdir();
        let directory = FsDirectory::open(&tmp.path().join("index")).unwrap();
        directory.write_file("a.txt", b"hello").unwrap();
        assert_eq!(directory.read_file("a.txt").unwrap().unwrap(), b"hello");
        assert_eq!(directory.read_file("b.txt").unwrap(), None);
        assert_eq!(directory.file_names().unwrap(), vec!["a.txt".to_owned()]);
    }

    #[test]
    fn test_instance_ids_are_unique_per_open() {
        let tmp = textindex_test::tempdir();
        let first = FsDirectory::open(tmp.path()).unwrap();
        let second = FsDirectory::open(tmp.path()).unwrap();
        assert_ne!(first.id(), second.id());
    }
}
