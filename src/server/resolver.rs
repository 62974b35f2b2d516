//! Maps request paths to files under the document root.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use memmap2::Mmap;

use crate::parser::Error as ParserError;
use crate::server::error::Error;

/// Longest resolved file name accepted, document root included.
pub const FILENAME_LEN: usize = 200;

/// Permission bit for read access by others.
const WORLD_READABLE: u32 = 0o004;

/// Single-character page aliases: `/0` serves the register page and so on.
#[derive(Debug, Clone)]
pub struct ShortcutTable {
    entries: HashMap<char, String>,
}

impl Default for ShortcutTable {
    fn default() -> Self {
        let entries = [
            ('0', "/register.html"),
            ('1', "/log.html"),
            ('5', "/picture.html"),
            ('6', "/video.html"),
            ('7', "/fans.html"),
        ];
        Self {
            entries: entries.into_iter().map(|(c, p)| (c, p.to_string())).collect(),
        }
    }
}

impl ShortcutTable {
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn insert(&mut self, key: char, page: impl Into<String>) {
        self.entries.insert(key, page.into());
    }

    /// The aliased page when the last path segment is a single known character.
    ///
    /// Only a segment of exactly one character matches, not a segment that
    /// merely starts with a known character: `/0abc` is served literally
    /// rather than as the register page.
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let segment = path.rsplit('/').next()?;
        let mut chars = segment.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => self.entries.get(&key).map(String::as_str),
            _ => None,
        }
    }
}

/// A read-only private mapping of a whole file.
///
/// Empty files are not mapped. Dropping the value releases the mapping.
#[derive(Debug)]
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    fn open(path: &Path, len: u64) -> io::Result<Self> {
        if len == 0 {
            return Ok(Self { map: None });
        }
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and private; files under the
        // document root are not truncated while being served.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A file that passed every check, ready to be sent.
#[derive(Debug)]
pub struct FileResource {
    pub path: PathBuf,
    pub map: MappedFile,
}

/// Resolves request paths against a document root.
#[derive(Debug, Clone)]
pub struct Resolver {
    doc_root: PathBuf,
    shortcuts: ShortcutTable,
}

impl Resolver {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self::with_shortcuts(doc_root, ShortcutTable::default())
    }

    pub fn with_shortcuts(doc_root: impl Into<PathBuf>, shortcuts: ShortcutTable) -> Self {
        Self {
            doc_root: doc_root.into(),
            shortcuts,
        }
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Builds the on-disk path for a request path.
    pub fn real_path(&self, url: &str) -> Result<PathBuf, Error> {
        let url = self.shortcuts.lookup(url).unwrap_or(url);
        if url.split('/').any(|segment| segment == "..") {
            return Err(ParserError::InvalidPath.into());
        }

        let mut real = self.doc_root.clone().into_os_string();
        real.push(url);
        if real.len() >= FILENAME_LEN {
            return Err(ParserError::InvalidPath.into());
        }
        Ok(PathBuf::from(real))
    }

    /// Checks the target file and maps it into memory.
    pub fn resolve(&self, url: &str) -> Result<FileResource, Error> {
        let path = self.real_path(url)?;

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                debug!("stat {} failed: {e}", path.display());
                return Err(Error::NotFound(path));
            }
        };
        if meta.is_dir() {
            return Err(Error::IsDirectory(path));
        }
        if meta.permissions().mode() & WORLD_READABLE == 0 {
            return Err(Error::Forbidden(path));
        }

        let map = MappedFile::open(&path, meta.len()).map_err(|e| {
            warn!("failed to map {}: {e}", path.display());
            Error::InternalError(format!("mapping {} failed: {e}", path.display()))
        })?;
        Ok(FileResource { path, map })
    }
}
