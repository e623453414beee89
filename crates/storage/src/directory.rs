//! Filesystem directory holding segment and commit files
//!
//! Every file is written once and never modified in place. Writes go
//! through temp + fsync + rename so a concurrent reader either sees the
//! complete file or no file at all.

use shadow_core::{IndexError, IndexResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix of in-flight temp files; never listed
const TEMP_SUFFIX: &str = ".tmp";

/// A directory of index files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open (creating if needed) the directory at `path`
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Directory { path })
    }

    /// Filesystem path of the directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sorted names of all complete files in the directory
    pub fn list_all(&self) -> IndexResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TEMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// True if a file with this name exists
    pub fn exists(&self, name: &str) -> bool {
        self.path.join(name).is_file()
    }

    /// Length of a file in bytes
    pub fn file_length(&self, name: &str) -> IndexResult<u64> {
        Ok(fs::metadata(self.path.join(name))?.len())
    }

    /// Read a whole file
    pub fn read(&self, name: &str) -> IndexResult<Vec<u8>> {
        fs::read(self.path.join(name)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => IndexError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file [{}] not found in {}", name, self.path.display()),
            )),
            _ => IndexError::Io(e),
        })
    }

    /// Write a file atomically (temp + fsync + rename)
    pub fn write_atomic(&self, name: &str, bytes: &[u8]) -> IndexResult<()> {
        let tmp_path = self.path.join(format!("{}{}", name, TEMP_SUFFIX));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.path.join(name))?;
        Ok(())
    }

    /// Delete a file; deleting a missing file is not an error
    pub fn delete(&self, name: &str) -> IndexResult<()> {
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
