//! In-memory multi-file archive model.
//!
//! An [`Archive`] is the unit of exchange between ingestion, validation and
//! the build sandbox. It keeps files in insertion order and guarantees that
//! names are unique and pass the [permission filter](permission::is_permitted_file).

pub mod permission;
pub mod txtar;

use std::borrow::Cow;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PlaygroundError, Result};

pub use permission::is_permitted_file;

/// Content given to a new `.go` file created by the editor.
const NEW_GO_FILE: &[u8] = b"package main\n";

/// One source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Forward-slash relative path.
    pub name: String,
    /// Raw content.
    pub data: Vec<u8>,
}

impl File {
    /// Content as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Final path segment of the name.
    pub fn base_name(&self) -> &str {
        permission::base_name(&self.name)
    }

    /// Lowercased extension of the final path segment.
    pub fn extension(&self) -> Option<String> {
        permission::extension(self.base_name()).map(str::to_ascii_lowercase)
    }
}

/// An ordered, uniquely-named collection of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    files: Vec<File>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an archive from `(name, data)` pairs, validating each name.
    pub fn from_files<N, D, I>(files: I) -> Result<Self>
    where
        N: Into<String>,
        D: Into<Vec<u8>>,
        I: IntoIterator<Item = (N, D)>,
    {
        let mut archive = Self::new();
        for (name, data) in files {
            archive.add_file(name, data)?;
        }
        Ok(archive)
    }

    /// Files in insertion order.
    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut [File] {
        &mut self.files
    }

    /// Iterate over files in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, File> {
        self.files.iter()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check whether the archive holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file by name.
    pub fn get(&self, name: &str) -> Option<&File> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Check whether a file with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a file.
    ///
    /// Fails if the name does not pass the permission filter, is already
    /// taken, or would need an existing file to be a directory (or the reverse).
    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<()> {
        let name = name.into();
        if !is_permitted_file(&name) {
            return Err(PlaygroundError::FileNotPermitted(name));
        }
        if self.contains(&name) {
            return Err(PlaygroundError::DuplicateFile(name));
        }
        if let Some(existing) = self.files.iter().find(|f| is_path_prefix(&f.name, &name)) {
            return Err(PlaygroundError::PathConflict {
                name,
                existing: existing.name.clone(),
            });
        }
        self.files.push(File {
            name,
            data: data.into(),
        });
        Ok(())
    }

    /// Editor "new file" operation: append an empty file, or a
    /// `package main` stub for Go sources.
    pub fn new_file(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let data = if name.to_ascii_lowercase().ends_with(".go") {
            NEW_GO_FILE.to_vec()
        } else {
            Vec::new()
        };
        self.add_file(name, data)
    }

    /// Editor "delete file" operation. Returns whether a file was removed.
    pub fn delete_file(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.files.len() != before
    }

    /// Decode a txtar document, validating every member name.
    pub fn parse_txtar(data: &[u8]) -> Result<Self> {
        let decoded = txtar::parse(data);
        Self::from_files(decoded.files)
    }

    /// Encode the archive as txtar.
    pub fn to_txtar(&self) -> Vec<u8> {
        txtar::format(
            b"",
            self.files.iter().map(|f| (f.name.as_str(), f.data.as_slice())),
        )
    }

    /// Replace every `.txt`/`.txtar` member that is itself a txtar document
    /// by the files it contains.
    ///
    /// Expansion goes one level deep: members of a nested archive are not
    /// expanded again. Expanded names pass through the permission filter and
    /// must not collide with existing names.
    pub fn expand_nested_archives(&mut self) -> Result<()> {
        let mut expanded = Archive::new();
        for file in &self.files {
            let is_txtar = matches!(file.extension().as_deref(), Some("txt" | "txtar"));
            if is_txtar && txtar::has_file_markers(&file.data) {
                tracing::debug!(file = %file.name, "expanding nested archive");
                for (name, data) in txtar::parse(&file.data).files {
                    expanded.add_file(name, data)?;
                }
            } else {
                expanded.add_file(file.name.clone(), file.data.clone())?;
            }
        }
        *self = expanded;
        Ok(())
    }

    /// Package the archive as a zip file.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in &self.files {
            writer
                .start_file(file.name.as_str(), options)
                .map_err(std::io::Error::from)?;
            writer.write_all(&file.data)?;
        }
        let cursor = writer.finish().map_err(std::io::Error::from)?;
        Ok(cursor.into_inner())
    }
}

/// Check whether one name is a directory prefix of the other.
fn is_path_prefix(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    long.strip_prefix(short).is_some_and(|rest| rest.starts_with('/'))
}

impl<'a> IntoIterator for &'a Archive {
    type Item = &'a File;
    type IntoIter = std::slice::Iter<'a, File>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
