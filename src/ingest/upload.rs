//! Zip upload adapter.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::archive::permission::normalize_path;
use crate::archive::{is_permitted_file, Archive};
use crate::error::{PlaygroundError, Result};

/// Build an archive from an uploaded zip file.
///
/// Directories are skipped. Entries are cleaned of `.`, `..` and duplicate
/// separators; entries that escape the root or fail the permission filter are
/// dropped without error. Files are taken in lexical path order and the
/// first of several entries cleaning to the same path wins. The total
/// uncompressed size may not exceed `max_uncompressed` bytes.
pub fn archive_from_zip(data: &[u8], max_uncompressed: u64) -> Result<Archive> {
    let mut zip = ZipArchive::new(Cursor::new(data)).map_err(malformed)?;

    let mut entries = Vec::new();
    for index in 0..zip.len() {
        let entry = zip.by_index(index).map_err(malformed)?;
        if entry.is_dir() {
            continue;
        }
        match normalize_path(entry.name()) {
            Some(name) if is_permitted_file(&name) => entries.push((name, index)),
            _ => tracing::debug!(entry = entry.name(), "dropping zip entry"),
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut archive = Archive::new();
    let mut remaining = max_uncompressed;
    for (name, index) in entries {
        if archive.contains(&name) {
            tracing::debug!(entry = %name, "dropping duplicate zip entry");
            continue;
        }
        let entry = zip.by_index(index).map_err(malformed)?;
        let mut data = Vec::new();
        entry
            .take(remaining.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| PlaygroundError::MalformedArchive(format!("{name}: {e}")))?;
        let size = data.len() as u64;
        if size > remaining {
            return Err(PlaygroundError::MalformedArchive(format!(
                "uncompressed size exceeds {max_uncompressed} bytes"
            )));
        }
        remaining -= size;
        archive.add_file(name, data)?;
    }
    tracing::debug!(files = archive.len(), "zip upload decoded");
    Ok(archive)
}

fn malformed(e: zip::result::ZipError) -> PlaygroundError {
    PlaygroundError::MalformedArchive(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_filters_and_normalizes_entries() {
        let data = zip_of(&[
            ("project/", ""),
            ("project/main.go", "package main\n"),
            ("./go.mod", "module m\n"),
            ("project/.env", "SECRET=1"),
            ("run.sh", "#!/bin/sh"),
            ("../escape.go", "package main\n"),
            ("a//b/./c.md", "# c\n"),
        ]);
        let archive = archive_from_zip(&data, 1024).unwrap();
        let names: Vec<_> = archive.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a/b/c.md", "go.mod", "project/main.go"]);
    }

    #[test]
    fn test_duplicate_paths_keep_first() {
        let data = zip_of(&[("main.go", "package main\n"), ("./main.go", "package other\n")]);
        let archive = archive_from_zip(&data, 1024).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.get("main.go").unwrap().data, b"package main\n");
    }

    #[test]
    fn test_size_limit() {
        let data = zip_of(&[("a.go", "package a\n"), ("b.go", "package b\n")]);
        assert!(archive_from_zip(&data, 20).is_ok());
        assert!(matches!(
            archive_from_zip(&data, 15),
            Err(PlaygroundError::MalformedArchive(msg)) if msg.contains("exceeds")
        ));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            archive_from_zip(b"definitely not a zip", 1024),
            Err(PlaygroundError::MalformedArchive(_))
        ));
    }
}
