//! Editor form adapter.
//!
//! The editor posts one `filename` field per file, in display order, and one
//! field named after each file holding its content.

use url::form_urlencoded;

use crate::archive::Archive;
use crate::error::Result;

/// Field listing the file names of the archive.
pub const FILENAME_FIELD: &str = "filename";

/// Ordered form fields. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    /// Create an empty field list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn parse_urlencoded(body: &[u8]) -> Self {
        form_urlencoded::parse(body).into_owned().collect()
    }

    /// Encode as `application/x-www-form-urlencoded`.
    pub fn to_urlencoded(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.fields)
            .finish()
    }

    /// Encode an archive the way the editor submits it.
    pub fn from_archive(archive: &Archive) -> Self {
        let mut form = Self::new();
        for file in archive {
            form.push(FILENAME_FIELD, file.name.clone());
        }
        for file in archive {
            form.push(file.name.clone(), file.text().into_owned());
        }
        form
    }

    /// Append a field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a field, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Build an archive from editor form fields.
///
/// A listed name without a content field becomes an empty file. Any name
/// that fails the permission filter fails the whole request.
pub fn archive_from_form(form: &FormFields) -> Result<Archive> {
    let mut archive = Archive::new();
    for name in form.get_all(FILENAME_FIELD) {
        let content = form.get(name).unwrap_or_default();
        archive.add_file(name, content)?;
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaygroundError;

    #[test]
    fn test_archive_from_form_keeps_order() {
        let form: FormFields = [
            ("filename", "main.go"),
            ("filename", "go.mod"),
            ("go.mod", "module m\n"),
            ("main.go", "package main\n"),
        ]
        .into_iter()
        .collect();

        let archive = archive_from_form(&form).unwrap();
        let names: Vec<_> = archive.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["main.go", "go.mod"]);
        assert_eq!(archive.get("main.go").unwrap().data, b"package main\n");
    }

    #[test]
    fn test_disallowed_name_fails_request() {
        let form: FormFields = [("filename", "main.go"), ("filename", ".env")]
            .into_iter()
            .collect();
        assert!(matches!(
            archive_from_form(&form),
            Err(PlaygroundError::FileNotPermitted(name)) if name == ".env"
        ));
    }

    #[test]
    fn test_missing_content_is_empty_file() {
        let form: FormFields = [("filename", "README.md")].into_iter().collect();
        let archive = archive_from_form(&form).unwrap();
        assert!(archive.get("README.md").unwrap().data.is_empty());
    }

    #[test]
    fn test_urlencoded_round_trip() {
        let archive = Archive::from_files([
            ("go.mod", "module m\n\ngo 1.22\n"),
            ("main.go", "package main\n\nfunc main() { println(\"a&b=c\") }\n"),
        ])
        .unwrap();
        let body = FormFields::from_archive(&archive).to_urlencoded();
        let decoded = FormFields::parse_urlencoded(body.as_bytes());
        assert_eq!(archive_from_form(&decoded).unwrap(), archive);
    }

    #[test]
    fn test_get_returns_first_value() {
        let form: FormFields = [("filename", "a.go"), ("filename", "b.go")]
            .into_iter()
            .collect();
        let name = String::from("filename");
        let first = form.get(&name);
        drop(name);
        assert_eq!(first, Some("a.go"));
        assert_eq!(form.get("missing"), None);
        assert_eq!(form.get_all("filename").collect::<Vec<_>>(), ["a.go", "b.go"]);
    }

    #[test]
    fn test_empty_form_is_empty_archive() {
        assert!(archive_from_form(&FormFields::new()).unwrap().is_empty());
    }
}
