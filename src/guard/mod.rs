//! Dependency guard.
//!
//! Every archive is checked here before anything touches disk: each
//! `go.mod` manifest must parse, must not contain a `replace` directive and
//! may only require allowlisted modules directly; each `.go` file may only
//! import allowlisted packages or packages inside an allowlisted module.

pub mod imports;
pub mod manifest;

use std::collections::HashSet;
use std::path::Path;

use crate::archive::{Archive, File};
use crate::error::{PlaygroundError, Result};

pub use imports::{is_package_main, scan_imports, ImportSet};
pub use manifest::{Manifest, Requirement};

const BUNDLED_MODULES: &str = include_str!("../../assets/module_allow_list.txt");
const BUNDLED_PACKAGES: &str = include_str!("../../assets/import_allow_list.txt");

/// Static allowlists consulted by the guard.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    modules: Vec<String>,
    packages: HashSet<String>,
}

impl AllowList {
    /// The allowlists shipped with the crate.
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_MODULES, BUNDLED_PACKAGES)
    }

    /// Build allowlists from newline-delimited text. Blank lines are ignored.
    pub fn parse(modules: &str, packages: &str) -> Self {
        Self {
            modules: entries(modules).map(str::to_string).collect(),
            packages: entries(packages).map(str::to_string).collect(),
        }
    }

    /// Load allowlists from files.
    pub fn from_files(modules: impl AsRef<Path>, packages: impl AsRef<Path>) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                PlaygroundError::Config(format!("failed to read {}: {e}", path.display()))
            })
        };
        let modules = read(modules.as_ref())?;
        let packages = read(packages.as_ref())?;
        Ok(Self::parse(&modules, &packages))
    }

    /// Allowlisted module paths.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Check whether a module may be required directly.
    pub fn permits_module(&self, path: &str) -> bool {
        self.modules.iter().any(|m| m == path)
    }

    /// Check whether a package may be imported.
    pub fn permits_import(&self, path: &str) -> bool {
        self.packages.contains(path)
            || self.modules.iter().any(|m| {
                path.strip_prefix(m.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

fn entries(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Run the manifest and import checks over every file of an archive.
///
/// Returns the parsed manifests in archive order.
pub fn check_archive(archive: &Archive, allow: &AllowList) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for file in archive {
        if file.base_name() == "go.mod" {
            manifests.push(check_manifest(file, allow)?);
        } else if file.extension().as_deref() == Some("go") {
            check_imports(file, allow)?;
        }
    }
    tracing::debug!(files = archive.len(), manifests = manifests.len(), "archive passed guard");
    Ok(manifests)
}

/// Parse a `go.mod` file and check it against the module allowlist.
pub fn check_manifest(file: &File, allow: &AllowList) -> Result<Manifest> {
    let manifest = Manifest::parse(&file.text()).map_err(|e| PlaygroundError::MalformedManifest {
        file: file.name.clone(),
        line: e.line,
        reason: e.reason,
    })?;
    if manifest.has_replace() {
        return Err(PlaygroundError::ReplaceDirective {
            file: file.name.clone(),
        });
    }
    if let Some(requirement) = manifest
        .direct_requirements()
        .find(|r| !allow.permits_module(&r.path))
    {
        return Err(PlaygroundError::ModuleNotPermitted {
            file: file.name.clone(),
            module: requirement.path.clone(),
        });
    }
    Ok(manifest)
}

/// Check every import declaration of a `.go` file against the allowlists.
pub fn check_imports(file: &File, allow: &AllowList) -> Result<ImportSet> {
    let source = std::str::from_utf8(&file.data).map_err(|_| PlaygroundError::MalformedSource {
        file: file.name.clone(),
        reason: "source is not valid UTF-8".to_string(),
    })?;
    let set = scan_imports(source).map_err(|e| PlaygroundError::MalformedSource {
        file: file.name.clone(),
        reason: e.to_string(),
    })?;
    if let Some(package) = set.paths().iter().find(|p| !allow.permits_import(p)) {
        return Err(PlaygroundError::ImportNotPermitted {
            file: file.name.clone(),
            package: package.clone(),
        });
    }
    Ok(set)
}
