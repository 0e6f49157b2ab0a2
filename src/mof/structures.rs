use std::path::{Path, PathBuf};

/// A structure file resolved from a material identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureFile {
    pub name: String,
    pub path: PathBuf,
}

/// Directory of `{NAME}.cif` files.
#[derive(Debug, Clone)]
pub struct StructureStore {
    root: PathBuf,
}

impl StructureStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exact lookup, trying the identifier as written and then uppercased.
    pub fn find(&self, name: &str) -> Option<StructureFile> {
        let name = name.trim().trim_end_matches(".cif");
        if name.is_empty() || !is_plain_name(name) {
            return None;
        }
        let upper = name.to_uppercase();
        let found = [name, upper.as_str()]
            .into_iter()
            .map(|candidate| self.root.join(format!("{}.cif", candidate)))
            .find(|path| path.is_file())
            .map(to_structure);
        found
    }

    /// Resolve an identifier or glob pattern. Results are sorted by name.
    pub fn resolve(&self, identifier: &str) -> Vec<StructureFile> {
        let identifier = identifier.trim();
        if !identifier.contains(['*', '?', '[']) {
            return self.find(identifier).into_iter().collect();
        }
        if !is_plain_name(identifier) {
            tracing::warn!(pattern = %identifier, "Rejected structure pattern outside the store");
            return Vec::new();
        }

        let mut pattern = identifier.to_string();
        if !pattern.ends_with(".cif") {
            pattern.push_str(".cif");
        }
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            pattern
        );

        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(pattern = %identifier, "Invalid structure pattern: {}", e);
                return Vec::new();
            }
        };

        let mut found: Vec<StructureFile> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .map(to_structure)
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

/// Identifiers and patterns stay inside the store directory.
fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && !name.contains("..")
}

fn to_structure(path: PathBuf) -> StructureFile {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    StructureFile { name, path }
}
