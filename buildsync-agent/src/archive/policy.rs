//! Entry-path policy for backup archives.
//!
//! Two independent checks guard extraction: a string allow-list on the normalized entry name, and
//! a lexical containment check on the resolved target path.

use std::path::{Component, Path, PathBuf};

/// Top-level namespaces a backup archive may contain.
pub const ALLOWED_ROOTS: [&str; 2] = ["userdata/", "addons/"];

/// Fold backslashes to forward slashes.
pub fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
}

pub fn is_directory_entry(name: &str) -> bool {
    name.ends_with('/') || name.ends_with('\\')
}

/// True when the normalized name has no `..` segment and starts with an allowed root.
pub fn is_allowed_entry(name: &str) -> bool {
    let norm = normalize_entry_name(name);
    if norm.split('/').any(|segment| segment == "..") {
        return false;
    }
    ALLOWED_ROOTS.iter().any(|root| norm.starts_with(root))
}

/// Entries that would restore this agent's own data directory over the live configuration.
pub fn is_self_entry(name: &str, addon_id: &str) -> bool {
    name.contains(addon_id) && name.contains("addon_data")
}

/// Resolve `name` under `root` lexically. `None` when the result would not lie strictly inside
/// `root` (absolute names, drive prefixes, `..` climbing out, or the root itself).
pub fn contained_target(root: &Path, name: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(&normalize_entry_name(name)).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(relative))
}
