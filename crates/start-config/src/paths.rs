use std::path::{Path, PathBuf};

/// XDG app name used for config and cache paths.
pub const APP_NAME: &str = "start";
/// Project-local scope directory name.
pub const LOCAL_DIR: &str = ".start";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Global scope: `~/.config/start/` (or platform equivalent).
pub fn global_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Local scope: `<workdir>/.start/`.
pub fn local_config_dir(workdir: &Path) -> PathBuf {
    workdir.join(LOCAL_DIR)
}

/// Scope directory for a given target; `local` selects the project scope.
pub fn scope_dir(workdir: &Path, local: bool) -> Option<PathBuf> {
    if local {
        Some(local_config_dir(workdir))
    } else {
        global_config_dir()
    }
}

/// Per-working-directory scratch area for resolved UTD output. Files here
/// are overwritten, not rotated.
pub fn temp_dir(workdir: &Path) -> PathBuf {
    local_config_dir(workdir).join("temp")
}

/// Root of the module cache: `<user-cache>/start/`.
pub fn cache_root() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Parent directory of all extracted module versions.
pub fn extract_root(cache_root: &Path) -> PathBuf {
    cache_root.join("mod").join("extract")
}

/// Extracted tree for one canonical `module@version`. Path separators in the
/// module path become directory levels; the version stays in the final
/// component so entries are content-addressed by canonical version.
pub fn module_extract_dir(cache_root: &Path, module: &str, version: &str) -> PathBuf {
    let mut dir = extract_root(cache_root);
    let mut parts = module.split('/').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            dir.push(format!("{part}@{version}"));
        } else {
            dir.push(part);
        }
    }
    dir
}

/// Most recently versioned extracted tree for a module, if any version is
/// cached. Used to rewrite `@module/` UTD file prefixes.
pub fn find_extracted(cache_root: &Path, module: &str) -> Option<PathBuf> {
    let (parent, leaf) = match module.rsplit_once('/') {
        Some((head, leaf)) => (extract_root(cache_root).join(head), leaf.to_string()),
        None => (extract_root(cache_root), module.to_string()),
    };
    let prefix = format!("{leaf}@");
    let mut best: Option<(semver::Version, PathBuf)> = None;
    for entry in std::fs::read_dir(&parent).ok()?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(version_str) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(version) = semver::Version::parse(version_str.trim_start_matches('v')) else {
            continue;
        };
        if best.as_ref().is_none_or(|(v, _)| version > *v) {
            best = Some((version, entry.path()));
        }
    }
    best.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_dirs_are_under_dot_start() {
        let workdir = Path::new("/work/project");
        assert_eq!(
            local_config_dir(workdir),
            PathBuf::from("/work/project/.start")
        );
        assert_eq!(
            temp_dir(workdir),
            PathBuf::from("/work/project/.start/temp")
        );
    }

    #[test]
    fn module_extract_dir_keeps_version_in_leaf() {
        let dir = module_extract_dir(
            Path::new("/cache/start"),
            "example.com/roles/golang/code-review",
            "v0.2.1",
        );
        assert_eq!(
            dir,
            PathBuf::from(
                "/cache/start/mod/extract/example.com/roles/golang/code-review@v0.2.1"
            )
        );
    }

    #[test]
    fn find_extracted_picks_highest_version() {
        let cache = tempfile::tempdir().unwrap();
        let module = "example.com/roles/helper";
        for version in ["v0.1.0", "v0.3.0", "v0.2.5"] {
            std::fs::create_dir_all(module_extract_dir(cache.path(), module, version)).unwrap();
        }

        let found = find_extracted(cache.path(), module).unwrap();
        assert!(found.ends_with("helper@v0.3.0"), "{}", found.display());
    }

    #[test]
    fn find_extracted_none_when_missing() {
        let cache = tempfile::tempdir().unwrap();
        assert!(find_extracted(cache.path(), "example.com/none").is_none());
    }
}
