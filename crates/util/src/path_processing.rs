//! Filesystem and `PATH` helpers.

use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf};

use dirs_next::home_dir;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("could not determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("could not join search path entries: {0}")]
    JoinPaths(#[from] env::JoinPathsError),
}

pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/").or_else(|| p.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// True when anything exists at `path`. Errors count as absent.
pub fn path_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok()
}

pub fn is_file(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok_and(|metadata| metadata.is_file())
}

pub fn is_dir(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok_and(|metadata| metadata.is_dir())
}

/// A fresh, unused file name in the system temp directory. Nothing is
/// created on disk.
///
/// # Arguments
/// * `extension` - Optional extension, with or without leading dots
///
/// # Example
/// ```rust
/// use knit_util::path_processing::temp_file_name;
///
/// let path = temp_file_name(Some(".png"));
/// assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("png"));
/// assert!(path.starts_with(std::env::temp_dir()));
/// ```
pub fn temp_file_name(extension: Option<&str>) -> PathBuf {
    temp_file_name_in(env::temp_dir(), extension)
}

/// Like [`temp_file_name`], inside `directory`.
pub fn temp_file_name_in(directory: impl AsRef<Path>, extension: Option<&str>) -> PathBuf {
    let mut name = random_name();
    if let Some(extension) = extension.map(|ext| ext.trim_start_matches('.')).filter(|ext| !ext.is_empty()) {
        name.push('.');
        name.push_str(extension);
    }
    directory.as_ref().join(name)
}

/// A fresh, unused directory name in the system temp directory.
pub fn temp_dir_name() -> PathBuf {
    env::temp_dir().join(random_name())
}

fn random_name() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Name of the environment variable holding the executable search path for
/// the running platform, given the names present in the environment.
pub fn path_key<I, K>(keys: I) -> String
where
    I: IntoIterator<Item = K>,
    K: AsRef<OsStr>,
{
    path_key_for_platform(keys, cfg!(windows))
}

/// `PATH` everywhere except Windows, where the variable name is matched
/// case-insensitively (last match wins) and defaults to `Path`.
pub fn path_key_for_platform<I, K>(keys: I, windows: bool) -> String
where
    I: IntoIterator<Item = K>,
    K: AsRef<OsStr>,
{
    if !windows {
        return "PATH".to_string();
    }
    keys.into_iter()
        .filter_map(|key| key.as_ref().to_str().map(str::to_string))
        .filter(|key| key.eq_ignore_ascii_case("PATH"))
        .last()
        .unwrap_or_else(|| "Path".to_string())
}

/// Inputs for [`run_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPathOptions {
    /// Directory whose ancestors contribute `bin_dir` entries.
    pub cwd: PathBuf,
    /// Search path to extend; defaults to the current `PATH`.
    pub path: Option<OsString>,
    /// Directory, relative to each ancestor, holding local executables.
    pub bin_dir: PathBuf,
    /// Executable whose directory is added; defaults to the running binary.
    pub exec_path: Option<PathBuf>,
    pub add_exec_path: bool,
}

impl Default for RunPathOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            path: None,
            bin_dir: PathBuf::from("node_modules/.bin"),
            exec_path: None,
            add_exec_path: true,
        }
    }
}

/// Builds a search path that prefers locally installed executables.
///
/// Entries are `<dir>/<bin_dir>` for the working directory and each of its
/// ancestors (nearest first), then the directory of `exec_path`, then the
/// existing search path.
pub fn run_path(options: &RunPathOptions) -> Result<OsString, PathError> {
    let cwd = absolutize(&options.cwd)?;
    let mut entries: Vec<PathBuf> = cwd.ancestors().map(|directory| directory.join(&options.bin_dir)).collect();

    if options.add_exec_path {
        let exec_path = match &options.exec_path {
            Some(exec_path) => Some(cwd.join(exec_path)),
            None => env::current_exe().ok(),
        };
        if let Some(directory) = exec_path.as_deref().and_then(Path::parent) {
            entries.push(normalize_lexically(directory));
        }
    }

    let existing = match &options.path {
        Some(path) => Some(path.clone()),
        None => env::var_os(path_key(env::vars_os().map(|(key, _)| key))),
    };
    if let Some(existing) = existing.filter(|path| !path.is_empty()) {
        entries.extend(env::split_paths(&existing));
    }

    debug!(entries = entries.len(), cwd = %cwd.display(), "built run path");
    Ok(env::join_paths(entries)?)
}

/// Returns a copy of `environment` whose search path variable is replaced by
/// [`run_path`]. `options.path` defaults to the variable's current value.
pub fn run_path_env(
    options: &RunPathOptions,
    environment: &HashMap<OsString, OsString>,
) -> Result<HashMap<OsString, OsString>, PathError> {
    let key = OsString::from(path_key(environment.keys()));
    let mut options = options.clone();
    if options.path.is_none() {
        options.path = Some(environment.get(&key).cloned().unwrap_or_default());
    }

    let mut updated = environment.clone();
    updated.insert(key, run_path(&options)?);
    Ok(updated)
}

/// Nearest directory, starting at `cwd` and walking up, that contains
/// `name`. Returns the full path to the match.
pub fn find_up(name: impl AsRef<Path>, cwd: impl AsRef<Path>) -> Option<PathBuf> {
    let start = absolutize(cwd.as_ref()).ok()?;
    start
        .ancestors()
        .map(|directory| directory.join(name.as_ref()))
        .find(|candidate| path_exists(candidate))
}

/// True when `child` lies strictly inside `parent`. Paths are compared
/// lexically after resolving `.` and `..`; symlinks are not followed.
pub fn is_path_inside(child: impl AsRef<Path>, parent: impl AsRef<Path>) -> bool {
    let (Ok(child), Ok(parent)) = (absolutize(child.as_ref()), absolutize(parent.as_ref())) else {
        return false;
    };
    child != parent && child.starts_with(&parent)
}

/// Converts Windows separators to forward slashes. Extended-length paths
/// (`\\?\C:\…`) are returned untouched.
pub fn to_slash(path: &str) -> String {
    if path.starts_with(r"\\?\") {
        return path.to_string();
    }
    path.replace('\\', "/")
}

fn absolutize(path: &Path) -> Result<PathBuf, PathError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_err(PathError::CurrentDir)?.join(path)
    };
    Ok(normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefixes() {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("~"));
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde(" ~/notes.txt "), home.join("notes.txt"));
        assert_eq!(expand_tilde("~\\notes.txt"), home.join("notes.txt"));
        assert_eq!(expand_tilde("/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn temp_names_are_unique_and_normalized() {
        let first = temp_file_name(Some("..json"));
        let second = temp_file_name(Some("json"));
        assert_ne!(first, second);
        assert_eq!(first.extension().and_then(OsStr::to_str), Some("json"));
        assert_eq!(temp_file_name(Some("")).extension(), None);
        assert!(temp_dir_name().starts_with(env::temp_dir()));
        assert_eq!(
            temp_file_name_in("/var/cache", None).parent(),
            Some(Path::new("/var/cache"))
        );
    }

    #[test]
    fn path_key_matches_platform_rules() {
        assert_eq!(path_key_for_platform(["Path", "HOME"], false), "PATH");
        assert_eq!(path_key_for_platform(["HOME", "path", "PATH"], true), "PATH");
        assert_eq!(path_key_for_platform(["HOME"], true), "Path");
        assert_eq!(path_key_for_platform(Vec::<&str>::new(), true), "Path");
    }

    #[test]
    fn to_slash_converts_separators() {
        assert_eq!(to_slash(r"c:\aaaa\bbbb"), "c:/aaaa/bbbb");
        assert_eq!(to_slash(r"\\?\c:\aaaa\bbbb"), r"\\?\c:\aaaa\bbbb");
        assert_eq!(to_slash("already/slashed"), "already/slashed");
    }

    #[cfg(unix)]
    #[test]
    fn path_inside_is_strict_and_lexical() {
        assert!(is_path_inside("/a/b/c", "/a/b"));
        assert!(is_path_inside("/a/b/./c/../d", "/a/b"));
        assert!(!is_path_inside("/a/b", "/a/b"));
        assert!(!is_path_inside("/a/bc", "/a/b"));
        assert!(!is_path_inside("/a/b/../x", "/a/b"));
    }

    #[cfg(unix)]
    #[test]
    fn run_path_prefers_local_bins() {
        let options = RunPathOptions {
            cwd: PathBuf::from("/work/project"),
            path: Some(OsString::from("/usr/bin")),
            exec_path: Some(PathBuf::from("/opt/node/bin/node")),
            ..RunPathOptions::default()
        };
        let joined = run_path(&options).unwrap();
        let entries: Vec<PathBuf> = env::split_paths(&joined).collect();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/work/project/node_modules/.bin"),
                PathBuf::from("/work/node_modules/.bin"),
                PathBuf::from("/node_modules/.bin"),
                PathBuf::from("/opt/node/bin"),
                PathBuf::from("/usr/bin"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_path_env_replaces_path_variable() {
        let environment = HashMap::from([
            (OsString::from("PATH"), OsString::from("/bin")),
            (OsString::from("HOME"), OsString::from("/home/me")),
        ]);
        let options = RunPathOptions {
            cwd: PathBuf::from("/srv"),
            add_exec_path: false,
            ..RunPathOptions::default()
        };
        let updated = run_path_env(&options, &environment).unwrap();
        assert_eq!(updated.get(OsStr::new("HOME")), environment.get(OsStr::new("HOME")));
        assert_eq!(
            updated.get(OsStr::new("PATH")),
            Some(&OsString::from("/srv/node_modules/.bin:/node_modules/.bin:/bin"))
        );
    }
}
