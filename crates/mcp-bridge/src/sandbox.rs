//! Path and command sandboxing.
//!
//! Pure validation with no state: paths are resolved to canonical form *before* they are
//! compared with the allow-list, so `..` segments and symlinks cannot be used to escape it.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::error::SandboxError;

/// Expand `~` and `~/...` to the current user's home directory.
#[must_use]
pub fn expand_home(input: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (input, home) {
        ("~", Some(home)) => home,
        (rest, Some(home)) if rest.starts_with("~/") => home.join(&rest[2..]),
        _ => PathBuf::from(input),
    }
}

/// Symlinks followed while resolving one path before it is treated as a loop.
const MAX_SYMLINK_HOPS: usize = 40;

enum Step {
    Prefix(OsString),
    Root(OsString),
    Parent,
    Name(OsString),
}

/// Components of `path` in reverse, so the next one pops off the end.
fn steps(path: &Path) -> Vec<Step> {
    let mut steps: Vec<Step> = path
        .components()
        .filter_map(|c| match c {
            Component::Prefix(_) => Some(Step::Prefix(c.as_os_str().to_owned())),
            Component::RootDir => Some(Step::Root(c.as_os_str().to_owned())),
            Component::CurDir => None,
            Component::ParentDir => Some(Step::Parent),
            Component::Normal(name) => Some(Step::Name(name.to_owned())),
        })
        .collect();
    steps.reverse();
    steps
}

/// Resolve a path to absolute canonical form.
///
/// Walks the path one component at a time and expands every symlink it meets, dangling
/// ones included, relative to the link's directory. The remainder that does not exist yet
/// is normalized lexically, so the result is well defined for files about to be created.
pub fn resolve_path(input: &str) -> io::Result<PathBuf> {
    let expanded = expand_home(input);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };

    let mut pending = steps(&absolute);
    let mut resolved = PathBuf::new();
    let mut hops = 0;

    while let Some(step) = pending.pop() {
        match step {
            Step::Prefix(prefix) => resolved = PathBuf::from(prefix),
            Step::Root(root) => resolved.push(root),
            Step::Parent => {
                resolved.pop();
            }
            Step::Name(name) => {
                resolved.push(name);
                match resolved.symlink_metadata() {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidInput,
                                format!("too many levels of symbolic links at '{}'", resolved.display()),
                            ));
                        }
                        let target = std::fs::read_link(&resolved)?;
                        resolved.pop();
                        pending.extend(steps(&target));
                    }
                    Ok(_) => {}
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(resolved)
}

/// Resolve `input` and check that it is equal to or below one of `allowed`.
///
/// `allowed` must already hold canonical paths (see [`resolve_path`]). The first matching
/// root wins and the canonical path is returned.
pub fn validate_path(input: &str, allowed: &[PathBuf]) -> Result<PathBuf, SandboxError> {
    let resolved = resolve_path(input)
        .map_err(|source| SandboxError::Unresolvable { path: input.to_owned(), source })?;

    if allowed.iter().any(|root| is_within(&resolved, root)) {
        return Ok(resolved);
    }

    tracing::warn!(path = %resolved.display(), "Path rejected by sandbox");
    Err(SandboxError::PathNotAllowed {
        path: resolved,
        allowed: allowed.iter().map(|p| p.display().to_string()).collect(),
    })
}

/// Component-wise containment, so `/tmp/safe-other` is not inside `/tmp/safe`.
fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Check `command` against the deny patterns in order.
///
/// Patterns search anywhere in the command; the first match rejects it.
pub fn validate_command(command: &str, blocked: &[Regex]) -> Result<(), SandboxError> {
    match blocked.iter().find(|pattern| pattern.is_match(command)) {
        Some(pattern) => {
            tracing::warn!(pattern = %pattern.as_str(), "Command rejected by sandbox");
            Err(SandboxError::CommandBlocked { pattern: pattern.as_str().to_owned() })
        }
        None => Ok(()),
    }
}
