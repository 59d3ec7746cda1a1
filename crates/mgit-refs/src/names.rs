//! The MGit ref namespace.
//!
//! Only two kinds of ref exist:
//!
//! ```text
//! refs/heads/<branch>              local branches
//! refs/remotes/<remote>/<branch>   last known tip of <branch> on <remote>
//! ```
//!
//! Ref names become file paths under `.mgit/refs/`, so every name is
//! checked one `/`-separated segment at a time before it reaches the disk.

use crate::error::{RefError, Result};

const HEADS: &str = "refs/heads/";
const REMOTES: &str = "refs/remotes/";

/// Characters with meaning in revision syntax or on common filesystems.
const RESERVED: &[char] = &['~', '^', ':', '?', '*', '[', '\\', '{', '}'];

/// A validated ref name split into its parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefName<'a> {
    Branch(&'a str),
    RemoteTracking { remote: &'a str, branch: &'a str },
}

impl<'a> RefName<'a> {
    /// Split and validate a full ref name.
    pub fn parse(name: &'a str) -> Result<Self> {
        let named = |e: RefError| rename(e, name);
        if let Some(branch) = name.strip_prefix(HEADS) {
            validate_branch_name(branch).map_err(named)?;
            return Ok(Self::Branch(branch));
        }
        if let Some(rest) = name.strip_prefix(REMOTES) {
            let (remote, branch) = rest.split_once('/').ok_or_else(|| {
                invalid(name, "expected refs/remotes/<remote>/<branch>".into())
            })?;
            validate_remote_name(remote).map_err(named)?;
            validate_branch_name(branch).map_err(named)?;
            return Ok(Self::RemoteTracking { remote, branch });
        }
        Err(invalid(
            name,
            format!("must start with '{HEADS}' or '{REMOTES}'"),
        ))
    }

    pub fn branch(&self) -> &'a str {
        match *self {
            Self::Branch(branch) | Self::RemoteTracking { branch, .. } => branch,
        }
    }
}

/// Canonical ref name for a local branch.
pub fn branch_ref(branch: &str) -> String {
    format!("{HEADS}{branch}")
}

/// Canonical remote-tracking ref name for a branch on a remote.
pub fn remote_ref(remote: &str, branch: &str) -> String {
    format!("{REMOTES}{remote}/{branch}")
}

/// Validate a full ref name; see [`RefName::parse`].
pub fn validate_ref_name(name: &str) -> Result<()> {
    RefName::parse(name).map(|_| ())
}

/// Validate a branch name: one or more segments joined by `/`.
///
/// ```
/// use mgit_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("clinic/2024").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("../escape").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty".into()));
    }
    for segment in name.split('/') {
        check_segment(segment).map_err(|why| invalid(name, why))?;
    }
    Ok(())
}

/// Validate a remote name: exactly one segment.
pub fn validate_remote_name(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(invalid(name, "remote name must not contain '/'".into()));
    }
    check_segment(name).map_err(|why| invalid(name, format!("remote name: {why}")))
}

fn check_segment(segment: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err("empty segment".into());
    }
    if segment.starts_with('.') || segment.ends_with('.') {
        return Err(format!("segment {segment:?} starts or ends with '.'"));
    }
    if segment.contains("..") {
        return Err(format!("segment {segment:?} contains '..'"));
    }
    // `<ref>.lock` is the compare-and-swap lock file.
    if segment.ends_with(".lock") {
        return Err(format!("segment {segment:?} ends with '.lock'"));
    }
    match segment
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || RESERVED.contains(c))
    {
        Some(c) => Err(format!("segment {segment:?} contains {c:?}")),
        None => Ok(()),
    }
}

fn invalid(name: &str, reason: String) -> RefError {
    RefError::InvalidRefName {
        name: name.to_string(),
        reason,
    }
}

fn rename(err: RefError, name: &str) -> RefError {
    match err {
        RefError::InvalidRefName { reason, .. } => invalid(name, reason),
        other => other,
    }
}
