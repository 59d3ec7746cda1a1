//! The [`RefStore`] trait defining the reference storage interface.
//!
//! Any backend (in-memory, filesystem) implements this trait to provide
//! named reference management.

use mgit_types::ObjectId;

use crate::error::{RefError, Result};
use crate::names::branch_ref;
use crate::types::{BranchInfo, Head};

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`) and make
/// [`compare_and_swap`](RefStore::compare_and_swap) atomic with respect to
/// every other write through the same store. The namespace follows a
/// hierarchical layout:
///
/// - `refs/heads/*` for branches
/// - `refs/remotes/{remote}/*` for remote tracking refs
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/main").
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Unconditionally create or overwrite a ref.
    fn write_ref(&self, name: &str, target: ObjectId) -> Result<()>;

    /// Set `name` to `new` only if it currently equals `expected`.
    ///
    /// `expected == None` means the ref must not exist yet. On mismatch
    /// nothing is written and [`RefError::CasFailed`] carries the value
    /// actually found.
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<()>;

    /// Delete a ref by canonical name.
    ///
    /// Returns `Ok(true)` if the ref existed and was deleted, `Ok(false)` if
    /// it did not exist.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// List all refs whose canonical name starts with `prefix`, sorted by
    /// name.
    ///
    /// Pass `""` to list all refs. Pass `"refs/heads/"` for branches only.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>>;

    /// Read the current HEAD state.
    ///
    /// Returns `Ok(None)` if HEAD has not been set.
    fn head(&self) -> Result<Option<Head>>;

    /// Set HEAD to point at a branch (symbolic ref).
    fn set_head(&self, branch: &str) -> Result<()>;

    /// Set HEAD to a detached state pointing directly to a commit.
    fn set_head_detached(&self, commit: ObjectId) -> Result<()>;

    /// Name of the checked-out branch.
    fn current_branch(&self) -> Result<String> {
        match self.head()? {
            Some(Head::Symbolic(branch)) => Ok(branch),
            Some(Head::Detached(_)) => Err(RefError::DetachedHead),
            None => Err(RefError::NotFound {
                name: "HEAD".into(),
            }),
        }
    }

    /// Commit HEAD resolves to, or `None` on an unborn branch.
    fn resolve_head(&self) -> Result<Option<ObjectId>> {
        match self.head()? {
            Some(Head::Symbolic(branch)) => self.read_ref(&branch_ref(&branch)),
            Some(Head::Detached(id)) => Ok(Some(id)),
            None => Ok(None),
        }
    }

    /// List all branches with their tips.
    fn branches(&self) -> Result<Vec<BranchInfo>> {
        let current = match self.head()? {
            Some(Head::Symbolic(branch)) => Some(branch),
            _ => None,
        };
        Ok(self
            .list_refs("refs/heads/")?
            .into_iter()
            .filter_map(|(name, tip)| {
                let short = name.strip_prefix("refs/heads/")?.to_string();
                let is_current = current.as_deref() == Some(short.as_str());
                Some(BranchInfo {
                    name: short,
                    tip,
                    is_current,
                })
            })
            .collect())
    }

    /// List all known remote names.
    fn remotes(&self) -> Result<Vec<String>> {
        let refs = self.list_refs("refs/remotes/")?;
        let mut remotes: Vec<String> = refs
            .iter()
            .filter_map(|(name, _)| {
                let rest = name.strip_prefix("refs/remotes/")?;
                let remote = rest.split('/').next()?;
                Some(remote.to_string())
            })
            .collect();
        remotes.sort();
        remotes.dedup();
        Ok(remotes)
    }
}
