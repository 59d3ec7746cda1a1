//! In-memory reference store for testing and ephemeral use.
//!
//! [`InMemoryRefStore`] stores all refs in a `HashMap` protected by a
//! `RwLock`. It implements the full [`RefStore`] trait and is suitable for
//! unit tests, server-hosted scratch repositories, and short-lived processes.

use std::collections::HashMap;
use std::sync::RwLock;

use mgit_types::ObjectId;

use crate::error::{RefError, Result};
use crate::names::{validate_branch_name, validate_ref_name};
use crate::traits::RefStore;
use crate::types::Head;

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `HashMap` behind a `RwLock`. Data is lost when the
/// store is dropped.
#[derive(Debug)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, ObjectId>>,
    head: RwLock<Option<Head>>,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self {
            refs: RwLock::new(HashMap::new()),
            head: RwLock::new(None),
        }
    }
}

impl Default for InMemoryRefStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RefError {
    RefError::Serialization(format!("lock poisoned: {e}"))
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let refs = self.refs.read().map_err(poisoned)?;
        Ok(refs.get(name).copied())
    }

    fn write_ref(&self, name: &str, target: ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(poisoned)?;
        refs.insert(name.to_string(), target);
        tracing::debug!(name, %target, "ref written");
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(poisoned)?;
        let actual = refs.get(name).copied();
        if actual != expected {
            return Err(RefError::CasFailed {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        refs.insert(name.to_string(), new);
        tracing::debug!(name, %new, "ref advanced");
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        // Prevent deleting the current branch.
        {
            let head = self.head.read().map_err(poisoned)?;
            if let Some(Head::Symbolic(current)) = head.as_ref() {
                if name == format!("refs/heads/{current}") {
                    return Err(RefError::DeleteCurrentBranch {
                        name: current.clone(),
                    });
                }
            }
        }

        let mut refs = self.refs.write().map_err(poisoned)?;
        Ok(refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let refs = self.refs.read().map_err(poisoned)?;
        let mut result: Vec<(String, ObjectId)> = refs
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn head(&self) -> Result<Option<Head>> {
        let head = self.head.read().map_err(poisoned)?;
        Ok(head.clone())
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_branch_name(branch)?;
        let mut head = self.head.write().map_err(poisoned)?;
        *head = Some(Head::Symbolic(branch.to_string()));
        Ok(())
    }

    fn set_head_detached(&self, commit: ObjectId) -> Result<()> {
        let mut head = self.head.write().map_err(poisoned)?;
        *head = Some(Head::Detached(commit));
        Ok(())
    }
}
