use mgit_store::{Commit, SignatureStatus};
use mgit_types::{NostrPubkey, ObjectId};
use serde::{Deserialize, Serialize};

/// Result of a commit operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub branch: String,
}

/// One commit as shown by `log`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: NostrPubkey,
    pub timestamp: i64,
    pub message: String,
    pub signature: SignatureStatus,
}

impl CommitSummary {
    pub fn new(id: ObjectId, commit: &Commit) -> Self {
        Self {
            id,
            tree: commit.tree,
            parents: commit.parents.clone(),
            author: commit.author,
            timestamp: commit.timestamp,
            message: commit.message.clone(),
            signature: commit.verify(),
        }
    }

    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn is_verified(&self) -> bool {
        self.signature == SignatureStatus::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_first_line() {
        let commit = Commit::new(
            ObjectId::null(),
            vec![],
            NostrPubkey::from_bytes([7; 32]),
            1_700_000_000,
            "add allergy record\n\nPenicillin, confirmed by GP.",
        );
        let summary = CommitSummary::new(commit.id(), &commit);
        assert_eq!(summary.subject(), "add allergy record");
        assert_eq!(summary.signature, SignatureStatus::Unsigned);
        assert!(!summary.is_verified());
    }
}
