use serde::{Deserialize, Serialize};
use mgit_types::ObjectId;

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on the object bytes a client puts in one `ObjectBatch`.
pub const MAX_BATCH_BYTES: usize = 8 * 1024 * 1024;

/// One object on the wire: its id and its framed bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPayload {
    pub id: ObjectId,
    pub bytes: Vec<u8>,
}

/// All message types in the MGit protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MgitMessage {
    ListRefsRequest {
        prefix: Option<String>,
    },
    ListRefsResponse {
        refs: Vec<(String, ObjectId)>,
    },
    /// Ask which of `ids` the server lacks.
    HasRequest {
        ids: Vec<ObjectId>,
    },
    HasResponse {
        missing: Vec<ObjectId>,
    },
    FetchRequest {
        ids: Vec<ObjectId>,
    },
    ObjectBatch {
        objects: Vec<ObjectPayload>,
    },
    PushAck {
        stored: u32,
    },
    /// Move `name` from `expected_old` (`None` = must not exist) to `new`.
    RefUpdateRequest {
        name: String,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    },
    RefUpdateResponse {
        result: RefUpdateResult,
    },
    Error {
        code: u32,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefUpdateResult {
    Ok {
        name: String,
    },
    /// The ref was not at `expected_old`, or `new` does not descend from it.
    Rejected {
        name: String,
        current: Option<ObjectId>,
        reason: String,
    },
}

impl MgitMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::ListRefsRequest { .. } => 1,
            Self::ListRefsResponse { .. } => 2,
            Self::HasRequest { .. } => 3,
            Self::HasResponse { .. } => 4,
            Self::FetchRequest { .. } => 5,
            Self::ObjectBatch { .. } => 6,
            Self::PushAck { .. } => 7,
            Self::RefUpdateRequest { .. } => 8,
            Self::RefUpdateResponse { .. } => 9,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ListRefsRequest { .. } => "ListRefsRequest",
            Self::ListRefsResponse { .. } => "ListRefsResponse",
            Self::HasRequest { .. } => "HasRequest",
            Self::HasResponse { .. } => "HasResponse",
            Self::FetchRequest { .. } => "FetchRequest",
            Self::ObjectBatch { .. } => "ObjectBatch",
            Self::PushAck { .. } => "PushAck",
            Self::RefUpdateRequest { .. } => "RefUpdateRequest",
            Self::RefUpdateResponse { .. } => "RefUpdateResponse",
            Self::Error { .. } => "Error",
        }
    }

    /// Turn an `Error` reply into `RemoteError`, or any other message that
    /// is not `expected` into `UnexpectedMessage`.
    pub fn expect(self, expected: &'static str) -> ProtocolResult<Self> {
        match self {
            Self::Error { code, message } => Err(ProtocolError::RemoteError { code, message }),
            msg if msg.type_name() == expected => Ok(msg),
            msg => Err(ProtocolError::UnexpectedMessage {
                expected,
                actual: msg.type_name(),
            }),
        }
    }
}

pub mod capabilities {
    pub const OBJECTS_V1: &str = "objects-v1";
    pub const REF_CAS: &str = "ref-cas";
    pub const NOSTR_SIGNED_COMMITS: &str = "nostr-signed-commits";

    pub fn all() -> Vec<String> {
        [OBJECTS_V1, REF_CAS, NOSTR_SIGNED_COMMITS]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_passes_matching_message() {
        let msg = MgitMessage::PushAck { stored: 2 };
        assert_eq!(msg.clone().expect("PushAck").unwrap(), msg);
    }

    #[test]
    fn expect_surfaces_remote_error() {
        let msg = MgitMessage::Error {
            code: 404,
            message: "no such repository".into(),
        };
        assert!(matches!(
            msg.expect("ListRefsResponse"),
            Err(ProtocolError::RemoteError { code: 404, .. })
        ));
    }

    #[test]
    fn expect_rejects_other_message() {
        let msg = MgitMessage::HasResponse { missing: vec![] };
        assert!(matches!(
            msg.expect("ObjectBatch"),
            Err(ProtocolError::UnexpectedMessage {
                expected: "ObjectBatch",
                actual: "HasResponse"
            })
        ));
    }

    #[test]
    fn capabilities_listed() {
        let all = capabilities::all();
        assert!(all.contains(&capabilities::REF_CAS.to_string()));
        assert_eq!(all.len(), 3);
    }
}
