use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{MgitMessage, MAX_MESSAGE_SIZE};

/// Codec for encoding/decoding MGit protocol messages.
pub struct MgitCodec;

impl MgitCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][payload]
    pub fn encode(msg: &MgitMessage) -> ProtocolResult<Vec<u8>> {
        let payload = bincode::serialize(msg)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(MgitMessage, usize)> {
        let Some((header, rest)) = data.split_first_chunk::<4>() else {
            return Err(ProtocolError::FramingError("too short".into()));
        };
        let len = u32::from_be_bytes(*header) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len - 1,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if rest.len() < len {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                4 + len
            )));
        }
        let tag = rest[0];
        let msg: MgitMessage = bincode::deserialize(&rest[1..len])
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        Ok((msg, 4 + len))
    }

    /// Decode a body that must hold exactly one framed message.
    pub fn decode_body(data: &[u8]) -> ProtocolResult<MgitMessage> {
        let (msg, consumed) = Self::decode(data)?;
        if consumed != data.len() {
            return Err(ProtocolError::FramingError(format!(
                "{} trailing bytes after {}",
                data.len() - consumed,
                msg.type_name()
            )));
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::*;
    use mgit_types::ObjectId;

    fn roundtrip(msg: MgitMessage) {
        let encoded = MgitCodec::encode(&msg).unwrap();
        let (decoded, consumed) = MgitCodec::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn object_batch_roundtrip() {
        roundtrip(MgitMessage::ObjectBatch {
            objects: vec![ObjectPayload {
                id: ObjectId::from_bytes(b"blob 2\0{}"),
                bytes: b"blob 2\0{}".to_vec(),
            }],
        });
    }

    #[test]
    fn ref_update_roundtrip() {
        roundtrip(MgitMessage::RefUpdateRequest {
            name: "refs/heads/main".into(),
            expected_old: None,
            new: ObjectId::from_bytes(b"tip"),
        });
        roundtrip(MgitMessage::RefUpdateResponse {
            result: RefUpdateResult::Rejected {
                name: "refs/heads/main".into(),
                current: Some(ObjectId::from_bytes(b"other")),
                reason: "non-fast-forward".into(),
            },
        });
    }

    #[test]
    fn type_tags_unique() {
        let id = ObjectId::null();
        let msgs: Vec<MgitMessage> = vec![
            MgitMessage::ListRefsRequest { prefix: None },
            MgitMessage::ListRefsResponse { refs: vec![] },
            MgitMessage::HasRequest { ids: vec![] },
            MgitMessage::HasResponse { missing: vec![] },
            MgitMessage::FetchRequest { ids: vec![] },
            MgitMessage::ObjectBatch { objects: vec![] },
            MgitMessage::PushAck { stored: 0 },
            MgitMessage::RefUpdateRequest {
                name: String::new(),
                expected_old: None,
                new: id,
            },
            MgitMessage::RefUpdateResponse {
                result: RefUpdateResult::Ok { name: String::new() },
            },
            MgitMessage::Error {
                code: 0,
                message: String::new(),
            },
        ];
        let mut tags: Vec<u8> = msgs.iter().map(|m| m.type_tag()).collect();
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
    }

    #[test]
    fn decode_truncated() {
        let err = MgitCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_zero_length() {
        let data = [0u8, 0, 0, 0, 0];
        let err = MgitCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_incomplete_frame() {
        let encoded = MgitCodec::encode(&MgitMessage::HasRequest {
            ids: vec![ObjectId::null()],
        })
        .unwrap();
        let err = MgitCodec::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_rejects_oversized_length() {
        let mut data = ((MAX_MESSAGE_SIZE + 2) as u32).to_be_bytes().to_vec();
        data.push(1);
        assert!(matches!(
            MgitCodec::decode(&data),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn decode_rejects_mismatched_tag() {
        let mut encoded = MgitCodec::encode(&MgitMessage::PushAck { stored: 1 }).unwrap();
        encoded[4] = 3;
        assert!(matches!(
            MgitCodec::decode(&encoded),
            Err(ProtocolError::InvalidMessageType(3))
        ));
    }

    #[test]
    fn decode_body_rejects_trailing_bytes() {
        let mut encoded = MgitCodec::encode(&MgitMessage::PushAck { stored: 1 }).unwrap();
        assert!(MgitCodec::decode_body(&encoded).is_ok());
        encoded.push(0);
        assert!(matches!(
            MgitCodec::decode_body(&encoded),
            Err(ProtocolError::FramingError(_))
        ));
    }
}
