//! Journal frame format.
//!
//! ```text
//! +-------+---------+--------+-----------------+-------+
//! | magic | version | length | CBOR body       | crc32 |
//! | 4 B   | u16 LE  | u32 LE | `length` bytes  | u32 LE|
//! +-------+---------+--------+-----------------+-------+
//! ```
//!
//! The checksum covers everything before it. One frame is one committed
//! transaction.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"WBJ\x01";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4;
const TRAILER_LEN: usize = 4;

/// A single write inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Insert or replace a record.
    Put {
        /// Table name.
        table: String,
        /// Record id.
        id: String,
        /// Full record body.
        value: Value,
    },
    /// Remove a record. Removing a missing record is a no-op.
    Delete {
        /// Table name.
        table: String,
        /// Record id.
        id: String,
    },
}

impl WriteOp {
    /// Returns the table this write touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } => table,
        }
    }

    /// Returns the record id this write touches.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Put { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// One committed transaction as written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalFrame {
    /// Commit sequence number, strictly increasing.
    pub seq: u64,
    /// Writes in the order they were staged.
    pub ops: Vec<WriteOp>,
}

impl JournalFrame {
    /// Encodes the frame with its envelope and checksum.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut body = Vec::new();
        ciborium::into_writer(self, &mut body).map_err(|e| CoreError::codec(e.to_string()))?;

        let len = u32::try_from(body.len()).map_err(|_| {
            CoreError::invalid_argument(format!(
                "transaction too large for one frame: {} bytes",
                body.len()
            ))
        })?;

        let mut buf = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&body);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes every intact frame at the start of `bytes`.
    ///
    /// Returns the frames and the number of bytes they occupy. Decoding
    /// stops at the first incomplete or damaged frame; everything from
    /// there on is a torn tail the caller should cut off.
    pub fn decode_all(bytes: &[u8]) -> CoreResult<(Vec<JournalFrame>, usize)> {
        let mut frames = Vec::new();
        let mut offset = 0usize;

        while let Some((frame, consumed)) = Self::decode_one(&bytes[offset..])? {
            if let Some(prev) = frames.last().map(|f: &JournalFrame| f.seq) {
                if frame.seq <= prev {
                    return Err(CoreError::journal_corruption(format!(
                        "frame sequence went backwards: {} after {}",
                        frame.seq, prev
                    )));
                }
            }
            frames.push(frame);
            offset += consumed;
        }

        Ok((frames, offset))
    }

    fn decode_one(bytes: &[u8]) -> CoreResult<Option<(JournalFrame, usize)>> {
        if bytes.len() < HEADER_LEN + TRAILER_LEN || bytes[0..4] != FRAME_MAGIC {
            return Ok(None);
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FRAME_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported frame version {version}"
            )));
        }

        let len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let body_end = HEADER_LEN + len;
        let frame_end = body_end + TRAILER_LEN;
        if bytes.len() < frame_end {
            return Ok(None);
        }

        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        if stored != compute_crc32(&bytes[..body_end]) {
            return Ok(None);
        }

        let frame: JournalFrame = ciborium::from_reader(&bytes[HEADER_LEN..body_end])
            .map_err(|e| CoreError::journal_corruption(format!("undecodable frame body: {e}")))?;
        Ok(Some((frame, frame_end)))
    }
}

/// CRC-32 (IEEE) of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn frame(seq: u64) -> JournalFrame {
        JournalFrame {
            seq,
            ops: vec![
                WriteOp::Put {
                    table: "outbox".into(),
                    id: format!("{seq}"),
                    value: json!({ "attempts": 0, "payload": { "note": "fragile" } }),
                },
                WriteOp::Delete {
                    table: "pickup-request".into(),
                    id: "pr-9".into(),
                },
            ],
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn frames_decode_in_sequence() {
        let mut bytes = frame(1).encode().unwrap();
        bytes.extend(frame(2).encode().unwrap());

        let (frames, used) = JournalFrame::decode_all(&bytes).unwrap();
        assert_eq!(frames, vec![frame(1), frame(2)]);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn torn_tail_is_not_decoded() {
        let first = frame(1).encode().unwrap();
        let second = frame(2).encode().unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let (frames, used) = JournalFrame::decode_all(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(used, first.len());
    }

    #[test]
    fn flipped_bit_stops_decoding() {
        let mut bytes = frame(1).encode().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x40;

        let (frames, used) = JournalFrame::decode_all(&bytes).unwrap();
        assert!(frames.is_empty());
        assert_eq!(used, 0);
    }

    #[test]
    fn sequence_must_increase() {
        let mut bytes = frame(5).encode().unwrap();
        bytes.extend(frame(5).encode().unwrap());
        assert!(matches!(
            JournalFrame::decode_all(&bytes),
            Err(CoreError::JournalCorruption { .. })
        ));
    }

    #[test]
    fn write_op_accessors() {
        let op = WriteOp::Delete {
            table: "photo".into(),
            id: "ph-1".into(),
        };
        assert_eq!(op.table(), "photo");
        assert_eq!(op.id(), "ph-1");
    }

    fn op_strategy() -> impl Strategy<Value = WriteOp> {
        let table = prop::sample::select(vec!["outbox", "item", "sync.meta"]);
        prop_oneof![
            (table.clone(), "[a-z0-9-]{1,8}", any::<i64>(), ".{0,16}").prop_map(
                |(table, id, n, note)| WriteOp::Put {
                    table: table.to_string(),
                    id,
                    value: json!({ "n": n, "note": note }),
                }
            ),
            (table, "[a-z0-9-]{1,8}").prop_map(|(table, id)| WriteOp::Delete {
                table: table.to_string(),
                id,
            }),
        ]
    }

    proptest! {
        #[test]
        fn any_cut_recovers_a_prefix_of_whole_frames(
            ops in prop::collection::vec(prop::collection::vec(op_strategy(), 0..4), 1..6),
            cut in any::<prop::sample::Index>(),
        ) {
            let frames: Vec<JournalFrame> = ops
                .into_iter()
                .enumerate()
                .map(|(i, ops)| JournalFrame { seq: i as u64 + 1, ops })
                .collect();
            let mut bytes = Vec::new();
            let mut ends = vec![0];
            for frame in &frames {
                bytes.extend(frame.encode().unwrap());
                ends.push(bytes.len());
            }

            let cut = cut.index(bytes.len() + 1);
            let (decoded, used) = JournalFrame::decode_all(&bytes[..cut]).unwrap();
            let whole = ends.iter().filter(|&&end| end > 0 && end <= cut).count();
            prop_assert_eq!(decoded.len(), whole);
            prop_assert_eq!(used, ends[whole]);
            prop_assert_eq!(&decoded[..], &frames[..whole]);
        }
    }
}
