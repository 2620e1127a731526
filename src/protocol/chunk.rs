//! Chunked transfer of oversized payloads.
//!
//! The agent only produces fragments; the server reassembles them by
//! `chunkIndex` and detects an incomplete sequence by timeout. Lengths are
//! counted in characters so a fragment never splits a code point.

use serde::Serialize;
use serde_json::json;

use super::envelope::Envelope;
use super::types::MessageType;

/// Fragment budget for a single frame (512 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// One fragment of a chunked payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
    pub is_last: bool,
}

impl Chunk {
    /// Wrap as a `FILE_CHUNK` envelope for `request_id`.
    pub fn into_envelope(self, request_id: &str) -> Envelope {
        Envelope::new(
            MessageType::FileChunk,
            Some(request_id.to_string()),
            Some(json!({
                "chunkIndex": self.chunk_index,
                "totalChunks": self.total_chunks,
                "content": self.content,
                "isLast": self.is_last,
            })),
        )
    }
}

/// Whether `content` exceeds the per-frame budget.
pub fn needs_chunking(content: &str, limit: usize) -> bool {
    content.chars().count() > limit.max(1)
}

/// Split `content` into `ceil(len / limit)` ordered fragments.
///
/// Deterministic; the last fragment is the only one with `is_last`. Empty
/// content yields no fragments.
pub fn split(content: &str, limit: usize) -> Vec<Chunk> {
    let limit = limit.max(1);
    let char_count = content.chars().count();
    if char_count == 0 {
        return Vec::new();
    }

    let total = char_count.div_ceil(limit);
    let mut chunks = Vec::with_capacity(total);
    let mut rest = content;

    for index in 0..total {
        let end = rest
            .char_indices()
            .nth(limit)
            .map(|(offset, _)| offset)
            .unwrap_or(rest.len());
        let (piece, tail) = rest.split_at(end);
        chunks.push(Chunk {
            chunk_index: index,
            total_chunks: total,
            content: piece.to_string(),
            is_last: index + 1 == total,
        });
        rest = tail;
    }

    chunks
}
