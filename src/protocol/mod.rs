//! Wire protocol between the agent and the ConfigTool server.
//!
//! JSON envelopes over WebSocket text frames; see [`Envelope`] for the shape
//! and [`MessageType`] for the closed set of tags.

mod chunk;
mod envelope;
mod types;

pub use chunk::{needs_chunking, split, Chunk, DEFAULT_CHUNK_SIZE};
pub use envelope::{CodecError, Envelope};
pub use types::*;
