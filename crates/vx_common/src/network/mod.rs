//! The remote-authority RPC edge: wire protocol and transport plumbing.
//!
//! Frames are length-delimited bincode. The protocol is four methods: chunk fetch,
//! world-id listing, world metadata, and the fire-and-forget block pick.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vx_schemas::coordinates::{AbsBlockPos, AbsChunkPos};
use vx_schemas::voxel::ChunkBlob;

use crate::prelude::*;

/// A request sent from a client to the authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Fetch a chunk's contents; the authority materializes the chunk if needed.
    GetChunk {
        /// Target world.
        world_id: u32,
        /// Chunk coordinate.
        position: AbsChunkPos,
    },
    /// List the world ids the authority serves.
    GetAvailableWorldIds,
    /// Fetch a world's metadata map; contains at least `"name"`.
    GetWorldInfo {
        /// Target world.
        world_id: u32,
    },
    /// Replace the addressed voxel with air. No response is sent.
    PickBlock {
        /// Target world.
        world_id: u32,
        /// Block coordinate.
        position: AbsBlockPos,
    },
}

/// An answer sent from the authority back to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    /// Chunk contents, length 1 (monotone) or the full chunk volume.
    Chunk(ChunkBlob),
    /// Served world ids.
    WorldIds(Vec<u32>),
    /// World metadata.
    WorldInfo(std::collections::HashMap<String, String>),
    /// The request could not be served.
    Error(String),
}

/// A request frame: the id correlates the authority's answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Client-chosen correlation id.
    pub id: u64,
    /// The request itself.
    pub body: Request,
}

/// A response frame answering the request with the same id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id copied from the request.
    pub id: u64,
    /// The answer.
    pub body: Response,
}

/// Errors of the RPC transport and protocol layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Frame encode/decode failure.
    #[error("Frame serialization failed: {0}")]
    Codec(#[from] bincode::Error),
    /// The underlying connection is gone.
    #[error("Connection closed")]
    ConnectionClosed,
    /// The authority answered with a different variant than the request implies.
    #[error("Unexpected response variant for the request")]
    UnexpectedResponse,
    /// The authority reported an error.
    #[error("Authority error: {0}")]
    Remote(String),
}

pub(crate) fn encode_frame<T: Serialize>(value: &T) -> Result<tokio_util::bytes::Bytes, NetworkError> {
    Ok(tokio_util::bytes::Bytes::from(bincode::serialize(value)?))
}

pub(crate) fn decode_frame<'d, T: Deserialize<'d>>(bytes: &'d [u8]) -> Result<T, NetworkError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use vx_schemas::voxel::BlockData;

    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = RequestEnvelope {
            id: 42,
            body: Request::GetChunk {
                world_id: 1,
                position: AbsChunkPos::new(-3, 0, 7),
            },
        };
        let bytes = encode_frame(&envelope).unwrap();
        let decoded: RequestEnvelope = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.id, 42);
        match decoded.body {
            Request::GetChunk { world_id, position } => {
                assert_eq!(world_id, 1);
                assert_eq!(position, AbsChunkPos::new(-3, 0, 7));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn chunk_response_round_trip() {
        let envelope = ResponseEnvelope {
            id: 7,
            body: Response::Chunk(vec![BlockData::new(3, 15, 0)]),
        };
        let bytes = encode_frame(&envelope).unwrap();
        let decoded: ResponseEnvelope = decode_frame(&bytes).unwrap();
        match decoded.body {
            Response::Chunk(blob) => assert_eq!(blob, vec![BlockData::new(3, 15, 0)]),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
