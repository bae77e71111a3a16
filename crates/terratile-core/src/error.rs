//! Error types for the tile engine.

use thiserror::Error;

use crate::tile::TileKey;

/// Tile engine errors
#[derive(Error, Debug)]
pub enum TileError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Level {level} out of range (pyramid has {count} levels)")]
    LevelOutOfRange { level: u32, count: u32 },

    #[error("Split evaluation failed for sector: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for tile engine operations
pub type TileResult<T> = Result<T, TileError>;

/// Errors reported by a [`TileFetcher`](crate::worker::TileFetcher)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch of tile {0} failed: {1}")]
    Failed(TileKey, String),

    #[error("Tile {0} could not be decoded: {1}")]
    Decode(TileKey, String),

    #[error("Tile {0} timed out")]
    Timeout(TileKey),
}

impl FetchError {
    /// The tile the failure refers to
    pub fn key(&self) -> TileKey {
        match self {
            Self::Failed(key, _) | Self::Decode(key, _) | Self::Timeout(key) => *key,
        }
    }
}
