//! Error types for the chess annotator.
//!
//! This crate uses `thiserror` to provide two enumerations of errors:
//! [`EvalError`] for everything that can go wrong while talking to the
//! remote evaluation/move service, and [`GameError`] for rule-level,
//! PGN and storage failures surfaced by the play and replay sessions.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    /// The request was superseded or explicitly aborted by the caller.
    #[error("evaluation request cancelled")]
    Cancelled,

    /// The request did not complete within the configured bound.
    #[error("evaluation request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure: the service could not be reached at all.
    #[error("evaluation service unavailable: {0}")]
    ServiceUnavailable(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("evaluation service returned {0}")]
    ServiceError(StatusCode),

    /// The response body was missing expected fields or was not JSON.
    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    #[error("search depth must be positive")]
    InvalidDepth,

    /// The provided FEN string could not be parsed.
    #[error("Invalid FEN: {0}")]
    InvalidFen(#[from] shakmaty::fen::ParseFenError),

    /// A parsed position is invalid from the perspective of `shakmaty`.
    #[error("Invalid Chess Position: {0}")]
    InvalidPosition(#[from] shakmaty::PositionError<shakmaty::Chess>),
}

#[derive(Error, Debug)]
pub enum GameError {
    /// The rules engine rejected the move.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("game is over")]
    GameOver,

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("invalid PGN: {0}")]
    InvalidPgn(String),

    /// A move string at a storage or service boundary could not be decoded.
    #[error("invalid move text: {0:?}")]
    InvalidMoveText(String),

    #[error("Invalid FEN: {0}")]
    InvalidFen(#[from] shakmaty::fen::ParseFenError),

    #[error("Invalid Chess Position: {0}")]
    InvalidPosition(#[from] shakmaty::PositionError<shakmaty::Chess>),

    /// A persisted JSON blob could not be read or written.
    #[error("storage encoding error: {0}")]
    Storage(#[from] serde_json::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
