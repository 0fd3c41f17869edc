//! Chess game annotator backed by a remote engine evaluation service.
//!
//!
//! This crate drives a position evaluation service over HTTP and turns its
//! answers into something a board view can show: a score text and an
//! evaluation bar. Evaluations are refined by asking again at increasing
//! depth until the rounded score stops moving, and finished results are
//! cached per position so revisiting a move costs nothing.
//!
//! The principal type is [`EvaluationPoller`], which owns one polling
//! session at a time and publishes its progress through a `tokio::sync::watch`
//! channel. Around it sit the play and replay sessions ([`PlaySession`],
//! [`AnalysisView`]), the computer [`Opponent`], PGN reading and writing,
//! and a small key/value [`Storage`] layer for persisted state.
//!
//! The library re‑exports `shakmaty` to make position construction easy.

mod cache;
mod client;
mod config;
pub mod display;
mod error;
mod game;
mod opponent;
pub mod pgn;
mod play;
mod poller;
mod replay;
pub mod score;
pub mod storage;
mod types;

/// Evaluation polling loop and its published state.
pub use poller::{AbortReason, EvaluationPoller, PollOutcome, PollState, Published};

/// Service seam and its HTTP implementation.
pub use client::{EVALUATION_PATH, EvaluationService, HttpClient, MOVE_PATH, MoveService, PGN_PATH};

pub use cache::{CacheKey, CacheMode, EvaluationCache};
pub use tokio_util::sync::CancellationToken;
pub use config::{AppConfig, ClientConfig, PollConfig};
pub use display::{EvalDisplay, NO_DATA};

/// Error types produced by library operations.
pub use error::{EvalError, GameError};

pub use game::{CapturedPieces, DrawReason, Game, GameStatus, PlayedMove};
pub use opponent::{AiSettings, ColorChoice, DrawDecision, Opponent};
pub use play::{Command, Effect, Ending, PlayMode, PlaySession, SavedGameState};
pub use replay::{AnalysisView, MoveCell, MoveRow, ReplaySession};
pub use storage::{FileStorage, MemoryStorage, Storage};

/// Core data structures shared by every module.
pub use types::{EvaluationResult, MoveCommand, PlayerColor, PositionKey, ScoreKind};

/// Re-export of `shakmaty` for convenience when building positions.
pub use shakmaty;
