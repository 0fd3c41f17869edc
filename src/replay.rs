//! Move-by-move replay of a loaded game, with evaluation per position.
//!
//! [`ReplaySession`] is pure state: which game is loaded and which ply is on
//! the board. [`AnalysisView`] ties it to the evaluation poller and to
//! storage, so that loading a game resets the analysis cache and stepping
//! through it evaluates each position once.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::CacheKey;
use crate::client::EvaluationService;
use crate::error::GameError;
use crate::game::{CapturedPieces, Game, GameStatus};
use crate::pgn::{self, PgnGame, PlayerInfo};
use crate::poller::{EvaluationPoller, PollOutcome};
use crate::storage::{SAVED_PGN, Storage};
use crate::types::PlayerColor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCell {
    /// Zero-based index into the game's moves.
    pub index: usize,
    pub san: String,
    pub highlighted: bool,
}

/// One numbered row of the move list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRow {
    pub number: usize,
    pub white: Option<MoveCell>,
    pub black: Option<MoveCell>,
}

#[derive(Debug, Clone)]
pub struct ReplaySession {
    info: PlayerInfo,
    full: Game,
    board: Game,
    current: isize,
    orientation: PlayerColor,
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self::from_pgn(&PgnGame::default()).unwrap_or_else(|_| Self {
            info: PgnGame::default().player_info(),
            full: Game::new(),
            board: Game::new(),
            current: -1,
            orientation: PlayerColor::White,
        })
    }
}

impl ReplaySession {
    /// Parse and validate `text`; the board starts before the first move.
    pub fn load(text: &str) -> Result<Self, GameError> {
        Self::from_pgn(&pgn::parse(text)?)
    }

    pub fn from_pgn(pgn: &PgnGame) -> Result<Self, GameError> {
        let full = pgn.replay()?;
        let mut board = full.clone();
        board.reset();
        Ok(Self {
            info: pgn.player_info(),
            full,
            board,
            current: -1,
            orientation: PlayerColor::White,
        })
    }

    pub fn len(&self) -> usize {
        self.full.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `-1` is the starting position, `n` the position after move `n`.
    pub fn current_index(&self) -> isize {
        self.current
    }

    /// Rebuild the board up to and including move `target`. Out-of-range
    /// targets leave everything unchanged and return `false`.
    pub fn navigate_to(&mut self, target: isize) -> bool {
        if target < -1 || target >= self.len() as isize {
            return false;
        }
        self.board.reset();
        let upto = (target + 1) as usize;
        for played in &self.full.history()[..upto] {
            if let Err(e) = self.board.apply(played.command) {
                // history was validated on load
                warn!(error = %e, "replay diverged from loaded game");
                break;
            }
        }
        self.current = target;
        true
    }

    pub fn next(&mut self) -> bool {
        self.navigate_to(self.current + 1)
    }

    pub fn previous(&mut self) -> bool {
        self.navigate_to(self.current - 1)
    }

    pub fn board(&self) -> &Game {
        &self.board
    }

    pub fn status(&self) -> GameStatus {
        self.board.status()
    }

    pub fn captured(&self) -> CapturedPieces {
        self.board.captured()
    }

    pub fn player_info(&self) -> &PlayerInfo {
        &self.info
    }

    pub fn orientation(&self) -> PlayerColor {
        self.orientation
    }

    pub fn flip(&mut self) {
        self.orientation = self.orientation.opposite();
    }

    /// Cache/poll key for the position on the board.
    pub fn poll_key(&self) -> CacheKey {
        CacheKey::at_ply(self.board.position_key(), (self.current + 1) as usize)
    }

    pub fn move_rows(&self) -> Vec<MoveRow> {
        let cell = |index: usize| {
            self.full.history().get(index).map(|m| MoveCell {
                index,
                san: m.san.clone(),
                highlighted: index as isize == self.current,
            })
        };
        (0..self.len().div_ceil(2))
            .map(|row| MoveRow {
                number: row + 1,
                white: cell(row * 2),
                black: cell(row * 2 + 1),
            })
            .collect()
    }
}

/// Analysis page: a replay session plus its evaluation poller.
pub struct AnalysisView<S> {
    session: ReplaySession,
    poller: Arc<EvaluationPoller<S>>,
    storage: Arc<dyn Storage>,
}

impl<S: EvaluationService> AnalysisView<S> {
    /// Restore the game handed over under `savedPGN`, if any.
    pub fn open(poller: Arc<EvaluationPoller<S>>, storage: Arc<dyn Storage>) -> Self {
        let session = match storage.get(SAVED_PGN) {
            Some(text) => ReplaySession::load(&text).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring saved PGN");
                ReplaySession::default()
            }),
            None => ReplaySession::default(),
        };
        Self {
            session,
            poller,
            storage,
        }
    }

    pub fn session(&self) -> &ReplaySession {
        &self.session
    }

    pub fn poller(&self) -> &EvaluationPoller<S> {
        &self.poller
    }

    /// Replace the loaded game. Invalid PGN leaves the current game in place.
    pub fn load_pgn(&mut self, text: &str) -> Result<(), GameError> {
        let session = ReplaySession::load(text)?;
        self.poller.invalidate();
        self.storage.set(SAVED_PGN, text.trim().to_owned())?;
        info!(moves = session.len(), "loaded game for analysis");
        self.session = session;
        Ok(())
    }

    pub fn navigate_to(&mut self, target: isize) -> bool {
        self.session.navigate_to(target)
    }

    pub fn next(&mut self) -> bool {
        self.session.next()
    }

    pub fn previous(&mut self) -> bool {
        self.session.previous()
    }

    pub fn flip(&mut self) {
        self.session.flip();
    }

    /// Evaluate whatever is on the board now.
    pub async fn evaluate_current(&self) -> PollOutcome {
        self.poller.poll(self.session.poll_key()).await
    }
}
