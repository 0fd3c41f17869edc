//! Game-state facade over [`shakmaty::Chess`].
//!
//! Rules, move legality and SAN come from `shakmaty`. This module adds what
//! the views need on top: a move history with SAN and captures, draw
//! detection the way players expect it (repetition and the fifty-move rule
//! included), status text, and the captured-piece trays.

use std::fmt;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Piece, Position, Rank, Role, Square};

use crate::error::GameError;
use crate::types::{MoveCommand, PlayerColor, PositionKey};

/// A move that the rules engine accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub command: MoveCommand,
    pub san: String,
    pub color: PlayerColor,
    pub role: Role,
    pub captured: Option<Role>,
    pub position_after: PositionKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoves,
    Repetition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Checkmate { winner: PlayerColor },
    Draw(DrawReason),
    Check { to_move: PlayerColor },
    ToMove(PlayerColor),
}

impl GameStatus {
    pub fn is_over(self) -> bool {
        matches!(self, GameStatus::Checkmate { .. } | GameStatus::Draw(_))
    }

    /// PGN result token.
    pub fn result(self) -> &'static str {
        match self {
            GameStatus::Checkmate {
                winner: PlayerColor::White,
            } => "1-0",
            GameStatus::Checkmate {
                winner: PlayerColor::Black,
            } => "0-1",
            GameStatus::Draw(_) => "1/2-1/2",
            _ => "*",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Checkmate { winner } => write!(f, "Checkmate! {} wins.", winner.name()),
            GameStatus::Draw(DrawReason::Stalemate) => f.write_str("Stalemate!"),
            GameStatus::Draw(_) => f.write_str("Draw!"),
            GameStatus::Check { .. } => f.write_str("Check!"),
            GameStatus::ToMove(color) => write!(f, "{} to move", color.name()),
        }
    }
}

/// Pieces taken off the board, grouped by the colour of the captured piece.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedPieces {
    pub white: Vec<Role>,
    pub black: Vec<Role>,
}

impl CapturedPieces {
    pub fn push(&mut self, color: PlayerColor, role: Role) {
        match color {
            PlayerColor::White => self.white.push(role),
            PlayerColor::Black => self.black.push(role),
        }
    }

    /// Image names such as `bQ`, in capture order.
    pub fn icons(&self, color: PlayerColor) -> Vec<String> {
        let (prefix, roles) = match color {
            PlayerColor::White => ('w', &self.white),
            PlayerColor::Black => ('b', &self.black),
        };
        roles
            .iter()
            .map(|r| format!("{prefix}{}", r.upper_char()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Game {
    start: Chess,
    position: Chess,
    history: Vec<PlayedMove>,
    /// Placement/turn/castling/en-passant part of every position reached.
    seen: Vec<String>,
}

fn repetition_key(pos: &Chess) -> String {
    let fen = Fen::from_position(pos, EnPassantMode::Legal).to_string();
    fen.split(' ').take(4).collect::<Vec<_>>().join(" ")
}

impl Default for Game {
    fn default() -> Self {
        Self::from_position(Chess::default())
    }
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(start: Chess) -> Self {
        let seen = vec![repetition_key(&start)];
        Self {
            position: start.clone(),
            start,
            history: Vec::new(),
            seen,
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let fen: Fen = fen.trim().parse()?;
        Ok(Self::from_position(fen.into_position(CastlingMode::Standard)?))
    }

    /// Back to the position this game started from.
    pub fn reset(&mut self) {
        *self = Self::from_position(self.start.clone());
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn start_position(&self) -> &Chess {
        &self.start
    }

    pub fn position_key(&self) -> PositionKey {
        PositionKey::from_position(&self.position)
    }

    pub fn turn(&self) -> PlayerColor {
        self.position.turn().into()
    }

    pub fn history(&self) -> &[PlayedMove] {
        &self.history
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    /// Squares the piece on `from` may legally move to.
    pub fn legal_targets(&self, from: Square) -> Vec<Square> {
        let mut targets: Vec<Square> = self
            .position
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(from))
            .map(uci_target)
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Play `command`, promoting to a queen when a pawn reaches the last rank
    /// without an explicit choice.
    pub fn apply(&mut self, command: MoveCommand) -> Result<PlayedMove, GameError> {
        let command = self.with_default_promotion(command);
        let m = command
            .to_uci()
            .to_move(&self.position)
            .map_err(|_| GameError::IllegalMove(command.to_string()))?;
        Ok(self.play(m, command))
    }

    /// Play a move written in SAN, as found in PGN movetext.
    pub fn apply_san(&mut self, san: &str) -> Result<PlayedMove, GameError> {
        let cleaned = san.trim_end_matches(['!', '?']);
        let parsed: SanPlus = cleaned
            .parse()
            .map_err(|_| GameError::IllegalMove(san.to_owned()))?;
        let m = parsed
            .san
            .to_move(&self.position)
            .map_err(|_| GameError::IllegalMove(san.to_owned()))?;
        let command = MoveCommand {
            from: m.from().unwrap_or_else(|| m.to()),
            to: uci_target(&m),
            promotion: m.promotion(),
        };
        Ok(self.play(m, command))
    }

    fn play(&mut self, m: Move, command: MoveCommand) -> PlayedMove {
        let color = self.turn();
        let role = m.role();
        let captured = m.capture();
        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, m).to_string();
        self.seen.push(repetition_key(&self.position));
        let played = PlayedMove {
            command,
            san,
            color,
            role,
            captured,
            position_after: self.position_key(),
        };
        self.history.push(played.clone());
        played
    }

    fn with_default_promotion(&self, mut command: MoveCommand) -> MoveCommand {
        if command.promotion.is_none() {
            let last_rank = match self.position.turn() {
                Color::White => Rank::Eighth,
                Color::Black => Rank::First,
            };
            let is_pawn = self
                .piece_at(command.from)
                .is_some_and(|p| p.role == Role::Pawn);
            if is_pawn && command.to.rank() == last_rank {
                command.promotion = Some(Role::Queen);
            }
        }
        command
    }

    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    pub fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    pub fn is_threefold_repetition(&self) -> bool {
        let current = repetition_key(&self.position);
        self.seen.iter().filter(|k| **k == current).count() >= 3
    }

    pub fn draw_reason(&self) -> Option<DrawReason> {
        if self.position.is_stalemate() {
            Some(DrawReason::Stalemate)
        } else if self.position.is_insufficient_material() {
            Some(DrawReason::InsufficientMaterial)
        } else if self.position.halfmoves() >= 100 {
            Some(DrawReason::FiftyMoves)
        } else if self.is_threefold_repetition() {
            Some(DrawReason::Repetition)
        } else {
            None
        }
    }

    pub fn is_draw(&self) -> bool {
        self.draw_reason().is_some()
    }

    pub fn is_game_over(&self) -> bool {
        self.is_checkmate() || self.is_draw()
    }

    pub fn status(&self) -> GameStatus {
        let to_move = self.turn();
        if self.is_checkmate() {
            GameStatus::Checkmate {
                winner: to_move.opposite(),
            }
        } else if let Some(reason) = self.draw_reason() {
            GameStatus::Draw(reason)
        } else if self.is_check() {
            GameStatus::Check { to_move }
        } else {
            GameStatus::ToMove(to_move)
        }
    }

    /// Square of the side to move's king when it is attacked, for highlighting.
    pub fn king_in_check(&self) -> Option<Square> {
        if !self.is_check() {
            return None;
        }
        self.position.board().king_of(self.position.turn())
    }

    pub fn captured(&self) -> CapturedPieces {
        let mut captured = CapturedPieces::default();
        for m in &self.history {
            if let Some(role) = m.captured {
                captured.push(m.color.opposite(), role);
            }
        }
        captured
    }
}

/// Target square as a UCI string would name it; castling goes to the
/// king's destination rather than the rook.
fn uci_target(m: &Move) -> Square {
    match m.to_uci(CastlingMode::Standard) {
        shakmaty::uci::UciMove::Normal { to, .. } => to,
        _ => m.to(),
    }
}
