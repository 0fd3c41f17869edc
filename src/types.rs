use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::fen::{Fen, ParseFenError};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position, Role, Square};

use crate::error::{EvalError, GameError};

/// Canonical FEN string of a board position. Used as the evaluation cache key
/// and as the `fen` field of every service request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    /// Validate `fen` syntactically and wrap it.
    pub fn parse(fen: &str) -> Result<Self, ParseFenError> {
        let parsed: Fen = fen.trim().parse()?;
        Ok(Self(parsed.to_string()))
    }

    pub fn from_position(pos: &Chess) -> Self {
        Self(Fen::from_position(pos, EnPassantMode::Legal).to_string())
    }

    pub fn starting() -> Self {
        Self::from_position(&Chess::default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the full position, rejecting syntactically valid but illegal setups.
    pub fn to_position(&self) -> Result<Chess, EvalError> {
        let fen: Fen = self.0.parse()?;
        Ok(fen.into_position(CastlingMode::Standard)?)
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the evaluation service expressed a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreKind {
    /// Hundredths of a pawn from the side to move's perspective.
    #[serde(rename = "cp", alias = "centipawn")]
    Centipawn,
    /// Signed moves to mate; positive means the side to move mates.
    #[serde(rename = "mate")]
    Mate,
    /// Anything the service sent that we do not recognise.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub kind: ScoreKind,
    pub value: i32,
    pub depth: u32,
}

impl EvaluationResult {
    pub fn centipawns(value: i32, depth: u32) -> Self {
        Self {
            kind: ScoreKind::Centipawn,
            value,
            depth,
        }
    }

    pub fn mate(value: i32, depth: u32) -> Self {
        Self {
            kind: ScoreKind::Mate,
            value,
            depth,
        }
    }
}

/// A move as the user (or the computer) expresses it: origin, target and an
/// optional promotion piece. Serialized as a UCI string (`e2e4`, `e7e8q`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MoveCommand {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveCommand {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }

    pub fn to_uci(self) -> UciMove {
        UciMove::Normal {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}

impl FromStr for MoveCommand {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GameError::InvalidMoveText(s.to_owned());
        let s = s.trim();
        if !(4..=5).contains(&s.len()) || !s.is_ascii() {
            return Err(invalid());
        }
        let from: Square = s[0..2].parse().map_err(|_| invalid())?;
        let to: Square = s[2..4].parse().map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(c) => match Role::from_char(c.to_ascii_lowercase()) {
                Some(role @ (Role::Queen | Role::Rook | Role::Bishop | Role::Knight)) => Some(role),
                _ => return Err(invalid()),
            },
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

impl From<MoveCommand> for String {
    fn from(m: MoveCommand) -> Self {
        m.to_string()
    }
}

impl TryFrom<String> for MoveCommand {
    type Error = GameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn opposite(self) -> Self {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlayerColor::White => "White",
            PlayerColor::Black => "Black",
        }
    }
}

impl From<Color> for PlayerColor {
    fn from(c: Color) -> Self {
        match c {
            Color::White => PlayerColor::White,
            Color::Black => PlayerColor::Black,
        }
    }
}

impl From<PlayerColor> for Color {
    fn from(c: PlayerColor) -> Self {
        match c {
            PlayerColor::White => Color::White,
            PlayerColor::Black => Color::Black,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_key_normalizes_whitespace() {
        let key = PositionKey::parse("  rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1 ")
            .unwrap();
        assert_eq!(key, PositionKey::starting());
    }

    #[test]
    fn position_key_omits_unusable_en_passant() {
        let m = MoveCommand::new(Square::E2, Square::E4)
            .to_uci()
            .to_move(&Chess::default())
            .unwrap();
        let pos = Chess::default().play(m).unwrap();
        assert_eq!(
            PositionKey::from_position(&pos).as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn position_key_rejects_garbage() {
        assert!(PositionKey::parse("not a fen").is_err());
    }

    #[test]
    fn move_command_parses_promotion() {
        let m: MoveCommand = "e7e8q".parse().unwrap();
        assert_eq!(m.from, Square::E7);
        assert_eq!(m.to, Square::E8);
        assert_eq!(m.promotion, Some(Role::Queen));
        assert_eq!(m.to_string(), "e7e8q");
    }

    #[test]
    fn move_command_rejects_bad_text() {
        for bad in ["", "e2", "e2e9", "e7e8k", "e2e4qq", "z1a1"] {
            assert!(bad.parse::<MoveCommand>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn move_command_is_stored_as_uci_string() {
        let m = MoveCommand::new(Square::G1, Square::F3);
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"g1f3\"");
        let back: MoveCommand = serde_json::from_str("\"g1f3\"").unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn score_kind_accepts_service_spelling() {
        let r: EvaluationResult =
            serde_json::from_str(r#"{"kind":"cp","value":30,"depth":10}"#).unwrap();
        assert_eq!(r, EvaluationResult::centipawns(30, 10));
        let r: EvaluationResult =
            serde_json::from_str(r#"{"kind":"wdl","value":1,"depth":3}"#).unwrap();
        assert_eq!(r.kind, ScoreKind::Unknown);
    }
}
