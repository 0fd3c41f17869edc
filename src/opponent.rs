//! The computer opponent: its settings, its moves and its answer to a draw
//! offer.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shakmaty::Position;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{EvaluationService, MoveService};
use crate::error::EvalError;
use crate::types::{MoveCommand, PlayerColor, PositionKey, ScoreKind};

/// Pawns beyond which the computer stops treating the position as level.
pub const DRAW_MARGIN: f64 = 0.5;

/// The colour a player picked for themselves, before `Random` is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    White,
    Black,
    Random,
}

impl ColorChoice {
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> PlayerColor {
        match self {
            ColorChoice::White => PlayerColor::White,
            ColorChoice::Black => PlayerColor::Black,
            ColorChoice::Random if rng.random_bool(0.5) => PlayerColor::White,
            ColorChoice::Random => PlayerColor::Black,
        }
    }
}

/// Stored under `aiSettings`. The strength is written as a string, the way
/// the settings form submits it; plain numbers are accepted on read. Skill
/// levels start at 1 and a stored 0 does not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(with = "strength")]
    pub ai_strength: u8,
    pub player_color: PlayerColor,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            ai_strength: 1,
            player_color: PlayerColor::White,
        }
    }
}

impl AiSettings {
    /// Settle a `Random` colour choice once, when the settings are submitted.
    /// A strength of 0 is raised to 1.
    pub fn choose<R: Rng + ?Sized>(ai_strength: u8, color: ColorChoice, rng: &mut R) -> Self {
        Self {
            ai_strength: ai_strength.max(1),
            player_color: color.resolve(rng),
        }
    }

    pub fn computer_color(&self) -> PlayerColor {
        self.player_color.opposite()
    }
}

mod strength {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u8),
    }

    pub fn serialize<S: Serializer>(value: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let n = match Raw::deserialize(d)? {
            Raw::Number(n) => n,
            Raw::Text(t) => t.trim().parse().map_err(serde::de::Error::custom)?,
        };
        if n == 0 {
            return Err(serde::de::Error::custom("skill levels start at 1"));
        }
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawDecision {
    Accept,
    Decline,
}

/// The computer side of a vs-computer game.
pub struct Opponent<S> {
    service: S,
    settings: AiSettings,
    draw_depth: u32,
}

impl<S> Opponent<S> {
    pub fn new(service: S, settings: AiSettings, draw_depth: u32) -> Self {
        Self {
            service,
            settings,
            draw_depth,
        }
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }
}

impl<S: MoveService> Opponent<S> {
    pub async fn choose_move(
        &self,
        position: &PositionKey,
        cancel: &CancellationToken,
    ) -> Result<MoveCommand, EvalError> {
        let command = self
            .service
            .request_move(position, self.settings.ai_strength, cancel)
            .await?;
        debug!(%command, skill = self.settings.ai_strength, "computer chose move");
        Ok(command)
    }
}

impl<S: EvaluationService> Opponent<S> {
    /// Answer a draw offer made in `position`. Scores are read from the side
    /// to move, so they are flipped when that is not the computer. A clear edge
    /// for the computer declines, a clear deficit accepts, anything level is
    /// a coin toss. Any failure to evaluate declines.
    pub async fn answer_draw<R: Rng + ?Sized>(
        &self,
        position: &PositionKey,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> DrawDecision {
        let to_move = match position.to_position() {
            Ok(pos) => PlayerColor::from(pos.turn()),
            Err(e) => {
                warn!(error = %e, "draw offer declined: bad position");
                return DrawDecision::Decline;
            }
        };
        let result = match self
            .service
            .request_evaluation(position, self.draw_depth, cancel)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "draw offer declined: no evaluation");
                return DrawDecision::Decline;
            }
        };

        let pawns = match result.kind {
            ScoreKind::Centipawn => f64::from(result.value) / 100.0,
            ScoreKind::Mate if result.value > 0 => f64::INFINITY,
            ScoreKind::Mate => f64::NEG_INFINITY,
            ScoreKind::Unknown => 0.0,
        };
        let edge = if to_move == self.settings.computer_color() {
            pawns
        } else {
            -pawns
        };

        let decision = if edge > DRAW_MARGIN {
            DrawDecision::Decline
        } else if edge < -DRAW_MARGIN {
            DrawDecision::Accept
        } else if rng.random_bool(0.5) {
            DrawDecision::Accept
        } else {
            DrawDecision::Decline
        };
        debug!(edge, ?decision, "answered draw offer");
        decision
    }
}
