//! Interactive play: two people at one board, or one person against the
//! computer.
//!
//! A [`PlaySession`] takes user [`Command`]s and answers with the
//! [`Effect`]s a front end should apply. It never talks to the network
//! itself; when the computer has to move or answer a draw offer the session
//! says so with an effect and the caller feeds the answer back as another
//! command. State is saved after every change under the mode's storage key.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shakmaty::{Role, Square};
use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::error::GameError;
use crate::game::Game;
use crate::opponent::{AiSettings, DrawDecision};
use crate::pgn;
use crate::storage::{self, EVALUATION_TABLE, SAVED_PGN, Storage, VS_AI_GAME_STATE, VS_GAME_STATE};
use crate::types::{MoveCommand, PlayerColor, PositionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    TwoPlayer,
    VsComputer(AiSettings),
}

impl PlayMode {
    pub fn storage_key(&self) -> &'static str {
        match self {
            PlayMode::TwoPlayer => VS_GAME_STATE,
            PlayMode::VsComputer(_) => VS_AI_GAME_STATE,
        }
    }

    fn computer(&self) -> Option<PlayerColor> {
        match self {
            PlayMode::TwoPlayer => None,
            PlayMode::VsComputer(settings) => Some(settings.computer_color()),
        }
    }
}

/// A game that finished by agreement rather than on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Ending {
    Forfeit { loser: PlayerColor },
    Agreement,
}

/// What is written under `vsChessGameState` / `vsAiChessGameState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameState {
    pub fen: PositionKey,
    pub moves: Vec<MoveCommand>,
    pub white_player_name: String,
    pub black_player_name: String,
    pub is_game_started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending: Option<Ending>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { white: String, black: String },
    /// A click on a square: select a piece, or move the selected one there.
    Select(Square),
    /// A piece dragged from one square to another.
    Drop {
        from: Square,
        to: Square,
        promotion: Option<Role>,
    },
    ComputerMove(MoveCommand),
    OfferDraw,
    AnswerDraw(DrawDecision),
    Forfeit,
    NewGame,
    Flip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Board(PositionKey),
    /// Put the dragged piece back where it came from.
    Snapback,
    Highlight(Vec<Square>),
    ClearHighlights,
    KingInCheck(Square),
    Status(String),
    MoveList(Vec<String>),
    Orientation(PlayerColor),
    /// Evaluate the position now on the board.
    Evaluate(CacheKey),
    /// Drop every cached evaluation; the game they belong to is gone.
    ResetEvaluations,
    RequestComputerMove(PositionKey),
    /// Ask the side that did not offer (a person or the computer).
    RequestDrawAnswer(PositionKey),
    DrawDeclined,
    GameOver,
}

pub struct PlaySession {
    mode: PlayMode,
    storage: Arc<dyn Storage>,
    game: Game,
    white_name: String,
    black_name: String,
    started: bool,
    ending: Option<Ending>,
    selected: Option<Square>,
    draw_offered: bool,
    orientation: PlayerColor,
}

impl PlaySession {
    /// Resume the saved game for `mode`, or start fresh when there is none
    /// or it no longer replays.
    pub fn open(mode: PlayMode, storage: Arc<dyn Storage>) -> Self {
        let orientation = match mode {
            PlayMode::TwoPlayer => PlayerColor::White,
            PlayMode::VsComputer(settings) => settings.player_color,
        };
        let mut session = Self {
            mode,
            storage,
            game: Game::new(),
            white_name: String::new(),
            black_name: String::new(),
            started: false,
            ending: None,
            selected: None,
            draw_offered: false,
            orientation,
        };

        let key = mode.storage_key();
        if let Some(saved) = storage::load_json::<SavedGameState>(&*session.storage, key) {
            match replay(&saved.moves) {
                Ok(game) => {
                    if game.position_key() != saved.fen {
                        warn!(key, "saved position disagrees with its moves, using the moves");
                    }
                    info!(key, moves = saved.moves.len(), "resumed saved game");
                    session.game = game;
                    session.white_name = saved.white_player_name;
                    session.black_name = saved.black_player_name;
                    session.started = saved.is_game_started;
                    session.ending = saved.ending;
                }
                Err(e) => warn!(key, error = %e, "discarding saved game"),
            }
        }
        session
    }

    pub fn mode(&self) -> &PlayMode {
        &self.mode
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn ending(&self) -> Option<Ending> {
        self.ending
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn orientation(&self) -> PlayerColor {
        self.orientation
    }

    /// Moves are accepted only between `Start` and the end of the game.
    pub fn is_active(&self) -> bool {
        self.started && self.ending.is_none() && !self.game.is_game_over()
    }

    pub fn poll_key(&self) -> CacheKey {
        CacheKey::position(self.game.position_key())
    }

    pub fn status_text(&self) -> String {
        match self.ending {
            Some(Ending::Forfeit { loser }) => {
                format!("{} wins by forfeit!", loser.opposite().name())
            }
            Some(Ending::Agreement) => "Game drawn by agreement!".to_owned(),
            None => self.game.status().to_string(),
        }
    }

    /// Numbered move pairs, with a closing line when someone forfeited.
    pub fn move_list(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .game
            .history()
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| {
                let sans: Vec<&str> = pair.iter().map(|m| m.san.as_str()).collect();
                format!("{}. {}", i + 1, sans.join(" "))
            })
            .collect();
        if let Some(Ending::Forfeit { loser }) = self.ending {
            let number = self.game.history().len() / 2 + 1;
            lines.push(format!("{number}. {} forfeits", loser.name()));
        }
        lines
    }

    pub fn saved_state(&self) -> SavedGameState {
        SavedGameState {
            fen: self.game.position_key(),
            moves: self.game.history().iter().map(|m| m.command).collect(),
            white_player_name: self.white_name.clone(),
            black_player_name: self.black_name.clone(),
            is_game_started: self.started,
            ending: self.ending,
        }
    }

    /// Write the game as PGN under `savedPGN` for the analysis view. The
    /// analysis table belongs to whatever game was there before, so it goes.
    pub fn hand_off(&self, date: &str) -> Result<String, GameError> {
        let headers = pgn::handoff_headers(&self.white_name, &self.black_name, date);
        let result = match self.ending {
            Some(Ending::Forfeit { loser }) => match loser {
                PlayerColor::White => "0-1",
                PlayerColor::Black => "1-0",
            },
            Some(Ending::Agreement) => "1/2-1/2",
            None => self.game.status().result(),
        };
        let text = pgn::write_with_result(&self.game, &headers, result);
        self.storage.set(SAVED_PGN, text.clone())?;
        self.storage.remove(EVALUATION_TABLE)?;
        info!(moves = self.game.history().len(), "handed game off to analysis");
        Ok(text)
    }

    pub fn handle(&mut self, command: Command) -> Vec<Effect> {
        debug!(?command, "play command");
        match command {
            Command::Start { white, black } => self.start(white, black),
            Command::Select(square) => self.select(square),
            Command::Drop {
                from,
                to,
                promotion,
            } => {
                let mut command = MoveCommand::new(from, to);
                command.promotion = promotion;
                self.human_move(command)
            }
            Command::ComputerMove(command) => self.computer_move(command),
            Command::OfferDraw => self.offer_draw(),
            Command::AnswerDraw(decision) => self.answer_draw(decision),
            Command::Forfeit => self.forfeit(),
            Command::NewGame => self.new_game(),
            Command::Flip => {
                self.orientation = self.orientation.opposite();
                vec![Effect::Orientation(self.orientation)]
            }
        }
    }

    fn start(&mut self, white: String, black: String) -> Vec<Effect> {
        if self.started {
            return Vec::new();
        }
        self.white_name = white;
        self.black_name = black;
        self.started = true;
        self.persist();
        let mut effects = vec![Effect::Status(self.status_text())];
        effects.extend(self.computer_turn());
        effects
    }

    /// True when a person may move `color`'s pieces right now.
    fn human_may_move(&self, color: PlayerColor) -> bool {
        self.is_active() && self.game.turn() == color && self.mode.computer() != Some(color)
    }

    fn select(&mut self, square: Square) -> Vec<Effect> {
        if let Some(from) = self.selected.take() {
            if self.game.legal_targets(from).contains(&square) {
                return self.human_move(MoveCommand::new(from, square));
            }
        }
        let own_piece = self
            .game
            .piece_at(square)
            .is_some_and(|p| self.human_may_move(p.color.into()));
        if !own_piece {
            return vec![Effect::ClearHighlights];
        }
        self.selected = Some(square);
        vec![
            Effect::ClearHighlights,
            Effect::Highlight(self.game.legal_targets(square)),
        ]
    }

    fn human_move(&mut self, command: MoveCommand) -> Vec<Effect> {
        self.selected = None;
        let mover: Option<PlayerColor> = self.game.piece_at(command.from).map(|p| p.color.into());
        if !mover.is_some_and(|c| self.human_may_move(c)) {
            return vec![Effect::Snapback, Effect::ClearHighlights];
        }
        match self.game.apply(command) {
            Ok(_) => {
                let mut effects = self.after_move();
                effects.extend(self.computer_turn());
                effects
            }
            Err(e) => {
                debug!(error = %e, "move rejected");
                vec![Effect::Snapback, Effect::ClearHighlights]
            }
        }
    }

    fn computer_move(&mut self, command: MoveCommand) -> Vec<Effect> {
        let Some(computer) = self.mode.computer() else {
            warn!(%command, "computer move in a two-player game");
            return Vec::new();
        };
        if !self.is_active() || self.game.turn() != computer {
            debug!(%command, "computer move arrived out of turn");
            return Vec::new();
        }
        match self.game.apply(command) {
            Ok(_) => self.after_move(),
            Err(e) => {
                warn!(error = %e, "computer move rejected");
                Vec::new()
            }
        }
    }

    fn after_move(&mut self) -> Vec<Effect> {
        self.draw_offered = false;
        self.persist();
        let mut effects = vec![
            Effect::Board(self.game.position_key()),
            Effect::ClearHighlights,
        ];
        if let Some(king) = self.game.king_in_check() {
            effects.push(Effect::KingInCheck(king));
        }
        effects.push(Effect::MoveList(self.move_list()));
        effects.push(Effect::Status(self.status_text()));
        effects.push(Effect::Evaluate(self.poll_key()));
        if self.game.is_game_over() {
            info!(status = %self.game.status(), "game over");
            effects.push(Effect::GameOver);
        }
        effects
    }

    fn computer_turn(&self) -> Option<Effect> {
        let computer = self.mode.computer()?;
        (self.is_active() && self.game.turn() == computer)
            .then(|| Effect::RequestComputerMove(self.game.position_key()))
    }

    fn offer_draw(&mut self) -> Vec<Effect> {
        if !self.is_active() || self.draw_offered {
            return Vec::new();
        }
        self.draw_offered = true;
        vec![Effect::RequestDrawAnswer(self.game.position_key())]
    }

    fn answer_draw(&mut self, decision: DrawDecision) -> Vec<Effect> {
        if !std::mem::take(&mut self.draw_offered) || !self.is_active() {
            return Vec::new();
        }
        match decision {
            DrawDecision::Decline => vec![Effect::DrawDeclined],
            DrawDecision::Accept => {
                self.ending = Some(Ending::Agreement);
                self.persist();
                info!("game drawn by agreement");
                vec![Effect::Status(self.status_text()), Effect::GameOver]
            }
        }
    }

    fn forfeit(&mut self) -> Vec<Effect> {
        if !self.is_active() {
            return Vec::new();
        }
        let loser = match self.mode {
            PlayMode::TwoPlayer => self.game.turn(),
            PlayMode::VsComputer(settings) => settings.player_color,
        };
        self.ending = Some(Ending::Forfeit { loser });
        self.selected = None;
        self.persist();
        info!(loser = loser.name(), "game forfeited");
        vec![
            Effect::MoveList(self.move_list()),
            Effect::Status(self.status_text()),
            Effect::GameOver,
        ]
    }

    fn new_game(&mut self) -> Vec<Effect> {
        self.game = Game::new();
        self.started = false;
        self.ending = None;
        self.selected = None;
        self.draw_offered = false;
        self.persist();
        vec![
            Effect::Board(self.game.position_key()),
            Effect::ClearHighlights,
            Effect::MoveList(Vec::new()),
            Effect::Status(self.status_text()),
            Effect::ResetEvaluations,
        ]
    }

    fn persist(&self) {
        let key = self.mode.storage_key();
        if let Err(e) = storage::save_json(&*self.storage, key, &self.saved_state()) {
            warn!(key, error = %e, "could not save game");
        }
    }
}

fn replay(moves: &[MoveCommand]) -> Result<Game, GameError> {
    let mut game = Game::new();
    for &command in moves {
        game.apply(command)?;
    }
    Ok(game)
}
