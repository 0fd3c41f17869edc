//! Reading and writing single-game PGN.
//!
//! Only the main line is kept: comments, variations, NAGs and move numbers
//! are skipped while reading. SAN tokens are resolved by the rules engine
//! when the game is replayed, so an illegal move makes the whole PGN invalid.

use shakmaty::Position;

use crate::error::GameError;
use crate::game::Game;

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];
const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    pub headers: Vec<(String, String)>,
    pub moves: Vec<String>,
    pub result: Option<String>,
}

/// Who played and when, as shown above the analysis board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub white: String,
    pub black: String,
    pub date: String,
}

impl PgnGame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn player_info(&self) -> PlayerInfo {
        let or_unknown = |v: Option<&str>| v.unwrap_or("Unknown").to_owned();
        PlayerInfo {
            white: or_unknown(self.header("White")),
            black: or_unknown(self.header("Black")),
            date: or_unknown(self.header("EventDate").or_else(|| self.header("Date"))),
        }
    }

    /// Play the main line from the start (or the `FEN` header) position.
    pub fn replay(&self) -> Result<Game, GameError> {
        let mut game = match self.header("FEN") {
            Some(fen) => Game::from_fen(fen)?,
            None => Game::new(),
        };
        for (i, san) in self.moves.iter().enumerate() {
            game.apply_san(san)
                .map_err(|_| GameError::InvalidPgn(format!("illegal move {san:?} at ply {}", i + 1)))?;
        }
        Ok(game)
    }
}

pub fn parse(text: &str) -> Result<PgnGame, GameError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GameError::InvalidPgn("empty input".to_owned()));
    }

    let mut game = PgnGame::default();
    let mut movetext = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') && movetext.trim().is_empty() {
            game.headers.push(parse_header(line)?);
        } else {
            movetext.push_str(line);
            movetext.push('\n');
        }
    }

    for token in tokenize(&movetext)? {
        if RESULTS.contains(&token.as_str()) {
            game.result = Some(token);
            break;
        }
        let san = token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
        if !san.is_empty() {
            game.moves.push(san.to_owned());
        }
    }

    if game.headers.is_empty() && game.moves.is_empty() && game.result.is_none() {
        return Err(GameError::InvalidPgn("no headers or moves".to_owned()));
    }
    Ok(game)
}

fn parse_header(line: &str) -> Result<(String, String), GameError> {
    let invalid = || GameError::InvalidPgn(format!("bad header line {line:?}"));
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(invalid)?
        .trim();
    let (name, rest) = inner.split_once(char::is_whitespace).ok_or_else(invalid)?;
    let quoted = rest
        .trim()
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(invalid)?;
    let value = quoted.replace("\\\"", "\"").replace("\\\\", "\\");
    Ok((name.to_owned(), value))
}

/// Split movetext into tokens, dropping comments, variations and NAGs.
fn tokenize(movetext: &str) -> Result<Vec<String>, GameError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = movetext.chars();
    let mut variation_depth = 0usize;

    // tokens inside a variation are dropped rather than kept
    let end_token = |current: &mut String, tokens: &mut Vec<String>, depth: usize| {
        if depth == 0 && !current.is_empty() {
            tokens.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                end_token(&mut current, &mut tokens, variation_depth);
                if !chars.by_ref().any(|c| c == '}') {
                    return Err(GameError::InvalidPgn("unterminated comment".to_owned()));
                }
            }
            ';' => {
                end_token(&mut current, &mut tokens, variation_depth);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                end_token(&mut current, &mut tokens, variation_depth);
                variation_depth += 1;
            }
            ')' => {
                current.clear();
                variation_depth = variation_depth
                    .checked_sub(1)
                    .ok_or_else(|| GameError::InvalidPgn("unbalanced ')'".to_owned()))?;
            }
            c if c.is_whitespace() => end_token(&mut current, &mut tokens, variation_depth),
            c => current.push(c),
        }
    }
    if variation_depth > 0 {
        return Err(GameError::InvalidPgn("unterminated variation".to_owned()));
    }
    end_token(&mut current, &mut tokens, 0);

    tokens.retain(|t| !t.starts_with('$'));
    Ok(tokens)
}

/// Header set attached when a finished game is handed to the analysis view.
pub fn handoff_headers(white: &str, black: &str, date: &str) -> Vec<(String, String)> {
    let white = if white.trim().is_empty() { "White" } else { white.trim() };
    let black = if black.trim().is_empty() { "Black" } else { black.trim() };
    vec![
        (
            "Event".to_owned(),
            format!("Epic {white} vs {black} Chess Match!"),
        ),
        ("EventDate".to_owned(), date.to_owned()),
        ("White".to_owned(), white.to_owned()),
        ("Black".to_owned(), black.to_owned()),
    ]
}

/// Render `game` with `headers`, wrapping movetext at 80 columns.
pub fn write(game: &Game, headers: &[(String, String)]) -> String {
    write_with_result(game, headers, game.status().result())
}

/// Like [`write`], for games that ended off the board (forfeit, agreed draw).
pub fn write_with_result(game: &Game, headers: &[(String, String)], result: &str) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        out.push_str(&format!("[{name} \"{escaped}\"]\n"));
    }
    if !headers.is_empty() {
        out.push('\n');
    }

    let start = game.start_position();
    let mut number = start.fullmoves().get();
    let mut white_to_move = start.turn().is_white();
    let mut words = Vec::new();
    for (i, m) in game.history().iter().enumerate() {
        if white_to_move {
            words.push(format!("{number}. {}", m.san));
        } else if i == 0 {
            words.push(format!("{number}... {}", m.san));
        } else {
            words.push(m.san.clone());
        }
        if !white_to_move {
            number += 1;
        }
        white_to_move = !white_to_move;
    }
    words.push(result.to_owned());

    let mut line = String::new();
    for word in words {
        if !line.is_empty() && line.len() + 1 + word.len() > LINE_WIDTH {
            out.push_str(&line);
            out.push('\n');
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&word);
    }
    out.push_str(&line);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameStatus;
    use crate::types::PlayerColor;

    const OPERA: &str = r#"[Event "Paris"]
[White "Paul Morphy"]
[Black "Duke Karl / Count Isouard"]
[Date "1858.??.??"]

1. e4 e5 2. Nf3 d6 3. d4 Bg4 {This is a weak move.} 4. dxe5 Bxf3 5. Qxf3 dxe5
6. Bc4 Nf6 7. Qb3 Qe7 8. Nc3 (8. Qxb7 Qb4+ 9. Qxb4 Bxb4+) c6 9. Bg5 b5 $2
10. Nxb5 cxb5 11. Bxb5+ Nbd7 12. O-O-O Rd8 13. Rxd7 Rxd7 14. Rd1 Qe6
15. Bxd7+ Nxd7 16. Qb8+ Nxb8 17. Rd8# 1-0"#;

    #[test]
    fn reads_the_opera_game() {
        let pgn = parse(OPERA).unwrap();
        assert_eq!(pgn.moves.len(), 33);
        assert_eq!(pgn.moves[0], "e4");
        assert_eq!(pgn.moves[32], "Rd8#");
        assert_eq!(pgn.result.as_deref(), Some("1-0"));
        let info = pgn.player_info();
        assert_eq!(info.white, "Paul Morphy");
        assert_eq!(info.date, "1858.??.??");

        let game = pgn.replay().unwrap();
        assert_eq!(
            game.status(),
            GameStatus::Checkmate {
                winner: PlayerColor::White
            }
        );
    }

    #[test]
    fn missing_headers_default_to_unknown() {
        let pgn = parse("1. d4 d5 *").unwrap();
        let info = pgn.player_info();
        assert_eq!(info.black, "Unknown");
        assert_eq!(info.date, "Unknown");
    }

    #[test]
    fn glued_move_numbers_and_black_continuations() {
        let pgn = parse("1.e4 e5 2.Nf3 2... Nc6 *").unwrap();
        assert_eq!(pgn.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn illegal_move_rejects_the_pgn() {
        let pgn = parse("1. e4 e5 2. Ke3 *").unwrap();
        assert!(matches!(pgn.replay(), Err(GameError::InvalidPgn(_))));
    }

    #[test]
    fn rejects_empty_and_broken_input() {
        assert!(parse("   ").is_err());
        assert!(parse("1. e4 {never closed").is_err());
        assert!(parse("[White Morphy]\n1. e4 *").is_err());
    }

    #[test]
    fn escaped_header_values() {
        let pgn = parse("[Event \"The \\\"Immortal\\\"\"]\n\n*").unwrap();
        assert_eq!(pgn.header("Event"), Some("The \"Immortal\""));
    }

    #[test]
    fn writes_numbered_movetext_with_headers() {
        let mut game = Game::new();
        for san in ["e4", "e5", "Nf3"] {
            game.apply_san(san).unwrap();
        }
        let headers = handoff_headers("Player", "", "2024-05-01");
        let text = write(&game, &headers);
        assert_eq!(
            text,
            "[Event \"Epic Player vs Black Chess Match!\"]\n\
             [EventDate \"2024-05-01\"]\n\
             [White \"Player\"]\n\
             [Black \"Black\"]\n\
             \n\
             1. e4 e5 2. Nf3 *"
        );
        let back = parse(&text).unwrap();
        assert_eq!(back.moves, vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn long_games_wrap() {
        let game = parse(OPERA).unwrap().replay().unwrap();
        let text = write(&game, &[]);
        assert!(text.lines().all(|l| l.len() <= 80));
        assert!(text.contains("17. Rd8#"));
        assert!(text.ends_with("1-0"));
    }

    #[test]
    fn black_to_move_start_uses_ellipsis() {
        let mut game =
            Game::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();
        game.apply_san("c5").unwrap();
        game.apply_san("Nf3").unwrap();
        assert_eq!(write(&game, &[]), "1... c5 2. Nf3 *");
    }
}
