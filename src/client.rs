//! HTTP client for the remote evaluation and move service.
//!
//! The service speaks two JSON endpoints:
//!
//! - `POST /get_ai_evaluation` with `{ "fen", "depth" }`, answering
//!   `{ "value", "type": "cp" | "mate", "depth" }`. Some deployments wrap the
//!   payload in an `evaluation` field instead; both shapes are accepted here
//!   so that callers only ever see an [`EvaluationResult`].
//! - `POST /get_ai_move` with `{ "fen", "skill" }`, answering `{ "move" }`
//!   as a UCI string, decoded into a [`MoveCommand`].
//!
//! Sample games are plain PGN text under `GET /static/pgns/<name>`.
//!
//! Nothing here retries. Cancellation drops the in-flight request.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::EvalError;
use crate::types::{EvaluationResult, MoveCommand, PositionKey, ScoreKind};

pub const EVALUATION_PATH: &str = "/get_ai_evaluation";
pub const MOVE_PATH: &str = "/get_ai_move";
pub const PGN_PATH: &str = "/static/pgns/";

/// One evaluation of one position at one depth.
pub trait EvaluationService: Send + Sync {
    fn request_evaluation(
        &self,
        position: &PositionKey,
        depth: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<EvaluationResult, EvalError>> + Send;
}

/// The computer opponent's move choice for a position.
pub trait MoveService: Send + Sync {
    fn request_move(
        &self,
        position: &PositionKey,
        skill: u8,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<MoveCommand, EvalError>> + Send;
}

impl<T: EvaluationService> EvaluationService for Arc<T> {
    fn request_evaluation(
        &self,
        position: &PositionKey,
        depth: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<EvaluationResult, EvalError>> + Send {
        (**self).request_evaluation(position, depth, cancel)
    }
}

impl<T: MoveService> MoveService for Arc<T> {
    fn request_move(
        &self,
        position: &PositionKey,
        skill: u8,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<MoveCommand, EvalError>> + Send {
        (**self).request_move(position, skill, cancel)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EvaluationRequest<'a> {
    fen: &'a str,
    depth: u32,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    fen: &'a str,
    skill: u8,
}

#[derive(Deserialize)]
struct EvaluationBody {
    value: Option<i32>,
    #[serde(rename = "type")]
    kind: Option<ScoreKind>,
    depth: Option<u32>,
    evaluation: Option<EvaluationField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EvaluationField {
    Centipawns(i32),
    Payload {
        value: i32,
        #[serde(rename = "type")]
        kind: Option<ScoreKind>,
        depth: Option<u32>,
    },
}

#[derive(Deserialize)]
struct MoveBody {
    #[serde(rename = "move")]
    mv: Option<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), &config.base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Fetch one of the sample games served under `/static/pgns/`.
    pub async fn fetch_pgn(&self, name: &str, cancel: &CancellationToken) -> Result<String, EvalError> {
        let url = format!("{}{PGN_PATH}{name}", self.base_url);
        debug!(%url, "fetching PGN");
        let bytes = self.send(self.http.get(&url), cancel).await?;
        String::from_utf8(bytes).map_err(|e| EvalError::MalformedResponse(e.to_string()))
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EvalError> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.post(&url).json(body), cancel).await
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<Vec<u8>, EvalError> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EvalError::ServiceError(status));
            }
            Ok(response.bytes().await?.to_vec())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EvalError::Cancelled),
            result = exchange => result,
        }
    }
}

impl EvaluationService for HttpClient {
    async fn request_evaluation(
        &self,
        position: &PositionKey,
        depth: u32,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, EvalError> {
        if depth == 0 {
            return Err(EvalError::InvalidDepth);
        }
        debug!(fen = %position, depth, "requesting evaluation");
        let body = EvaluationRequest {
            fen: position.as_str(),
            depth,
        };
        let bytes = self.post(EVALUATION_PATH, &body, cancel).await?;
        decode_evaluation(&bytes, depth)
    }
}

impl MoveService for HttpClient {
    async fn request_move(
        &self,
        position: &PositionKey,
        skill: u8,
        cancel: &CancellationToken,
    ) -> Result<MoveCommand, EvalError> {
        debug!(fen = %position, skill, "requesting computer move");
        let body = MoveRequest {
            fen: position.as_str(),
            skill,
        };
        let bytes = self.post(MOVE_PATH, &body, cancel).await?;
        decode_move(&bytes)
    }
}

/// Fold both response shapes into one result. A missing `depth` means the
/// service searched to the requested depth.
fn decode_evaluation(bytes: &[u8], requested_depth: u32) -> Result<EvaluationResult, EvalError> {
    let body: EvaluationBody =
        serde_json::from_slice(bytes).map_err(|e| EvalError::MalformedResponse(e.to_string()))?;

    let (value, kind, depth) = match (body.value, body.evaluation) {
        (Some(value), _) => (value, body.kind, body.depth),
        (None, Some(EvaluationField::Payload { value, kind, depth })) => {
            (value, kind.or(body.kind), depth.or(body.depth))
        }
        // a bare number is the older centipawn-only shape
        (None, Some(EvaluationField::Centipawns(value))) => {
            (value, body.kind.or(Some(ScoreKind::Centipawn)), body.depth)
        }
        (None, None) => {
            return Err(EvalError::MalformedResponse(
                "missing `value` and `evaluation`".to_owned(),
            ));
        }
    };

    Ok(EvaluationResult {
        kind: kind.unwrap_or(ScoreKind::Unknown),
        value,
        depth: depth.unwrap_or(requested_depth),
    })
}

fn decode_move(bytes: &[u8]) -> Result<MoveCommand, EvalError> {
    let body: MoveBody =
        serde_json::from_slice(bytes).map_err(|e| EvalError::MalformedResponse(e.to_string()))?;
    let text = body
        .mv
        .ok_or_else(|| EvalError::MalformedResponse("missing `move`".to_owned()))?;
    text.parse()
        .map_err(|e: crate::error::GameError| EvalError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use shakmaty::{Role, Square};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve one canned response and hand back the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (HttpClient, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        let client = HttpClient::with_client(Client::new(), &format!("http://{addr}/"));
        (client, handle)
    }

    #[tokio::test]
    async fn evaluation_round_trip() {
        let (client, server) =
            serve_once("200 OK", r#"{"value": 30, "type": "cp", "depth": 10}"#).await;
        let result = client
            .request_evaluation(&PositionKey::starting(), 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, EvaluationResult::centipawns(30, 10));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /get_ai_evaluation "));
        assert!(request.contains(r#""depth":10"#));
        assert!(request.contains(PositionKey::starting().as_str()));
    }

    #[tokio::test]
    async fn non_success_status_is_service_error() {
        let (client, _server) = serve_once("500 Internal Server Error", "{}").await;
        let err = client
            .request_evaluation(&PositionKey::starting(), 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ServiceError(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn missing_fields_are_malformed() {
        let (client, _server) = serve_once("200 OK", r#"{"type": "cp"}"#).await;
        let err = client
            .request_evaluation(&PositionKey::starting(), 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpClient::with_client(Client::new(), &format!("http://{addr}"));
        let err = client
            .request_evaluation(&PositionKey::starting(), 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn cancel_aborts_a_hanging_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let client = HttpClient::with_client(Client::new(), &format!("http://{addr}"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = client
            .request_evaluation(&PositionKey::starting(), 10, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Cancelled));
    }

    #[tokio::test]
    async fn zero_depth_is_rejected_locally() {
        let client = HttpClient::new(&ClientConfig::default());
        let err = client
            .request_evaluation(&PositionKey::starting(), 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidDepth));
    }

    #[tokio::test]
    async fn move_request_decodes_promotion() {
        let (client, server) = serve_once("200 OK", r#"{"move": "a7a8n"}"#).await;
        let mv = client
            .request_move(&PositionKey::starting(), 3, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mv, MoveCommand::new(Square::A7, Square::A8).with_promotion(Role::Knight));
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /get_ai_move "));
        assert!(request.contains(r#""skill":3"#));
    }

    #[tokio::test]
    async fn sample_pgn_is_fetched_as_text() {
        let (client, server) = serve_once("200 OK", "1. e4 e5 *").await;
        let text = client
            .fetch_pgn("opera.pgn", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "1. e4 e5 *");
        assert!(server.await.unwrap().starts_with("GET /static/pgns/opera.pgn "));

        let (client, _server) = serve_once("404 Not Found", "").await;
        let err = client
            .fetch_pgn("missing.pgn", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ServiceError(s) if s == StatusCode::NOT_FOUND));
    }

    #[test]
    fn wrapped_evaluation_shapes() {
        let nested = br#"{"evaluation": {"value": -3, "type": "mate", "depth": 14}}"#;
        assert_eq!(
            decode_evaluation(nested, 12).unwrap(),
            EvaluationResult::mate(-3, 14)
        );
        let scalar = br#"{"evaluation": 45}"#;
        assert_eq!(
            decode_evaluation(scalar, 12).unwrap(),
            EvaluationResult::centipawns(45, 12)
        );
    }

    #[test]
    fn missing_type_is_unknown_kind() {
        let r = decode_evaluation(br#"{"value": 12}"#, 8).unwrap();
        assert_eq!(r.kind, ScoreKind::Unknown);
        assert_eq!(r.depth, 8);
    }

    #[test]
    fn garbage_move_is_malformed() {
        assert!(matches!(
            decode_move(br#"{"move": "castle"}"#),
            Err(EvalError::MalformedResponse(_))
        ));
        assert!(matches!(
            decode_move(br#"{"move": null}"#),
            Err(EvalError::MalformedResponse(_))
        ));
    }
}
