use std::env;
use std::error::Error;
use std::fs;
use std::sync::Arc;

use chess_annotator::storage::SAVED_PGN;
use chess_annotator::{
    AnalysisView, AppConfig, CacheMode, CancellationToken, EvalDisplay, EvaluationCache,
    EvaluationPoller, FileStorage, HttpClient, PollOutcome, Storage,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = env::args().skip(1);
    let Some(pgn_path) = args.next() else {
        eprintln!("usage: analyse <game.pgn | sample name> [config.json]");
        return Ok(());
    };

    // 1. Configuration and persisted state
    let config = match args.next() {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.storage_path)?);

    // 2. Service client and poller
    let client = HttpClient::new(&config.client);
    let cache = EvaluationCache::open(CacheMode::Analysis, storage.clone());
    let poller = Arc::new(EvaluationPoller::new(client.clone(), config.analysis.clone(), cache));
    let mut view = AnalysisView::open(poller, storage.clone());

    // 3. Load the game, from disk or else from the server's sample games
    let text = match fs::read_to_string(&pgn_path) {
        Ok(text) => text,
        Err(_) => client.fetch_pgn(&pgn_path, &CancellationToken::new()).await?,
    };
    // the same game as last run keeps its evaluations
    if storage.get(SAVED_PGN).as_deref() != Some(text.trim()) {
        view.load_pgn(&text)?;
    }
    let info = view.session().player_info().clone();
    println!("{} vs {} ({})", info.white, info.black, info.date);
    println!("------------------------------------------------");

    // 4. Step through every position
    loop {
        let outcome = view.evaluate_current().await;
        let display = EvalDisplay::project(&view.poller().published());
        let index = view.session().current_index();
        let san = usize::try_from(index)
            .ok()
            .and_then(|i| view.session().board().history().get(i))
            .map_or("start", |m| m.san.as_str());
        let note = match outcome {
            PollOutcome::Cached(_) => " (cached)",
            PollOutcome::Aborted { .. } => " (incomplete)",
            _ => "",
        };
        println!(
            "{:>3}. {:<8} {:>6}  bar {:>5.1}%{note}",
            index + 1,
            san,
            display.text,
            display.bar_percent
        );
        if !view.next() {
            break;
        }
    }

    println!("------------------------------------------------");
    println!("{}", view.session().status());
    Ok(())
}
