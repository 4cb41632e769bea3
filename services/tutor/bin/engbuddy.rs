//! Terminal front-end for the EngBuddy tutor.
//!
//! This binary is the rendering layer only:
//! 1. Loads configuration from the environment.
//! 2. Initializes logging.
//! 3. Builds the conversation session and the playback board.
//! 4. Prints the log as it changes and forwards input, quick actions and
//!    playback requests to the core.

use anyhow::Context;
use engbuddy_core::{
    Config, MessageId, PlayOutcome, SessionEvent, SubmitOutcome,
    quick_actions::{INPUT_PLACEHOLDER_MARKER, QUICK_ACTIONS, QuickDispatch},
    session::Rejection,
};
use engbuddy_tutor::{render, state::AppState};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

enum Input {
    Quit,
    Help,
    QuickList,
    Quick(usize),
    Play(u64),
    Say(String),
    Invalid(&'static str),
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Input::Say(line.to_string());
        };
        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit"), _) => Input::Quit,
            (Some("help"), _) => Input::Help,
            (Some("quick"), None) => Input::QuickList,
            (Some("quick"), Some(n)) => match n.parse::<usize>() {
                Ok(n) if (1..=QUICK_ACTIONS.len()).contains(&n) => Input::Quick(n - 1),
                _ => Input::Invalid("빠른 질문 번호를 확인해주세요."),
            },
            (Some("play"), Some(n)) => match n.parse::<u64>() {
                Ok(id) => Input::Play(id),
                Err(_) => Input::Invalid("메시지 번호를 확인해주세요."),
            },
            _ => Input::Invalid("알 수 없는 명령어입니다. /help 를 입력해보세요."),
        }
    }
}

/// Listens for the `Ctrl+C` signal to shut down.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down...");
}

/// Re-renders the newest message on every log change.
async fn render_events(app: AppState) {
    let mut events = app.session.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::ScrollToNewest { newest, .. }) => {
                if let Some(message) = app.session.message(newest) {
                    render::print_message(&message, app.playback.state(newest));
                }
            }
            Ok(SessionEvent::BusyChanged(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Renderer fell behind the session");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn submit(app: &AppState, text: String) {
    let session = Arc::clone(&app.session);
    tokio::spawn(async move {
        if let SubmitOutcome::Rejected(Rejection::Busy) = session.submit(&text).await {
            render::print_notice("이전 질문에 대한 답변을 기다리는 중입니다.");
        }
    });
}

fn play(app: &AppState, id: MessageId) {
    let Some(message) = app.session.message(id) else {
        render::print_notice("해당 번호의 메시지가 없습니다.");
        return;
    };
    let playback = Arc::clone(&app.playback);
    let audible = app.audible;
    tokio::spawn(async move {
        match playback.play(&message).await {
            Ok(PlayOutcome::Started) if audible => println!("🔊 #{} 재생 중", message.id()),
            Ok(PlayOutcome::Started) => {
                render::print_notice("음성 출력 없이 빌드되어 재생되지 않습니다.")
            }
            Ok(PlayOutcome::Refused) => {
                render::print_notice("지금은 이 메시지를 재생할 수 없습니다.")
            }
            Err(e) => render::print_notice(e.user_message()),
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    if config.api_key.is_none() {
        warn!("No API key set (VITE_VAIT_API_KEY, GEMINI_API_KEY, API_KEY); requests will fail.");
    }
    info!(
        chat_model = %config.chat_model,
        speech_model = %config.speech_model,
        "Configuration loaded."
    );

    // --- 3. Build the Session ---
    let app = AppState::from_config(&config);

    // --- 4. Render and Read Input ---
    render::print_header();
    for message in app.session.messages() {
        render::print_message(&message, app.playback.state(message.id()));
    }
    tokio::spawn(render_events(app.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut draft: Option<&'static str> = None;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else { break };

        match Input::parse(&line) {
            Input::Quit => break,
            Input::Help => render::print_help(),
            Input::QuickList => render::print_quick_actions(),
            Input::Quick(index) => {
                if app.session.is_busy() {
                    render::print_notice("답변을 기다리는 중에는 빠른 질문을 쓸 수 없습니다.");
                    continue;
                }
                match QUICK_ACTIONS[index].dispatch() {
                    QuickDispatch::Submit(prompt) => submit(&app, prompt.to_string()),
                    QuickDispatch::Prefill(prompt) => {
                        println!("✏️  {}", prompt);
                        println!("    {} 부분에 들어갈 문장을 입력하세요.", INPUT_PLACEHOLDER_MARKER);
                        draft = Some(prompt);
                    }
                }
            }
            Input::Play(id) => play(&app, MessageId(id)),
            Input::Say(text) => {
                let text = match draft.take() {
                    Some(prompt) if !text.is_empty() => {
                        prompt.replace(INPUT_PLACEHOLDER_MARKER, &text)
                    }
                    _ => text,
                };
                submit(&app, text);
            }
            Input::Invalid(reason) => render::print_notice(reason),
        }
    }

    info!("EngBuddy has shut down.");
    Ok(())
}
