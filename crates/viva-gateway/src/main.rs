//! Viva gateway: voice interview API on `bind_addr:port` (default 127.0.0.1:8000).
//!
//! `viva-gateway --register <email> [name…]` adds a candidate to the registry and exits.

mod routes;

use routes::{build_router, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viva_core::{InterviewConfig, InterviewController};
use viva_voice::{FfmpegTranscoder, TranscoderKind};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[viva-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = match InterviewConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[viva-gateway] {}", e);
            std::process::exit(1);
        }
    };

    let controller = match InterviewController::from_config(&cfg) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--register") {
        let email = args.get(pos + 1).cloned().unwrap_or_default();
        let name = args.get(pos + 2..).map(|rest| rest.join(" ")).filter(|n| !n.trim().is_empty());
        if email.trim().is_empty() {
            eprintln!("Usage: viva-gateway --register <email> [name...]");
            std::process::exit(1);
        }
        match controller.records().register_candidate(&email, name.as_deref()) {
            Ok(candidate) => {
                println!("Registered {} as {}", candidate.email, candidate.id);
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Registration failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    match controller.reconcile() {
        Ok(report) if report.failed > 0 => {
            tracing::warn!(failed = report.failed, "some answers are still waiting to be mirrored")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("outbox reconciliation failed: {}", e),
    }

    if cfg.transcoder == TranscoderKind::Ffmpeg {
        match FfmpegTranscoder::new(&cfg.ffmpeg_path).probe().await {
            Ok(version) => tracing::info!("{}", version),
            Err(e) => tracing::warn!("ffmpeg unavailable, answer uploads will fail: {}", e),
        }
    }

    if cfg.preload_stt {
        let engine = controller.speech_engine();
        match tokio::task::spawn_blocking(move || engine.preload()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("speech engine preload failed, will retry on first answer: {}", e),
            Err(e) => tracing::warn!("speech engine preload task failed: {}", e),
        }
    }

    if let Err(e) = std::fs::create_dir_all(cfg.local_blob_dir()) {
        tracing::warn!(dir = %cfg.static_dir.display(), "cannot create static dir: {}", e);
    }

    let state = Arc::new(AppState { controller });
    let app = build_router(state, &cfg);

    let addr = cfg.socket_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("viva gateway listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
    {
        tracing::error!("server error: {}", e);
    }
}
