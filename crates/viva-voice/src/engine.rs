//! `SpeechEngine`: the process-wide STT handle.
//!
//! Loading a Whisper model takes seconds, so the backend is built once, on first use
//! (or eagerly via [`SpeechEngine::preload`]), behind a single initialisation guard.
//! Every later call shares the same `Arc`.

use crate::error::VoiceResult;
use crate::stt::{create_stt, SttBackend, SttKind};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

type SttLoader = Box<dyn Fn() -> VoiceResult<Box<dyn SttBackend>> + Send + Sync>;

pub struct SpeechEngine {
    loader: SttLoader,
    backend: OnceCell<Arc<dyn SttBackend>>,
}

impl SpeechEngine {
    /// Lazy engine: `loader` runs at most once successfully. A failed load is retried on the next call.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> VoiceResult<Box<dyn SttBackend>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            backend: OnceCell::new(),
        }
    }

    /// Lazy engine for a configured backend kind.
    pub fn for_kind(kind: SttKind) -> Self {
        Self::new(move || create_stt(kind))
    }

    /// Engine around an already-built backend (tests, custom wiring).
    pub fn with_backend(backend: Arc<dyn SttBackend>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(backend);
        Self {
            loader: Box::new(|| {
                Err(crate::error::VoiceError::Config(
                    "engine was built with a fixed backend".to_string(),
                ))
            }),
            backend: cell,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.get().is_some()
    }

    /// The shared backend, loading it if needed. Blocking; call from a blocking context.
    pub fn get(&self) -> VoiceResult<Arc<dyn SttBackend>> {
        self.backend
            .get_or_try_init(|| {
                let started = Instant::now();
                info!("Loading speech engine...");
                let backend: Arc<dyn SttBackend> = Arc::from((self.loader)()?);
                info!(
                    backend = backend.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Speech engine ready"
                );
                Ok(backend)
            })
            .map(Arc::clone)
    }

    /// Force the one-time load now (e.g. at process start).
    pub fn preload(&self) -> VoiceResult<()> {
        self.get().map(|_| ())
    }
}

impl std::fmt::Debug for SpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechEngine")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use crate::stt::PlaceholderStt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn loader_runs_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let engine = SpeechEngine::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PlaceholderStt::with_response("ok")) as Box<dyn SttBackend>)
        });
        assert!(!engine.is_loaded());
        let a = engine.get().unwrap();
        let b = engine.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(engine.is_loaded());
    }

    #[test]
    fn failed_load_is_retried() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let engine = SpeechEngine::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(VoiceError::Stt("model missing".to_string()))
            } else {
                Ok(Box::new(PlaceholderStt::new()) as Box<dyn SttBackend>)
            }
        });
        assert!(engine.get().is_err());
        assert!(engine.preload().is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fixed_backend_is_already_loaded() {
        let engine = SpeechEngine::with_backend(Arc::new(PlaceholderStt::new()));
        assert!(engine.is_loaded());
        assert_eq!(engine.get().unwrap().name(), "placeholder");
    }
}
