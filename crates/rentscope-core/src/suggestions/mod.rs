pub mod debouncer;

pub use debouncer::{DebounceState, IssuedRequest, KeystrokeEffect, SuggestionDebouncer};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::fetch::parse_suggestions;
use crate::models::{CoreError, CoreErrorKind, Operation, Suggestion};
use crate::sources::{ListingSource, call_source};

/// Drives a [`SuggestionDebouncer`] on tokio timers and publishes each
/// accepted batch through a watch channel.
pub struct SuggestionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    source: Arc<dyn ListingSource>,
    max_suggestions: usize,
    epoch: Instant,
    debouncer: Mutex<SuggestionDebouncer>,
    timer: Mutex<Option<AbortHandle>>,
    batches: watch::Sender<Vec<Suggestion>>,
}

impl SuggestionEngine {
    pub fn new(
        source: Arc<dyn ListingSource>,
        debounce: Duration,
        min_chars: usize,
        max_suggestions: usize,
    ) -> Self {
        let (batches, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(EngineInner {
                source,
                max_suggestions,
                epoch: Instant::now(),
                debouncer: Mutex::new(SuggestionDebouncer::new(debounce, min_chars)),
                timer: Mutex::new(None),
                batches,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Suggestion>> {
        self.inner.batches.subscribe()
    }

    pub fn current(&self) -> Vec<Suggestion> {
        self.inner.batches.borrow().clone()
    }

    /// Feeds one keystroke. Must be called from within a tokio runtime.
    pub async fn input(&self, text: &str) -> Result<(), CoreError> {
        let now = self.inner.elapsed();
        let effect = self.inner.lock_debouncer()?.keystroke(text, now);

        let mut timer = self.inner.lock_timer()?;
        if let Some(pending) = timer.take() {
            pending.abort();
        }

        match effect {
            KeystrokeEffect::Cleared => {
                self.inner.batches.send_replace(Vec::new());
            }
            KeystrokeEffect::Scheduled { seq, due_at } => {
                tracing::trace!(
                    seq,
                    due_at_ms = due_at.as_millis() as u64,
                    "suggestion request scheduled"
                );
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep_until(inner.epoch + due_at).await;
                    inner.fire();
                });
                *timer = Some(handle.abort_handle());
            }
        }
        Ok(())
    }
}

impl EngineInner {
    fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.epoch)
    }

    /// Issues the request in its own task; aborting the timer never cancels
    /// a request that already went out.
    fn fire(self: &Arc<Self>) {
        let request = match self.lock_debouncer() {
            Ok(mut debouncer) => debouncer.poll(self.elapsed()),
            Err(_) => None,
        };
        let Some(request) = request else {
            return;
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tracing::debug!(seq = request.seq, text = %request.text, "requesting suggestions");
            let text = request.text.clone();
            let outcome = call_source(
                Operation::Suggestions,
                Arc::clone(&inner.source),
                move |source: &dyn ListingSource| source.search_suggestions(&text),
            )
            .await
            .and_then(|raw| parse_suggestions(&raw, inner.max_suggestions));
            inner.resolve(request.seq, outcome);
        });
    }

    fn resolve(&self, seq: u64, outcome: Result<Vec<Suggestion>, CoreError>) {
        let Ok(mut debouncer) = self.lock_debouncer() else {
            return;
        };
        match outcome {
            Ok(batch) => {
                if debouncer.accept(seq) {
                    tracing::debug!(seq, count = batch.len(), "applying suggestions");
                    self.batches.send_replace(batch);
                } else {
                    tracing::debug!(seq, "discarding stale suggestions");
                }
            }
            Err(error) => {
                debouncer.fail(seq);
                tracing::debug!(
                    seq,
                    kind = ?error.kind,
                    message = %error.message,
                    "suggestion request failed; keeping previous list"
                );
            }
        }
    }

    fn lock_debouncer(&self) -> Result<MutexGuard<'_, SuggestionDebouncer>, CoreError> {
        self.debouncer.lock().map_err(|_| poisoned("suggestion debouncer"))
    }

    fn lock_timer(&self) -> Result<MutexGuard<'_, Option<AbortHandle>>, CoreError> {
        self.timer.lock().map_err(|_| poisoned("suggestion timer"))
    }
}

fn poisoned(what: &str) -> CoreError {
    CoreError::new(CoreErrorKind::Internal, format!("{what} mutex poisoned"))
        .during(Operation::Suggestions)
}
