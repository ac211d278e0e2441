use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rentscope_core::models::{CoreError, CoreErrorKind, Suggestion};
use rentscope_core::sources::{ListingSource, SourceResult};
use rentscope_core::suggestions::{KeystrokeEffect, SuggestionDebouncer, SuggestionEngine};

/// Answers suggestion requests from a fixed script and records every call.
struct ScriptedSource {
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl ListingSource for ScriptedSource {
    fn search_listings(&self, _query_string: &str) -> SourceResult<String> {
        unreachable!("suggestion tests never fetch listings")
    }

    fn search_suggestions(&self, text: &str) -> SourceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(text.to_string());
        match text {
            "bo" => {
                // Slow enough to resolve after the follow-up request.
                std::thread::sleep(Duration::from_millis(300));
                Ok(r#"{"cities":["Boise"],"states":[]}"#.to_string())
            }
            "down" => Err(CoreError::new(CoreErrorKind::Transport, "connection reset")),
            _ => Ok(r#"{"cities":["Boston","Boston"],"states":["Bolivar"," "]}"#.to_string()),
        }
    }

    fn favorites(&self) -> SourceResult<String> {
        unreachable!("suggestion tests never fetch favorites")
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn debouncer_issues_one_request_for_the_last_keystroke() {
    let mut debouncer = SuggestionDebouncer::new(ms(300), 2);
    let keystrokes = [(0, "bo"), (50, "bos"), (100, "bost"), (350, "boston")];

    let mut issued = Vec::new();
    for now in 0..=1_000u64 {
        if let Some((_, text)) = keystrokes.iter().find(|(at, _)| *at == now) {
            let effect = debouncer.keystroke(text, ms(now));
            assert!(matches!(effect, KeystrokeEffect::Scheduled { .. }));
        }
        if let Some(request) = debouncer.poll(ms(now)) {
            issued.push((now, request));
        }
    }

    assert_eq!(issued.len(), 1);
    let (fired_at, request) = &issued[0];
    assert_eq!(*fired_at, 350 + 300);
    assert_eq!(request.text, "boston");
    assert!(debouncer.accept(request.seq));
}

#[tokio::test(start_paused = true)]
async fn engine_debounces_keystrokes_into_a_single_request() {
    let source = ScriptedSource::new();
    let engine = SuggestionEngine::new(source.clone(), ms(300), 2, 8);
    let mut batches = engine.subscribe();

    engine.input("bos").await.unwrap();
    tokio::time::advance(ms(50)).await;
    engine.input("bost").await.unwrap();
    tokio::time::advance(ms(50)).await;
    engine.input("bosto").await.unwrap();
    tokio::time::advance(ms(250)).await;
    engine.input("boston").await.unwrap();

    tokio::time::advance(ms(299)).await;
    assert_eq!(source.calls(), 0);

    batches.changed().await.unwrap();
    assert_eq!(source.requested(), vec!["boston"]);
    assert_eq!(
        *batches.borrow(),
        vec![Suggestion::city("Boston"), Suggestion::state("Bolivar")]
    );
}

#[tokio::test(start_paused = true)]
async fn short_input_clears_without_a_request() {
    let source = ScriptedSource::new();
    let engine = SuggestionEngine::new(source.clone(), ms(300), 2, 8);
    let mut batches = engine.subscribe();

    engine.input("boston").await.unwrap();
    batches.changed().await.unwrap();
    assert_eq!(engine.current().len(), 2);

    engine.input(" b ").await.unwrap();
    assert!(engine.current().is_empty());

    tokio::time::sleep(ms(1_000)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_request_keeps_previous_list() {
    let source = ScriptedSource::new();
    let engine = SuggestionEngine::new(source.clone(), ms(300), 2, 8);
    let mut batches = engine.subscribe();

    engine.input("boston").await.unwrap();
    batches.changed().await.unwrap();

    engine.input("down").await.unwrap();
    while source.calls() < 2 {
        tokio::time::sleep(ms(50)).await;
    }
    // Let the failed response be processed.
    tokio::time::sleep(ms(50)).await;

    assert_eq!(source.requested(), vec!["boston", "down"]);
    assert_eq!(engine.current()[0], Suggestion::city("Boston"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_response_for_an_older_request_is_discarded() {
    let source = ScriptedSource::new();
    let engine = SuggestionEngine::new(source.clone(), ms(10), 2, 8);
    let mut batches = engine.subscribe();

    engine.input("bo").await.unwrap();
    while source.calls() < 1 {
        tokio::time::sleep(ms(5)).await;
    }
    engine.input("bos").await.unwrap();

    batches.changed().await.unwrap();
    assert_eq!(engine.current()[0], Suggestion::city("Boston"));

    // The "bo" response lands ~300ms after it was issued.
    tokio::time::sleep(ms(500)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(engine.current()[0], Suggestion::city("Boston"));
    assert!(!batches.has_changed().unwrap());
}
