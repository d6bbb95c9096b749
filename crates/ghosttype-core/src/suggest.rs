//! Debounced inline suggestions
//!
//! Every input change bumps the request id, drops the displayed suggestion and
//! restarts a quiet-period timer. Only when the timer fires for the latest id is
//! a completion fetched, and its result is applied only if the id is still
//! current. Superseded timers and fetches are aborted, but the id comparison is
//! what keeps a late result off the screen.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ai::{CompletionRequest, ModelGateway};
use crate::events::{EventSink, SuggestionEvent};
use crate::prompts::COMPLETION_SYSTEM_PROMPT;
use crate::state::SuggestionState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct SuggestionSettings {
    /// Quiet period after the last keystroke before fetching
    pub debounce: Duration,
    /// A fetch is scheduled only for inputs longer than this many characters
    pub min_query_chars: usize,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl SuggestionSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_query_chars: DEFAULT_MIN_QUERY_CHARS,
            model: model.into(),
            system_prompt: COMPLETION_SYSTEM_PROMPT.to_string(),
            temperature: 0.9,
            max_tokens: 250,
        }
    }
}

pub struct SuggestionController {
    state: SuggestionState,
    settings: SuggestionSettings,
    gateway: Arc<dyn ModelGateway>,
    sink: EventSink<SuggestionEvent>,
    timer: Option<JoinHandle<()>>,
    fetch: Option<JoinHandle<()>>,
}

impl SuggestionController {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        settings: SuggestionSettings,
        sink: EventSink<SuggestionEvent>,
    ) -> Self {
        Self {
            state: SuggestionState::default(),
            settings,
            gateway,
            sink,
            timer: None,
            fetch: None,
        }
    }

    pub fn state(&self) -> &SuggestionState {
        &self.state
    }

    pub fn settings(&self) -> &SuggestionSettings {
        &self.settings
    }

    /// A fetch is in flight for the current request
    pub fn is_loading(&self) -> bool {
        self.state.pending
    }

    /// Record new input text and restart the debounce cycle
    pub fn input_changed(&mut self, text: &str) {
        self.invalidate();
        self.state.query_text = text.to_string();

        if text.chars().count() > self.settings.min_query_chars {
            self.schedule(text.to_string());
        }
    }

    /// Append the suggestion to `input`, separated by one space, and start a new
    /// cycle with the merged text. Returns the merged text, or `None` when there is
    /// nothing to accept.
    pub fn accept(&mut self, input: &str) -> Option<String> {
        let suggestion = self
            .state
            .suggestion
            .as_deref()
            .filter(|s| !s.is_empty() && !input.ends_with(s))?;

        let merged = format!("{} {}", input, suggestion);
        debug!(request_id = self.state.request_id, "suggestion accepted");
        self.input_changed(&merged);
        Some(merged)
    }

    /// Stop any scheduled or in-flight fetch and clear the displayed suggestion
    pub fn cancel(&mut self) {
        self.invalidate();
    }

    /// Suggestion to display next to `input`, if any
    pub fn visible_suggestion(&self, input: &str) -> Option<&str> {
        self.state
            .suggestion
            .as_deref()
            .filter(|s| input.chars().count() > self.settings.min_query_chars && !input.ends_with(s))
    }

    /// Apply a timer fire or fetch result
    pub fn handle(&mut self, event: SuggestionEvent) {
        if event.request_id() != self.state.request_id {
            debug!(
                request_id = event.request_id(),
                current = self.state.request_id,
                "stale suggestion event discarded"
            );
            return;
        }

        match event {
            SuggestionEvent::DebounceElapsed { request_id, query } => {
                self.timer = None;
                self.start_fetch(request_id, query);
            }
            SuggestionEvent::Resolved { request_id, result } => {
                self.fetch = None;
                self.state.pending = false;
                match result {
                    Ok(text) => {
                        let text = text.trim();
                        debug!(request_id, chars = text.chars().count(), "suggestion received");
                        self.state.suggestion = (!text.is_empty()).then(|| text.to_string());
                    }
                    Err(err) => {
                        warn!(request_id, "suggestion fetch failed: {}", err);
                        self.state.suggestion = None;
                    }
                }
            }
        }
    }

    fn invalidate(&mut self) {
        self.state.request_id += 1;
        self.state.suggestion = None;
        self.state.pending = false;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
    }

    fn schedule(&mut self, query: String) {
        let request_id = self.state.request_id;
        let delay = self.settings.debounce;
        let sink = self.sink.clone();

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink(SuggestionEvent::DebounceElapsed { request_id, query });
        }));
    }

    fn start_fetch(&mut self, request_id: u64, query: String) {
        debug!(request_id, "fetching suggestion");
        self.state.pending = true;

        let gateway = self.gateway.clone();
        let sink = self.sink.clone();
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system: self.settings.system_prompt.clone(),
            prompt: query,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        self.fetch = Some(tokio::spawn(async move {
            let result = gateway.complete(request).await;
            sink(SuggestionEvent::Resolved { request_id, result });
        }));
    }
}

impl Drop for SuggestionController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fake::FakeGateway;
    use crate::error::GatewayError;
    use crate::events::channel_sink;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn controller(gateway: FakeGateway) -> (SuggestionController, UnboundedReceiver<SuggestionEvent>, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SuggestionController::new(
            gateway.clone(),
            SuggestionSettings::new("fake-model"),
            channel_sink(tx),
        );
        (controller, rx, gateway)
    }

    /// Feed events back until the controller settles or nothing more arrives
    async fn drive(controller: &mut SuggestionController, rx: &mut UnboundedReceiver<SuggestionEvent>) -> usize {
        let mut handled = 0;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            controller.handle(event);
            handled += 1;
        }
        handled
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_keystrokes_fetches_once_with_final_text() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("sat on the mat"));

        controller.input_changed("the ca");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.input_changed("the cat");

        drive(&mut controller, &mut rx).await;

        assert_eq!(gateway.queries(), vec!["the cat"]);
        assert_eq!(controller.state().suggestion.as_deref(), Some("sat on the mat"));
        assert!(!controller.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_rapid_keystrokes_coalesce() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("x"));

        let text = "hello world";
        for end in 1..=text.len() {
            controller.input_changed(&text[..end]);
            tokio::time::sleep(Duration::from_millis(299)).await;
        }
        drive(&mut controller, &mut rx).await;

        assert_eq!(gateway.queries(), vec!["hello world"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_pauses_fetch_separately() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("x"));

        controller.input_changed("first");
        drive(&mut controller, &mut rx).await;
        controller.input_changed("first second");
        drive(&mut controller, &mut rx).await;

        assert_eq!(gateway.queries(), vec!["first", "first second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_input_never_fetches() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("x"));

        controller.input_changed("abc");
        assert_eq!(drive(&mut controller, &mut rx).await, 0);
        assert!(gateway.queries().is_empty());
        assert_eq!(controller.state().query_text, "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let gateway = FakeGateway {
            completion_reply: Some("cat".to_string()),
            completion_delay: Duration::from_secs(1),
            ..Default::default()
        };
        let (mut controller, mut rx, gateway) = controller(gateway);

        controller.input_changed("abcd");
        let fired = rx.recv().await.unwrap();
        let stale_id = fired.request_id();
        controller.handle(fired);
        assert!(controller.is_loading());
        tokio::task::yield_now().await;

        controller.input_changed("abcde");
        assert!(!controller.is_loading());

        // the superseded fetch may still complete; its result must not show
        controller.handle(SuggestionEvent::Resolved {
            request_id: stale_id,
            result: Ok("cat".to_string()),
        });
        assert_eq!(controller.state().suggestion, None);

        drive(&mut controller, &mut rx).await;
        assert_eq!(gateway.queries().last().map(String::as_str), Some("abcde"));
        assert_eq!(controller.state().suggestion.as_deref(), Some("cat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_merges_and_chains() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("  sat down  "));

        controller.input_changed("the cat");
        drive(&mut controller, &mut rx).await;
        assert_eq!(controller.visible_suggestion("the cat"), Some("sat down"));

        let merged = controller.accept("the cat").unwrap();
        assert_eq!(merged, "the cat sat down");
        assert_eq!(controller.state().suggestion, None);
        assert_eq!(controller.state().query_text, "the cat sat down");

        drive(&mut controller, &mut rx).await;
        assert_eq!(gateway.queries(), vec!["the cat", "the cat sat down"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_rejected_without_usable_suggestion() {
        let (mut controller, mut rx, _gateway) = controller(FakeGateway::replying("mat"));

        assert_eq!(controller.accept("the cat"), None);

        controller.input_changed("on the mat");
        drive(&mut controller, &mut rx).await;
        assert_eq!(controller.state().suggestion.as_deref(), Some("mat"));
        // input already ends with the suggestion
        assert_eq!(controller.accept("on the mat"), None);
        assert_eq!(controller.visible_suggestion("on the mat"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scheduled_fetch() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::replying("x"));

        controller.input_changed("send this now");
        controller.cancel();

        assert_eq!(drive(&mut controller, &mut rx).await, 0);
        assert!(gateway.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_ignores_result() {
        let gateway = FakeGateway {
            completion_reply: Some("late".to_string()),
            completion_delay: Duration::from_millis(500),
            ..Default::default()
        };
        let (mut controller, mut rx, _gateway) = controller(gateway);

        controller.input_changed("hello there");
        let fired = rx.recv().await.unwrap();
        let id = fired.request_id();
        controller.handle(fired);
        controller.cancel();

        controller.handle(SuggestionEvent::Resolved {
            request_id: id,
            result: Ok("late".to_string()),
        });
        assert_eq!(controller.state().suggestion, None);
        assert!(!controller.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_clears_state() {
        let (mut controller, mut rx, gateway) = controller(FakeGateway::default());

        controller.input_changed("hello there");
        drive(&mut controller, &mut rx).await;

        assert_eq!(gateway.queries().len(), 1);
        assert_eq!(controller.state().suggestion, None);
        assert!(!controller.is_loading());
    }

    #[test]
    fn test_visible_suggestion_respects_min_length() {
        let (tx, _rx) = mpsc::unbounded_channel::<SuggestionEvent>();
        let mut controller = SuggestionController::new(
            Arc::new(FakeGateway::default()),
            SuggestionSettings::new("fake-model"),
            channel_sink(tx),
        );
        controller.state.suggestion = Some("more".to_string());

        assert_eq!(controller.visible_suggestion("abc"), None);
        assert_eq!(controller.visible_suggestion("abcd"), Some("more"));
        assert_eq!(controller.visible_suggestion("abcd more"), None);
    }

    #[test]
    fn test_error_result_is_not_a_suggestion() {
        let (tx, _rx) = mpsc::unbounded_channel::<SuggestionEvent>();
        let mut controller = SuggestionController::new(
            Arc::new(FakeGateway::default()),
            SuggestionSettings::new("fake-model"),
            channel_sink(tx),
        );
        let id = controller.state().request_id;
        controller.state.pending = true;
        controller.handle(SuggestionEvent::Resolved {
            request_id: id,
            result: Err(GatewayError::Malformed("bad json".to_string())),
        });

        assert_eq!(controller.state().suggestion, None);
        assert!(!controller.is_loading());
    }
}
