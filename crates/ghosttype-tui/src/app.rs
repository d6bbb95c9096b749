use std::sync::Arc;

use ghosttype_core::ai::ChatRequest;
use ghosttype_core::{
    channel_sink, spawn_turn, ChatEvent, ChatMode, ChatSession, EventSink, ModelGateway, Provider,
    SuggestionController, SuggestionEvent, SuggestionSettings,
};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::tui::AppEvent;

/// Everything the front-end needs to start a session
pub struct AppOptions {
    pub provider: Provider,
    pub chat_model: String,
    pub mode: ChatMode,
    pub system_prompt: String,
    pub chat_gateway: Arc<dyn ModelGateway>,
    pub completion_gateway: Arc<dyn ModelGateway>,
    pub suggestion_settings: SuggestionSettings,
}

pub struct App {
    pub should_quit: bool,

    // Input line; cursor is a character index
    pub input: String,
    pub input_cursor: usize,

    pub session: ChatSession,
    pub suggestions: SuggestionController,

    pub provider: Provider,
    pub chat_model: String,
    pub mode: ChatMode,
    system_prompt: String,
    gateway: Arc<dyn ModelGateway>,
    chat_sink: EventSink<ChatEvent>,

    // Transcript viewport, updated on every render
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub chat_area: Option<Rect>,
    /// Keep the newest output in view until the user scrolls up
    pub follow_output: bool,

    pub animation_frame: u8,
    /// Last surfaced chat error
    pub notice: Option<String>,
}

impl App {
    pub fn new(options: AppOptions, events: UnboundedSender<AppEvent>) -> Self {
        let suggestion_sink: EventSink<SuggestionEvent> = channel_sink(events.clone());
        let suggestions = SuggestionController::new(
            options.completion_gateway,
            options.suggestion_settings,
            suggestion_sink,
        );

        Self {
            should_quit: false,
            input: String::new(),
            input_cursor: 0,
            session: ChatSession::new(),
            suggestions,
            provider: options.provider,
            chat_model: options.chat_model,
            mode: options.mode,
            system_prompt: options.system_prompt,
            gateway: options.chat_gateway,
            chat_sink: channel_sink(events),
            chat_scroll: 0,
            chat_max_scroll: 0,
            chat_area: None,
            follow_output: true,
            animation_frame: 0,
            notice: None,
        }
    }

    pub fn insert_char(&mut self, c: char) {
        let idx = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(idx, c);
        self.input_cursor += 1;
        self.suggestions.input_changed(&self.input);
    }

    pub fn backspace(&mut self) {
        if self.input_cursor == 0 {
            return;
        }
        self.input_cursor -= 1;
        let idx = char_to_byte_index(&self.input, self.input_cursor);
        self.input.remove(idx);
        self.suggestions.input_changed(&self.input);
    }

    pub fn delete(&mut self) {
        if self.input_cursor >= self.input.chars().count() {
            return;
        }
        let idx = char_to_byte_index(&self.input, self.input_cursor);
        self.input.remove(idx);
        self.suggestions.input_changed(&self.input);
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.input_cursor = (self.input_cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }

    /// Suggestion that fits the current input, if one should be shown
    pub fn visible_suggestion(&self) -> Option<&str> {
        self.suggestions.visible_suggestion(&self.input)
    }

    /// Merge the shown suggestion into the input. Returns false when there was none.
    pub fn accept_suggestion(&mut self) -> bool {
        if self.visible_suggestion().is_none() {
            return false;
        }
        match self.suggestions.accept(&self.input) {
            Some(merged) => {
                self.input = merged;
                self.cursor_end();
                true
            }
            None => false,
        }
    }

    pub fn dismiss_suggestion(&mut self) {
        self.suggestions.cancel();
    }

    /// Send the input as a chat turn. A rejected send leaves the input untouched.
    pub fn submit(&mut self) {
        let turn = match self.session.send(&self.input) {
            Ok(turn) => turn,
            Err(reason) => {
                debug!("submission ignored: {}", reason);
                return;
            }
        };

        let request = ChatRequest {
            model: self.chat_model.clone(),
            system: Some(self.system_prompt.clone()),
            messages: turn.history,
        };
        spawn_turn(
            self.mode,
            self.gateway.clone(),
            turn.id,
            request,
            self.chat_sink.clone(),
        );

        self.input.clear();
        self.input_cursor = 0;
        self.suggestions.cancel();
        self.notice = None;
        self.scroll_to_bottom();
    }

    pub fn apply_chat_event(&mut self, event: ChatEvent) {
        self.session.apply(event);

        if let Some(error) = self.session.acknowledge_error() {
            self.notice = Some(format!("Error: {}", error));
        }
    }

    pub fn apply_suggestion_event(&mut self, event: SuggestionEvent) {
        self.suggestions.handle(event);
    }

    /// Animate the "Thinking..." indicator while waiting for the first fragment
    pub fn tick_animation(&mut self) {
        if self.session.status().is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_output = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.chat_max_scroll);
        if self.chat_scroll >= self.chat_max_scroll {
            self.follow_output = true;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_output = true;
        self.chat_scroll = self.chat_max_scroll;
    }

    /// Clamp the viewport after the transcript was laid out with `total_lines` rows
    pub fn update_chat_viewport(&mut self, total_lines: u16, visible_height: u16) {
        self.chat_max_scroll = total_lines.saturating_sub(visible_height);
        if self.follow_output {
            self.chat_scroll = self.chat_max_scroll;
        } else {
            self.chat_scroll = self.chat_scroll.min(self.chat_max_scroll);
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
