use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::App;
use crate::tui::AppEvent;

const PAGE_LINES: u16 = 10;
const WHEEL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Suggestion(event) => app.apply_suggestion_event(event),
        AppEvent::Chat(event) => app.apply_chat_event(event),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char('c') = key.code {
            app.should_quit = true;
        }
        return;
    }

    match key.code {
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Tab => {
            app.accept_suggestion();
        }
        KeyCode::Enter => app.submit(),
        KeyCode::Esc => app.dismiss_suggestion(),
        KeyCode::PageUp => app.scroll_up(PAGE_LINES),
        KeyCode::PageDown => app.scroll_down(PAGE_LINES),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{test_app, ScriptedGateway};
    use crossterm::event::KeyEventKind;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn gateway() -> ScriptedGateway {
        ScriptedGateway {
            suggestion: "world",
            fragments: vec!["ok"],
            fail_chat: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_and_cursor_keys() {
        let (mut app, _rx) = test_app(gateway());
        for c in "helo".chars() {
            handle_event(&mut app, press(KeyCode::Char(c)));
        }
        handle_event(&mut app, press(KeyCode::Left));
        handle_event(&mut app, press(KeyCode::Char('l')));
        assert_eq!(app.input, "hello");

        handle_event(&mut app, press(KeyCode::Home));
        handle_event(&mut app, press(KeyCode::Delete));
        assert_eq!(app.input, "ello");
        assert_eq!(app.suggestions.state().query_text, "ello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ctrl_c_quits() {
        let (mut app, _rx) = test_app(gateway());
        let key = KeyEvent {
            code: KeyCode::Char('c'),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        };
        handle_event(&mut app, AppEvent::Key(key));
        assert!(app.should_quit);
        assert!(app.input.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_submits() {
        let (mut app, _rx) = test_app(gateway());
        for c in "hi".chars() {
            handle_event(&mut app, press(KeyCode::Char(c)));
        }
        handle_event(&mut app, press(KeyCode::Enter));
        assert!(app.input.is_empty());
        assert_eq!(app.session.transcript().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_keeps_state() {
        let (mut app, _rx) = test_app(gateway());
        for c in "draft".chars() {
            handle_event(&mut app, press(KeyCode::Char(c)));
        }
        handle_event(&mut app, AppEvent::Resize);
        assert_eq!(app.input, "draft");
        assert_eq!(app.input_cursor, 5);
        assert!(!app.should_quit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mouse_scroll_only_inside_chat() {
        let (mut app, _rx) = test_app(gateway());
        app.chat_area = Some(Rect::new(0, 1, 40, 10));
        app.update_chat_viewport(50, 10);

        let wheel = |column, row| {
            AppEvent::Mouse(MouseEvent {
                kind: MouseEventKind::ScrollUp,
                column,
                row,
                modifiers: KeyModifiers::NONE,
            })
        };
        handle_event(&mut app, wheel(5, 20));
        assert!(app.follow_output);

        handle_event(&mut app, wheel(5, 5));
        assert!(!app.follow_output);
        assert_eq!(app.chat_scroll, 40 - WHEEL_LINES);
    }
}
