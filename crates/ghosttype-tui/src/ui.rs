use ghosttype_core::{ChatMessage, ChatRole, RequestStatus};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::app::App;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c != '*' || chars.peek() != Some(&'*') {
            current_text.push(c);
            continue;
        }
        chars.next();

        let mut bold_text = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            bold_text.push(c);
        }

        if found_close && !bold_text.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(
                bold_text,
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            // No closing **, keep it literal
            current_text.push_str("**");
            current_text.push_str(&bold_text);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Rows `paragraph` occupies at `width` columns, using the same wrapping it is drawn with.
/// Measure before attaching a block, or the borders are counted too.
fn rendered_height(paragraph: &Paragraph, width: u16) -> u16 {
    paragraph.line_count(width).min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, suggestion_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_suggestion(app, frame, suggestion_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" ghosttype ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{}: {} ", app.provider.display_name(), app.chat_model),
            Style::default().fg(Color::White),
        ),
        Span::styled(format!("[{}] ", app.mode.as_str()), Style::default().fg(Color::Yellow)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn role_line(message: &ChatMessage) -> Line<'static> {
    let (label, color) = match message.role {
        ChatRole::User => ("You:", Color::Cyan),
        ChatRole::Assistant => ("AI:", Color::Yellow),
    };
    Line::from(vec![
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(
            format!(" {}", message.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// Transcript as display lines; the open reply shows "Thinking..." until its first fragment
fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let transcript = app.session.transcript();
    let thinking = app.session.status() == RequestStatus::Submitted;
    let mut lines: Vec<Line<'static>> = Vec::new();

    for (i, message) in transcript.messages().iter().enumerate() {
        lines.push(role_line(message));

        let is_last = i + 1 == transcript.len();
        if thinking && is_last && message.is_empty() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            match message.role {
                ChatRole::User => {
                    for line in message.text().lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                ChatRole::Assistant => {
                    for line in message.text().lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
        }
        lines.push(Line::default());
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let chat_text = if app.session.transcript().is_empty() {
        Text::from(Span::styled(
            "Start a conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(transcript_lines(app))
    };

    let chat = Paragraph::new(chat_text).wrap(Wrap { trim: false });
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    app.update_chat_viewport(rendered_height(&chat, inner_width), inner_height);

    let chat = chat.block(chat_block).scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

/// Input tail that fits next to the ghost text, then the ghost text itself
fn suggestion_line(input: &str, suggestion: &str, width: usize) -> Line<'static> {
    const HINT: &str = "  Tab to accept";
    let ghost = format!(" {}", suggestion);
    let budget = width.saturating_sub(ghost.chars().count() + HINT.len() + 1);

    let input_chars = input.chars().count();
    let shown: String = input.chars().skip(input_chars.saturating_sub(budget)).collect();

    Line::from(vec![
        Span::raw(" "),
        Span::styled(shown, Style::default().fg(Color::Cyan)),
        Span::styled(
            ghost,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
        Span::styled(HINT, Style::default().fg(Color::Gray)),
    ])
}

fn render_suggestion(app: &App, frame: &mut Frame, area: Rect) {
    let line = if app.suggestions.is_loading() {
        Line::from(Span::styled(
            " Generating suggestion...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else if let Some(suggestion) = app.visible_suggestion() {
        suggestion_line(&app.input, suggestion, area.width as usize)
    } else {
        Line::default()
    };

    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.session.status().accepts_submission() {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message (Enter to send) ");

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Scroll horizontally so the cursor stays visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn status_style(status: RequestStatus) -> Style {
    match status {
        RequestStatus::Idle | RequestStatus::Ready => Style::default().bg(Color::Blue).fg(Color::White),
        RequestStatus::Submitted | RequestStatus::Streaming => {
            Style::default().bg(Color::Yellow).fg(Color::Black)
        }
        RequestStatus::Error => Style::default().bg(Color::Red).fg(Color::White),
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.session.status();
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::Gray);

    let mut spans = vec![
        Span::styled(format!(" {} ", status.as_str().to_uppercase()), status_style(status)),
        Span::raw(" "),
    ];

    if let Some(notice) = &app.notice {
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Red)));
        spans.push(Span::raw(" "));
    } else if let Some(total) = app.session.last_usage().and_then(|u| u.total()) {
        let mut usage = format!("{} tokens", total);
        if let Some(reason) = app.session.last_finish_reason() {
            usage.push_str(&format!(" ({})", reason));
        }
        spans.push(Span::styled(usage, Style::default().fg(Color::DarkGray)));
        spans.push(Span::raw(" "));
    }

    for (key, label) in [("Tab", " accept "), ("Esc", " dismiss "), ("PgUp/PgDn", " scroll "), ("^C", " quit ")] {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
