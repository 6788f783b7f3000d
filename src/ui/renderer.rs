use ratatui::{
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::core::message::Role;
use crate::core::session::ChatSession;
use crate::ui::theme::Theme;

pub const CURSOR_GLYPH: &str = "█";
pub const TYPING_INDICATOR: &str = "Assistant is typing...";
pub const HELP_TEXT: &str = "Enter to send · Esc or Ctrl+C to quit";
pub const QUIT_HINT: &str = "Press Esc or Ctrl+C to quit.";

/// Build the full view for `session`. Pure: same inputs, same lines.
pub fn render_lines(session: &ChatSession, theme: &Theme) -> Vec<Line<'static>> {
    if let Some(fatal) = session.fatal_error() {
        return vec![
            Line::from(Span::styled(format!("Error: {fatal}"), theme.error_style)),
            Line::default(),
            Line::from(Span::styled(QUIT_HINT, theme.help_style)),
        ];
    }

    let mut lines = Vec::new();

    let title = format!("parley · {}", session.model());
    let rule = "=".repeat(title.chars().count());
    lines.push(Line::from(Span::styled(title, theme.title_style)));
    lines.push(Line::from(Span::styled(rule, theme.title_style)));
    lines.push(Line::default());

    for message in session.messages() {
        let (prefix_style, text_style) = match message.role {
            Role::User => (theme.user_prefix_style, theme.user_text_style),
            Role::Assistant => (theme.assistant_prefix_style, theme.assistant_text_style),
        };
        lines.extend(labelled_lines(
            message.role.label(),
            prefix_style,
            &message.content,
            text_style,
        ));
        lines.push(Line::default());
    }

    if session.is_loading() {
        if session.is_streaming() && !session.partial().is_empty() {
            let mut partial = labelled_lines(
                Role::Assistant.label(),
                theme.assistant_prefix_style,
                session.partial(),
                theme.assistant_text_style,
            );
            if let Some(last) = partial.last_mut() {
                last.spans
                    .push(Span::styled(CURSOR_GLYPH, theme.streaming_indicator_style));
            }
            lines.extend(partial);
        } else {
            lines.push(Line::from(Span::styled(
                TYPING_INDICATOR,
                theme.streaming_indicator_style,
            )));
        }
        lines.push(Line::default());
    }

    if let Some(error) = session.error() {
        lines.push(Line::from(Span::styled(
            format!("Error: {error}"),
            theme.error_style,
        )));
        lines.push(Line::default());
    }

    let mut input_line = vec![
        Span::styled(format!("{}: ", Role::User.label()), theme.input_prefix_style),
        Span::styled(session.input().to_string(), theme.input_text_style),
    ];
    if !session.is_loading() {
        input_line.push(Span::styled(CURSOR_GLYPH, theme.input_cursor_style));
    }
    lines.push(Line::from(input_line));
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(HELP_TEXT, theme.help_style)));

    lines
}

/// Plain-text form of [`render_lines`], without styling.
pub fn render_text(session: &ChatSession, theme: &Theme) -> String {
    render_lines(session, theme)
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn labelled_lines(label: &str, label_style: Style, text: &str, text_style: Style) -> Vec<Line<'static>> {
    let mut content_lines = text.split('\n');
    let first = content_lines.next().unwrap_or_default();

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{label}: "), label_style),
        Span::styled(first.to_string(), text_style),
    ])];
    lines.extend(content_lines.map(|line| Line::from(Span::styled(line.to_string(), text_style))));
    lines
}

/// Draw the view, hard-wrapped to the frame width and scrolled so the bottom
/// of the conversation (and the input line) stays visible.
pub fn ui(f: &mut Frame, session: &ChatSession, theme: &Theme) {
    let area = f.area();
    f.render_widget(
        Block::default().style(Style::default().bg(theme.background_color)),
        area,
    );

    let lines: Vec<Line<'static>> = render_lines(session, theme)
        .into_iter()
        .flat_map(|line| wrap_line(line, area.width as usize))
        .collect();
    let overflow = lines.len().saturating_sub(area.height as usize);
    let scroll = u16::try_from(overflow).unwrap_or(u16::MAX);

    f.render_widget(Paragraph::new(lines).scroll((scroll, 0)), area);
}

fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![line];
    }

    let mut rows = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut row_width = 0;

    for span in line.spans {
        let mut chunk = String::new();
        for c in span.content.chars() {
            let char_width = c.width().unwrap_or(0);
            if row_width + char_width > width && row_width > 0 {
                if !chunk.is_empty() {
                    row.push(Span::styled(std::mem::take(&mut chunk), span.style));
                }
                rows.push(Line::from(std::mem::take(&mut row)));
                row_width = 0;
            }
            chunk.push(c);
            row_width += char_width;
        }
        if !chunk.is_empty() {
            row.push(Span::styled(chunk, span.style));
        }
    }
    rows.push(Line::from(row));
    rows
}
