use ratatui::style::{Color, Modifier, Style};
use tracing::warn;

/// Immutable set of styles used by the renderer. Built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    // Overall background color to paint the full frame
    pub background_color: Color,

    pub title_style: Style,
    pub user_prefix_style: Style,
    pub user_text_style: Style,
    pub assistant_prefix_style: Style,
    pub assistant_text_style: Style,
    pub streaming_indicator_style: Style,
    pub error_style: Style,

    // Input line and footer
    pub input_prefix_style: Style,
    pub input_text_style: Style,
    pub input_cursor_style: Style,
    pub help_style: Style,
}

impl Theme {
    pub fn dark_default() -> Self {
        Theme {
            background_color: Color::Reset,
            title_style: Style::default()
                .fg(Color::Rgb(0x7c, 0x3a, 0xed))
                .add_modifier(Modifier::BOLD),
            user_prefix_style: Style::default()
                .fg(Color::Rgb(0x10, 0xb9, 0x81))
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default(),
            assistant_prefix_style: Style::default()
                .fg(Color::Rgb(0x3b, 0x82, 0xf6))
                .add_modifier(Modifier::BOLD),
            assistant_text_style: Style::default(),
            streaming_indicator_style: Style::default()
                .fg(Color::Rgb(0x3b, 0x82, 0xf6))
                .add_modifier(Modifier::BOLD),
            error_style: Style::default()
                .fg(Color::Rgb(0xef, 0x44, 0x44))
                .add_modifier(Modifier::BOLD),

            input_prefix_style: Style::default()
                .fg(Color::Rgb(0xf5, 0x9e, 0x0b))
                .add_modifier(Modifier::BOLD),
            input_text_style: Style::default(),
            input_cursor_style: Style::default()
                .fg(Color::Rgb(0xf5, 0x9e, 0x0b))
                .add_modifier(Modifier::BOLD),
            help_style: Style::default()
                .fg(Color::Rgb(0x6b, 0x72, 0x80))
                .add_modifier(Modifier::ITALIC),
        }
    }

    pub fn light() -> Self {
        Theme {
            background_color: Color::White,
            title_style: Style::default()
                .fg(Color::Rgb(0x5b, 0x21, 0xb6))
                .add_modifier(Modifier::BOLD),
            user_prefix_style: Style::default()
                .fg(Color::Rgb(0x04, 0x78, 0x57))
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Black),
            assistant_prefix_style: Style::default()
                .fg(Color::Rgb(0x1d, 0x4e, 0xd8))
                .add_modifier(Modifier::BOLD),
            assistant_text_style: Style::default().fg(Color::Black),
            streaming_indicator_style: Style::default()
                .fg(Color::Rgb(0x1d, 0x4e, 0xd8))
                .add_modifier(Modifier::BOLD),
            error_style: Style::default()
                .fg(Color::Rgb(0xb9, 0x1c, 0x1c))
                .add_modifier(Modifier::BOLD),

            input_prefix_style: Style::default()
                .fg(Color::Rgb(0xb4, 0x53, 0x09))
                .add_modifier(Modifier::BOLD),
            input_text_style: Style::default().fg(Color::Black),
            input_cursor_style: Style::default()
                .fg(Color::Rgb(0xb4, 0x53, 0x09))
                .add_modifier(Modifier::BOLD),
            help_style: Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "dark" | "default" | "default-dark" => Self::dark_default(),
            "light" => Self::light(),
            other => {
                warn!(theme = other, "unknown theme; falling back to dark");
                Self::dark_default()
            }
        }
    }
}
