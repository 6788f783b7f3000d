use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::session::KeyInput;

/// Resolve a terminal key event. Keys with no meaning in the chat view map to
/// `None`.
pub fn resolve_key(key: &KeyEvent) -> Option<KeyInput> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Char('c') if ctrl => Some(KeyInput::Quit),
        KeyCode::Esc => Some(KeyInput::Quit),
        KeyCode::Enter => Some(KeyInput::Submit),
        KeyCode::Backspace => Some(KeyInput::Backspace),
        KeyCode::Char(c) if !ctrl && !alt => Some(KeyInput::Char(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn both_quit_bindings_resolve_to_quit() {
        assert_eq!(
            resolve_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(KeyInput::Quit)
        );
        assert_eq!(
            resolve_key(&key(KeyCode::Esc, KeyModifiers::NONE)),
            Some(KeyInput::Quit)
        );
    }

    #[test]
    fn printable_characters_are_literal() {
        assert_eq!(
            resolve_key(&key(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(KeyInput::Char('q'))
        );
        assert_eq!(
            resolve_key(&key(KeyCode::Char('H'), KeyModifiers::SHIFT)),
            Some(KeyInput::Char('H'))
        );
        assert_eq!(
            resolve_key(&key(KeyCode::Char(' '), KeyModifiers::NONE)),
            Some(KeyInput::Char(' '))
        );
    }

    #[test]
    fn control_chords_and_navigation_keys_are_ignored() {
        assert_eq!(resolve_key(&key(KeyCode::Char('x'), KeyModifiers::CONTROL)), None);
        assert_eq!(resolve_key(&key(KeyCode::Char('x'), KeyModifiers::ALT)), None);
        assert_eq!(resolve_key(&key(KeyCode::Up, KeyModifiers::NONE)), None);
        assert_eq!(resolve_key(&key(KeyCode::Tab, KeyModifiers::NONE)), None);
    }

    #[test]
    fn editing_keys_resolve() {
        assert_eq!(
            resolve_key(&key(KeyCode::Enter, KeyModifiers::NONE)),
            Some(KeyInput::Submit)
        );
        assert_eq!(
            resolve_key(&key(KeyCode::Backspace, KeyModifiers::NONE)),
            Some(KeyInput::Backspace)
        );
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut release = key(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(resolve_key(&release), None);
    }
}
