//! Translates crossterm terminal events into [`Action`]s.

use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};

use crate::app::{rect_contains, Action, AppState, FocusedPanel};

/// Top-level event entry point: dispatches to key/mouse handlers. Returns
/// `None` when the event doesn't map to any action (e.g. a key-release on
/// platforms that report them).
pub fn handle_event(event: &Event, app: &AppState) -> Option<Action> {
    match event {
        Event::Key(key) => handle_key_event(key, app),
        Event::Mouse(mouse) => handle_mouse_event(mouse, app),
        _ => None,
    }
}

fn handle_key_event(key: &crossterm::event::KeyEvent, app: &AppState) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    if key.code == KeyCode::Tab {
        return Some(Action::SwitchFocus);
    }

    match app.focused {
        FocusedPanel::PeerList => handle_peer_list_key(key),
        FocusedPanel::Transcript => handle_transcript_key(key),
        FocusedPanel::Input => handle_input_key(key),
    }
}

fn handle_peer_list_key(key: &crossterm::event::KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => Some(Action::SelectNextPeer),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::SelectPrevPeer),
        KeyCode::Enter => Some(Action::DialSelectedDevice),
        _ => None,
    }
}

fn handle_transcript_key(key: &crossterm::event::KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(Action::ScrollTranscriptUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::ScrollTranscriptDown),
        _ => None,
    }
}

fn handle_input_key(key: &crossterm::event::KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char(c) => Some(Action::InputChar(c)),
        KeyCode::Backspace => Some(Action::InputBackspace),
        KeyCode::Delete => Some(Action::InputDelete),
        KeyCode::Left => Some(Action::InputCursorLeft),
        KeyCode::Right => Some(Action::InputCursorRight),
        KeyCode::Enter => Some(Action::SubmitInput),
        _ => None,
    }
}

fn handle_mouse_event(mouse: &crossterm::event::MouseEvent, app: &AppState) -> Option<Action> {
    if !matches!(mouse.kind, MouseEventKind::Down(_)) {
        return None;
    }
    let (x, y) = (mouse.column, mouse.row);
    let rects = app.panel_rects;

    if rect_contains(rects.peer_list, x, y) {
        return Some(Action::FocusPanel(FocusedPanel::PeerList));
    }
    if rect_contains(rects.transcript, x, y) {
        return Some(Action::FocusPanel(FocusedPanel::Transcript));
    }
    if rect_contains(rects.input, x, y) {
        return Some(Action::FocusPanel(FocusedPanel::Input));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, MouseEvent};

    fn state() -> AppState {
        AppState::new("Me".to_string(), "AA".to_string())
    }

    #[test]
    fn ctrl_c_quits_from_any_focus() {
        let app = state();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let action = handle_event(&Event::Key(key), &app);
        assert!(matches!(action, Some(Action::Quit)));
    }

    #[test]
    fn tab_switches_focus() {
        let app = state();
        let key = KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE);
        let action = handle_event(&Event::Key(key), &app);
        assert!(matches!(action, Some(Action::SwitchFocus)));
    }

    #[test]
    fn typed_char_in_input_focus_produces_input_char() {
        let app = state();
        let key = KeyEvent::new(KeyCode::Char('h'), KeyModifiers::NONE);
        let action = handle_event(&Event::Key(key), &app);
        assert!(matches!(action, Some(Action::InputChar('h'))));
    }

    #[test]
    fn enter_in_input_focus_submits() {
        let app = state();
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        let action = handle_event(&Event::Key(key), &app);
        assert!(matches!(action, Some(Action::SubmitInput)));
    }

    #[test]
    fn mouse_click_outside_all_rects_is_none() {
        let app = state();
        let mouse = MouseEvent {
            kind: MouseEventKind::Down(crossterm::event::MouseButton::Left),
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        assert!(handle_event(&Event::Mouse(mouse), &app).is_none());
    }
}
