//! The input box, with a UTF-8-aware cursor position.

use ratatui::layout::{Position, Rect};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::AppState;

pub fn render(frame: &mut Frame, app: &AppState, area: Rect) {
    let text = format!("> {}", app.input);
    let paragraph = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Input"));
    frame.render_widget(paragraph, area);

    let cursor_x = area.x + 1 + 2 + visual_cursor_offset(&app.input, app.input_cursor) as u16;
    let cursor_y = area.y + 1;
    frame.set_cursor_position(Position::new(cursor_x, cursor_y));
}

/// `input_cursor` is a byte offset; the terminal needs a column offset in
/// displayed characters, which differ whenever the input contains
/// multi-byte UTF-8 characters.
fn visual_cursor_offset(input: &str, byte_cursor: usize) -> usize {
    input
        .char_indices()
        .take_while(|(byte_idx, _)| *byte_idx < byte_cursor)
        .count()
}
