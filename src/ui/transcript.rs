//! The scrolling transcript panel (spec §6 "scrolling transcript sink").

use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::AppState;

pub fn render(frame: &mut Frame, app: &AppState, area: Rect) {
    let mut lines: Vec<Line> = app.transcript.iter().map(|l| Line::from(l.as_str())).collect();
    lines.push(Line::from(""));

    let mut title = "Transcript".to_string();
    if !app.typing.is_empty() {
        title.push_str(" (typing...)");
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(paragraph, area);
}
