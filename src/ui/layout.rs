//! Top-level frame layout: peer list / transcript split on top, an input
//! box, and a status bar.

use ratatui::layout::{Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::{AppState, PanelRects};

pub fn render(frame: &mut Frame, app: &mut AppState) {
    let outer = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3), Constraint::Length(1)])
        .split(frame.area());

    let content = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(outer[0]);

    app.panel_rects = PanelRects {
        peer_list: content[0],
        transcript: content[1],
        input: outer[1],
    };

    crate::ui::peer_list::render(frame, app, content[0]);
    crate::ui::transcript::render(frame, app, content[1]);
    crate::ui::input::render(frame, app, outer[1]);
    render_status_bar(frame, app, outer[2]);
}

fn render_status_bar(frame: &mut Frame, app: &AppState, area: Rect) {
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.link_count), Style::default().fg(Color::Green)),
        Span::raw("links | "),
        Span::raw(app.status.clone()),
        Span::raw(" | "),
        Span::styled(app.local_nickname.clone(), Style::default().fg(Color::Cyan)),
    ]);
    frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::NONE)), area);
}
