//! The peer list panel: directly-linked peers with a selection cursor.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

use crate::app::AppState;

pub fn render(frame: &mut Frame, app: &AppState, area: Rect) {
    let items: Vec<ListItem> = app
        .direct_peers
        .iter()
        .map(|(_, name, _)| ListItem::new(format!("* {name}")))
        .collect();

    let mut state = ListState::default();
    if !app.direct_peers.is_empty() {
        state.select(Some(app.selected_peer_idx));
    }

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Peers"))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Yellow))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut state);
}
