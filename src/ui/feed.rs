use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::app::App;
use crate::feed::ViewState;

use super::truncate;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.view;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Curated ({})", view.photo_count()))
        .title_bottom(footer(view));

    if view.photo_count() == 0 {
        let message = if view.refreshing || view.is_loading() {
            "Loading..."
        } else if view.pagination_stalled() {
            "Couldn't load photos (R to retry)"
        } else if view.sequence.is_some() {
            "No photos"
        } else {
            ""
        };
        let empty = Paragraph::new(message)
            .block(block)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let w = area.width.saturating_sub(2) as usize;
    let fixed = 38; // swatch(2) + space(1) + photographer(24) + space(1) + size(9) + space(1)
    let flex = w.saturating_sub(fixed).max(10);

    let items: Vec<ListItem> = view
        .sequence
        .iter()
        .flat_map(|s| s.photos())
        .enumerate()
        .map(|(i, photo)| {
            let style = if i == app.cursor {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let swatch = match photo.avg_rgb() {
                Some((r, g, b)) => Span::styled("██", Style::default().fg(Color::Rgb(r, g, b))),
                None => Span::raw("  "),
            };

            let line = Line::from(vec![
                swatch,
                Span::raw(" "),
                Span::styled(format!("{:<24}", truncate(&photo.photographer, 24)), style),
                Span::raw(" "),
                Span::styled(
                    format!("{:>9}", format!("{}x{}", photo.width, photo.height)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(" "),
                Span::styled(truncate(&photo.alt, flex), Style::default().fg(Color::Gray)),
            ]);

            ListItem::new(line)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = ListState::default();
    state.select(Some(app.cursor));

    frame.render_stateful_widget(list, area, &mut state);
}

/// Bottom edge of the list: whether more is coming, stuck, or done
fn footer(view: &ViewState) -> Line<'static> {
    if view.pagination_stalled() {
        Line::from(Span::styled(
            " Couldn't load more (R to retry) ",
            Style::default().fg(Color::Red),
        ))
    } else if view.is_loading() {
        Line::from(Span::styled(
            " Loading more... ",
            Style::default().fg(Color::Yellow),
        ))
    } else if view.end_of_feed() {
        Line::from(Span::styled(" End of feed ", Style::default().fg(Color::DarkGray)))
    } else {
        Line::default()
    }
}
