mod detail;
mod feed;
mod popup;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{App, Screen};

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    match app.screen() {
        Screen::Feed => feed::render(frame, app, chunks[1]),
        Screen::Detail => detail::render(frame, app, chunks[1]),
    }

    render_status_bar(frame, app, chunks[2]);

    if app.view.error && app.screen() == Screen::Feed {
        popup::render_banner(frame, "No internet connection", "Pull to refresh with r");
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let title = match (app.screen(), &app.view.selected) {
        (Screen::Detail, Some(photo)) => format!("photofeed - {}", photo.photographer),
        _ => "photofeed - Curated".to_string(),
    };

    let mut spans = vec![Span::styled(
        title,
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    if !app.view.has_connection {
        spans.push(Span::styled(
            "  [offline]",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(error) = &app.error {
        Line::from(vec![Span::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red),
        )])
    } else if let Some(status) = &app.status {
        Line::from(vec![Span::styled(
            status.clone(),
            Style::default().fg(Color::Green),
        )])
    } else if app.view.refreshing {
        Line::from(vec![Span::styled(
            "Refreshing...",
            Style::default().fg(Color::Yellow),
        )])
    } else {
        let help = match app.screen() {
            Screen::Feed => "j/k/g/G: nav | Ctrl+d/u: page | Enter: open | r: refresh | R: retry | q: quit",
            Screen::Detail => "o: open in browser | y: copy url | q/Esc: back",
        };
        Line::from(vec![Span::styled(help, Style::default().fg(Color::Gray))])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Cut `text` to `max` characters, marking the cut with "..."
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("Joey Farina", 20), "Joey Farina");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("Brown Rocks During Golden Hour", 10), "Brown R...");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("Zürich Straße bei Nacht", 9), "Zürich...");
    }
}
