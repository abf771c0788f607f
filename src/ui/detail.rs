use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::types::{Orientation, Photo};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(photo) = &app.view.selected else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(7)])
        .split(area);

    render_preview(frame, photo, chunks[0]);
    render_sources(frame, app, photo, chunks[1]);
}

/// Average-colour block in the photo's aspect ratio, captioned with its alt text
fn render_preview(frame: &mut Frame, photo: &Photo, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {} ", photo.photographer),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let (w, h) = fit_aspect(photo.width, photo.height, inner.width, inner.height.saturating_sub(2));
    let canvas = Rect {
        x: inner.x + (inner.width - w) / 2,
        y: inner.y,
        width: w,
        height: h,
    };
    let color = photo
        .avg_rgb()
        .map(|(r, g, b)| Color::Rgb(r, g, b))
        .unwrap_or(Color::DarkGray);
    frame.render_widget(Block::default().style(Style::default().bg(color)), canvas);

    let caption_area = Rect {
        x: inner.x,
        y: inner.y + h,
        width: inner.width,
        height: inner.height.saturating_sub(h),
    };
    let caption = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(&photo.alt, Style::default().fg(Color::Gray))),
    ])
    .alignment(ratatui::layout::Alignment::Center)
    .wrap(Wrap { trim: true });
    frame.render_widget(caption, caption_area);
}

fn render_sources(frame: &mut Frame, app: &App, photo: &Photo, area: Rect) {
    let label = Style::default().fg(Color::DarkGray);
    let shown = match app.orientation {
        Orientation::Landscape => "landscape",
        Orientation::Portrait => "portrait",
    };

    let lines = vec![
        Line::from(vec![
            Span::styled(format!("{}x{}", photo.width, photo.height), Style::default().fg(Color::Cyan)),
            Span::raw(" | "),
            Span::styled(&photo.avg_color, label),
            Span::raw(" | "),
            Span::styled(&photo.photographer_url, Style::default().fg(Color::Blue)),
        ]),
        Line::from(vec![
            Span::styled(format!("{:<10}", shown), label),
            Span::raw(photo.fullscreen_url(app.orientation)),
        ]),
        Line::from(vec![Span::styled(format!("{:<10}", "original"), label), Span::raw(&photo.src.original)]),
        Line::from(vec![Span::styled(format!("{:<10}", "page"), label), Span::raw(&photo.url)]),
    ];

    let sources = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Sources"))
        .wrap(Wrap { trim: false });
    frame.render_widget(sources, area);
}

/// Largest cell box with the photo's aspect ratio that fits in `max_w` x
/// `max_h`, counting a cell as twice as tall as it is wide.
fn fit_aspect(width: u32, height: u32, max_w: u16, max_h: u16) -> (u16, u16) {
    if width == 0 || height == 0 || max_w == 0 || max_h == 0 {
        return (0, 0);
    }
    let ratio = width as f64 / height as f64 * 2.0;
    let by_height = (max_h as f64 * ratio).floor();
    if by_height <= max_w as f64 {
        (by_height.max(1.0) as u16, max_h)
    } else {
        let h = (max_w as f64 / ratio).floor().max(1.0);
        (max_w, h as u16)
    }
}
