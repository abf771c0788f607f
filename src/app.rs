use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use crate::action::Action;
use crate::event::Event;
use crate::feed::{FeedEvent, ViewState};
use crate::types::{Orientation, Photo};

/// Rows moved by Ctrl+d / Ctrl+u
const PAGE_STEP: usize = 10;
/// Ticks a status message stays on screen
const STATUS_TICKS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Feed,
    Detail,
}

/// Terminal-side state: cursor, transient messages, and the latest view
/// snapshot from the feed controller.
pub struct App {
    pub view: ViewState,
    pub cursor: usize,
    pub orientation: Orientation,
    pub status: Option<String>,
    pub error: Option<String>,
    pub should_quit: bool,
    status_ticks: u8,
    cursor_photo: Option<u64>,
    feed_tx: mpsc::UnboundedSender<FeedEvent>,
}

impl App {
    pub fn new(feed_tx: mpsc::UnboundedSender<FeedEvent>, view: ViewState) -> Self {
        Self {
            view,
            cursor: 0,
            orientation: Orientation::Landscape,
            status: None,
            error: None,
            should_quit: false,
            status_ticks: 0,
            cursor_photo: None,
            feed_tx,
        }
    }

    pub fn screen(&self) -> Screen {
        if self.view.selected.is_some() {
            Screen::Detail
        } else {
            Screen::Feed
        }
    }

    /// Photo under the cursor, or the one shown fullscreen
    pub fn current_photo(&self) -> Option<&Photo> {
        match self.screen() {
            Screen::Detail => self.view.selected.as_ref(),
            Screen::Feed => self.view.photo(self.cursor),
        }
    }

    fn send(&self, event: FeedEvent) {
        if self.feed_tx.send(event).is_err() {
            tracing::warn!("feed controller is gone");
        }
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Resize(width, height) => Action::Resize(width, height),
            Event::Tick => Action::None,
            Event::Render => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('d') => Action::PageDown,
                KeyCode::Char('u') => Action::PageUp,
                _ => Action::None,
            };
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => match self.screen() {
                Screen::Feed => Action::Quit,
                Screen::Detail => Action::Back,
            },
            KeyCode::Char('j') | KeyCode::Down => Action::ScrollDown,
            KeyCode::Char('k') | KeyCode::Up => Action::ScrollUp,
            KeyCode::PageDown => Action::PageDown,
            KeyCode::PageUp => Action::PageUp,
            KeyCode::Char('g') | KeyCode::Home => Action::GoToTop,
            KeyCode::Char('G') | KeyCode::End => Action::GoToBottom,
            KeyCode::Enter => Action::Select,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('R') => Action::Retry,
            KeyCode::Char('o') => Action::OpenInBrowser,
            KeyCode::Char('y') => Action::YankUrl,
            _ => Action::None,
        }
    }

    pub fn tick(&mut self) {
        if self.status_ticks > 0 {
            self.status_ticks -= 1;
            if self.status_ticks == 0 {
                self.status = None;
            }
        }
    }

    fn set_status(&mut self, message: String) {
        self.status = Some(message);
        self.status_ticks = STATUS_TICKS;
    }

    pub fn update(&mut self, action: Action) {
        if self.error.is_some() && !matches!(action, Action::Quit | Action::Back | Action::None) {
            self.error = None;
        }

        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::Back => match self.screen() {
                Screen::Detail => self.send(FeedEvent::ClosePhoto),
                Screen::Feed => self.should_quit = true,
            },
            Action::ScrollUp => self.move_cursor(self.cursor.saturating_sub(1)),
            Action::ScrollDown => self.move_cursor(self.cursor.saturating_add(1)),
            Action::PageUp => self.move_cursor(self.cursor.saturating_sub(PAGE_STEP)),
            Action::PageDown => self.move_cursor(self.cursor.saturating_add(PAGE_STEP)),
            Action::GoToTop => self.move_cursor(0),
            Action::GoToBottom => self.move_cursor(usize::MAX),
            Action::Select => {
                if self.screen() == Screen::Feed {
                    if let Some(photo) = self.view.photo(self.cursor) {
                        self.send(FeedEvent::SelectPhoto(Box::new(photo.clone())));
                    }
                }
            }
            Action::Refresh => self.send(FeedEvent::Refresh),
            Action::Retry => self.send(FeedEvent::Retry),
            Action::OpenInBrowser => {
                if let Some(url) = self.current_url() {
                    match open::that(&url) {
                        Ok(()) => self.set_status(format!("Opened {}", url)),
                        Err(e) => self.error = Some(format!("Could not open browser: {}", e)),
                    }
                }
            }
            Action::YankUrl => {
                if let Some(url) = self.current_url() {
                    let copied = arboard::Clipboard::new().and_then(|mut c| c.set_text(url.clone()));
                    match copied {
                        Ok(()) => self.set_status(format!("Copied {}", url)),
                        Err(e) => self.error = Some(format!("Clipboard unavailable: {}", e)),
                    }
                }
            }
            Action::Resize(width, height) => {
                self.orientation = orientation_for(width, height);
            }
            Action::Error(msg) => {
                self.error = Some(msg);
            }
            Action::None => {}
        }
    }

    fn current_url(&self) -> Option<String> {
        let orientation = self.orientation;
        self.current_photo()
            .map(|photo| photo.fullscreen_url(orientation).to_string())
    }

    /// Move within the feed and report the new position for prefetching
    fn move_cursor(&mut self, target: usize) {
        if self.screen() != Screen::Feed {
            return;
        }
        let count = self.view.photo_count();
        if count == 0 {
            return;
        }
        self.cursor = target.min(count - 1);
        self.cursor_photo = self.view.photo(self.cursor).map(|p| p.id);
        self.send(FeedEvent::Scrolled(self.cursor));
    }

    /// Take a new snapshot from the controller, keeping the cursor on the
    /// same photo when pages are added before it.
    pub fn set_view(&mut self, view: ViewState) {
        let same_feed = view.generation().is_some() && view.generation() == self.view.generation();
        self.view = view;

        if !same_feed {
            self.cursor = 0;
        } else if let Some(index) = self
            .cursor_photo
            .and_then(|id| self.view.sequence.as_ref()?.position_of(id))
        {
            self.cursor = index;
        }

        let count = self.view.photo_count();
        self.cursor = self.cursor.min(count.saturating_sub(1));
        self.cursor_photo = self.view.photo(self.cursor).map(|p| p.id);
    }
}

/// Terminal cells are about twice as tall as they are wide
pub fn orientation_for(width: u16, height: u16) -> Orientation {
    if u32::from(width) >= u32::from(height) * 2 {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    }
}
