use crate::error::FeedError;

/// What the presentation layer does in response to input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Back,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    GoToTop,
    GoToBottom,
    Select,

    // Feed
    Refresh,
    Retry,

    // Detail view
    OpenInBrowser,
    YankUrl,

    Resize(u16, u16),
    Error(String),
    None,
}

impl From<FeedError> for Action {
    fn from(err: FeedError) -> Self {
        Action::Error(err.to_string())
    }
}
