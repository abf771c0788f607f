use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::PagingConfig;
use crate::error::FeedError;
use crate::paging::{PageLoaded, PagingEngine, SequenceState, STARTING_KEY};
use crate::source::ListingSource;
use crate::types::Photo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Refreshing,
    Ready,
    Errored,
}

/// Immutable snapshot handed to the presentation layer
#[derive(Debug, Clone)]
pub struct ViewState {
    pub phase: Phase,
    pub sequence: Option<Arc<SequenceState>>,
    /// `Some` means the detail view is showing this photo
    pub selected: Option<Photo>,
    pub has_connection: bool,
    pub refreshing: bool,
    /// Last refresh was refused for lack of a connection
    pub error: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            sequence: None,
            selected: None,
            has_connection: true,
            refreshing: false,
            error: false,
        }
    }
}

impl ViewState {
    pub fn photo_count(&self) -> usize {
        self.sequence.as_ref().map_or(0, |s| s.len())
    }

    pub fn photo(&self, index: usize) -> Option<&Photo> {
        self.sequence.as_ref()?.get(index)
    }

    pub fn generation(&self) -> Option<u64> {
        self.sequence.as_ref().map(|s| s.generation())
    }

    pub fn is_loading(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| s.is_loading())
    }

    /// Pagination stopped on a failed load, as opposed to the end of the feed
    pub fn pagination_stalled(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| s.append_failed())
    }

    pub fn end_of_feed(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| s.end_of_feed())
    }
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    SelectPhoto(Box<Photo>),
    ClosePhoto,
    Refresh,
    Retry,
    /// The reader's position in the sequence moved
    Scrolled(usize),
}

/// Owns the paging engine of the current refresh generation and the view
/// state derived from it. Every observable change is published on a watch
/// channel.
pub struct FeedController {
    config: PagingConfig,
    api_key: Arc<str>,
    source: Arc<dyn ListingSource>,
    engine: Option<PagingEngine>,
    generation: u64,
    state: ViewState,
    view_tx: watch::Sender<ViewState>,
    loads_tx: mpsc::UnboundedSender<PageLoaded>,
    loads_rx: mpsc::UnboundedReceiver<PageLoaded>,
}

impl FeedController {
    pub fn new(config: PagingConfig, api_key: String, source: Arc<dyn ListingSource>) -> Self {
        let (view_tx, _) = watch::channel(ViewState::default());
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();

        Self {
            config,
            api_key: Arc::from(api_key),
            source,
            engine: None,
            generation: 0,
            state: ViewState::default(),
            view_tx,
            loads_tx,
            loads_rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view_tx.subscribe()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    fn emit(&self) {
        self.view_tx.send_replace(self.state.clone());
    }

    /// Pick up the engine's latest snapshot; true if it changed
    fn sync_sequence(&mut self) -> bool {
        let Some(engine) = &self.engine else {
            return false;
        };
        let snapshot = engine.snapshot();
        let changed = !self
            .state
            .sequence
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &snapshot));
        if changed {
            self.state.sequence = Some(snapshot);
        }
        changed
    }

    pub fn handle(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::SelectPhoto(photo) => self.select_photo(&photo),
            FeedEvent::ClosePhoto => self.close_photo(),
            FeedEvent::Refresh => self.refresh(),
            FeedEvent::Retry => self.retry(),
            FeedEvent::Scrolled(anchor) => self.scrolled(anchor),
        }
    }

    /// Replace the feed with a fresh engine.
    ///
    /// Ignored while a refresh is still loading its first page. Offline, the
    /// current engine is dropped and the error flag raised instead.
    pub fn refresh(&mut self) {
        if self.state.refreshing {
            tracing::debug!("refresh already in flight");
            return;
        }

        if !self.state.has_connection {
            tracing::info!(error = %FeedError::NoConnection, "refresh refused");
            self.engine = None;
            self.state.phase = Phase::Errored;
            self.state.sequence = None;
            self.state.selected = None;
            self.state.refreshing = false;
            self.state.error = true;
            self.emit();
            return;
        }

        self.state.phase = Phase::Refreshing;
        self.state.refreshing = true;
        self.state.error = false;
        self.emit();

        let (initial_key, landing) = self
            .engine
            .as_ref()
            .map_or((STARTING_KEY, None), |engine| engine.reload_point());
        self.generation += 1;

        let mut engine = PagingEngine::new(
            self.generation,
            initial_key,
            Arc::clone(&self.api_key),
            self.config.clone(),
            Arc::clone(&self.source),
            self.loads_tx.clone(),
        );
        engine.land_at(landing);
        engine.start();
        tracing::debug!(generation = self.generation, initial_key, ?landing, "paging engine created");

        self.engine = Some(engine);
        self.sync_sequence();
        self.state.selected = None;
        self.state.phase = Phase::Ready;
        self.emit();
    }

    pub fn apply_load(&mut self, loaded: PageLoaded) {
        let Some(engine) = self.engine.as_mut() else {
            tracing::debug!(generation = loaded.generation, "page load with no engine");
            return;
        };
        if !engine.apply(loaded) {
            return;
        }

        self.sync_sequence();
        if self.state.refreshing
            && self
                .state
                .sequence
                .as_ref()
                .is_some_and(|s| !s.refresh_state().is_loading())
        {
            self.state.refreshing = false;
        }
        self.emit();
    }

    /// Show a photo fullscreen. Only photos present in the current sequence
    /// can be selected.
    pub fn select_photo(&mut self, photo: &Photo) {
        if self.state.phase != Phase::Ready {
            return;
        }
        let found = self
            .state
            .sequence
            .as_ref()
            .and_then(|s| s.find_photo(photo.id))
            .cloned();

        match found {
            Some(photo) => {
                self.state.selected = Some(photo);
                self.emit();
            }
            None => tracing::warn!(id = photo.id, "ignoring selection of unknown photo"),
        }
    }

    pub fn close_photo(&mut self) {
        if self.state.selected.take().is_some() {
            self.emit();
        }
    }

    pub fn scrolled(&mut self, anchor: usize) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.on_anchor(anchor);
        if self.sync_sequence() {
            self.emit();
        }
    }

    pub fn retry(&mut self) {
        if self.state.phase == Phase::Errored {
            self.refresh();
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let issued = engine.retry();
        tracing::debug!(issued, "retrying failed loads");
        if self.sync_sequence() {
            self.emit();
        }
    }

    /// Connectivity only updates the flag, except that regaining it
    /// recovers from a refused refresh or failed page loads.
    pub fn connectivity_changed(&mut self, online: bool) {
        if self.state.has_connection == online {
            return;
        }
        self.state.has_connection = online;
        self.emit();

        if !online {
            return;
        }
        match self.state.phase {
            Phase::Errored => self.refresh(),
            Phase::Ready
                if self
                    .state
                    .sequence
                    .as_ref()
                    .is_some_and(|s| s.has_errors()) =>
            {
                self.retry()
            }
            _ => {}
        }
    }

    /// Drive the controller until `events` closes or `cancel` fires.
    ///
    /// Performs the initial refresh, then applies events, page loads and
    /// connectivity transitions one at a time in arrival order.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FeedEvent>,
        mut connectivity: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        let online = *connectivity.borrow_and_update();
        self.connectivity_changed(online);
        self.refresh();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                Some(loaded) = self.loads_rx.recv() => self.apply_load(loaded),
                Ok(()) = connectivity.changed() => {
                    let online = *connectivity.borrow_and_update();
                    self.connectivity_changed(online);
                }
            }
        }
        tracing::debug!("feed controller stopped");
    }
}
