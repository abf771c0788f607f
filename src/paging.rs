//! Incremental loading of the curated feed.
//!
//! A [`PagingEngine`] turns the page-numbered listing into one contiguous
//! [`SequenceState`]. Fetches run as tokio tasks and report back as
//! [`PageLoaded`] messages; merging them is synchronous and happens only in
//! [`PagingEngine::apply`]. Readers get `Arc` snapshots, so a merge is never
//! observed half done.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::PagingConfig;
use crate::source::ListingSource;
use crate::types::Photo;

/// Key of the first page of the feed
pub const STARTING_KEY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Initial load of a fresh engine
    Refresh,
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub key: u32,
    pub kind: LoadKind,
    pub anchor: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub key: u32,
    pub photos: Vec<Photo>,
    pub prev_key: Option<u32>,
    pub next_key: Option<u32>,
}

impl Page {
    /// Stitch keys for a fetched page: an empty page ends the feed, the
    /// starting page has nothing before it.
    pub fn new(key: u32, photos: Vec<Photo>) -> Self {
        let prev_key = if key == STARTING_KEY {
            None
        } else {
            key.checked_sub(1)
        };
        let next_key = if photos.is_empty() {
            None
        } else {
            key.checked_add(1)
        };

        Self {
            key,
            photos,
            prev_key,
            next_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Success(Page),
    Failure(String),
}

/// Completion of one fetch, tagged with the engine generation that issued it
#[derive(Debug, Clone)]
pub struct PageLoaded {
    pub generation: u64,
    pub request: LoadRequest,
    pub result: LoadResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoading { end_reached: bool },
    Loading(LoadRequest),
    Error { request: LoadRequest, message: String },
}

impl Default for LoadState {
    fn default() -> Self {
        LoadState::NotLoading { end_reached: false }
    }
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LoadState::Error { .. })
    }

    pub fn end_reached(&self) -> bool {
        matches!(self, LoadState::NotLoading { end_reached: true })
    }

    fn failed_request(&self) -> Option<LoadRequest> {
        match self {
            LoadState::Error { request, .. } => Some(*request),
            _ => None,
        }
    }
}

/// Everything loaded so far, in key order, plus per-edge load status
#[derive(Debug, Clone, Default)]
pub struct SequenceState {
    generation: u64,
    pages: Vec<Arc<Page>>,
    refresh: LoadState,
    append: LoadState,
    prepend: LoadState,
}

impl SequenceState {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub(crate) fn from_pages(generation: u64, pages: Vec<Page>) -> Self {
        Self {
            generation,
            pages: pages.into_iter().map(Arc::new).collect(),
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.key).collect()
    }

    pub fn photos(&self) -> impl Iterator<Item = &Photo> {
        self.pages.iter().flat_map(|p| p.photos.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.photos.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&Photo> {
        self.photos().nth(index)
    }

    pub fn find_photo(&self, id: u64) -> Option<&Photo> {
        self.photos().find(|p| p.id == id)
    }

    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.photos().position(|p| p.id == id)
    }

    pub fn has_key(&self, key: u32) -> bool {
        self.pages.iter().any(|p| p.key == key)
    }

    /// Key the next append would load
    pub fn next_key(&self) -> Option<u32> {
        self.pages.last().and_then(|p| p.next_key)
    }

    /// Key the next prepend would load
    pub fn prev_key(&self) -> Option<u32> {
        self.pages.first().and_then(|p| p.prev_key)
    }

    pub fn refresh_state(&self) -> &LoadState {
        &self.refresh
    }

    #[cfg(test)]
    pub(crate) fn append_state(&self) -> &LoadState {
        &self.append
    }

    #[cfg(test)]
    pub(crate) fn prepend_state(&self) -> &LoadState {
        &self.prepend
    }

    pub fn edge(&self, kind: LoadKind) -> &LoadState {
        match kind {
            LoadKind::Refresh => &self.refresh,
            LoadKind::Append => &self.append,
            LoadKind::Prepend => &self.prepend,
        }
    }

    fn edge_mut(&mut self, kind: LoadKind) -> &mut LoadState {
        match kind {
            LoadKind::Refresh => &mut self.refresh,
            LoadKind::Append => &mut self.append,
            LoadKind::Prepend => &mut self.prepend,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.refresh.is_loading() || self.append.is_loading() || self.prepend.is_loading()
    }

    pub fn has_errors(&self) -> bool {
        self.refresh.is_error() || self.append.is_error() || self.prepend.is_error()
    }

    /// Forward pagination is stuck on a failed load rather than finished
    pub fn append_failed(&self) -> bool {
        self.refresh.is_error() || self.append.is_error()
    }

    pub fn end_of_feed(&self) -> bool {
        !self.pages.is_empty() && self.append.end_reached()
    }

    fn merge(&mut self, kind: LoadKind, page: Page) {
        match kind {
            LoadKind::Refresh => {
                self.refresh = LoadState::default();
                self.prepend = LoadState::NotLoading {
                    end_reached: page.prev_key.is_none(),
                };
                self.append = LoadState::NotLoading {
                    end_reached: page.next_key.is_none(),
                };
                self.pages = vec![Arc::new(page)];
            }
            LoadKind::Append => {
                if self.next_key() != Some(page.key) {
                    tracing::warn!(key = page.key, "dropping non-adjacent append");
                    self.append = LoadState::default();
                    return;
                }
                self.append = LoadState::NotLoading {
                    end_reached: page.next_key.is_none(),
                };
                self.pages.push(Arc::new(page));
            }
            LoadKind::Prepend => {
                if self.prev_key() != Some(page.key) {
                    tracing::warn!(key = page.key, "dropping non-adjacent prepend");
                    self.prepend = LoadState::default();
                    return;
                }
                self.prepend = LoadState::NotLoading {
                    end_reached: page.prev_key.is_none(),
                };
                self.pages.insert(0, Arc::new(page));
            }
        }
    }
}

/// Page key to reload around `anchor` after the feed is replaced.
///
/// `anchor` is a position in the whole feed, counted from the first photo of
/// [`STARTING_KEY`]. The window of `window` photos is centered on it and the
/// key of the page holding the window's first photo is returned.
pub fn refresh_key(anchor: Option<usize>, window: u32, per_page: u32) -> u32 {
    let Some(anchor) = anchor else {
        return STARTING_KEY;
    };
    let start = anchor.saturating_sub((window / 2) as usize);
    let offset = start / per_page.max(1) as usize;
    u32::try_from(offset)
        .unwrap_or(u32::MAX)
        .saturating_add(STARTING_KEY)
}

pub struct PagingEngine {
    generation: u64,
    initial_key: u32,
    api_key: Arc<str>,
    config: PagingConfig,
    source: Arc<dyn ListingSource>,
    tx: mpsc::UnboundedSender<PageLoaded>,
    state: Arc<SequenceState>,
    last_anchor: Option<usize>,
}

impl std::fmt::Debug for PagingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagingEngine")
            .field("generation", &self.generation)
            .field("initial_key", &self.initial_key)
            .field("source", &self.source.name())
            .finish_non_exhaustive()
    }
}

impl PagingEngine {
    pub fn new(
        generation: u64,
        initial_key: u32,
        api_key: Arc<str>,
        config: PagingConfig,
        source: Arc<dyn ListingSource>,
        tx: mpsc::UnboundedSender<PageLoaded>,
    ) -> Self {
        Self {
            generation,
            initial_key: initial_key.max(STARTING_KEY),
            api_key,
            config,
            source,
            tx,
            state: Arc::new(SequenceState::new(generation)),
            last_anchor: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Arc<SequenceState> {
        Arc::clone(&self.state)
    }

    /// Key of the first loaded page, or the key this engine was started at
    fn first_key(&self) -> u32 {
        self.state
            .pages
            .first()
            .map_or(self.initial_key, |page| page.key)
    }

    /// `last_anchor` as a position in the whole feed
    pub fn absolute_anchor(&self) -> Option<usize> {
        let per_page = self.config.fetch_page_size as usize;
        self.last_anchor
            .map(|anchor| (self.first_key() - STARTING_KEY) as usize * per_page + anchor)
    }

    /// Where a replacement engine should start: the refresh key and the
    /// reader's position relative to that key's first photo.
    pub fn reload_point(&self) -> (u32, Option<usize>) {
        let absolute = self.absolute_anchor();
        let key = refresh_key(absolute, self.config.page_size, self.config.fetch_page_size);
        let skipped = (key - STARTING_KEY) as usize * self.config.fetch_page_size as usize;
        (key, absolute.map(|anchor| anchor.saturating_sub(skipped)))
    }

    /// Remember where the reader will be once the initial load lands, so
    /// prefetching resumes around that position.
    pub fn land_at(&mut self, anchor: Option<usize>) {
        self.last_anchor = anchor;
    }

    /// Issue the initial load at this engine's initial key
    pub fn start(&mut self) -> bool {
        self.request_page(self.initial_key, LoadKind::Refresh, None)
    }

    /// Start loading `key` into the given edge.
    ///
    /// Nothing is issued while that edge already has a load in flight, when
    /// the key is already loaded, or when it would not attach directly to the
    /// loaded range.
    pub fn request_page(&mut self, key: u32, kind: LoadKind, anchor: Option<usize>) -> bool {
        if self.state.edge(kind).is_loading() {
            tracing::debug!(key, ?kind, "load already in flight for edge");
            return false;
        }
        if self.state.has_key(key) {
            return false;
        }
        let adjacent = match kind {
            LoadKind::Refresh => self.state.pages.is_empty(),
            LoadKind::Append => self.state.next_key() == Some(key),
            LoadKind::Prepend => self.state.prev_key() == Some(key),
        };
        if !adjacent {
            return false;
        }

        let request = LoadRequest { key, kind, anchor };
        *Arc::make_mut(&mut self.state).edge_mut(kind) = LoadState::Loading(request);
        self.spawn_fetch(request);
        true
    }

    fn spawn_fetch(&self, request: LoadRequest) {
        let tx = self.tx.clone();
        let source = Arc::clone(&self.source);
        let api_key = Arc::clone(&self.api_key);
        let per_page = self.config.fetch_page_size;
        let generation = self.generation;

        tokio::spawn(async move {
            let result = match source.fetch_page(&api_key, per_page, request.key).await {
                Ok(response) => LoadResult::Success(Page::new(request.key, response.photos)),
                Err(e) => {
                    tracing::warn!(key = request.key, kind = ?request.kind, error = %e, "page load failed");
                    LoadResult::Failure(e.to_string())
                }
            };
            tx.send(PageLoaded {
                generation,
                request,
                result,
            })
            .ok();
        });
    }

    /// Merge a finished load. Returns false when the completion is ignored:
    /// it belongs to another engine or to a request no longer in flight.
    pub fn apply(&mut self, loaded: PageLoaded) -> bool {
        if loaded.generation != self.generation {
            tracing::debug!(
                stale = loaded.generation,
                current = self.generation,
                "dropping stale page load"
            );
            return false;
        }
        let kind = loaded.request.kind;
        if *self.state.edge(kind) != LoadState::Loading(loaded.request) {
            tracing::debug!(key = loaded.request.key, ?kind, "dropping unexpected page load");
            return false;
        }

        let state = Arc::make_mut(&mut self.state);
        match loaded.result {
            LoadResult::Success(page) => {
                state.merge(kind, page);
                if kind == LoadKind::Refresh {
                    if let Some(anchor) = self.last_anchor {
                        let landed = anchor.min(self.state.len().saturating_sub(1));
                        self.prefetch(landed);
                    }
                }
                // nothing to scroll through yet, so nothing would trigger a prepend
                if self.state.is_empty() {
                    self.load_previous(self.last_anchor);
                }
            }
            LoadResult::Failure(message) => {
                *state.edge_mut(kind) = LoadState::Error {
                    request: loaded.request,
                    message,
                };
            }
        }
        true
    }

    pub fn load_next(&mut self, anchor: Option<usize>) -> bool {
        match self.state.next_key() {
            Some(key) => self.request_page(key, LoadKind::Append, anchor),
            None => false,
        }
    }

    pub fn load_previous(&mut self, anchor: Option<usize>) -> bool {
        match self.state.prev_key() {
            Some(key) => self.request_page(key, LoadKind::Prepend, anchor),
            None => false,
        }
    }

    /// Record where the reader is and prefetch toward whichever end is
    /// within `prefetch_distance`. A failed edge is retried when reached.
    pub fn on_anchor(&mut self, anchor: usize) -> bool {
        self.last_anchor = Some(anchor);
        self.prefetch(anchor)
    }

    fn prefetch(&mut self, anchor: usize) -> bool {
        let distance = self.config.prefetch_distance;
        let mut issued = false;

        if let Some(request) = self.state.refresh.failed_request() {
            issued |= self.reissue(request, Some(anchor));
        }
        if anchor.saturating_add(distance) >= self.state.len() {
            issued |= match self.state.append.failed_request() {
                Some(request) => self.reissue(request, Some(anchor)),
                None => self.load_next(Some(anchor)),
            };
        }
        if anchor < distance {
            issued |= match self.state.prepend.failed_request() {
                Some(request) => self.reissue(request, Some(anchor)),
                None => self.load_previous(Some(anchor)),
            };
        }
        issued
    }

    /// Re-issue every failed edge's stored request
    pub fn retry(&mut self) -> usize {
        let failed: Vec<LoadRequest> = [LoadKind::Refresh, LoadKind::Append, LoadKind::Prepend]
            .into_iter()
            .filter_map(|kind| self.state.edge(kind).failed_request())
            .collect();

        failed
            .into_iter()
            .filter(|request| self.reissue(*request, request.anchor))
            .count()
    }

    fn reissue(&mut self, request: LoadRequest, anchor: Option<usize>) -> bool {
        tracing::debug!(key = request.key, kind = ?request.kind, "retrying page load");
        self.request_page(request.key, request.kind, anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::source::testing::{photo_id, FakeSource};

    fn engine_with(
        source: Arc<FakeSource>,
        generation: u64,
        initial_key: u32,
    ) -> (PagingEngine, mpsc::UnboundedReceiver<PageLoaded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = PagingEngine::new(
            generation,
            initial_key,
            Arc::from("test-key"),
            PagingConfig::default(),
            source,
            tx,
        );
        (engine, rx)
    }

    async fn next_load(rx: &mut mpsc::UnboundedReceiver<PageLoaded>) -> PageLoaded {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("page load never completed")
            .expect("channel closed")
    }

    async fn complete_one(engine: &mut PagingEngine, rx: &mut mpsc::UnboundedReceiver<PageLoaded>) -> bool {
        let loaded = next_load(rx).await;
        engine.apply(loaded)
    }

    #[test]
    fn refresh_key_is_page_of_window_start() {
        // photo 12 with a 10 photo window starts at photo 7, on page 2
        assert_eq!(refresh_key(Some(12), 10, 5), 2);
        assert_eq!(refresh_key(Some(44), 10, 5), 8);
        assert_eq!(refresh_key(Some(44), 10, 20), 2);
    }

    #[test]
    fn refresh_key_clamps_to_starting_key() {
        assert_eq!(refresh_key(Some(2), 10, 5), 1);
        assert_eq!(refresh_key(Some(9), 10, 5), 1);
        assert_eq!(refresh_key(Some(0), 10, 5), 1);
        assert_eq!(refresh_key(Some(3), 10, 0), 1);
    }

    #[test]
    fn refresh_key_without_anchor_is_starting_key() {
        assert_eq!(refresh_key(None, 10, 5), STARTING_KEY);
    }

    #[tokio::test]
    async fn reload_point_counts_from_first_loaded_page() {
        let source = Arc::new(FakeSource::with_full_pages(5, 5));
        let (mut engine, mut rx) = engine_with(source, 1, 3);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        engine.on_anchor(2);

        // photo 2 of page 3 is photo 12 of the feed
        assert_eq!(engine.absolute_anchor(), Some(12));
        assert_eq!(engine.reload_point(), (2, Some(7)));
    }

    #[tokio::test]
    async fn reload_point_without_anchor_starts_over() {
        let source = Arc::new(FakeSource::with_full_pages(2, 5));
        let (mut engine, mut rx) = engine_with(source, 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert_eq!(engine.reload_point(), (STARTING_KEY, None));
    }

    #[tokio::test]
    async fn landing_prefetches_around_reader() {
        let source = Arc::new(FakeSource::with_full_pages(3, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 2, 2);

        engine.land_at(Some(7));
        engine.start();
        complete_one(&mut engine, &mut rx).await;

        let state = engine.snapshot();
        assert!(state.append_state().is_loading());
        assert!(state.prepend_state().is_loading());

        complete_one(&mut engine, &mut rx).await;
        complete_one(&mut engine, &mut rx).await;
        let state = engine.snapshot();
        assert_eq!(state.keys(), vec![1, 2, 3]);
        assert!(state.position_of(photo_id(3, 2)).is_some());
    }

    #[tokio::test]
    async fn empty_landing_walks_back_to_photos() {
        let source = Arc::new(FakeSource::with_full_pages(2, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 2, 4);

        engine.land_at(Some(3));
        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert!(engine.snapshot().is_empty());
        assert!(engine.snapshot().prepend_state().is_loading());

        complete_one(&mut engine, &mut rx).await;
        assert!(engine.snapshot().is_empty());
        complete_one(&mut engine, &mut rx).await;

        let state = engine.snapshot();
        assert_eq!(state.keys(), vec![2, 3, 4]);
        assert_eq!(state.len(), 5);
        assert!(!state.prepend_state().is_loading());
        assert_eq!(source.calls(), vec![(5, 4), (5, 3), (5, 2)]);
    }

    #[tokio::test]
    async fn append_and_prepend_in_flight_merge_independently() {
        let source = Arc::new(FakeSource::with_full_pages(5, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, 3);

        engine.start();
        complete_one(&mut engine, &mut rx).await;

        assert!(engine.load_previous(None));
        assert!(engine.load_next(None));
        let state = engine.snapshot();
        assert!(state.prepend_state().is_loading());
        assert!(state.append_state().is_loading());

        let first = next_load(&mut rx).await;
        let second = next_load(&mut rx).await;
        let (prepend, append) = if first.request.kind == LoadKind::Prepend {
            (first, second)
        } else {
            (second, first)
        };

        // append lands first, then the prepend
        assert!(engine.apply(append));
        assert_eq!(engine.snapshot().keys(), vec![3, 4]);
        assert!(engine.apply(prepend));

        let state = engine.snapshot();
        let keys = state.keys();
        assert_eq!(keys, vec![2, 3, 4]);
        assert!(keys.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(*state.append_state(), LoadState::NotLoading { end_reached: false });
        assert_eq!(*state.prepend_state(), LoadState::NotLoading { end_reached: false });
        assert_eq!(state.len(), 15);
        assert_eq!(state.get(0).map(|p| p.id), Some(photo_id(2, 0)));
        assert_eq!(state.get(14).map(|p| p.id), Some(photo_id(4, 4)));
    }

    #[test]
    fn page_keys_follow_emptiness_and_start() {
        let first = Page::new(1, vec![crate::types::sample_photo(1)]);
        assert_eq!(first.prev_key, None);
        assert_eq!(first.next_key, Some(2));

        let empty = Page::new(4, vec![]);
        assert_eq!(empty.prev_key, Some(3));
        assert_eq!(empty.next_key, None);
    }

    #[tokio::test]
    async fn first_fetch_is_starting_page_with_fetch_size() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        assert!(engine.start());
        assert!(engine.snapshot().refresh_state().is_loading());
        assert!(complete_one(&mut engine, &mut rx).await);

        assert_eq!(source.calls(), vec![(5, 1)]);
        let state = engine.snapshot();
        assert_eq!(state.keys(), vec![1]);
        assert_eq!(state.len(), 5);
        assert_eq!(state.next_key(), Some(2));
        assert!(state.prepend_state().end_reached());
    }

    #[tokio::test]
    async fn empty_page_halts_pagination() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert!(engine.load_next(Some(4)));
        complete_one(&mut engine, &mut rx).await;

        let state = engine.snapshot();
        assert_eq!(state.next_key(), None);
        assert!(state.end_of_feed());
        assert!(!engine.load_next(Some(4)));
        assert!(!engine.on_anchor(4));
        assert!(!engine.request_page(3, LoadKind::Append, None));
        assert_eq!(source.calls(), vec![(5, 1), (5, 2)]);
    }

    #[tokio::test]
    async fn duplicate_requests_issue_one_fetch() {
        let source = Arc::new(FakeSource::with_full_pages(3, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        assert!(engine.start());
        assert!(!engine.request_page(1, LoadKind::Refresh, None));
        complete_one(&mut engine, &mut rx).await;

        assert!(engine.request_page(2, LoadKind::Append, Some(3)));
        assert!(!engine.request_page(2, LoadKind::Append, Some(4)));
        assert!(!engine.load_next(Some(4)));
        complete_one(&mut engine, &mut rx).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(source.calls(), vec![(5, 1), (5, 2)]);
    }

    #[tokio::test]
    async fn appended_pages_stay_contiguous_and_increasing() {
        let source = Arc::new(FakeSource::with_full_pages(4, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        while engine.load_next(None) {
            complete_one(&mut engine, &mut rx).await;
        }

        let state = engine.snapshot();
        let keys = state.keys();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        assert!(keys.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(state.len(), 20);
        assert_eq!(state.get(5).map(|p| p.id), Some(photo_id(2, 0)));
        assert!(state.end_of_feed());
    }

    #[tokio::test]
    async fn loaded_or_detached_keys_are_not_requested() {
        let source = Arc::new(FakeSource::with_full_pages(5, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, 3);

        engine.start();
        complete_one(&mut engine, &mut rx).await;

        assert!(!engine.request_page(3, LoadKind::Append, None));
        assert!(!engine.request_page(5, LoadKind::Append, None));
        assert!(!engine.request_page(1, LoadKind::Prepend, None));
        assert!(!engine.request_page(7, LoadKind::Refresh, None));
        assert_eq!(source.calls(), vec![(5, 3)]);
    }

    #[tokio::test]
    async fn prepends_walk_back_to_starting_key() {
        let source = Arc::new(FakeSource::with_full_pages(5, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 1, 3);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert_eq!(engine.snapshot().prev_key(), Some(2));

        while engine.load_previous(Some(0)) {
            complete_one(&mut engine, &mut rx).await;
        }

        let state = engine.snapshot();
        assert_eq!(state.keys(), vec![1, 2, 3]);
        assert!(state.prepend_state().end_reached());
        assert_eq!(state.get(0).map(|p| p.id), Some(photo_id(1, 0)));
    }

    #[tokio::test]
    async fn failure_keeps_loaded_pages_and_retry_resumes() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        source.fail_page(2, "connection reset");
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert!(engine.on_anchor(4));
        complete_one(&mut engine, &mut rx).await;

        let state = engine.snapshot();
        assert_eq!(state.keys(), vec![1]);
        assert_eq!(state.len(), 5);
        assert!(state.append_failed());
        assert!(!state.end_of_feed());
        match state.append_state() {
            LoadState::Error { request, message } => {
                assert_eq!(request.key, 2);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected append state: {other:?}"),
        }

        source.set_page(2, 5);
        assert_eq!(engine.retry(), 1);
        complete_one(&mut engine, &mut rx).await;
        assert_eq!(engine.snapshot().keys(), vec![1, 2]);
        assert!(!engine.snapshot().has_errors());
    }

    #[tokio::test]
    async fn scrolling_into_failed_edge_retries_it() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        source.fail_page(2, "timeout");
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        engine.on_anchor(2);
        complete_one(&mut engine, &mut rx).await;

        source.set_page(2, 5);
        assert!(engine.on_anchor(3));
        complete_one(&mut engine, &mut rx).await;
        assert_eq!(engine.snapshot().keys(), vec![1, 2]);
        assert_eq!(source.calls(), vec![(5, 1), (5, 2), (5, 2)]);
    }

    #[tokio::test]
    async fn failed_initial_load_retries() {
        let source = Arc::new(FakeSource::default());
        source.fail_page(1, "dns");
        let (mut engine, mut rx) = engine_with(source.clone(), 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        assert!(engine.snapshot().refresh_state().is_error());
        assert!(engine.snapshot().is_empty());

        source.set_page(1, 5);
        assert_eq!(engine.retry(), 1);
        complete_one(&mut engine, &mut rx).await;
        assert_eq!(engine.snapshot().len(), 5);
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        let (mut engine, mut rx) = engine_with(source.clone(), 2, STARTING_KEY);
        engine.start();

        let mut loaded = next_load(&mut rx).await;
        loaded.generation = 1;
        assert!(!engine.apply(loaded));
        assert!(engine.snapshot().is_empty());
        assert!(engine.snapshot().refresh_state().is_loading());
    }

    #[tokio::test]
    async fn completion_without_matching_request_is_ignored() {
        let source = Arc::new(FakeSource::with_full_pages(1, 5));
        let (mut engine, _rx) = engine_with(source, 1, STARTING_KEY);

        let loaded = PageLoaded {
            generation: 1,
            request: LoadRequest {
                key: 1,
                kind: LoadKind::Refresh,
                anchor: None,
            },
            result: LoadResult::Success(Page::new(1, vec![])),
        };
        assert!(!engine.apply(loaded));
        assert!(engine.snapshot().pages.is_empty());
    }

    #[tokio::test]
    async fn snapshots_are_not_mutated_by_later_merges() {
        let source = Arc::new(FakeSource::with_full_pages(2, 5));
        let (mut engine, mut rx) = engine_with(source, 1, STARTING_KEY);

        engine.start();
        complete_one(&mut engine, &mut rx).await;
        let before = engine.snapshot();

        engine.load_next(None);
        complete_one(&mut engine, &mut rx).await;

        assert_eq!(before.keys(), vec![1]);
        assert_eq!(engine.snapshot().keys(), vec![1, 2]);
    }
}
