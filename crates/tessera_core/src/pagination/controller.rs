//! Infinite-scroll state machine.

use super::{PageSource, PaginatedList, PaginationState};
use crate::error::{CoreResult, Failure};
use crate::repository::DEFAULT_PAGE_SIZE;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Configuration for a [`PaginationController`].
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Items per page.
    pub page_size: u32,
    /// Deadline for a single page fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl PaginationConfig {
    /// Creates a configuration with the given page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            fetch_timeout: None,
        }
    }

    /// Sets the per-fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

/// What a controller call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and applied.
    Loaded,
    /// A fetch ran and failed; the controller is in the error state.
    Failed,
    /// Nothing was fetched, or the result arrived after a reset and was
    /// dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    First,
    More,
    Refresh,
}

struct Flight<T> {
    op: Op,
    generation: u64,
    base: Option<PaginatedList<T>>,
    fallback: PaginationState<T>,
}

/// Restores the last known-good state if an in-flight fetch is dropped.
struct FlightGuard<'a, T: Clone + Send + Sync + 'static> {
    controller: &'a PaginationController<T>,
    generation: u64,
    fallback: Option<PaginationState<T>>,
}

impl<T: Clone + Send + Sync + 'static> FlightGuard<'_, T> {
    fn disarm(&mut self) {
        self.fallback = None;
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        let Some(fallback) = self.fallback.take() else {
            return;
        };
        let controller = self.controller;
        let generation = self.generation;
        controller.state.send_if_modified(|state| {
            if controller.generation.load(Ordering::SeqCst) != generation || !state.is_loading() {
                return false;
            }
            debug!("page fetch cancelled, restoring previous state");
            *state = fallback;
            true
        });
    }
}

/// Drives an infinite-scroll list over a [`PageSource`].
///
/// The controller owns one [`PaginationState`] and replaces it
/// atomically; observers follow it through [`subscribe`](Self::subscribe).
/// At most one fetch runs at a time. Results of fetches started before a
/// [`reset`](Self::reset) are discarded. Dropping a running
/// `load_more`/`refresh` future puts the previous state back.
///
/// # Example
///
/// ```rust,ignore
/// let controller = PaginationController::start(source, PaginationConfig::new(20)).await;
/// controller.load_more().await;
/// let shown = controller.state().items().len();
/// ```
pub struct PaginationController<T> {
    source: Arc<dyn PageSource<T>>,
    config: PaginationConfig,
    state: watch::Sender<PaginationState<T>>,
    generation: AtomicU64,
    last_failed: Mutex<Op>,
}

impl<T: Clone + Send + Sync + 'static> PaginationController<T> {
    /// Creates a controller in [`PaginationState::InitialLoading`] without
    /// fetching. Call [`reset`](Self::reset) to load page 1.
    pub fn new(source: Arc<dyn PageSource<T>>, config: PaginationConfig) -> Self {
        let (state, _) = watch::channel(PaginationState::InitialLoading);
        Self {
            source,
            config,
            state,
            generation: AtomicU64::new(0),
            last_failed: Mutex::new(Op::First),
        }
    }

    /// Creates a controller and loads page 1.
    pub async fn start(source: Arc<dyn PageSource<T>>, config: PaginationConfig) -> Self {
        let controller = Self::new(source, config);
        controller.reset().await;
        controller
    }

    /// The configuration.
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> PaginationState<T> {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<PaginationState<T>> {
        self.state.subscribe()
    }

    /// Fetches the next page and appends it.
    ///
    /// Only acts from [`PaginationState::Idle`] when more pages exist.
    /// While a fetch is running this is a no-op. On failure the loaded
    /// items are kept and the controller enters the error state.
    pub async fn load_more(&self) -> LoadOutcome {
        match self.begin(Op::More, false) {
            Some(flight) => self.fly(flight).await,
            None => LoadOutcome::Ignored,
        }
    }

    /// Re-fetches page 1 and replaces the dataset with it.
    ///
    /// The current data stays visible while refreshing and is kept if the
    /// refresh fails.
    pub async fn refresh(&self) -> LoadOutcome {
        match self.begin(Op::Refresh, false) {
            Some(flight) => self.fly(flight).await,
            None => LoadOutcome::Ignored,
        }
    }

    /// Re-attempts whatever failed, from the error state only.
    pub async fn retry(&self) -> LoadOutcome {
        match self.begin(Op::First, true) {
            Some(flight) => self.fly(flight).await,
            None => LoadOutcome::Ignored,
        }
    }

    /// Discards all state and loads page 1 from scratch.
    ///
    /// Any fetch still running from before the reset has its result
    /// dropped.
    pub async fn reset(&self) -> LoadOutcome {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = PaginationState::InitialLoading;
        });
        debug!(generation, "pagination reset");
        let flight = Flight {
            op: Op::First,
            generation,
            base: None,
            fallback: cancelled_initial(),
        };
        self.fly(flight).await
    }

    /// Performs the check-and-set that starts a fetch.
    fn begin(&self, op: Op, retrying: bool) -> Option<Flight<T>> {
        let mut flight = None;
        let last_failed = *self.last_failed.lock();
        self.state.send_if_modified(|state| {
            let generation = self.generation.load(Ordering::SeqCst);
            let started = if retrying {
                retry_transition(state, last_failed)
            } else {
                transition(state, op)
            };
            match started {
                Some((op, next, base)) => {
                    let fallback = match op {
                        Op::First => cancelled_initial(),
                        Op::More | Op::Refresh => state.clone(),
                    };
                    *state = next;
                    flight = Some(Flight {
                        op,
                        generation,
                        base,
                        fallback,
                    });
                    true
                }
                None => false,
            }
        });
        flight
    }

    async fn fly(&self, flight: Flight<T>) -> LoadOutcome {
        let Flight {
            op,
            generation,
            base,
            fallback,
        } = flight;
        let mut guard = FlightGuard {
            controller: self,
            generation,
            fallback: Some(fallback),
        };

        let page = match (op, &base) {
            (Op::More, Some(list)) => list.page() + 1,
            _ => 1,
        };
        debug!(page, ?op, "fetching page");
        let result = self.fetch(page).await;
        guard.disarm();

        let mut outcome = LoadOutcome::Ignored;
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation || !state.is_loading() {
                debug!(page, "discarding stale page result");
                return false;
            }
            match result {
                Ok(list) => {
                    *state = match (op, base) {
                        (Op::More, Some(base)) => PaginationState::Idle(base.concat(list)),
                        _ => PaginationState::Idle(list),
                    };
                    outcome = LoadOutcome::Loaded;
                }
                Err(failure) => {
                    warn!(page, error = %failure, "page fetch failed");
                    *self.last_failed.lock() = op;
                    *state = PaginationState::Error {
                        data: base,
                        failure,
                    };
                    outcome = LoadOutcome::Failed;
                }
            }
            true
        });
        outcome
    }

    async fn fetch(&self, page: u32) -> CoreResult<PaginatedList<T>> {
        let fetch = self.source.fetch(page, self.config.page_size);
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.unwrap_or_else(|_| {
                Err(Failure::timeout(format!("page {page} not loaded within {limit:?}")))
            }),
            None => fetch.await,
        }
    }
}

fn cancelled_initial<T>() -> PaginationState<T> {
    PaginationState::Error {
        data: None,
        failure: Failure::unexpected("initial page load was cancelled"),
    }
}

type Started<T> = (Op, PaginationState<T>, Option<PaginatedList<T>>);

fn transition<T: Clone>(state: &PaginationState<T>, op: Op) -> Option<Started<T>> {
    match (op, state) {
        (Op::More, PaginationState::Idle(list)) if list.has_more() => Some((
            Op::More,
            PaginationState::LoadingMore(list.clone()),
            Some(list.clone()),
        )),
        (Op::More, PaginationState::InitialLoading) => {
            warn!("load_more called before the first page was loaded; ignoring");
            None
        }
        (Op::Refresh, PaginationState::Idle(list))
        | (
            Op::Refresh,
            PaginationState::Error {
                data: Some(list), ..
            },
        ) => Some((
            Op::Refresh,
            PaginationState::Refreshing(list.clone()),
            Some(list.clone()),
        )),
        (Op::Refresh, PaginationState::Error { data: None, .. }) => {
            Some((Op::First, PaginationState::InitialLoading, None))
        }
        _ => None,
    }
}

fn retry_transition<T: Clone>(state: &PaginationState<T>, last_failed: Op) -> Option<Started<T>> {
    match state {
        PaginationState::Error { data: None, .. } => {
            Some((Op::First, PaginationState::InitialLoading, None))
        }
        PaginationState::Error {
            data: Some(list), ..
        } => {
            if last_failed == Op::More && list.has_more() {
                Some((
                    Op::More,
                    PaginationState::LoadingMore(list.clone()),
                    Some(list.clone()),
                ))
            } else {
                Some((
                    Op::Refresh,
                    PaginationState::Refreshing(list.clone()),
                    Some(list.clone()),
                ))
            }
        }
        _ => None,
    }
}
