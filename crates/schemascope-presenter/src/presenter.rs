//! Graph presenter state machine
//!
//! `Idle -> Loading -> Loaded | Error`, re-entrant from any state. Every
//! transition goes through [`GraphPresenter::set_state`], which swaps in a new
//! snapshot and then notifies subscribers outside of any lock.
//!
//! Each load takes a sequence number. A response that arrives after a newer
//! load started is discarded with [`PresenterError::Superseded`] and never
//! touches the state.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use thiserror::Error;

use schemascope_core::{CacheStatus, GraphAdapter, GraphError, GraphRequest, GraphResult, RenderGraph};

use crate::backend::GraphBackend;
use crate::state::{Phase, PresenterState};

pub type Subscriber = Arc<dyn Fn(Arc<PresenterState>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PresenterError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("request #{sequence} was superseded by a newer request")]
    Superseded { sequence: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterOptions {
    /// Keep the last good graph visible when a load fails. Off by default,
    /// so a failed load shows no graph.
    pub keep_graph_on_error: bool,
}

#[derive(Debug, Clone, Copy)]
enum LoadOp {
    Fetch { use_cache: bool },
    Rebuild,
}

pub struct GraphPresenter {
    backend: Arc<dyn GraphBackend>,
    adapter: GraphAdapter,
    options: PresenterOptions,
    request: RwLock<GraphRequest>,
    state: Mutex<Arc<PresenterState>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    /// Sequence of the most recently issued load. Only written under `state`.
    sequence: AtomicU64,
}

impl GraphPresenter {
    pub fn new(backend: Arc<dyn GraphBackend>, adapter: GraphAdapter, request: GraphRequest) -> Self {
        Self {
            backend,
            adapter,
            options: PresenterOptions::default(),
            request: RwLock::new(request),
            state: Mutex::new(Arc::new(PresenterState::default())),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_options(mut self, options: PresenterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn request(&self) -> GraphRequest {
        self.request.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Target later loads at `request`. Does not load by itself.
    pub fn set_request(&self, request: GraphRequest) {
        *self.request.write().unwrap_or_else(PoisonError::into_inner) = request;
    }

    pub fn snapshot(&self) -> Arc<PresenterState> {
        Arc::clone(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn subscribe(&self, subscriber: impl Fn(Arc<PresenterState>) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(subscriber)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub async fn load_graph(&self, use_cache: bool) -> Result<Arc<PresenterState>, PresenterError> {
        self.load(LoadOp::Fetch { use_cache }).await
    }

    pub async fn rebuild(&self) -> Result<Arc<PresenterState>, PresenterError> {
        self.load(LoadOp::Rebuild).await
    }

    pub async fn refresh(&self) -> Result<Arc<PresenterState>, PresenterError> {
        self.load_graph(true).await
    }

    /// Clear the current request's cache entries, then load bypassing the cache.
    pub async fn clear_cache_and_reload(&self) -> Result<Arc<PresenterState>, PresenterError> {
        let request = self.request();
        if let Err(error) = self.backend.clear_cache(&request.cache_filter()).await {
            self.fail(&error);
            return Err(error.into());
        }
        self.load_graph(false).await
    }

    /// Refresh only `cache_status`. Failures are logged and otherwise ignored.
    pub async fn update_status(&self) {
        let request = self.request();
        match self.backend.status(&request).await {
            Ok(status) => {
                self.set_state(|state| state.cache_status = status);
            }
            Err(e) => tracing::warn!("Status check for {:?} failed: {}", request, e),
        }
    }

    /// Back to the initial state. In-flight loads are discarded when they land.
    pub fn reset(&self) {
        self.transition(|state| {
            self.sequence.fetch_add(1, Ordering::SeqCst);
            *state = PresenterState::default();
            true
        });
    }

    async fn load(&self, op: LoadOp) -> Result<Arc<PresenterState>, PresenterError> {
        let request = self.request();
        let mut sequence = 0;
        self.transition(|state| {
            sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            state.phase = Phase::Loading;
            state.loading = true;
            state.error = None;
            true
        });
        tracing::debug!("Load #{} ({:?}) for {:?}", sequence, op, request);

        let fetched = match op {
            LoadOp::Fetch { use_cache } => self.backend.get_graph(&request, use_cache).await,
            LoadOp::Rebuild => self.backend.rebuild(&request).await,
        };
        let outcome = fetched.and_then(|result| {
            let render = self.adapter.adapt(&result.graph)?;
            Ok((result, render))
        });

        let keep_graph = self.options.keep_graph_on_error;
        let mut failure = None;
        let committed = self.transition(|state| {
            if self.sequence.load(Ordering::SeqCst) != sequence {
                return false;
            }
            match &outcome {
                Ok((result, render)) => apply_loaded(state, result, render),
                Err(error) => {
                    apply_error(state, error, keep_graph);
                    failure = Some(error.clone());
                }
            }
            true
        });

        match (committed, failure) {
            (None, _) => {
                tracing::debug!("Discarding response of superseded load #{}", sequence);
                Err(PresenterError::Superseded { sequence })
            }
            (Some(_), Some(error)) => {
                tracing::warn!("Load #{} failed: {}", sequence, error);
                Err(error.into())
            }
            (Some(snapshot), None) => Ok(snapshot),
        }
    }

    fn fail(&self, error: &GraphError) {
        let keep_graph = self.options.keep_graph_on_error;
        self.set_state(|state| apply_error(state, error, keep_graph));
    }

    /// The single state mutator.
    fn set_state(&self, update: impl FnOnce(&mut PresenterState)) -> Arc<PresenterState> {
        self.transition(|state| {
            update(state);
            true
        })
        .unwrap_or_else(|| self.snapshot())
    }

    /// Apply `update` under the state lock. If it returns true, publish the
    /// new snapshot and notify subscribers; otherwise leave state untouched.
    fn transition(&self, update: impl FnOnce(&mut PresenterState) -> bool) -> Option<Arc<PresenterState>> {
        let snapshot = {
            let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut next = PresenterState::clone(&current);
            if !update(&mut next) {
                return None;
            }
            let snapshot = Arc::new(next);
            *current = Arc::clone(&snapshot);
            snapshot
        };
        self.notify(&snapshot);
        Some(snapshot)
    }

    fn notify(&self, snapshot: &Arc<PresenterState>) {
        let subscribers: Vec<(SubscriptionId, Subscriber)> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (id, subscriber) in subscribers {
            let delivered = catch_unwind(AssertUnwindSafe(|| subscriber(Arc::clone(snapshot))));
            if let Err(payload) = delivered {
                tracing::error!("Subscriber {:?} panicked: {}", id, panic_message(payload.as_ref()));
            }
        }
    }
}

fn apply_loaded(state: &mut PresenterState, result: &GraphResult, render: &RenderGraph) {
    state.phase = Phase::Loaded;
    state.loading = false;
    state.error = None;
    state.graph = Some(render.clone());
    state.generic_graph = Some(result.graph.clone());
    state.cache_status = CacheStatus {
        cached: result.cache_used,
        source_file_count: result.metadata.source_file_count,
        source_location: result.metadata.source_location.clone(),
    };
    state.last_refresh = Some(Utc::now());
}

fn apply_error(state: &mut PresenterState, error: &GraphError, keep_graph: bool) {
    state.phase = Phase::Error;
    state.loading = false;
    state.error = Some(error.to_string());
    if !keep_graph {
        state.graph = None;
        state.generic_graph = None;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
