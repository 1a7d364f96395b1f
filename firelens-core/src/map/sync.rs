//! Viewport-driven hotspot synchronization
//!
//! [`ViewportSynchronizer::refresh`] fetches the features for a viewport and
//! pushes them into the map's hotspot source. At most one request is in
//! flight per synchronizer: starting a refresh aborts the previous one, and
//! an aborted request never touches the map, even if its response has
//! already arrived.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::future::{AbortHandle, AbortRegistration, Abortable};

use crate::config::MapConfig;
use crate::geo::{FeatureCollection, FeatureSource, FilterParams, Viewport, ViewportQuery};
use crate::lock;

use super::binding::{ApplyResult, ClickHook, DataSourceBinding};
use super::handle::MapHandle;

/// Result of one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No usable viewport yet, nothing was requested
    Skipped,
    /// Features were written to the map
    Applied { created: bool, features: usize },
    /// Response shape was invalid; map left untouched
    Malformed,
    /// Transport or server failure; map left untouched
    Failed,
    /// Superseded by a newer refresh or cancelled explicitly
    Cancelled,
}

/// One in-flight request and its cancellation capability.
#[derive(Debug, Clone)]
pub struct RequestToken {
    id: u64,
    handle: AbortHandle,
}

impl RequestToken {
    fn issue(id: u64) -> (Self, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        (Self { id, handle }, registration)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort the request. Aborting twice, or after completion, is a no-op.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

/// Keeps the hotspot source consistent with the current viewport and filters.
pub struct ViewportSynchronizer<M: MapHandle, S: FeatureSource> {
    map: M,
    source: S,
    source_name: String,
    layer_id: String,
    on_click: ClickHook,
    filters: Mutex<FilterParams>,
    binding: Mutex<DataSourceBinding>,
    in_flight: Mutex<Option<RequestToken>>,
    next_request: AtomicU64,
    detached: AtomicBool,
}

impl<M: MapHandle, S: FeatureSource> ViewportSynchronizer<M, S> {
    pub fn new(map: M, source: S, config: &MapConfig, on_click: ClickHook) -> Self {
        Self {
            map,
            source,
            source_name: config.source_name.clone(),
            layer_id: config.layer_id.clone(),
            on_click,
            filters: Mutex::new(FilterParams::new()),
            binding: Mutex::new(DataSourceBinding::Unbound),
            in_flight: Mutex::new(None),
            next_request: AtomicU64::new(1),
            detached: AtomicBool::new(false),
        }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn filters(&self) -> FilterParams {
        lock(&self.filters).clone()
    }

    pub fn set_filters(&self, filters: FilterParams) {
        *lock(&self.filters) = filters;
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.binding).is_bound()
    }

    /// True once [`detach`](Self::detach) has run; every later refresh is cancelled.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// True while a request is outstanding
    pub fn is_loading(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Refresh using the map's current viewport and the stored filters.
    pub async fn refresh_current(&self) -> RefreshOutcome {
        let viewport = self.map.viewport();
        let filters = self.filters();
        self.refresh(viewport, filters).await
    }

    /// Fetch features for `viewport` + `filters` and apply them to the map.
    pub async fn refresh(&self, viewport: Option<Viewport>, filters: FilterParams) -> RefreshOutcome {
        if self.is_detached() {
            return RefreshOutcome::Cancelled;
        }
        let Some(viewport) = viewport else {
            tracing::debug!("Map not initialized, skipping refresh");
            return RefreshOutcome::Skipped;
        };
        if let Err(e) = viewport.validate() {
            tracing::warn!(error = %e, "Skipping refresh");
            return RefreshOutcome::Skipped;
        }

        let query = ViewportQuery::new(viewport, filters);
        let (token, registration) = self.issue_token();

        tracing::debug!(
            request = token.id(),
            viewport = %viewport,
            source = %self.source_name,
            "Refreshing hotspots"
        );

        let result = Abortable::new(self.source.fetch(&query), registration).await;

        let outcome = match result {
            Err(_aborted) => RefreshOutcome::Cancelled,
            Ok(Err(e)) => {
                if token.is_cancelled() {
                    RefreshOutcome::Cancelled
                } else {
                    tracing::warn!(request = token.id(), error = %e, "Hotspot fetch failed");
                    RefreshOutcome::Failed
                }
            }
            Ok(Ok(body)) => match FeatureCollection::from_value(body) {
                Ok(collection) => self.apply_if_current(&token, &collection),
                Err(e) => {
                    if token.is_cancelled() {
                        RefreshOutcome::Cancelled
                    } else {
                        tracing::warn!(request = token.id(), error = %e, "Discarding hotspot response");
                        RefreshOutcome::Malformed
                    }
                }
            },
        };

        self.release(&token);

        if outcome == RefreshOutcome::Cancelled {
            tracing::debug!(request = token.id(), "Refresh superseded");
        }
        outcome
    }

    /// Forget the binding after a base style swap cleared the map.
    pub fn handle_style_reloaded(&self) {
        lock(&self.binding).reset();
        tracing::debug!(source = %self.source_name, "Style reloaded, binding reset");
    }

    /// Cancel outstanding work and drop the layer handlers. Used at teardown.
    ///
    /// Refreshes that start afterwards, including ones already spawned but
    /// not yet polled, return `Cancelled` without touching the map.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.cancel();
        lock(&self.binding).reset();
    }

    /// Abort the outstanding request, if any.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.in_flight).take() {
            token.cancel();
        }
    }

    /// Register a new token, aborting the previous one first.
    fn issue_token(&self) -> (RequestToken, AbortRegistration) {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (token, registration) = RequestToken::issue(id);

        let mut in_flight = lock(&self.in_flight);
        if let Some(previous) = in_flight.replace(token.clone()) {
            previous.cancel();
        }
        if self.is_detached() {
            token.cancel();
        }
        (token, registration)
    }

    /// Apply while holding the in-flight slot so no newer request can start
    /// between the staleness check and the write.
    fn apply_if_current(&self, token: &RequestToken, collection: &FeatureCollection) -> RefreshOutcome {
        let in_flight = lock(&self.in_flight);
        let current = in_flight.as_ref().is_some_and(|t| t.id == token.id);
        if !current || token.is_cancelled() || self.is_detached() {
            return RefreshOutcome::Cancelled;
        }

        let result = lock(&self.binding).apply(
            &self.map,
            &self.source_name,
            &self.layer_id,
            collection,
            &self.on_click,
        );
        drop(in_flight);

        tracing::debug!(
            request = token.id(),
            features = collection.len(),
            created = result == ApplyResult::Created,
            "Applied hotspots"
        );

        RefreshOutcome::Applied {
            created: result == ApplyResult::Created,
            features: collection.len(),
        }
    }

    fn release(&self, token: &RequestToken) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.as_ref().is_some_and(|t| t.id == token.id) {
            *in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::geo::{Feature, FireProperties};
    use crate::map::InMemoryMap;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    /// Feature source answering from a queue of pending replies.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        replies: Arc<Mutex<VecDeque<oneshot::Receiver<Result<serde_json::Value>>>>>,
        queries: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedSource {
        fn expect(&self) -> oneshot::Sender<Result<serde_json::Value>> {
            let (tx, rx) = oneshot::channel();
            lock(&self.replies).push_back(rx);
            tx
        }

        fn queries(&self) -> Vec<String> {
            lock(&self.queries).clone()
        }
    }

    impl FeatureSource for ScriptedSource {
        fn fetch(
            &self,
            query: &ViewportQuery,
        ) -> impl Future<Output = Result<serde_json::Value>> + Send {
            lock(&self.queries).push(query.to_query_string());
            let reply = lock(&self.replies).pop_front();
            async move {
                match reply {
                    Some(rx) => rx
                        .await
                        .unwrap_or_else(|_| Err(Error::Http("reply dropped".to_string()))),
                    None => Err(Error::Http("unexpected request".to_string())),
                }
            }
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(10.0, 20.0, 0.0, 1.0).unwrap()
    }

    fn body(ids: &[u64]) -> serde_json::Value {
        let features: Vec<Feature> = ids
            .iter()
            .map(|id| Feature::new(*id, 0.5, 15.0, FireProperties::default()))
            .collect();
        serde_json::to_value(FeatureCollection::new(features)).unwrap()
    }

    fn synchronizer(
        map: &InMemoryMap,
        source: &ScriptedSource,
    ) -> ViewportSynchronizer<InMemoryMap, ScriptedSource> {
        ViewportSynchronizer::new(
            map.clone(),
            source.clone(),
            &MapConfig::default(),
            Arc::new(|_: &Feature| {}),
        )
    }

    #[tokio::test]
    async fn test_skips_uninitialized_map() {
        let map = InMemoryMap::uninitialized("style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        assert_eq!(sync.refresh_current().await, RefreshOutcome::Skipped);
        assert!(source.queries().is_empty());
    }

    #[tokio::test]
    async fn test_newer_refresh_cancels_older() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        let reply_a = source.expect();
        let reply_b = source.expect();

        let first = sync.refresh(Some(viewport()), FilterParams::new());
        let second = async {
            tokio::task::yield_now().await;
            let refresh = sync.refresh(Some(viewport()), FilterParams::new());
            // A answers after B started; it must be ignored.
            let replies = async {
                tokio::task::yield_now().await;
                let _ = reply_a.send(Ok(body(&[1, 2, 3])));
                let _ = reply_b.send(Ok(body(&[7])));
            };
            let (outcome, ()) = tokio::join!(refresh, replies);
            outcome
        };

        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, RefreshOutcome::Cancelled);
        assert_eq!(
            b,
            RefreshOutcome::Applied {
                created: true,
                features: 1
            }
        );
        let data = map.source_data("fire_points").unwrap();
        assert_eq!(data.features[0].id, 7);
        assert_eq!(map.data_writes(), 1);
        assert!(!sync.is_loading());
    }

    #[tokio::test]
    async fn test_repeated_success_creates_layer_once() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        for n in 0..4u64 {
            source.expect().send(Ok(body(&[n]))).unwrap();
            sync.refresh_current().await;
        }

        assert_eq!(map.layer_adds(), 1);
        assert_eq!(map.data_writes(), 4);
        assert_eq!(map.click_handler_count("fire_points_layer"), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_leaves_map_untouched() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        source.expect().send(Ok(body(&[5]))).unwrap();
        sync.refresh_current().await;
        let before = map.source_data("fire_points");

        source.expect().send(Ok(json!({}))).unwrap();
        assert_eq!(sync.refresh_current().await, RefreshOutcome::Malformed);
        source
            .expect()
            .send(Ok(json!({ "features": "not-an-array" })))
            .unwrap();
        assert_eq!(sync.refresh_current().await, RefreshOutcome::Malformed);

        assert_eq!(map.source_data("fire_points"), before);
        assert_eq!(map.data_writes(), 1);
    }

    #[tokio::test]
    async fn test_null_property_columns_still_apply() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        let mut response = body(&[9]);
        response["features"][0]["properties"]["version"] = json!(null);
        response["features"][0]["properties"]["daynight"] = json!(null);
        source.expect().send(Ok(response)).unwrap();

        assert_eq!(
            sync.refresh_current().await,
            RefreshOutcome::Applied {
                created: true,
                features: 1
            }
        );
        assert_eq!(map.source_data("fire_points").unwrap().features[0].id, 9);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_applied() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        source
            .expect()
            .send(Err(Error::Http("connection refused".to_string())))
            .unwrap();
        assert_eq!(sync.refresh_current().await, RefreshOutcome::Failed);
        assert!(!map.has_source("fire_points"));
    }

    #[tokio::test]
    async fn test_filters_are_merged_into_query() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);
        sync.set_filters(
            FilterParams::new()
                .with("confidence", None)
                .with("daynight", Some("D".into())),
        );

        source.expect().send(Ok(body(&[]))).unwrap();
        sync.refresh_current().await;

        let queries = source.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("daynight=D"));
        assert!(!queries[0].contains("confidence"));
    }

    #[tokio::test]
    async fn test_style_reload_recreates_binding() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        source.expect().send(Ok(body(&[1]))).unwrap();
        sync.refresh_current().await;

        map.set_style("other");
        map.finish_style_load();
        sync.handle_style_reloaded();

        source.expect().send(Ok(body(&[2]))).unwrap();
        let outcome = sync.refresh_current().await;

        assert_eq!(
            outcome,
            RefreshOutcome::Applied {
                created: true,
                features: 1
            }
        );
        assert_eq!(map.layer_adds(), 2);
        assert_eq!(map.click_handler_count("fire_points_layer"), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        let reply = source.expect();
        let refresh = sync.refresh_current();
        let cancel = async {
            tokio::task::yield_now().await;
            sync.cancel();
            sync.cancel();
            let _ = reply.send(Ok(body(&[1])));
        };

        let (outcome, ()) = tokio::join!(refresh, cancel);
        assert_eq!(outcome, RefreshOutcome::Cancelled);
        assert!(!map.has_source("fire_points"));
        sync.cancel();
    }

    #[tokio::test]
    async fn test_refresh_after_detach_never_touches_map() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        sync.detach();
        assert!(sync.is_detached());
        assert_eq!(sync.refresh_current().await, RefreshOutcome::Cancelled);
        assert!(source.queries().is_empty());
        assert!(!map.has_source("fire_points"));
        assert_eq!(map.layer_adds(), 0);
    }

    #[tokio::test]
    async fn test_detach_during_fetch_discards_response() {
        let map = InMemoryMap::new(viewport(), "style");
        let source = ScriptedSource::default();
        let sync = synchronizer(&map, &source);

        let reply = source.expect();
        let refresh = sync.refresh_current();
        let teardown = async {
            tokio::task::yield_now().await;
            sync.detach();
            let _ = reply.send(Ok(body(&[1])));
        };

        let (outcome, ()) = tokio::join!(refresh, teardown);
        assert_eq!(outcome, RefreshOutcome::Cancelled);
        assert!(!map.has_source("fire_points"));
        assert_eq!(map.click_handler_count("fire_points_layer"), 0);
    }
}
