//! Request Tracker
//!
//! Single-slot lock guarding "one authorization in flight per API".
//!
//! Opening is a compare-and-set: it succeeds only when no open, unexpired
//! tracker exists for the API. A stale tracker is closed with
//! [`CloseReason::TimedOut`] inside the same critical section as the new
//! tracker is inserted, so two concurrent callers can never both open one.
//! Stores backed by a shared database must give the same guarantee (unique
//! partial index on open trackers, or a transaction).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{MtdError, TrackerError};
use crate::types::{
    ApiId, CloseReason, EndpointTarget, RequestTracker, ReturnContext, TrackerId,
};

/// Result of a successful [`RequestTrackerStore::open`].
#[derive(Clone, Debug)]
pub struct TrackerOpened {
    /// The newly opened tracker.
    pub tracker: RequestTracker,
    /// A stale tracker that was closed with `timed_out` to make room.
    pub superseded: Option<RequestTracker>,
}

/// Result of [`RequestTrackerStore::close`].
#[derive(Clone, Debug)]
pub struct TrackerClosed {
    /// The tracker after the call.
    pub tracker: RequestTracker,
    /// `true` when this call moved the tracker from open to closed.
    pub closed_now: bool,
}

/// Request tracker persistence.
#[async_trait]
pub trait RequestTrackerStore: Send + Sync {
    /// Open a tracker for `api_id`.
    ///
    /// # Errors
    /// Returns `TrackerError::AlreadyOpen` if an open tracker younger than
    /// `timeout` exists for the API.
    async fn open(
        &self,
        api_id: &ApiId,
        endpoint: EndpointTarget,
        return_to: ReturnContext,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<TrackerOpened, MtdError>;

    /// Fetch a tracker by id.
    async fn get(&self, tracker_id: &TrackerId) -> Result<Option<RequestTracker>, MtdError>;

    /// The open tracker for an API, if any.
    async fn find_open(&self, api_id: &ApiId) -> Result<Option<RequestTracker>, MtdError>;

    /// Close a tracker on behalf of `api_id`.
    ///
    /// Closing an already closed tracker keeps the first reason and reports
    /// `closed_now == false`. Only one caller ever sees `closed_now == true`
    /// for a tracker. The tracker must belong to `api_id`; anything else is
    /// a caller bug reported as `TrackerError::ApiMismatch`.
    async fn close(
        &self,
        tracker_id: &TrackerId,
        api_id: &ApiId,
        reason: CloseReason,
    ) -> Result<TrackerClosed, MtdError>;
}

/// In-memory request tracker store.
///
/// Suitable for a single process; trackers are kept after closing for audit.
#[derive(Default)]
pub struct InMemoryRequestTrackerStore {
    trackers: Mutex<HashMap<TrackerId, RequestTracker>>,
}

impl InMemoryRequestTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tracker as-is (for seeding state).
    pub async fn insert(&self, tracker: RequestTracker) {
        self.trackers
            .lock()
            .await
            .insert(tracker.id.clone(), tracker);
    }

    /// All trackers recorded for an API, oldest first.
    pub async fn history(&self, api_id: &ApiId) -> Vec<RequestTracker> {
        let trackers = self.trackers.lock().await;
        let mut history: Vec<_> = trackers
            .values()
            .filter(|tracker| &tracker.api_id == api_id)
            .cloned()
            .collect();
        history.sort_by_key(|tracker| tracker.created_at);
        history
    }
}

#[async_trait]
impl RequestTrackerStore for InMemoryRequestTrackerStore {
    async fn open(
        &self,
        api_id: &ApiId,
        endpoint: EndpointTarget,
        return_to: ReturnContext,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<TrackerOpened, MtdError> {
        let mut trackers = self.trackers.lock().await;

        let existing = trackers
            .values_mut()
            .find(|tracker| &tracker.api_id == api_id && tracker.is_open());

        let superseded = match existing {
            Some(tracker) if !tracker.is_stale(now, timeout) => {
                return Err(TrackerError::AlreadyOpen {
                    api_id: api_id.clone(),
                    tracker_id: tracker.id.clone(),
                    age: tracker.age(now),
                }
                .into());
            }
            Some(tracker) => {
                tracker.close(CloseReason::TimedOut);
                info!(
                    api_id = %api_id,
                    tracker_id = %tracker.id,
                    "Closed stale authorisation request"
                );
                Some(tracker.clone())
            }
            None => None,
        };

        let tracker = RequestTracker::open(api_id.clone(), endpoint, return_to, now);
        trackers.insert(tracker.id.clone(), tracker.clone());

        Ok(TrackerOpened {
            tracker,
            superseded,
        })
    }

    async fn get(&self, tracker_id: &TrackerId) -> Result<Option<RequestTracker>, MtdError> {
        Ok(self.trackers.lock().await.get(tracker_id).cloned())
    }

    async fn find_open(&self, api_id: &ApiId) -> Result<Option<RequestTracker>, MtdError> {
        Ok(self
            .trackers
            .lock()
            .await
            .values()
            .find(|tracker| &tracker.api_id == api_id && tracker.is_open())
            .cloned())
    }

    async fn close(
        &self,
        tracker_id: &TrackerId,
        api_id: &ApiId,
        reason: CloseReason,
    ) -> Result<TrackerClosed, MtdError> {
        let mut trackers = self.trackers.lock().await;

        let tracker = trackers
            .get_mut(tracker_id)
            .ok_or_else(|| TrackerError::NotFound {
                tracker_id: tracker_id.clone(),
            })?;

        if &tracker.api_id != api_id {
            error!(
                tracker_id = %tracker_id,
                expected = %api_id,
                actual = %tracker.api_id,
                "Refusing to close a tracker that belongs to another api"
            );
            return Err(TrackerError::ApiMismatch {
                tracker_id: tracker_id.clone(),
                expected: api_id.clone(),
                actual: tracker.api_id.clone(),
            }
            .into());
        }

        let closed_now = tracker.close(reason);
        Ok(TrackerClosed {
            tracker: tracker.clone(),
            closed_now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TrackerStatus, TRACKER_TIMEOUT};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 9, 30, 0).unwrap()
    }

    async fn open(
        store: &InMemoryRequestTrackerStore,
        api: &str,
        now: DateTime<Utc>,
    ) -> Result<TrackerOpened, MtdError> {
        store
            .open(
                &ApiId::from(api),
                EndpointTarget::User,
                ReturnContext::default(),
                now,
                TRACKER_TIMEOUT,
            )
            .await
    }

    #[tokio::test]
    async fn test_open_when_idle() {
        let store = InMemoryRequestTrackerStore::new();
        let opened = assert_ok!(open(&store, "hello", start()).await);

        assert!(opened.tracker.is_open());
        assert!(opened.superseded.is_none());
        assert_eq!(
            store.find_open(&ApiId::from("hello")).await.unwrap(),
            Some(opened.tracker)
        );
    }

    #[tokio::test]
    async fn test_open_conflicts_within_timeout() {
        let store = InMemoryRequestTrackerStore::new();
        let first = open(&store, "hello", start()).await.unwrap();

        let result = open(&store, "hello", start() + chrono::Duration::minutes(9)).await;
        match result {
            Err(MtdError::Tracker(TrackerError::AlreadyOpen { tracker_id, age, .. })) => {
                assert_eq!(tracker_id, first.tracker.id);
                assert_eq!(age, Duration::from_secs(9 * 60));
            }
            other => panic!("Expected AlreadyOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_supersedes_stale_tracker() {
        let store = InMemoryRequestTrackerStore::new();
        let first = open(&store, "hello", start()).await.unwrap();

        let second = open(&store, "hello", start() + chrono::Duration::minutes(10))
            .await
            .unwrap();

        let superseded = second.superseded.unwrap();
        assert_eq!(superseded.id, first.tracker.id);
        assert_eq!(superseded.status, TrackerStatus::Closed(CloseReason::TimedOut));
        assert_ne!(second.tracker.id, first.tracker.id);

        let history = store.history(&ApiId::from("hello")).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|t| t.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn test_trackers_are_independent_per_api() {
        let store = InMemoryRequestTrackerStore::new();
        assert_ok!(open(&store, "vat", start()).await);
        assert_ok!(open(&store, "income-tax", start()).await);
        assert_err!(open(&store, "vat", start()).await);
    }

    #[tokio::test]
    async fn test_close_requires_matching_api() {
        let store = InMemoryRequestTrackerStore::new();
        let vat = open(&store, "vat", start()).await.unwrap();
        let income_tax = open(&store, "income-tax", start()).await.unwrap();

        let result = store
            .close(&vat.tracker.id, &ApiId::from("income-tax"), CloseReason::Response)
            .await;
        assert!(matches!(
            result,
            Err(MtdError::Tracker(TrackerError::ApiMismatch { .. }))
        ));

        // Neither tracker was touched.
        assert!(store.get(&vat.tracker.id).await.unwrap().unwrap().is_open());
        assert!(store.get(&income_tax.tracker.id).await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = InMemoryRequestTrackerStore::new();
        let opened = open(&store, "hello", start()).await.unwrap();
        let api = ApiId::from("hello");

        let closed = store
            .close(&opened.tracker.id, &api, CloseReason::Response)
            .await
            .unwrap();
        assert!(closed.closed_now);
        assert_eq!(closed.tracker.close_reason(), Some(CloseReason::Response));

        let again = store
            .close(&opened.tracker.id, &api, CloseReason::TimedOut)
            .await
            .unwrap();
        assert!(!again.closed_now);
        assert_eq!(again.tracker.close_reason(), Some(CloseReason::Response));
        assert!(store.find_open(&api).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_unknown_tracker() {
        let store = InMemoryRequestTrackerStore::new();
        let result = store
            .close(&TrackerId::from("missing"), &ApiId::from("hello"), CloseReason::Response)
            .await;
        assert!(matches!(
            result,
            Err(MtdError::Tracker(TrackerError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_close_has_one_winner() {
        let store = Arc::new(InMemoryRequestTrackerStore::new());
        let opened = open(&store, "hello", start()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = opened.tracker.id.clone();
                tokio::spawn(async move {
                    store
                        .close(&id, &ApiId::from("hello"), CloseReason::Response)
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().closed_now {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_concurrent_open_admits_one() {
        let store = Arc::new(InMemoryRequestTrackerStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .open(
                            &ApiId::from("hello"),
                            EndpointTarget::User,
                            ReturnContext::default(),
                            start(),
                            TRACKER_TIMEOUT,
                        )
                        .await
                        .is_ok()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
