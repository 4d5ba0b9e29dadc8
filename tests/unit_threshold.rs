// Threshold caching against a real (in-memory) mirror.
//
// A wrapper store counts how often the average query reaches the database,
// so the recompute schedule can be checked across many calls.

#![cfg(feature = "sqlite")]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use ambassador::db::models::{AccountId, CandidateQuery, PageCursor, Post, StatusId};
use ambassador::db::sqlite::SqliteMirror;
use ambassador::db::{MirrorSession, MirrorStore};
use ambassador::threshold::{ThresholdError, ThresholdEstimator, ThresholdSettings};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn post(id: i64, favourites: i64, age: Duration) -> Post {
    Post {
        id: StatusId(id),
        account_id: AccountId(10 + id),
        favourites_count: favourites,
        updated_at: now() - age,
        reblog_of_id: None,
    }
}

struct CountingStore {
    inner: SqliteMirror,
    averages: Arc<AtomicUsize>,
}

struct CountingSession {
    inner: Box<dyn MirrorSession>,
    averages: Arc<AtomicUsize>,
}

#[async_trait]
impl MirrorStore for CountingStore {
    async fn open_session(&self) -> Result<Box<dyn MirrorSession>> {
        Ok(Box::new(CountingSession {
            inner: self.inner.open_session().await?,
            averages: self.averages.clone(),
        }))
    }
}

#[async_trait]
impl MirrorSession for CountingSession {
    async fn average_engagement(&mut self, since: DateTime<Utc>) -> Result<Option<f64>> {
        self.averages.fetch_add(1, Ordering::SeqCst);
        self.inner.average_engagement(since).await
    }

    async fn candidate_page(
        &mut self,
        query: &CandidateQuery,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Post>> {
        self.inner.candidate_page(query, after, limit).await
    }

    async fn reposted_among(
        &mut self,
        account: AccountId,
        ids: &[StatusId],
    ) -> Result<HashSet<StatusId>> {
        self.inner.reposted_among(account, ids).await
    }

    async fn repost_counts_by_source(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<HashMap<AccountId, i64>> {
        self.inner.repost_counts_by_source(account, since).await
    }
}

async fn counting_store(posts: &[Post]) -> CountingStore {
    let inner = SqliteMirror::in_memory().unwrap();
    for p in posts {
        inner.insert_post(p).await.unwrap();
    }
    CountingStore {
        inner,
        averages: Arc::new(AtomicUsize::new(0)),
    }
}

#[tokio::test]
async fn recomputes_once_per_check_interval() {
    let store = counting_store(&[post(1, 5, Duration::days(1)), post(2, 3, Duration::days(1))]).await;
    let mut estimator = ThresholdEstimator::new(ThresholdSettings {
        check_interval: 4,
        ..ThresholdSettings::default()
    });

    // One session per call, the way cycles use it
    let mut values = Vec::new();
    for _ in 0..10 {
        let mut session = store.open_session().await.unwrap();
        let t = estimator.current(session.as_mut(), now()).await.unwrap();
        values.push(t.value());
    }

    // Calls 1, 6 recompute: each fresh value serves the next four calls
    assert_eq!(store.averages.load(Ordering::SeqCst), 2);
    assert!(values.iter().all(|v| *v == 4.0));
}

#[tokio::test]
async fn cached_value_survives_mirror_changes_until_refresh() {
    let store = counting_store(&[post(1, 4, Duration::days(1))]).await;
    let mut estimator = ThresholdEstimator::new(ThresholdSettings {
        check_interval: 1,
        ..ThresholdSettings::default()
    });

    let mut session = store.open_session().await.unwrap();
    let first = estimator.current(session.as_mut(), now()).await.unwrap();
    drop(session);
    assert_eq!(first.value(), 4.0);

    store
        .inner
        .insert_post(&post(2, 20, Duration::days(1)))
        .await
        .unwrap();

    let mut session = store.open_session().await.unwrap();
    let cached = estimator.current(session.as_mut(), now()).await.unwrap();
    let refreshed = estimator.current(session.as_mut(), now()).await.unwrap();

    assert_eq!(cached.value(), 4.0);
    assert_eq!(refreshed.value(), 12.0);
    assert_eq!(store.averages.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn posts_outside_the_window_or_with_one_favourite_are_ignored() {
    let store = counting_store(&[
        post(1, 6, Duration::days(2)),
        post(2, 1, Duration::days(2)),
        post(3, 0, Duration::days(2)),
        post(4, 500, Duration::days(45)),
    ])
    .await;
    let mut estimator = ThresholdEstimator::new(ThresholdSettings::default());

    let mut session = store.open_session().await.unwrap();
    let t = estimator.current(session.as_mut(), now()).await.unwrap();
    assert_eq!(t.value(), 6.0);
}

#[tokio::test]
async fn failed_recompute_is_retried_on_the_next_call() {
    let store = counting_store(&[post(1, 1, Duration::days(2))]).await;
    let mut estimator = ThresholdEstimator::new(ThresholdSettings::default());

    let mut session = store.open_session().await.unwrap();
    let err = estimator.current(session.as_mut(), now()).await.unwrap_err();
    assert!(matches!(err, ThresholdError::NoData { window_days: 30 }));
    assert!(estimator.state().is_stale());
    drop(session);

    store
        .inner
        .insert_post(&post(2, 7, Duration::days(2)))
        .await
        .unwrap();

    let mut session = store.open_session().await.unwrap();
    let t = estimator.current(session.as_mut(), now()).await.unwrap();
    assert_eq!(t.value(), 7.0);
    assert_eq!(store.averages.load(Ordering::SeqCst), 2);
    assert_eq!(estimator.state().remaining_cycles, 15);
}
