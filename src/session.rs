//! # Session Cookie Reconciliation
//!
//! Every page load presents an optional old cookie and always leaves with
//! a fresh one. The backing record keeps the visitor's identity across
//! rotations: one record per live cookie value, a verified flag, and an
//! append-only timestamp trail.
//!
//! Finding two records with the same live cookie is an integrity
//! violation, not an error to paper over: the protocol fails closed and
//! mutates nothing so an operator can investigate.
//!
//! Two stores implement the protocol's storage interface: an in-memory
//! one (tests, single-node dev) and a Redis one wired the same way the
//! rest of the service talks to Redis. The single-match rotation is
//! transactional in both: the verified flag is read and the cookie
//! re-pointed with no observable intermediate state.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};
use uuid::Uuid;

const RECORD_PREFIX: &str = "packlist:record:";
const COOKIE_PREFIX: &str = "packlist:cookie:";
const LOCK_PREFIX: &str = "packlist:lock:";

const LOCK_TTL_MS: u64 = 5_000;
const LOCK_RETRY_MS: u64 = 20;
const LOCK_ATTEMPTS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub record_id: String,
    pub http_cookie: String,
    pub verified: bool,
    /// Append-only: creation instant first, one more per rotation.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl CookieRecord {
    fn fresh(cookie: &str, now: DateTime<Utc>) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            http_cookie: cookie.to_string(),
            verified: false,
            timestamps: vec![now],
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// More than one record holds the same cookie value. Never
    /// auto-resolved; the store is left exactly as found.
    #[error("more than one session record holds the same cookie value")]
    AmbiguousRecord,

    #[error("record store error: {0}")]
    Store(String),
}

impl SessionError {
    fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No old cookie was presented.
    Created,
    /// An old cookie was presented but matched no record.
    CreatedFromUnknown,
    /// Exactly one record matched and was re-pointed at the new cookie.
    /// Carries the verified flag read inside the same transaction.
    Rotated { verified: bool },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::CreatedFromUnknown => "created_from_unknown",
            Outcome::Rotated { .. } => "rotated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The freshly issued cookie value.
    pub cookie: String,
    pub outcome: Outcome,
}

impl Reconciliation {
    pub fn verified(&self) -> bool {
        matches!(self.outcome, Outcome::Rotated { verified: true })
    }
}

/// What a store-level rotation found under its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    NotFound,
    Rotated { verified: bool },
}

/// Storage interface for cookie records. Implementations must make
/// [`rotate`] atomic per record: two concurrent rotations of the same
/// old cookie may not both succeed, and a failed or cancelled call may
/// not leave a half-written record.
///
/// [`rotate`]: RecordStore::rotate
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: CookieRecord) -> Result<(), SessionError>;

    /// All records whose live cookie equals `cookie`. More than one
    /// result means the at-most-one invariant is already broken.
    async fn find(&self, cookie: &str) -> Result<Vec<CookieRecord>, SessionError>;

    /// Re-point the single record holding `old_cookie` at `new_cookie`,
    /// appending `now` to its trail, and report the verified flag read in
    /// the same transaction. Ambiguity fails without mutating.
    async fn rotate(
        &self,
        old_cookie: &str,
        new_cookie: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, SessionError>;
}

/// Issue a fresh cookie and reconcile it against the record store.
///
/// Every call generates a new token. No old cookie, or an old cookie no
/// record holds, creates a fresh unverified record; exactly one match
/// rotates it. Ambiguity propagates without a cookie and without any
/// mutation.
pub async fn reconcile(
    store: &dyn RecordStore,
    old_cookie: Option<&str>,
) -> Result<Reconciliation, SessionError> {
    let cookie = Uuid::new_v4().to_string();
    let now = Utc::now();

    let outcome = match old_cookie {
        None => {
            store.create(CookieRecord::fresh(&cookie, now)).await?;
            Outcome::Created
        }
        Some(old) => match store.rotate(old, &cookie, now).await? {
            Rotation::Rotated { verified } => Outcome::Rotated { verified },
            Rotation::NotFound => {
                store.create(CookieRecord::fresh(&cookie, now)).await?;
                Outcome::CreatedFromUnknown
            }
        },
    };

    Ok(Reconciliation { cookie, outcome })
}

/// Rotate without creating on a miss: issue a fresh token and re-point
/// the single record holding `cookie` at it. `None` means no record held
/// the cookie and nothing was written. Used where an unknown cookie must
/// stay unknown instead of gaining a fresh record.
pub async fn rotate(
    store: &dyn RecordStore,
    cookie: &str,
) -> Result<Option<Reconciliation>, SessionError> {
    let new_cookie = Uuid::new_v4().to_string();
    match store.rotate(cookie, &new_cookie, Utc::now()).await? {
        Rotation::Rotated { verified } => Ok(Some(Reconciliation {
            cookie: new_cookie,
            outcome: Outcome::Rotated { verified },
        })),
        Rotation::NotFound => Ok(None),
    }
}

/// Verify-only lookup: no rotation, no mutation. `None` means unknown
/// cookie; two or more matches is [`SessionError::AmbiguousRecord`].
pub async fn verify(
    store: &dyn RecordStore,
    cookie: &str,
) -> Result<Option<CookieRecord>, SessionError> {
    let mut found = store.find(cookie).await?;
    if found.len() > 1 {
        error!(matches = found.len(), "cookie matched multiple records");
        return Err(SessionError::AmbiguousRecord);
    }
    Ok(found.pop())
}

/// In-memory record store. One async mutex guards the whole record set,
/// which makes every trait method a single transaction.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: tokio::sync::Mutex<Vec<CookieRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap hook: flip the verified flag on the record holding
    /// `cookie`.
    pub async fn mark_verified(&self, cookie: &str) -> bool {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.http_cookie == cookie) {
            Some(record) => {
                record.verified = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: CookieRecord) -> Result<(), SessionError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn find(&self, cookie: &str) -> Result<Vec<CookieRecord>, SessionError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.http_cookie == cookie)
            .cloned()
            .collect())
    }

    async fn rotate(
        &self,
        old_cookie: &str,
        new_cookie: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, SessionError> {
        let mut records = self.records.lock().await;

        let mut matches = records
            .iter_mut()
            .filter(|r| r.http_cookie == old_cookie)
            .collect::<Vec<_>>();

        match matches.len() {
            0 => Ok(Rotation::NotFound),
            1 => {
                let record = &mut matches[0];
                let verified = record.verified;
                record.http_cookie = new_cookie.to_string();
                record.timestamps.push(now);
                Ok(Rotation::Rotated { verified })
            }
            _ => Err(SessionError::AmbiguousRecord),
        }
    }
}

/// Redis-backed record store.
///
/// Layout: a hash per record under `packlist:record:{id}`, and a set of
/// record ids per live cookie under `packlist:cookie:{value}` — the set
/// is what makes duplicate detection a single `SMEMBERS`. Rotation takes
/// a short-TTL `SET NX` lock on the old cookie, reads under the lock, and
/// applies all writes in one `MULTI`/`EXEC` pipeline, so a cancelled call
/// leaves the record fully old or fully new.
pub struct RedisRecordStore {
    connection: ConnectionManager,
}

impl RedisRecordStore {
    pub async fn connect(redis_url: &str) -> Result<Self, SessionError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url).map_err(SessionError::store)?;
        let connection = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(SessionError::store)?;

        Ok(Self { connection })
    }

    async fn acquire_lock(&self, cookie: &str) -> Result<String, SessionError> {
        let key = format!("{LOCK_PREFIX}{cookie}");
        let holder = Uuid::new_v4().to_string();
        let mut connection = self.connection.clone();

        for _ in 0..LOCK_ATTEMPTS {
            let set: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&holder)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL_MS)
                .query_async(&mut connection)
                .await
                .map_err(SessionError::store)?;

            if set.is_some() {
                return Ok(key);
            }
            sleep(Duration::from_millis(LOCK_RETRY_MS)).await;
        }

        Err(SessionError::Store(format!(
            "could not lock cookie record within {LOCK_ATTEMPTS} attempts"
        )))
    }

    async fn release_lock(&self, key: &str) {
        let mut connection = self.connection.clone();
        let released: Result<(), _> = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await;
        if let Err(err) = released {
            // the TTL will reap it; rotation just serializes a bit longer
            warn!("failed to release record lock {key}: {err}");
        }
    }

    async fn read_record(&self, record_id: &str) -> Result<Option<CookieRecord>, SessionError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(format!("{RECORD_PREFIX}{record_id}"))
            .query_async(&mut connection)
            .await
            .map_err(SessionError::store)?;

        if fields.is_empty() {
            return Ok(None);
        }

        let timestamps = fields
            .get("timestamps")
            .map(|raw| serde_json::from_str(raw).map_err(SessionError::store))
            .transpose()?
            .unwrap_or_default();

        Ok(Some(CookieRecord {
            record_id: record_id.to_string(),
            http_cookie: fields.get("cookie").cloned().unwrap_or_default(),
            verified: fields.get("verified").map(String::as_str) == Some("1"),
            timestamps,
        }))
    }

    async fn cookie_members(&self, cookie: &str) -> Result<Vec<String>, SessionError> {
        let mut connection = self.connection.clone();
        redis::cmd("SMEMBERS")
            .arg(format!("{COOKIE_PREFIX}{cookie}"))
            .query_async(&mut connection)
            .await
            .map_err(SessionError::store)
    }

    async fn rotate_locked(
        &self,
        old_cookie: &str,
        new_cookie: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, SessionError> {
        let ids = self.cookie_members(old_cookie).await?;
        if ids.is_empty() {
            return Ok(Rotation::NotFound);
        }
        if ids.len() > 1 {
            return Err(SessionError::AmbiguousRecord);
        }

        let record_id = &ids[0];
        let Some(mut record) = self.read_record(record_id).await? else {
            // stale index entry: the record hash is gone
            return Ok(Rotation::NotFound);
        };

        let verified = record.verified;
        record.timestamps.push(now);
        let timestamps = serde_json::to_string(&record.timestamps).map_err(SessionError::store)?;

        let record_key = format!("{RECORD_PREFIX}{record_id}");
        let mut connection = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(&record_key, "cookie", new_cookie)
            .ignore()
            .hset(&record_key, "timestamps", &timestamps)
            .ignore()
            .srem(format!("{COOKIE_PREFIX}{old_cookie}"), record_id)
            .ignore()
            .sadd(format!("{COOKIE_PREFIX}{new_cookie}"), record_id)
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(SessionError::store)?;

        Ok(Rotation::Rotated { verified })
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn create(&self, record: CookieRecord) -> Result<(), SessionError> {
        let timestamps = serde_json::to_string(&record.timestamps).map_err(SessionError::store)?;
        let record_key = format!("{RECORD_PREFIX}{}", record.record_id);

        let mut connection = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &record_key,
                &[
                    ("cookie", record.http_cookie.as_str()),
                    ("verified", if record.verified { "1" } else { "0" }),
                    ("timestamps", timestamps.as_str()),
                ],
            )
            .ignore()
            .sadd(
                format!("{COOKIE_PREFIX}{}", record.http_cookie),
                &record.record_id,
            )
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(SessionError::store)?;

        Ok(())
    }

    async fn find(&self, cookie: &str) -> Result<Vec<CookieRecord>, SessionError> {
        let mut records = Vec::new();
        for record_id in self.cookie_members(cookie).await? {
            if let Some(record) = self.read_record(&record_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn rotate(
        &self,
        old_cookie: &str,
        new_cookie: &str,
        now: DateTime<Utc>,
    ) -> Result<Rotation, SessionError> {
        let lock_key = self.acquire_lock(old_cookie).await?;
        let rotation = self.rotate_locked(old_cookie, new_cookie, now).await;
        self.release_lock(&lock_key).await;
        rotation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn no_old_cookie_creates_a_fresh_unverified_record() {
        let store = MemoryRecordStore::new();

        let result = reconcile(&store, None).await.unwrap();
        assert_eq!(result.outcome, Outcome::Created);
        assert!(!result.verified());

        let record = verify(&store, &result.cookie).await.unwrap().unwrap();
        assert!(!record.verified);
        assert_eq!(record.timestamps.len(), 1);
    }

    #[tokio::test]
    async fn unknown_old_cookie_creates_rather_than_fails() {
        let store = MemoryRecordStore::new();

        let result = reconcile(&store, Some("never-issued")).await.unwrap();
        assert_eq!(result.outcome, Outcome::CreatedFromUnknown);
        assert!(verify(&store, &result.cookie).await.unwrap().is_some());
        // the unknown value itself gained no record
        assert!(verify(&store, "never-issued").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_match_rotates_and_reads_verified() {
        let store = MemoryRecordStore::new();
        let first = reconcile(&store, None).await.unwrap();
        store.mark_verified(&first.cookie).await;
        let before = verify(&store, &first.cookie).await.unwrap().unwrap();

        let second = reconcile(&store, Some(&first.cookie)).await.unwrap();
        assert_eq!(second.outcome, Outcome::Rotated { verified: true });
        assert!(second.verified());

        // the old value is dead, the stored cookie equals the returned one
        assert!(verify(&store, &first.cookie).await.unwrap().is_none());
        let record = verify(&store, &second.cookie).await.unwrap().unwrap();
        assert_eq!(record.http_cookie, second.cookie);
        assert_eq!(record.timestamps.len(), 2);
        // rotation preserves identity: same record, new cookie
        assert_eq!(record.record_id, before.record_id);
    }

    #[tokio::test]
    async fn duplicate_records_fail_closed_without_mutation() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();
        let mut a = CookieRecord::fresh("dup", now);
        a.verified = true;
        let b = CookieRecord::fresh("dup", now);
        store.create(a.clone()).await.unwrap();
        store.create(b.clone()).await.unwrap();

        let err = reconcile(&store, Some("dup")).await.unwrap_err();
        assert!(matches!(err, SessionError::AmbiguousRecord));

        // both records are exactly as they were
        let found = store.find("dup").await.unwrap();
        assert_eq!(found, vec![a, b]);

        let err = verify(&store, "dup").await.unwrap_err();
        assert!(matches!(err, SessionError::AmbiguousRecord));
    }

    #[tokio::test]
    async fn concurrent_rotations_of_one_cookie_yield_one_winner() {
        let store = Arc::new(MemoryRecordStore::new());
        let first = reconcile(store.as_ref(), None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let old = first.cookie.clone();
            handles.push(tokio::spawn(async move {
                reconcile(store.as_ref(), Some(&old)).await.unwrap()
            }));
        }

        let mut rotated = 0;
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap().outcome {
                Outcome::Rotated { .. } => rotated += 1,
                Outcome::CreatedFromUnknown => created += 1,
                Outcome::Created => unreachable!("an old cookie was always presented"),
            }
        }

        // exactly one request wins the rotation; the rest see a miss and
        // create fresh records, never a half-rotated one
        assert_eq!(rotated, 1);
        assert_eq!(created, 7);
    }

    #[tokio::test]
    async fn rotate_never_creates_on_a_miss() {
        let store = MemoryRecordStore::new();

        assert_eq!(rotate(&store, "never-issued").await.unwrap(), None);
        // unlike reconcile, the unknown value gained no record
        assert!(store.find("never-issued").await.unwrap().is_empty());
        assert!(store.records.lock().await.is_empty());

        // with a real record it behaves like the single-match branch
        let first = reconcile(&store, None).await.unwrap();
        let rotated = rotate(&store, &first.cookie).await.unwrap().unwrap();
        assert_eq!(rotated.outcome, Outcome::Rotated { verified: false });
        assert!(verify(&store, &first.cookie).await.unwrap().is_none());
        assert!(verify(&store, &rotated.cookie).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn every_call_issues_a_distinct_token() {
        let store = MemoryRecordStore::new();
        let a = reconcile(&store, None).await.unwrap();
        let b = reconcile(&store, None).await.unwrap();
        let c = reconcile(&store, Some(&a.cookie)).await.unwrap();
        assert_ne!(a.cookie, b.cookie);
        assert_ne!(a.cookie, c.cookie);
        assert_ne!(b.cookie, c.cookie);
    }
}
