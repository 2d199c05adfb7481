//! In-memory collaborators for integration tests
//!
//! Each fake counts every call it receives and can be told to answer slowly
//! or to fail with a fixed error.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ops_health::collaborators::{
    BucketInfo, ChannelInfo, Database, DependencyError, IndexInfo, ModelProvider, ObjectStore,
    ProviderProbe, RateLimitInfo, SlackApi, SlackIdentity, SlackMessage, SpeechApi, StaleJob,
    StatusCounts, StoredObject,
};
use ops_health::config::{AnalysisTable, DatabaseSettings, JobTable, OpsConfig, OrphanRule};
use ops_health::ToolContext;

/// Shared behaviour knobs: call counter, artificial latency, forced failure.
#[derive(Default)]
pub struct Behaviour {
    calls: AtomicUsize,
    delay: Mutex<Duration>,
    failure: Mutex<Option<DependencyError>>,
}

impl Behaviour {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_with(&self, error: DependencyError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    async fn enter(&self) -> Result<(), DependencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Database
// ============================================================================

pub struct FakeDatabase {
    pub behaviour: Behaviour,
    pub indexes: Mutex<Vec<IndexInfo>>,
    pub orphans: Mutex<i64>,
    pub counts: Mutex<StatusCounts>,
    pub stale: Mutex<Vec<StaleJob>>,
}

impl FakeDatabase {
    pub fn healthy() -> Self {
        let indexes = DatabaseSettings::default()
            .expected_indexes
            .into_iter()
            .map(|name| IndexInfo { name, valid: true })
            .collect();
        Self {
            behaviour: Behaviour::default(),
            indexes: Mutex::new(indexes),
            orphans: Mutex::new(0),
            counts: Mutex::new(StatusCounts {
                total: 10,
                done: 10,
                failed: 0,
            }),
            stale: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn ping(&self) -> Result<Duration, DependencyError> {
        self.behaviour.enter().await?;
        Ok(Duration::from_millis(2))
    }

    async fn list_indexes(&self, _schema: &str) -> Result<Vec<IndexInfo>, DependencyError> {
        self.behaviour.enter().await?;
        Ok(self.indexes.lock().unwrap().clone())
    }

    async fn reindex(&self, _schema: &str, index: &str) -> Result<(), DependencyError> {
        self.behaviour.enter().await?;
        for info in self.indexes.lock().unwrap().iter_mut() {
            if info.name == index {
                info.valid = true;
            }
        }
        Ok(())
    }

    async fn count_orphans(&self, _rule: &OrphanRule) -> Result<i64, DependencyError> {
        self.behaviour.enter().await?;
        Ok(*self.orphans.lock().unwrap())
    }

    async fn delete_orphans(&self, _rule: &OrphanRule) -> Result<u64, DependencyError> {
        self.behaviour.enter().await?;
        let mut orphans = self.orphans.lock().unwrap();
        let removed = u64::try_from(*orphans).unwrap_or(0);
        *orphans = 0;
        Ok(removed)
    }

    async fn status_counts(&self, _table: &AnalysisTable) -> Result<StatusCounts, DependencyError> {
        self.behaviour.enter().await?;
        Ok(*self.counts.lock().unwrap())
    }

    async fn reset_status(
        &self,
        _table: &AnalysisTable,
        _from: &str,
        _to: &str,
    ) -> Result<u64, DependencyError> {
        self.behaviour.enter().await?;
        let mut counts = self.counts.lock().unwrap();
        let moved = u64::try_from(counts.failed).unwrap_or(0);
        counts.failed = 0;
        Ok(moved)
    }

    async fn stale_jobs(
        &self,
        _jobs: &JobTable,
        older_than: Duration,
    ) -> Result<Vec<StaleJob>, DependencyError> {
        self.behaviour.enter().await?;
        Ok(self
            .stale
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.age >= older_than)
            .cloned()
            .collect())
    }

    async fn requeue_job(
        &self,
        _jobs: &JobTable,
        id: &str,
        _external_id: &str,
    ) -> Result<(), DependencyError> {
        self.behaviour.enter().await?;
        self.stale.lock().unwrap().retain(|j| j.id != id);
        Ok(())
    }

    async fn expire_jobs(&self, _jobs: &JobTable, ids: &[String]) -> Result<u64, DependencyError> {
        self.behaviour.enter().await?;
        let mut stale = self.stale.lock().unwrap();
        let before = stale.len();
        stale.retain(|j| !ids.contains(&j.id));
        Ok((before - stale.len()) as u64)
    }
}

// ============================================================================
// Slack
// ============================================================================

pub struct FakeSlack {
    pub behaviour: Behaviour,
    pub scopes: Mutex<Vec<String>>,
    pub is_member: Mutex<bool>,
    pub archived: Mutex<bool>,
    pub history: Mutex<Vec<SlackMessage>>,
    next_ts: AtomicUsize,
}

impl FakeSlack {
    pub fn healthy() -> Self {
        Self {
            behaviour: Behaviour::default(),
            scopes: Mutex::new(ops_health::config::SlackSettings::default().required_scopes),
            is_member: Mutex::new(true),
            archived: Mutex::new(false),
            history: Mutex::new(Vec::new()),
            next_ts: AtomicUsize::new(1),
        }
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn auth_test(&self) -> Result<SlackIdentity, DependencyError> {
        self.behaviour.enter().await?;
        Ok(SlackIdentity {
            user_id: "U0BOT".to_string(),
            team: Some("ops".to_string()),
            scopes: self.scopes.lock().unwrap().clone(),
            latency: Duration::from_millis(5),
        })
    }

    async fn channel_info(&self, _channel: &str) -> Result<ChannelInfo, DependencyError> {
        self.behaviour.enter().await?;
        Ok(ChannelInfo {
            is_member: *self.is_member.lock().unwrap(),
            is_archived: *self.archived.lock().unwrap(),
        })
    }

    async fn history(&self, _channel: &str, limit: u32) -> Result<Vec<SlackMessage>, DependencyError> {
        self.behaviour.enter().await?;
        let history = self.history.lock().unwrap();
        Ok(history.iter().take(limit as usize).cloned().collect())
    }

    async fn join_channel(&self, _channel: &str) -> Result<(), DependencyError> {
        self.behaviour.enter().await?;
        *self.is_member.lock().unwrap() = true;
        Ok(())
    }

    async fn post_message(&self, _channel: &str, text: &str) -> Result<String, DependencyError> {
        self.behaviour.enter().await?;
        if !*self.is_member.lock().unwrap() {
            return Err(DependencyError::Api {
                code: "not_in_channel".to_string(),
                message: "bot is not in the channel".to_string(),
                retryable: false,
            });
        }
        let ts = format!("1700000000.{:06}", self.next_ts.fetch_add(1, Ordering::SeqCst));
        self.history.lock().unwrap().insert(
            0,
            SlackMessage {
                ts: ts.clone(),
                text: Some(text.to_string()),
            },
        );
        Ok(ts)
    }
}

// ============================================================================
// Providers
// ============================================================================

pub struct FakeProvider {
    pub behaviour: Behaviour,
    pub requests: Option<RateLimitInfo>,
    pub submitted: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn healthy() -> Self {
        Self {
            behaviour: Behaviour::default(),
            requests: Some(RateLimitInfo {
                limit: 100,
                remaining: 90,
                reset_after: None,
            }),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelProvider for FakeProvider {
    async fn probe(&self) -> Result<ProviderProbe, DependencyError> {
        self.behaviour.enter().await?;
        Ok(ProviderProbe {
            latency: Duration::from_millis(40),
            model_count: 3,
            requests: self.requests,
            tokens: None,
        })
    }
}

#[async_trait]
impl SpeechApi for FakeProvider {
    async fn submit_transcription(&self, media_url: &str) -> Result<String, DependencyError> {
        self.behaviour.enter().await?;
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(media_url.to_string());
        Ok(format!("tx-{}", submitted.len()))
    }
}

// ============================================================================
// Storage
// ============================================================================

pub struct FakeStore {
    pub behaviour: Behaviour,
    pub bucket: Mutex<BucketInfo>,
    pub objects: Mutex<Vec<StoredObject>>,
}

impl FakeStore {
    pub fn healthy() -> Self {
        Self {
            behaviour: Behaviour::default(),
            bucket: Mutex::new(BucketInfo {
                name: ops_health::config::StorageSettings::default().bucket,
                public: false,
            }),
            objects: Mutex::new(vec![StoredObject {
                path: "calls/a.mp3".to_string(),
                size: Some(1_024),
                updated_at: None,
            }]),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, DependencyError> {
        self.behaviour.enter().await?;
        Ok(vec![self.bucket.lock().unwrap().clone()])
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        max_objects: usize,
    ) -> Result<Vec<StoredObject>, DependencyError> {
        self.behaviour.enter().await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.path.starts_with(prefix))
            .take(max_objects)
            .cloned()
            .collect())
    }

    async fn delete_objects(&self, _bucket: &str, paths: &[String]) -> Result<usize, DependencyError> {
        self.behaviour.enter().await?;
        let mut objects = self.objects.lock().unwrap();
        let before = objects.len();
        objects.retain(|o| !paths.contains(&o.path));
        Ok(before - objects.len())
    }
}

// ============================================================================
// Context
// ============================================================================

/// Every fake, kept so tests can inspect call counts after a run.
pub struct Fakes {
    pub database: Arc<FakeDatabase>,
    pub slack: Arc<FakeSlack>,
    pub speech: Arc<FakeProvider>,
    pub llm: Arc<FakeProvider>,
    pub storage: Arc<FakeStore>,
}

impl Fakes {
    pub fn healthy() -> Self {
        Self {
            database: Arc::new(FakeDatabase::healthy()),
            slack: Arc::new(FakeSlack::healthy()),
            speech: Arc::new(FakeProvider::healthy()),
            llm: Arc::new(FakeProvider::healthy()),
            storage: Arc::new(FakeStore::healthy()),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.database.behaviour.calls()
            + self.slack.behaviour.calls()
            + self.speech.behaviour.calls()
            + self.llm.behaviour.calls()
            + self.storage.behaviour.calls()
    }

    pub fn context(&self, config: OpsConfig) -> Arc<ToolContext> {
        Arc::new(
            ToolContext::new(Arc::new(config))
                .with_database(Arc::clone(&self.database) as Arc<dyn Database>)
                .with_slack(Arc::clone(&self.slack) as Arc<dyn SlackApi>)
                .with_speech(Arc::clone(&self.speech) as Arc<dyn SpeechApi>)
                .with_llm(Arc::clone(&self.llm) as Arc<dyn ModelProvider>)
                .with_storage(Arc::clone(&self.storage) as Arc<dyn ObjectStore>),
        )
    }
}

/// Config with storage pointed somewhere so its checks run.
pub fn test_config() -> OpsConfig {
    let mut config = OpsConfig::default();
    config.storage.base_url = Some("http://storage.test".to_string());
    config
}
