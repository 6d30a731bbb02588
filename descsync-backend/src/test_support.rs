//! In-memory platform fake and a fully wired component stack for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::db::{ChannelConnection, Database};
use crate::error::Result;
use crate::gateway::{
    ChannelDetails, ChannelMetrics, PlatformApi, QuotaGateway, RemoteFailure, VideoPage,
    VideoSnippet,
};
use crate::models::{Channel, Container, RemoteVideo, Template};
use crate::operations::Operations;
use crate::pipeline::{JobDispatcher, JobEvent, JobQueue, Pipeline};
use crate::plans::{DbTierLookup, PlanLimiter};
use crate::sync::{SyncOrchestrator, SyncReport};
use crate::variables::VariableStore;
use crate::vault::{CredentialVault, REQUIRED_SCOPE, TokenCipher, TokenEndpoint, TokenGrant};

pub const TEST_SECRET: &str = "test-token-encryption-secret";

#[derive(Clone)]
struct FakeVideo {
    channel: String,
    external_id: String,
    title: String,
    description: String,
}

#[derive(Default)]
struct FakeState {
    videos: Vec<FakeVideo>,
    pushes: HashMap<String, Vec<String>>,
    update_failures: HashMap<String, u16>,
    listing_failure: Option<u16>,
    page_size: Option<usize>,
    list_delay: Option<Duration>,
}

/// Platform and OAuth endpoint backed by in-memory state
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    pub refresh_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
}

impl FakePlatform {
    pub fn initial_access_token(external_channel_id: &str) -> String {
        format!("access-{}", external_channel_id)
    }

    pub fn add_video(&self, channel: &str, external_id: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        state.videos.push(FakeVideo {
            channel: channel.to_string(),
            external_id: external_id.to_string(),
            title: title.to_string(),
            description: String::new(),
        });
    }

    pub fn remove_video(&self, external_id: &str) {
        self.state
            .lock()
            .unwrap()
            .videos
            .retain(|v| v.external_id != external_id);
    }

    pub fn description_of(&self, external_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .videos
            .iter()
            .find(|v| v.external_id == external_id)
            .map(|v| v.description.clone())
    }

    /// Every description pushed for the video, oldest first
    pub fn pushes_for(&self, external_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .pushes
            .get(external_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = Some(size);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.state.lock().unwrap().list_delay = Some(delay);
    }

    pub fn fail_listing(&self, status: u16) {
        self.state.lock().unwrap().listing_failure = Some(status);
    }

    pub fn fail_updates_for(&self, external_id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .update_failures
            .insert(external_id.to_string(), status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.listing_failure = None;
        state.update_failures.clear();
    }

    fn snippet(&self, external_id: &str) -> Option<VideoSnippet> {
        self.state
            .lock()
            .unwrap()
            .videos
            .iter()
            .find(|v| v.external_id == external_id)
            .map(|v| VideoSnippet {
                external_video_id: v.external_id.clone(),
                title: v.title.clone(),
                description: v.description.clone(),
                category_id: "22".to_string(),
                tags: Vec::new(),
            })
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn own_channel(&self, token: &str) -> std::result::Result<ChannelDetails, RemoteFailure> {
        let external_channel_id = token.strip_prefix("access-").unwrap_or(token).to_string();
        Ok(ChannelDetails {
            title: format!("Channel {}", external_channel_id),
            uploads_playlist_id: Some(format!("UU{}", external_channel_id)),
            external_channel_id,
        })
    }

    async fn channel_details(
        &self,
        _token: &str,
        external_channel_id: &str,
    ) -> std::result::Result<ChannelDetails, RemoteFailure> {
        Ok(ChannelDetails {
            external_channel_id: external_channel_id.to_string(),
            title: format!("Channel {}", external_channel_id),
            uploads_playlist_id: Some(format!("UU{}", external_channel_id)),
        })
    }

    async fn list_playlist_page(
        &self,
        _token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> std::result::Result<VideoPage, RemoteFailure> {
        let (delay, failure) = {
            let state = self.state.lock().unwrap();
            (state.list_delay, state.listing_failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = failure {
            return Err(RemoteFailure::http(status, None, "listing failed"));
        }

        let channel = playlist_id.strip_prefix("UU").unwrap_or(playlist_id);
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let state = self.state.lock().unwrap();
        let size = state.page_size.unwrap_or(50);
        let all: Vec<RemoteVideo> = state
            .videos
            .iter()
            .filter(|v| v.channel == channel)
            .map(|v| RemoteVideo {
                external_video_id: v.external_id.clone(),
                title: v.title.clone(),
            })
            .collect();

        let end = (offset + size).min(all.len());
        Ok(VideoPage {
            videos: all[offset.min(end)..end].to_vec(),
            next_page_token: (end < all.len()).then(|| end.to_string()),
        })
    }

    async fn get_video_snippet(
        &self,
        _token: &str,
        external_video_id: &str,
    ) -> std::result::Result<VideoSnippet, RemoteFailure> {
        self.snippet(external_video_id)
            .ok_or_else(|| RemoteFailure::not_found(format!("video {} not found", external_video_id)))
    }

    async fn update_video_snippet(
        &self,
        _token: &str,
        snippet: &VideoSnippet,
    ) -> std::result::Result<(), RemoteFailure> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.update_failures.get(&snippet.external_video_id) {
            return Err(RemoteFailure::http(*status, None, "update failed"));
        }
        let video = state
            .videos
            .iter_mut()
            .find(|v| v.external_id == snippet.external_video_id)
            .ok_or_else(|| RemoteFailure::not_found("video not found"))?;
        video.description = snippet.description.clone();
        state
            .pushes
            .entry(snippet.external_video_id.clone())
            .or_default()
            .push(snippet.description.clone());
        Ok(())
    }

    async fn search_videos(
        &self,
        _token: &str,
        external_channel_id: &str,
        query: &str,
    ) -> std::result::Result<Vec<RemoteVideo>, RemoteFailure> {
        let query = query.to_lowercase();
        Ok(self
            .state
            .lock()
            .unwrap()
            .videos
            .iter()
            .filter(|v| v.channel == external_channel_id && v.title.to_lowercase().contains(&query))
            .map(|v| RemoteVideo {
                external_video_id: v.external_id.clone(),
                title: v.title.clone(),
            })
            .collect())
    }

    async fn delete_video(&self, _token: &str, external_video_id: &str) -> std::result::Result<(), RemoteFailure> {
        let mut state = self.state.lock().unwrap();
        let before = state.videos.len();
        state.videos.retain(|v| v.external_id != external_video_id);
        if state.videos.len() == before {
            return Err(RemoteFailure::not_found("video not found"));
        }
        Ok(())
    }

    async fn channel_metrics(
        &self,
        _token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<ChannelMetrics, RemoteFailure> {
        let days = (end - start).num_days() + 1;
        Ok(ChannelMetrics {
            views: 100 * days,
            estimated_minutes_watched: 250 * days,
            likes: 5 * days,
            subscribers_gained: days,
        })
    }
}

#[async_trait]
impl TokenEndpoint for FakePlatform {
    async fn exchange_code(&self, code: &str) -> std::result::Result<TokenGrant, RemoteFailure> {
        if code == "readonly-code" {
            return Ok(TokenGrant {
                access_token: "access-readonly".to_string(),
                expires_in: 3600,
                refresh_token: Some("refresh-readonly".to_string()),
                scope: Some("https://www.googleapis.com/auth/youtube.readonly".to_string()),
            });
        }
        Ok(TokenGrant {
            access_token: FakePlatform::initial_access_token(code),
            expires_in: 3600,
            refresh_token: Some(format!("refresh-{}", code)),
            scope: Some(REQUIRED_SCOPE.to_string()),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> std::result::Result<TokenGrant, RemoteFailure> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Long enough for concurrent callers to pile up behind the refresh lock
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(RemoteFailure::http(
                400,
                Some("invalid_grant".to_string()),
                "Token has been expired or revoked.",
            ));
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-{}", n),
            expires_in: 3600,
            refresh_token: None,
            scope: None,
        })
    }
}

/// Queue that only records what was published
#[derive(Default)]
pub struct RecordingQueue {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingQueue {
    pub fn published(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn publish(&self, event: JobEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Every component wired over an in-memory database and the fake platform
pub struct TestStack {
    pub db: Arc<Database>,
    pub cipher: TokenCipher,
    pub platform: Arc<FakePlatform>,
    pub queue: Arc<RecordingQueue>,
    pub vault: Arc<CredentialVault>,
    pub gateway: Arc<QuotaGateway>,
    pub limiter: Arc<PlanLimiter>,
    pub variables: Arc<VariableStore>,
    pub pipeline: Arc<Pipeline>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub dispatcher: Arc<JobDispatcher>,
    pub ops: Operations,
}

impl TestStack {
    pub fn new() -> Self {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let platform = Arc::new(FakePlatform::default());
        let queue = Arc::new(RecordingQueue::default());

        let vault = Arc::new(CredentialVault::new(
            db.clone(),
            TokenCipher::new(TEST_SECRET).unwrap(),
            platform.clone(),
        ));
        let gateway = Arc::new(QuotaGateway::new(db.clone(), vault.clone(), platform.clone()));
        let limiter = Arc::new(PlanLimiter::new(db.clone(), Arc::new(DbTierLookup::new(db.clone()))));
        let variables = Arc::new(VariableStore::new(db.clone()));
        let pipeline = Arc::new(Pipeline::new(
            db.clone(),
            gateway.clone(),
            variables.clone(),
            queue.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            db.clone(),
            gateway.clone(),
            limiter.clone(),
            variables.clone(),
            queue.clone(),
        ));
        let dispatcher = Arc::new(JobDispatcher::new(pipeline.clone(), orchestrator.clone()));
        let ops = Operations::new(
            db.clone(),
            vault.clone(),
            gateway.clone(),
            limiter.clone(),
            variables.clone(),
            pipeline.clone(),
            orchestrator.clone(),
            queue.clone(),
        );

        Self {
            db,
            cipher: TokenCipher::new(TEST_SECRET).unwrap(),
            platform,
            queue,
            vault,
            gateway,
            limiter,
            variables,
            pipeline,
            orchestrator,
            dispatcher,
            ops,
        }
    }

    /// Encrypted credentials as the vault would store them
    pub fn connection(user_id: i64, external_channel_id: &str) -> ChannelConnection {
        Self::connection_expiring(user_id, external_channel_id, 3600)
    }

    fn connection_expiring(user_id: i64, external_channel_id: &str, expires_in_secs: i64) -> ChannelConnection {
        let cipher = TokenCipher::new(TEST_SECRET).unwrap();
        ChannelConnection {
            user_id,
            external_channel_id: external_channel_id.to_string(),
            title: format!("Channel {}", external_channel_id),
            access_token: cipher
                .encrypt(&FakePlatform::initial_access_token(external_channel_id))
                .unwrap(),
            refresh_token: Some(cipher.encrypt(&format!("refresh-{}", external_channel_id)).unwrap()),
            token_expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
        }
    }

    /// Store a channel directly, without any platform calls
    pub async fn connected_channel(&self, user_id: i64, external_channel_id: &str, expires_in_secs: i64) -> Channel {
        let id = self
            .limiter
            .connect_channel(&Self::connection_expiring(user_id, external_channel_id, expires_in_secs))
            .unwrap();
        self.db.get_channel(id).unwrap().unwrap()
    }

    /// Insert `count` local videos as if a sync had found them
    pub fn discovered_videos(&self, channel: &Channel, count: usize) -> Vec<i64> {
        let remote: Vec<RemoteVideo> = (0..count)
            .map(|i| RemoteVideo {
                external_video_id: format!("{}-local-{}", channel.external_channel_id, i),
                title: format!("Video {}", i),
            })
            .collect();
        self.db
            .reconcile_channel_videos(channel.id, &remote)
            .unwrap()
            .discovered
    }

    pub fn template(&self, user_id: i64, name: &str, content: &str) -> Template {
        self.db.insert_template(user_id, name, content).unwrap()
    }

    pub fn container(&self, user_id: i64, name: &str, template_ids: &[i64]) -> Container {
        self.db
            .save_container(None, user_id, name, template_ids)
            .unwrap()
            .unwrap()
    }

    pub async fn sync(&self, channel: &Channel) -> SyncReport {
        self.orchestrator.sync_channel(channel.id).await.unwrap()
    }

    /// Sync the channel and return the local id of one of its videos
    pub async fn sync_and_find(&self, channel: &Channel, external_video_id: &str) -> i64 {
        self.sync(channel).await;
        self.db
            .list_videos_for_channel(channel.id)
            .unwrap()
            .into_iter()
            .find(|v| v.external_video_id == external_video_id)
            .map(|v| v.id)
            .unwrap()
    }
}
