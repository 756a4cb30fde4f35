use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::application::services::Sampling;
use crate::application::{ChatSession, DocumentService, EmbeddingFactory, SessionPipeline};
use crate::domain::{ports::EmbeddingService, DomainError, TextSplitter};
use crate::infrastructure::config::Credentials;
use crate::infrastructure::loaders::LoaderRegistry;
use crate::infrastructure::{AppConfig, GeminiGeneration, VertexEmbedding};

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    /// Milliseconds since the registry epoch.
    last_used: AtomicU64,
}

/// Live sessions by id. Each session serializes its own requests.
///
/// Every lookup refreshes the session's last-used time; sessions idle for
/// longer than the configured TTL are dropped by [`SessionRegistry::evict_idle`].
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    epoch: Instant,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            sessions: Arc::default(),
            epoch: Instant::now(),
        }
    }
}

impl SessionRegistry {
    fn millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }

    pub async fn create(&self, pipeline: Arc<SessionPipeline>) -> Uuid {
        let session = ChatSession::new(pipeline);
        let id = session.id();
        let entry = SessionEntry {
            session: Arc::new(Mutex::new(session)),
            last_used: AtomicU64::new(self.millis(Instant::now())),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<ChatSession>>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id)?;
        entry
            .last_used
            .store(self.millis(Instant::now()), Ordering::Relaxed);
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops sessions unused for longer than `ttl`. Returns how many went.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(Instant::now(), ttl).await
    }

    async fn evict_idle_at(&self, now: Instant, ttl: Duration) -> usize {
        let now = self.millis(now);
        let ttl = ttl.as_millis() as u64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            now.saturating_sub(entry.last_used.load(Ordering::Relaxed)) <= ttl
        });
        before - sessions.len()
    }

    /// Sweeps idle sessions every `interval` until the runtime shuts down.
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(ttl).await;
                if evicted > 0 {
                    let remaining = registry.len().await;
                    tracing::info!(evicted, remaining, "idle sessions evicted");
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<SessionPipeline>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: SessionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            sessions: SessionRegistry::default(),
        }
    }

    /// Wires the Gemini and Vertex AI clients from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, DomainError> {
        let pipeline = build_pipeline(&config)?;
        Ok(Self::new(config, pipeline))
    }
}

fn build_pipeline(config: &AppConfig) -> Result<SessionPipeline, DomainError> {
    let settings = &config.config;
    let credentials = Arc::new(config.credentials.clone());

    // Without a key the orchestrator answers before reaching the client.
    let generation = GeminiGeneration::new(
        &settings.llm,
        credentials.api_key().unwrap_or_default(),
    )?;

    let embedding_config = settings.embedding.clone();
    let embeddings: EmbeddingFactory = Arc::new(
        move |credentials: &Credentials| -> Result<Arc<dyn EmbeddingService>, DomainError> {
            let client = VertexEmbedding::from_credentials(&embedding_config, credentials)?;
            Ok(Arc::new(client))
        },
    );

    let splitter = TextSplitter::new(
        settings.chunking.chunk_size,
        settings.chunking.chunk_overlap,
    )?;

    Ok(SessionPipeline {
        credentials,
        prompts: Arc::new(config.prompts.clone()),
        documents: Arc::new(DocumentService::new(
            Arc::new(LoaderRegistry::new()),
            splitter,
        )),
        generation: Arc::new(generation),
        embeddings,
        sampling: Sampling::from(&settings.llm),
        default_temperature: settings.llm.temperature.clamp(0.0, 1.0),
        top_k: settings.rag.top_k,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_bad_chunking() {
        let mut config = AppConfig::default();
        config.config.chunking.chunk_overlap = config.config.chunking.chunk_size;
        assert!(matches!(
            AppState::from_config(config),
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_isolates_sessions() {
        let config = AppConfig {
            credentials: Credentials::from_pairs([("API_KEY", "key")]),
            ..AppConfig::default()
        };
        let state = AppState::from_config(config).unwrap();

        let a = state.sessions.create(state.pipeline.clone()).await;
        let b = state.sessions.create(state.pipeline.clone()).await;
        assert_ne!(a, b);
        assert_eq!(state.sessions.len().await, 2);

        assert!(state.sessions.remove(a).await);
        assert!(state.sessions.get(a).await.is_none());
        assert!(state.sessions.get(b).await.is_some());
        assert!(!state.sessions.remove(a).await);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let state = AppState::from_config(AppConfig::default()).unwrap();
        let ttl = Duration::from_secs(60);

        let idle = state.sessions.create(state.pipeline.clone()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let cutoff = Instant::now();
        let active = state.sessions.create(state.pipeline.clone()).await;

        let evicted = state.sessions.evict_idle_at(cutoff + ttl, ttl).await;
        assert_eq!(evicted, 1);
        assert!(state.sessions.get(idle).await.is_none());
        assert!(state.sessions.get(active).await.is_some());
    }

    #[tokio::test]
    async fn test_lookup_refreshes_last_use() {
        let state = AppState::from_config(AppConfig::default()).unwrap();
        let ttl = Duration::from_secs(60);

        let id = state.sessions.create(state.pipeline.clone()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let cutoff = Instant::now();
        assert!(state.sessions.get(id).await.is_some());

        assert_eq!(state.sessions.evict_idle_at(cutoff + ttl, ttl).await, 0);
        assert_eq!(state.sessions.len().await, 1);
    }
}
