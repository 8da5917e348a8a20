use std::sync::Arc;

use crate::config::{Config, QuestionSource, StoreBackend};
use crate::store::{DuelStore, InMemoryDuelStore, RedisDuelStore};
use duel_service::DuelEngine;
use question_bank::{MongoQuestionBank, QuestionBank, StaticQuestionBank};
use supervisor::{DuelSupervisor, REAP_INTERVAL};

pub struct AppState {
    pub config: Config,
    pub engine: Arc<DuelEngine>,
    pub supervisor: Arc<DuelSupervisor>,
    pub questions: Arc<dyn QuestionBank>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn DuelStore> = match config.store_backend {
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory duel store; duels are lost on restart");
                Arc::new(InMemoryDuelStore::new())
            }
            StoreBackend::Redis => {
                tracing::info!("Attempting to connect to Redis...");
                let client = redis::Client::open(config.redis_uri.as_str())?;
                Arc::new(RedisDuelStore::connect(client, config.duel_ttl_seconds).await?)
            }
        };

        let questions: Arc<dyn QuestionBank> = match config.question_source {
            QuestionSource::Static => Arc::new(StaticQuestionBank::with_defaults()),
            QuestionSource::Mongo => {
                tracing::info!("Connecting to MongoDB question bank...");
                let client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                Arc::new(MongoQuestionBank::new(client.database(&config.mongo_database)))
            }
        };

        Ok(Self::with_parts(config, store, questions))
    }

    /// Wires the engine and supervisor over an already-built store and bank.
    /// Must run inside a tokio runtime: it starts the supervisor's reaper.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DuelStore>,
        questions: Arc<dyn QuestionBank>,
    ) -> Self {
        let engine = Arc::new(DuelEngine::new(store, config.duel.max_write_attempts));
        let supervisor = Arc::new(DuelSupervisor::new(
            engine.clone(),
            config.duel.turn_duration(),
            config.bots.clone(),
        ));
        DuelSupervisor::spawn_reaper(&supervisor, REAP_INTERVAL);
        tracing::info!(
            "Duel engine ready: store={}, turn_duration={}s, bots={}",
            engine.store().backend_name(),
            config.duel.turn_duration_seconds,
            config.bots.len()
        );

        Self {
            config,
            engine,
            supervisor,
            questions,
        }
    }
}

pub mod bot_service;
pub mod duel_service;
pub mod question_bank;
pub mod state_machine;
pub mod supervisor;
pub mod turn_clock;
