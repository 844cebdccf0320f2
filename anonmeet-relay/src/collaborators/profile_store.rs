//! Profile store
//!
//! Holds one profile per participant. Writes replace; reads return a
//! snapshot with no ordering guarantee.

use async_trait::async_trait;
use anonmeet_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::info;

use crate::types::{Participant, ParticipantId};

/// Storage for submitted participant profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace the profile for a participant
    async fn put(&self, participant: &Participant) -> Result<()>;

    /// Snapshot of every stored profile
    async fn get_all(&self) -> Result<Vec<Participant>>;
}

/// Volatile store used when no database path is configured
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<ParticipantId, String>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn put(&self, participant: &Participant) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(participant.id.clone(), participant.profile.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Participant>> {
        Ok(self
            .profiles
            .read()
            .await
            .iter()
            .map(|(id, profile)| Participant::new(id.clone(), profile.clone()))
            .collect())
    }
}

/// SQLite-backed store
pub struct SqliteProfileStore {
    pool: Pool<Sqlite>,
}

impl SqliteProfileStore {
    /// Open (creating if missing) the database file and ensure the schema
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!("Profile database: {}", path.display());
        Self::with_pool(pool).await
    }

    /// Use an existing pool (e.g. `sqlite::memory:` in tests)
    pub async fn with_pool(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_responses (
                user_id TEXT PRIMARY KEY,
                profile TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn put(&self, participant: &Participant) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO user_responses (user_id, profile, submitted_at) VALUES (?, ?, ?)",
        )
        .bind(participant.id.as_str())
        .bind(&participant.profile)
        .bind(anonmeet_common::time::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Participant>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT user_id, profile FROM user_responses",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, profile)| Participant::new(ParticipantId::new(id), profile))
            .collect())
    }
}
