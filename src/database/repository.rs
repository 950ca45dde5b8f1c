use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::memory::MemoryStore;
use crate::database::models::{Movie, Permissions, Token, TokenScope, User};
use crate::database::postgres::PgStore;
use crate::filter::{Filters, Metadata};

#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Persists a new movie and returns it with id, created_at and version set.
    async fn insert(&self, movie: Movie) -> Result<Movie, DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Movie, DatabaseError>;

    /// Compare-and-swap on `movie.version`; a stale version is `EditConflict`.
    async fn update(&self, movie: Movie) -> Result<Movie, DatabaseError>;

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// `title` is a full-text match (empty matches everything); every entry of
    /// `genres` must be present on a movie for it to match.
    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, DatabaseError>;

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError>;

    async fn update(&self, user: User) -> Result<User, DatabaseError>;

    /// Owner of an unexpired token with this hash and scope.
    async fn get_for_token(
        &self,
        scope: TokenScope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError>;

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn get_all_for_user(&self, user_id: Uuid) -> Result<Permissions, DatabaseError>;

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> Result<(), DatabaseError>;
}

/// One handle per record collection, all backed by the same store.
#[derive(Clone)]
pub struct Repositories {
    pub movies: Arc<dyn MovieRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool, query_timeout: Duration) -> Self {
        let store = Arc::new(PgStore::new(pool, query_timeout));
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}
