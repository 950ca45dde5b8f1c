use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Movie, Permissions, Token, TokenScope, User};
use crate::database::repository::{MovieRepository, PermissionRepository, TokenRepository, UserRepository};
use crate::filter::{Filters, Metadata, SortDirection};

/// In-process record store honouring the same contracts as the Postgres
/// store: versioned compare-and-swap updates, unique emails (case
/// insensitive), expiry-aware token lookup. Used when no `DATABASE_URL` is
/// configured, and by the test suite.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    movies: HashMap<Uuid, Movie>,
    users: HashMap<Uuid, User>,
    tokens: Vec<Token>,
    permissions: HashMap<Uuid, HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Rough equivalent of `to_tsvector('simple', title) @@ plainto_tsquery('simple', query)`.
fn title_matches(title: &str, query: &str) -> bool {
    let wanted = words(query);
    if wanted.is_empty() {
        return true;
    }
    let have = words(title);
    wanted.iter().all(|w| have.contains(w))
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl MovieRepository for MemoryStore {
    async fn insert(&self, mut movie: Movie) -> Result<Movie, DatabaseError> {
        movie.id = Uuid::new_v4();
        movie.created_at = Utc::now();
        movie.version = 1;
        self.state.write().movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get(&self, id: Uuid) -> Result<Movie, DatabaseError> {
        self.state.read().movies.get(&id).cloned().ok_or(DatabaseError::NotFound)
    }

    async fn update(&self, mut movie: Movie) -> Result<Movie, DatabaseError> {
        let mut state = self.state.write();
        match state.movies.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => {
                movie.version += 1;
                *stored = movie.clone();
                Ok(movie)
            }
            _ => Err(DatabaseError::EditConflict),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.state
            .write()
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound)
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError> {
        let column = filters.sort_column()?.to_string();
        let direction = filters.sort_direction();

        let mut matched: Vec<Movie> = self
            .state
            .read()
            .movies
            .values()
            .filter(|m| title_matches(&m.title, title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let primary = match direction {
                SortDirection::Asc => compare_by(&column, a, b),
                SortDirection::Desc => compare_by(&column, b, a),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total_records = matched.len() as i64;
        let page: Vec<Movie> = matched
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .collect();

        // Postgres derives the total from the returned rows, so a page past
        // the end reports nothing at all
        let metadata = if page.is_empty() {
            Metadata::default()
        } else {
            Metadata::calculate(total_records, filters.page, filters.page_size)
        };
        Ok((page, metadata))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, mut user: User) -> Result<User, DatabaseError> {
        let mut state = self.state.write();
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DatabaseError::DuplicateEmail);
        }
        user.id = Uuid::new_v4();
        user.created_at = Utc::now();
        user.version = 1;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        self.state
            .read()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }

    async fn update(&self, mut user: User) -> Result<User, DatabaseError> {
        let mut state = self.state.write();
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DatabaseError::DuplicateEmail);
        }
        match state.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                user.version += 1;
                *stored = user.clone();
                Ok(user)
            }
            _ => Err(DatabaseError::EditConflict),
        }
    }

    async fn get_for_token(
        &self,
        scope: TokenScope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError> {
        let state = self.state.read();
        state
            .tokens
            .iter()
            .find(|t| t.hash == token_hash && t.scope == scope && t.expiry > now)
            .and_then(|t| state.users.get(&t.user_id))
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        let mut stored = token.clone();
        stored.plaintext.clear();
        self.state.write().tokens.push(stored);
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<(), DatabaseError> {
        self.state
            .write()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn get_all_for_user(&self, user_id: Uuid) -> Result<Permissions, DatabaseError> {
        Ok(self
            .state
            .read()
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> Result<(), DatabaseError> {
        self.state
            .write()
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|c| c.to_string()));
        Ok(())
    }
}
