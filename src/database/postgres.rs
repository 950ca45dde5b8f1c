use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::database::manager::{with_timeout, DatabaseError};
use crate::database::models::{Movie, Password, Permissions, Runtime, Token, TokenScope, User};
use crate::database::repository::{MovieRepository, PermissionRepository, TokenRepository, UserRepository};
use crate::filter::{Filters, Metadata};

/// Postgres-backed record store. Every statement runs under `query_timeout`.
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }
}

fn movie_from_row(row: &PgRow) -> Result<Movie, sqlx::Error> {
    Ok(Movie {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        runtime: Runtime(row.try_get("runtime")?),
        genres: row.try_get("genres")?,
        version: row.try_get("version")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password: Password::from_hash(row.try_get("password_hash")?),
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

fn map_email_conflict(err: DatabaseError) -> DatabaseError {
    match err {
        DatabaseError::Sqlx(sqlx::Error::Database(db)) if db.constraint() == Some("users_email_key") => {
            DatabaseError::DuplicateEmail
        }
        other => other,
    }
}

const USER_COLUMNS: &str = "users.id, users.created_at, users.name, users.email::text AS email, \
                            users.password_hash, users.activated, users.version";

#[async_trait]
impl MovieRepository for PgStore {
    async fn insert(&self, mut movie: Movie) -> Result<Movie, DatabaseError> {
        let query = r#"
            INSERT INTO movies (title, year, runtime, genres)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        let row = with_timeout(
            self.query_timeout,
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .fetch_one(&self.pool),
        )
        .await?;

        movie.id = row.try_get("id")?;
        movie.created_at = row.try_get("created_at")?;
        movie.version = row.try_get("version")?;
        Ok(movie)
    }

    async fn get(&self, id: Uuid) -> Result<Movie, DatabaseError> {
        let query = r#"
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE id = $1
        "#;

        let row = with_timeout(self.query_timeout, sqlx::query(query).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or(DatabaseError::NotFound)?;
        Ok(movie_from_row(&row)?)
    }

    async fn update(&self, mut movie: Movie) -> Result<Movie, DatabaseError> {
        let query = r#"
            UPDATE movies
            SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        // No row back means the version moved on (or the movie is gone)
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(DatabaseError::EditConflict)?;

        movie.version = row.try_get("version")?;
        Ok(movie)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = with_timeout(
            self.query_timeout,
            sqlx::query("DELETE FROM movies WHERE id = $1").bind(id).execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError> {
        let query = format!(
            r#"
            SELECT count(*) OVER() AS total_records, id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
            AND (genres @> $2 OR $2 = '{{}}')
            {}
            LIMIT $3 OFFSET $4
            "#,
            filters.order_by_sql()?
        );

        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(&query)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let mut total_records = 0i64;
        let mut movies = Vec::with_capacity(rows.len());
        for row in &rows {
            total_records = row.try_get("total_records")?;
            movies.push(movie_from_row(row)?);
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        Ok((movies, metadata))
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, mut user: User) -> Result<User, DatabaseError> {
        let query = r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        let row = with_timeout(
            self.query_timeout,
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.password.hash_bytes())
                .bind(user.activated)
                .fetch_one(&self.pool),
        )
        .await
        .map_err(map_email_conflict)?;

        user.id = row.try_get("id")?;
        user.created_at = row.try_get("created_at")?;
        user.version = row.try_get("version")?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let query = format!("SELECT {} FROM users WHERE users.email = $1", USER_COLUMNS);

        let row = with_timeout(self.query_timeout, sqlx::query(&query).bind(email).fetch_optional(&self.pool))
            .await?
            .ok_or(DatabaseError::NotFound)?;
        Ok(user_from_row(&row)?)
    }

    async fn update(&self, mut user: User) -> Result<User, DatabaseError> {
        let query = r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        let row = with_timeout(
            self.query_timeout,
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.password.hash_bytes())
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(map_email_conflict)?
        .ok_or(DatabaseError::EditConflict)?;

        user.version = row.try_get("version")?;
        Ok(user)
    }

    async fn get_for_token(
        &self,
        scope: TokenScope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<User, DatabaseError> {
        let query = format!(
            r#"
            SELECT {}
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
            AND tokens.scope = $2
            AND tokens.expiry > $3
            "#,
            USER_COLUMNS
        );

        let row = with_timeout(
            self.query_timeout,
            sqlx::query(&query)
                .bind(token_hash)
                .bind(scope.as_str())
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(DatabaseError::NotFound)?;
        Ok(user_from_row(&row)?)
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        let query = r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
        "#;

        with_timeout(
            self.query_timeout,
            sqlx::query(query)
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<(), DatabaseError> {
        with_timeout(
            self.query_timeout,
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for PgStore {
    async fn get_all_for_user(&self, user_id: Uuid) -> Result<Permissions, DatabaseError> {
        let query = r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
        "#;

        let codes: Vec<String> = with_timeout(
            self.query_timeout,
            sqlx::query_scalar(query).bind(user_id).fetch_all(&self.pool),
        )
        .await?;
        Ok(codes.into_iter().collect())
    }

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> Result<(), DatabaseError> {
        let query = r#"
            INSERT INTO users_permissions
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
        "#;

        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        with_timeout(
            self.query_timeout,
            sqlx::query(query).bind(user_id).bind(codes).execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
