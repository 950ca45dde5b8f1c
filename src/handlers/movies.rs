use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::models::{validate_movie, Movie, Runtime};
use crate::error::ApiError;
use crate::filter::{validate_filters, Filters};
use crate::handlers::extract::{read_csv, read_int, read_string, JsonBody};
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::validator::Validator;

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

pub const SORT_SAFE_LIST: [&str; 8] = ["id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime"];

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::record_not_found())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovie {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

/// GET /v1/movies
pub async fn list_movies(
    State(state): State<AppState>,
    Query(qs): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    let mut v = Validator::new();

    let title = read_string(&qs, "title", "");
    let genres = read_csv(&qs, "genres");
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safe_list: SORT_SAFE_LIST.iter().map(|s| s.to_string()).collect(),
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(v.into());
    }

    let (movies, metadata) = state.repos.movies.get_all(&title, &genres, &filters).await?;
    Ok(ApiResponse::success(json!({ "movies": movies, "metadata": metadata })))
}

/// POST /v1/movies
pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateMovie>,
) -> ApiResult<Value> {
    let movie = Movie::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(v.into());
    }

    let movie = state.repos.movies.insert(movie).await?;
    tracing::info!(movie_id = %movie.id, "created movie");

    let location = format!("/v1/movies/{}", movie.id);
    Ok(ApiResponse::created(json!({ "movie": movie })).with_location(location))
}

/// GET /v1/movies/:id
pub async fn show_movie(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let movie = state.repos.movies.get(parse_id(&id)?).await?;
    Ok(ApiResponse::success(json!({ "movie": movie })))
}

/// PATCH /v1/movies/:id
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovie>,
) -> ApiResult<Value> {
    let mut movie = state.repos.movies.get(parse_id(&id)?).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        if expected.as_bytes() != movie.version.to_string().as_bytes() {
            return Err(ApiError::EditConflict);
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(v.into());
    }

    let movie = state.repos.movies.update(movie).await?;
    Ok(ApiResponse::success(json!({ "movie": movie })))
}

/// DELETE /v1/movies/:id
pub async fn delete_movie(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.repos.movies.delete(parse_id(&id)?).await?;
    Ok(ApiResponse::success(json!({ "message": "movie successfully deleted" })))
}
