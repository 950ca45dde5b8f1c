mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};

use common::TestApp;
use marquee_api::database::models::{MOVIES_READ, MOVIES_WRITE};

async fn writer(app: &TestApp) -> String {
    app.user_with_token("writer@example.com", true, &[MOVIES_READ, MOVIES_WRITE])
        .await
        .1
}

async fn create(app: &TestApp, token: &str, movie: Value) -> Value {
    let res = app.request(Method::POST, "/v1/movies", Some(token), Some(movie)).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    res.body["data"]["movie"].clone()
}

fn titles(body: &Value) -> Vec<String> {
    body["data"]["movies"]
        .as_array()
        .expect("movies array")
        .iter()
        .map(|m| m["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn crud_round() {
    let app = TestApp::new();
    let token = writer(&app).await;

    let res = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({"title": "Moana", "year": 2016, "runtime": "107 mins", "genres": ["animation", "adventure"]})),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let movie = &res.body["data"]["movie"];
    let id = movie["id"].as_str().unwrap().to_string();
    assert_eq!(res.headers[header::LOCATION], format!("/v1/movies/{}", id));
    assert_eq!(movie["runtime"], "107 mins");
    assert_eq!(movie["version"], 1);

    let res = app.get(&format!("/v1/movies/{}", id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["movie"]["title"], "Moana");

    // Partial update keeps untouched fields
    let res = app
        .request(Method::PATCH, &format!("/v1/movies/{}", id), Some(&token), Some(json!({"year": 2017})))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["movie"]["year"], 2017);
    assert_eq!(res.body["data"]["movie"]["title"], "Moana");
    assert_eq!(res.body["data"]["movie"]["version"], 2);

    let res = app.request(Method::DELETE, &format!("/v1/movies/{}", id), Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["message"], "movie successfully deleted");

    let res = app.get(&format!("/v1/movies/{}", id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.request(Method::DELETE, &format!("/v1/movies/{}", id), Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_id_is_not_found() {
    let app = TestApp::new();
    let token = writer(&app).await;
    let res = app.get("/v1/movies/not-a-uuid", Some(&token)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn create_validates_fields() {
    let app = TestApp::new();
    let token = writer(&app).await;

    let res = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({"title": "", "year": 1500, "runtime": "-1 mins", "genres": ["drama", "drama"]})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["code"], "UNPROCESSABLE_ENTITY");
    let errors = &res.body["field_errors"];
    assert_eq!(errors["title"], "must be provided");
    assert_eq!(errors["year"], "must be greater than 1888");
    assert_eq!(errors["runtime"], "must be a positive integer");
    assert_eq!(errors["genres"], "must not contain duplicate values");

    let res = app.request(Method::POST, "/v1/movies", Some(&token), Some(json!({}))).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["field_errors"]["year"], "must be provided");
    assert_eq!(res.body["field_errors"]["genres"], "must contain at least 1 genre");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = TestApp::new();
    let token = writer(&app).await;

    let cases: [(&str, &str); 4] = [
        ("", "body must not be empty"),
        ("{\"title\": \"Moana\", }", "body contains badly-formed JSON"),
        ("{\"title\": \"Moana\", \"rating\": 5}", "body contains unknown key \"rating\""),
        ("{\"title\": \"Moana\"} {}", "body must only contain a single JSON value"),
    ];

    for (body, expected) in cases {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/movies")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let res = app.send(request).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{}", body);
        assert!(
            res.body["message"].as_str().unwrap().starts_with(expected),
            "{} -> {}",
            body,
            res.body["message"]
        );
    }

    let oversized = format!("{{\"title\": \"{}\"}}", "x".repeat(1_048_577));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/movies")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(oversized))
        .unwrap();
    let res = app.send(request).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "body must not be larger than 1048576 bytes");
}

#[tokio::test]
async fn expected_version_header_guards_updates() {
    let app = TestApp::new();
    let token = writer(&app).await;
    let movie = create(
        &app,
        &token,
        json!({"title": "Heat", "year": 1995, "runtime": "170 mins", "genres": ["crime"]}),
    )
    .await;
    let uri = format!("/v1/movies/{}", movie["id"].as_str().unwrap());

    let stale = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("X-Expected-Version", "7")
        .body(Body::from(json!({"title": "Heat (1995)"}).to_string()))
        .unwrap();
    let res = app.send(stale).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["code"], "EDIT_CONFLICT");

    let current = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("X-Expected-Version", "1")
        .body(Body::from(json!({"title": "Heat (1995)"}).to_string()))
        .unwrap();
    let res = app.send(current).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["movie"]["version"], 2);
}

#[tokio::test]
async fn listing_filters_sorts_and_pages() {
    let app = TestApp::new();
    let token = writer(&app).await;

    for (title, year, genres) in [
        ("The Godfather", 1972, vec!["crime", "drama"]),
        ("The Godfather Part II", 1974, vec!["crime", "drama"]),
        ("Alien", 1979, vec!["horror", "sci-fi"]),
        ("Aliens", 1986, vec!["action", "sci-fi"]),
        ("Heat", 1995, vec!["crime", "thriller"]),
    ] {
        create(&app, &token, json!({"title": title, "year": year, "runtime": "120 mins", "genres": genres})).await;
    }

    let res = app.get("/v1/movies?title=godfather&sort=-year", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(titles(&res.body), vec!["The Godfather Part II", "The Godfather"]);
    assert_eq!(res.body["data"]["metadata"]["total_records"], 2);

    let res = app.get("/v1/movies?genres=crime,drama&sort=year", Some(&token)).await;
    assert_eq!(titles(&res.body), vec!["The Godfather", "The Godfather Part II"]);

    let res = app.get("/v1/movies?sort=title&page=2&page_size=2", Some(&token)).await;
    assert_eq!(titles(&res.body), vec!["Heat", "The Godfather"]);
    let meta = &res.body["data"]["metadata"];
    assert_eq!(meta["current_page"], 2);
    assert_eq!(meta["page_size"], 2);
    assert_eq!(meta["total_pages"], 3);
    assert_eq!(meta["total_records"], 5);
    assert_eq!(meta["has_next"], true);
    assert_eq!(meta["has_prev"], true);

    // No matches: empty list and empty metadata
    let res = app.get("/v1/movies?title=casablanca", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(titles(&res.body).is_empty());
    assert_eq!(res.body["data"]["metadata"], json!({}));
}

#[tokio::test]
async fn listing_rejects_bad_directives_before_storage() {
    let app = TestApp::new();
    let token = writer(&app).await;

    let res = app
        .get("/v1/movies?page=0&page_size=101&sort=rating", Some(&token))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &res.body["field_errors"];
    assert_eq!(errors["page"], "must be greater than zero");
    assert_eq!(errors["page_size"], "must be a maximum of 100");
    assert_eq!(errors["sort"], "invalid sort value");

    let res = app.get("/v1/movies?page=abc", Some(&token)).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["field_errors"]["page"], "must be an integer value");

    let res = app.get("/v1/movies?page=10000001", Some(&token)).await;
    assert_eq!(res.body["field_errors"]["page"], "must be a maximum of 10 million");
}
