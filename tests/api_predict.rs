use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use fakelens::{
    adapters::SqliteStore,
    api::{create_router, AppState},
    domain::LabelMap,
    ml::{Classifier, PreprocessedTensor},
    services::{InferenceService, ModelState},
};
use image::{ImageFormat, Rgb, RgbImage};
use mockall::mock;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "fakelens-test-boundary";

mock! {
    pub Model {}

    impl Classifier for Model {
        fn predict_proba(&self, input: &PreprocessedTensor) -> fakelens::Result<f32>;
        fn image_size(&self) -> usize;
    }
}

fn model_returning(probability: f32) -> ModelState {
    let mut model = MockModel::new();
    model.expect_image_size().return_const(32usize);
    model.expect_predict_proba().returning(move |_| Ok(probability));
    ModelState::Ready(Arc::new(model))
}

async fn test_app(model: ModelState) -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let inference = Arc::new(InferenceService::new(
        model,
        LabelMap::default(),
        Arc::clone(&store),
        0.5,
        "711523BAM022",
    ));
    let router = create_router(AppState::new(Arc::clone(&store), inference));
    (router, store)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 160, 30]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

enum Part<'a> {
    File { name: &'a str, file_name: &'a str, bytes: Vec<u8> },
    Text { name: &'a str, value: &'a str },
}

fn multipart_body(parts: Vec<Part<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File { name, file_name, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(parts: Vec<Part<'_>>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn image_part(file_name: &str) -> Part<'_> {
    Part::File {
        name: "file",
        file_name,
        bytes: png(48, 64),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_predict_stores_prediction() {
    let (router, store) = test_app(model_returning(0.83)).await;

    let (status, body) = send(
        &router,
        predict_request(vec![
            image_part("face.png"),
            Part::Text {
                name: "roll_number",
                value: "R-42",
            },
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "real");
    assert_eq!(body["confidence"].as_f64(), Some(0.83));
    assert_eq!(body["message"], "Prediction stored successfully");

    let rows = store.list_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label, "real");
    assert_eq!(rows[0].confidence, 83.0);
    assert_eq!(rows[0].roll_number, "R-42");
    assert_eq!(rows[0].image_name, "face.png");
}

#[tokio::test]
async fn test_predict_without_roll_number_uses_default() {
    let (router, store) = test_app(model_returning(0.1)).await;

    let (status, body) = send(&router, predict_request(vec![image_part("a.png")])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "fake");
    assert_eq!(body["confidence"].as_f64(), Some(0.9));

    let rows = store.list_all().await.unwrap();
    assert_eq!(rows[0].roll_number, "711523BAM022");
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let (router, store) = test_app(model_returning(0.83)).await;

    let (status, body) = send(
        &router,
        predict_request(vec![Part::Text {
            name: "roll_number",
            value: "R-1",
        }]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file sent");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_file_field_without_filename_is_bad_request() {
    let (router, store) = test_app(model_returning(0.83)).await;

    let (status, body) = send(
        &router,
        predict_request(vec![Part::Text {
            name: "file",
            value: "just some text",
        }]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file sent");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_bad_request() {
    let (router, store) = test_app(model_returning(0.83)).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file sent");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_upload_is_server_error() {
    let (router, store) = test_app(model_returning(0.83)).await;

    let (status, body) = send(
        &router,
        predict_request(vec![Part::File {
            name: "file",
            file_name: "notes.txt",
            bytes: b"definitely not an image".to_vec(),
        }]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unavailable_model_is_server_error() {
    let (router, store) = test_app(ModelState::Unavailable(
        "Trained model not found. Ensure saved_model/best_model.mpk exists.".into(),
    ))
    .await;

    let (status, body) = send(&router, predict_request(vec![image_part("face.png")])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Trained model not found"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_history_most_recent_first() {
    let (router, _store) = test_app(model_returning(0.7)).await;

    for name in ["first.png", "second.png", "third.png"] {
        let (status, _) = send(&router, predict_request(vec![image_part(name)])).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, get("/api/history")).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let names: Vec<&str> = rows
        .iter()
        .map(|r| r["image_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["third.png", "second.png", "first.png"]);

    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(rows[0]["confidence"].as_f64(), Some(70.0));
    assert!(rows[0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_empty_history() {
    let (router, _store) = test_app(model_returning(0.7)).await;
    let (status, body) = send(&router, get("/api/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let (router, _store) = test_app(model_returning(0.7)).await;
    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "loaded");

    let (router, _store) = test_app(ModelState::Unavailable("missing".into())).await;
    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["db"], "connected");
    assert_eq!(body["model"], "unavailable");
}
