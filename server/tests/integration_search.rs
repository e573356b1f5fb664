use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use boolrank_core::store::{save_meta, save_to_path, IndexMeta, IndexPaths};
use boolrank_core::{CollectionParser, EnglishNormalizer, IndexBuilder};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

const COLLECTION: &str = "\
.I 1
.T
supersonic flow over swept wings
.W
pressure measurements on swept wings in supersonic flow .
.I 2
.T
heat transfer in laminar flow
.W
laminar boundary layers and heat transfer near a flat plate .
.I 3
.T
turbulent boundary layers
.W
turbulent boundary layer growth on a flat plate .
";

fn build_tiny_index(dir: &std::path::Path) -> String {
    let path = dir.join("cran.ind");
    let paths = IndexPaths::new(&path);
    let parsed = CollectionParser::default().parse_str(COLLECTION);
    let index = IndexBuilder::new().index_collection(&parsed, &EnglishNormalizer::new());
    save_to_path(&index, &paths).unwrap();
    save_meta(&paths, &IndexMeta::new(1400, index.len() as u32, "2024-01-01T00:00:00Z")).unwrap();
    path.to_string_lossy().to_string()
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|h| h["doc_id"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn boolean_search_orders_by_id() {
    let dir = tempdir().unwrap();
    let app = boolrank_server::build_app(&build_tiny_index(dir.path()), None).unwrap();

    // "flat plate" OR "supersonic"
    let (status, json) = call(app, "/search?q=flat%20plate%7Csupersonic").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![1, 2, 3]);
    assert_eq!(json["total_hits"], 3);
    assert!(json["results"][0].get("score").is_none());
}

#[tokio::test]
async fn ranked_search_orders_by_score() {
    let dir = tempdir().unwrap();
    let app = boolrank_server::build_app(&build_tiny_index(dir.path()), None).unwrap();

    let (status, json) = call(app, "/search?q=turbulent%0Aflow&mode=ranked&k=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "ranked");
    assert_eq!(json["total_hits"], 3);
    let got = ids(&json);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], 3);
    assert!(json["results"][0]["score"].as_f64().unwrap() > json["results"][1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn term_endpoint_reports_postings() {
    let dir = tempdir().unwrap();
    let app = boolrank_server::build_app(&build_tiny_index(dir.path()), None).unwrap();

    let (status, json) = call(app.clone(), "/term/Boundary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["term"], "boundari");
    assert_eq!(json["df"], 2);
    assert_eq!(json["postings"]["3"], 2);

    let (status, _) = call(app, "/term/propeller").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_index_fails_to_start() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("none.ind");
    assert!(boolrank_server::build_app(&missing.to_string_lossy(), None).is_err());
}

#[tokio::test]
async fn queries_follow_min_term_len_of_the_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("jets.ind");
    let paths = IndexPaths::new(&path);
    let parsed = CollectionParser::default().parse_str(".I 1\n.W jet engines\n.I 2\n.W small jet\n");
    let index = IndexBuilder::new().index_collection(&parsed, &EnglishNormalizer::with_min_len(3));
    save_to_path(&index, &paths).unwrap();
    save_meta(&paths, &IndexMeta::new(2, index.len() as u32, "2024-01-01T00:00:00Z").with_min_term_len(3)).unwrap();
    let app = boolrank_server::build_app(&path.to_string_lossy(), None).unwrap();

    let (status, json) = call(app, "/search?q=jet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![1, 2]);
}
