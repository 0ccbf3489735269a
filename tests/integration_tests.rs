/// End-to-end tests: CSV tables and a forest artifact on disk, loaded the
/// way `main` loads them.
///
/// Run with: cargo test --test integration_tests -- --nocapture
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use quali_predictor::{
    api,
    features::{Feature, FeatureValue, QualiQuery},
    model::{load_model, InferenceEngine, ModelKind},
    reference::TablePaths,
    types::PredictRequest,
    FeatureSchema, PredictError, Predictor, ReferenceStore, SchemaVersion,
};

const MEDIANS: &str = "\
Event,QualiSegment,CircuitName,Country,TrackType,LapSpeedClass,SpeedI1,SpeedI2,SpeedFL,SpeedST,TrackLength_m,NumCorners,CornerDensity,AvgCornerSpacing_m,AirTemp,TrackTemp,WindSpeed,Altitude_m,DRSZones,SessionMedianLap
Italian Grand Prix,Q3,Monza,Italy,permanent,high,330.1,325.4,310.2,345.0,5793,11,1.9,526.6,27.5,41.0,1.2,162,2,80.500
Italian Grand Prix,Q1,Monza,Italy,permanent,high,328.0,322.0,305.9,341.2,5793,11,1.9,526.6,26.1,39.5,1.6,162,2,81.120
Monaco Grand Prix,Q3,Monaco,Monaco,street,low,190.0,180.5,270.3,290.1,3337,19,5.7,175.6,22.0,35.0,0.8,10,1,70.270
";

const DRIVER_STATS: &str = "\
Driver,CircuitName,DriverTrackAvgDelta,DriverTrackStdDelta
VER,Monza,-0.31,0.08
LEC,Monaco,-0.42,0.11
";

const TEAM_STATS: &str = "\
Team,CircuitName,TeamTrackAvgDelta,TeamTrackStdDelta
Red Bull Racing,Monza,-0.22,0.06
Ferrari,Monaco,-0.18,0.09
";

const REAL_LAPS: &str = "\
driver,race,real_time_seconds
VER,Italian Grand Prix,80.10
";

// -0.25 everywhere at Monza; Monaco gets +0.4
const FOREST: &str = r#"{
    "bias": -0.25,
    "trees": [
        {
            "splits": [{"type": "one_hot", "feature": "CircuitName", "value": "Monaco"}],
            "leaf_values": [0.0, 0.4]
        },
        {
            "splits": [{"type": "border", "feature": "DriverTrackStdDelta", "border": 0.5}],
            "leaf_values": [0.0, 1.0]
        }
    ]
}"#;

struct Fixture {
    _dir: TempDir,
    paths: TablePaths,
    model: std::path::PathBuf,
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).expect("write fixture");
    p
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = TablePaths {
        medians: write(dir.path(), "circuit_medians.csv", MEDIANS),
        driver_stats: write(dir.path(), "driver_track_stats.csv", DRIVER_STATS),
        team_stats: write(dir.path(), "team_track_stats.csv", TEAM_STATS),
        real_laps: Some(write(dir.path(), "real_lap_time_2025.csv", REAL_LAPS)),
    };
    let model = write(dir.path(), "quali_model.json", FOREST);
    Fixture {
        _dir: dir,
        paths,
        model,
    }
}

fn predictor(fx: &Fixture, schema: FeatureSchema) -> Predictor {
    let store = ReferenceStore::load(&fx.paths).expect("store");
    let model = load_model(ModelKind::Forest, &fx.model, None, &schema).expect("model");
    let engine = InferenceEngine::new(model, &schema);
    Predictor::new(store, schema, engine)
}

#[test]
fn test_monza_q3_scenario() {
    println!("\n=== Test: Monza Q3 Scenario ===");
    let fx = fixture();
    let p = predictor(&fx, FeatureSchema::builtin(SchemaVersion::TrackHistory));

    let r = p
        .predict(&PredictRequest::new(
            "Max Verstappen",
            "Red Bull Racing",
            "Italian Grand Prix",
            "Q3",
        ))
        .expect("prediction");
    println!("✓ predicted {:?}", r.result);

    assert_eq!(r.driver, "VER");
    assert_eq!(r.result.predicted_lap_time_sec, 80.25);
    assert_eq!(r.result.real_lap_time_sec, Some(80.1));
    assert_eq!(r.result.delta_sec, Some(0.15));
}

#[test]
fn test_new_rookie_falls_back_and_succeeds() {
    println!("\n=== Test: NewRookie Fallback ===");
    let fx = fixture();
    let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
    let store = ReferenceStore::load(&fx.paths).expect("store");

    let query = QualiQuery::new("NewRookie", "Red Bull Racing", "Italian Grand Prix", "Q3");
    let a = quali_predictor::assemble(&store, &schema, &query).expect("assemble");
    let num = |f: Feature| a.record.get(f).and_then(FeatureValue::as_numeric);
    assert_eq!(num(Feature::DriverTrackAvgDelta), Some(0.0));
    assert_eq!(num(Feature::DriverTrackStdDelta), Some(0.15));
    // the team still has history here
    assert_eq!(num(Feature::TeamTrackAvgDelta), Some(-0.22));
    println!("✓ fallback stats applied");

    let p = predictor(&fx, schema);
    let r = p
        .predict(&PredictRequest::new(
            "NewRookie",
            "Red Bull Racing",
            "Italian Grand Prix",
            "Q3",
        ))
        .expect("rookie must still get a prediction");
    assert_eq!(r.result.predicted_lap_time_sec, 80.25);
    assert_eq!(r.result.delta_sec, None);
}

#[test]
fn test_schema_order_for_every_median_row() {
    let fx = fixture();
    let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
    let store = ReferenceStore::load(&fx.paths).expect("store");
    let meta = store.metadata();

    for event in &meta.events {
        for segment in &meta.segments {
            let q = QualiQuery::new("LEC", "Ferrari", event.as_str(), segment.as_str());
            match quali_predictor::assemble(&store, &schema, &q) {
                Ok(a) => assert_eq!(a.record.names(), schema.feature_names()),
                Err(PredictError::UnknownEventSegment { .. }) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }
}

#[test]
fn test_unknown_event_segment_is_an_error_not_a_crash() {
    let fx = fixture();
    let p = predictor(&fx, FeatureSchema::builtin(SchemaVersion::TrackHistory));
    let err = p
        .predict(&PredictRequest::new("VER", "Red Bull Racing", "Monaco Grand Prix", "Q1"))
        .unwrap_err();
    assert!(matches!(err, PredictError::UnknownEventSegment { .. }));
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_deterministic_outputs() {
    let fx = fixture();
    let p = predictor(&fx, FeatureSchema::builtin(SchemaVersion::TrackHistory));
    let req = PredictRequest::new("Charles Leclerc", "Ferrari", "Monaco Grand Prix", "Q3");
    let a = p.predict(&req).unwrap();
    let b = p.predict(&req).unwrap();
    assert_eq!(
        a.result.predicted_lap_time_sec.to_bits(),
        b.result.predicted_lap_time_sec.to_bits()
    );
    assert_eq!(a, b);
    // 70.27 + (-0.25 + 0.4)
    assert_eq!(a.result.predicted_lap_time_sec, 70.42);
}

#[test]
fn test_meta_file_drives_schema() {
    let fx = fixture();
    let meta = write(
        fx._dir.path(),
        "meta.json",
        r#"{"schema_version": "delta-from-median", "tyre_life": 5}"#,
    );
    let schema = FeatureSchema::load_meta(&meta, SchemaVersion::TrackHistory).expect("meta");
    assert_eq!(schema.version, SchemaVersion::DeltaFromMedian);
    assert!(!schema.feature_names().contains(&"DriverTrack"));

    // the forest splits on DriverTrackStdDelta, which this schema lacks
    let err = load_model(ModelKind::Forest, &fx.model, Some(meta.as_path()), &schema);
    assert!(err.is_err());
}

#[test]
fn test_startup_fails_on_duplicate_median() {
    let fx = fixture();
    let extra = "Monaco Grand Prix,Q3,Monaco,Monaco,street,low,1,1,1,1,1,1,1,1,1,1,1,1,1,70.0\n";
    let dup = format!("{MEDIANS}{extra}");
    fs::write(&fx.paths.medians, dup).unwrap();
    assert!(ReferenceStore::load(&fx.paths).is_err());
}

#[test]
fn test_missing_real_lap_table_is_not_fatal() {
    let mut fx = fixture();
    fx.paths.real_laps = Some(fx._dir.path().join("absent.csv"));
    let p = predictor(&fx, FeatureSchema::builtin(SchemaVersion::TrackHistory));
    let r = p
        .predict(&PredictRequest::new("VER", "Red Bull Racing", "Italian Grand Prix", "Q3"))
        .unwrap();
    assert_eq!(r.result.real_lap_time_sec, None);
}

async fn call(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn post_predict(body: &str) -> Request<Body> {
    Request::post("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_http_predict_and_errors() {
    let fx = fixture();
    let app = api::router(Arc::new(predictor(
        &fx,
        FeatureSchema::builtin(SchemaVersion::TrackHistory),
    )));

    let (status, v) = call(
        app.clone(),
        post_predict(
            r#"{"driver":"VER","team":"Red Bull Racing","event":"Italian Grand Prix","quali_segment":"Q3"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["predicted_lap_time_sec"], 80.25);
    assert_eq!(v["delta_sec"], 0.15);

    let (status, v) = call(
        app.clone(),
        post_predict(
            r#"{"driver":"VER","team":"Red Bull Racing","event":"Nowhere","segment":"Q3"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(v["error"].as_str().unwrap().contains("Nowhere"));

    let (status, v) = call(
        app,
        post_predict(
            r#"{"driver":"","team":"Ferrari","event":"Monaco Grand Prix","segment":"Q3"}"#,
        ),
    )
    .await;
    assert!(!status.is_success());
    assert!(v["error"].is_string());
}

#[tokio::test]
async fn test_http_malformed_bodies_get_error_json() {
    println!("\n=== Test: Malformed Request Bodies ===");
    let fx = fixture();
    let app = api::router(Arc::new(predictor(
        &fx,
        FeatureSchema::builtin(SchemaVersion::TrackHistory),
    )));

    // no team
    let (status, v) = call(
        app.clone(),
        post_predict(r#"{"driver":"VER","event":"Italian Grand Prix","quali_segment":"Q3"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].as_str().unwrap().contains("team"));
    println!("✓ missing field -> {status}");

    // wrong type
    let (status, v) = call(
        app.clone(),
        post_predict(
            r#"{"driver":44,"team":"Mercedes","event":"Monaco Grand Prix","segment":"Q3"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].is_string());

    let (status, v) = call(app.clone(), post_predict("driver=VER&team=Red+Bull")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].is_string());
    println!("✓ non-JSON body -> {status}");

    let req = Request::post("/predict")
        .body(Body::from(r#"{"driver":"VER"}"#))
        .unwrap();
    let (status, v) = call(app, req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(v["error"].is_string());
}

#[tokio::test]
async fn test_http_metadata() {
    let fx = fixture();
    let app = api::router(Arc::new(predictor(
        &fx,
        FeatureSchema::builtin(SchemaVersion::TrackHistory),
    )));
    let (status, v) = call(app, Request::get("/metadata").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["events"], serde_json::json!(["Italian Grand Prix", "Monaco Grand Prix"]));
    assert_eq!(v["segments"], serde_json::json!(["Q1", "Q3"]));
    assert_eq!(v["drivers"], serde_json::json!(["LEC", "VER"]));
    assert_eq!(v["teams"], serde_json::json!(["Ferrari", "Red Bull Racing"]));
}

#[tokio::test]
async fn test_http_root_health() {
    let fx = fixture();
    let app = api::router(Arc::new(predictor(
        &fx,
        FeatureSchema::builtin(SchemaVersion::TrackHistory),
    )));
    let (status, v) = call(app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(v["message"].as_str().unwrap().contains("running"));
}
