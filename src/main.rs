use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use quali_predictor::{
    api,
    config::ServiceConfig,
    features::FeatureSchema,
    model::{load_model, InferenceEngine},
    Predictor, ReferenceStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ServiceConfig::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cfg.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Everything below is load-once; any failure stops us before serving.
    let store = ReferenceStore::load(&cfg.table_paths())?;

    let schema = match &cfg.meta_path {
        Some(p) => FeatureSchema::load_meta(p, cfg.schema_version)?,
        None => FeatureSchema::builtin(cfg.schema_version),
    };
    tracing::info!(
        "schema {}: feat_list[{}]: {:?}",
        schema.version,
        schema.features.len(),
        schema.feature_names()
    );
    tracing::info!("cat_features: {:?}", schema.categorical_names());

    let model = load_model(
        cfg.model_kind,
        &cfg.model_path,
        cfg.meta_path.as_deref(),
        &schema,
    )?;
    let engine = InferenceEngine::new(model, &schema);
    tracing::info!(
        "loaded {} model from {}",
        engine.model_kind(),
        cfg.model_path.display()
    );

    let predictor = Predictor::new(store, schema, engine).with_feature_logging(cfg.log_features);
    predictor.warmup()?;

    let app = api::router(Arc::new(predictor));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
