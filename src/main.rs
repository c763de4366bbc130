// Módulos de la aplicación
mod api;
mod app_state;
mod clause_detector;
mod config;
mod highlight;
mod ingest;
mod jobs;
mod knowledge_base;
mod llm;
mod models;
mod qa_model;
mod question_router;
mod retrieval;
mod samples;
mod synthesizer;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::sync::{oneshot, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app_state::{AppState, Status};
use crate::clause_detector::ClauseDetector;
use crate::ingest::DocumentAnalyzer;
use crate::jobs::JobQueue;
use crate::llm::LlmLoader;
use crate::qa_model::SharedQaModel;
use crate::synthesizer::{AnswerSynthesizer, SynthesisOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Detector de cláusulas (los patrones se compilan una vez)
    let detector = ClauseDetector::new(cfg.max_clauses).context("Error compilando los patrones de cláusulas")?;
    let analyzer = DocumentAnalyzer::new(detector).with_highlighting(cfg.highlight_clauses);

    // 4. Modelo de QA: se carga en la primera pregunta que lo necesite
    let qa_model = SharedQaModel::new(Arc::new(LlmLoader::from_config(&cfg)));
    let synthesizer = AnswerSynthesizer::new(qa_model, SynthesisOptions::from_config(&cfg));

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación y arrancar la cola de análisis
    let status = Arc::new(Mutex::new(Status::ready()));
    let app_state = AppState {
        config: cfg.clone(),
        synthesizer: Arc::new(synthesizer),
        jobs: JobQueue::start(analyzer, status.clone(), cfg.max_finished_jobs),
        status,
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = Router::new().merge(api::create_router(app_state)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
