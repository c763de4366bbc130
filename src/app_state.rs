use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use crate::{config::AppConfig, jobs::JobQueue, synthesizer::AnswerSynthesizer};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub synthesizer: Arc<AnswerSynthesizer>,
    pub jobs: JobQueue,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn ready() -> Self {
        Self {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        }
    }
}
