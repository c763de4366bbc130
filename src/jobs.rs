//! Cola de análisis en segundo plano.
//!
//! Las subidas se encolan en un canal y un único worker las procesa en orden de
//! llegada. El análisis (extracción + regex) es CPU intensivo, así que se ejecuta
//! en el pool bloqueante de Tokio para no frenar el servidor.
//!
//! Sólo se conservan los `max_finished` jobs terminados más recientes; los más
//! antiguos se descartan cada vez que otro termina.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::app_state::Status;
use crate::clause_detector::HighlightEvent;
use crate::ingest::{DocumentAnalysis, DocumentAnalyzer};
use crate::models::ClauseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

/// Estado observable de un análisis.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    #[serde(rename = "status")]
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "pages")]
    pub page_count: usize,
    pub clauses: Vec<ClauseRecord>,
    #[serde(skip)]
    pub document_text: Arc<str>,
    pub highlight_events: Vec<HighlightEvent>,
    pub has_highlighted_pdf: bool,
    #[serde(skip)]
    pub highlighted_pdf: Option<Arc<Vec<u8>>>,
    pub error: Option<String>,
}

impl Job {
    fn queued(id: Uuid, filename: String) -> Self {
        Self {
            id,
            filename,
            state: JobState::Queued,
            created_at: Utc::now(),
            finished_at: None,
            page_count: 0,
            clauses: Vec::new(),
            document_text: Arc::from(""),
            highlight_events: Vec::new(),
            has_highlighted_pdf: false,
            highlighted_pdf: None,
            error: None,
        }
    }

    fn complete(&mut self, analysis: DocumentAnalysis) {
        self.state = JobState::Done;
        self.finished_at = Some(Utc::now());
        self.page_count = analysis.pages.len();
        self.clauses = analysis.clauses;
        self.document_text = Arc::from(analysis.document_text);
        self.highlight_events = analysis.highlight_events;
        self.has_highlighted_pdf = analysis.highlighted_pdf.is_some();
        self.highlighted_pdf = analysis.highlighted_pdf.map(Arc::new);
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Done | JobState::Error)
    }

    fn fail(&mut self, reason: String) {
        self.state = JobState::Error;
        self.finished_at = Some(Utc::now());
        self.error = Some(reason);
    }
}

struct AnalysisRequest {
    job_id: Uuid,
    bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct JobQueue {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    sender: mpsc::UnboundedSender<AnalysisRequest>,
}

impl JobQueue {
    /// Crea la cola y lanza su worker. Debe llamarse dentro de un runtime Tokio.
    pub fn start(analyzer: DocumentAnalyzer, status: Arc<Mutex<Status>>, max_finished: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let jobs = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(run_worker(analyzer, jobs.clone(), status, receiver, max_finished));
        Self { jobs, sender }
    }

    pub async fn enqueue(&self, filename: String, bytes: Vec<u8>) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        self.jobs
            .lock()
            .await
            .insert(job_id, Job::queued(job_id, filename));

        self.sender
            .send(AnalysisRequest { job_id, bytes })
            .map_err(|_| anyhow!("El worker de análisis no está activo"))?;
        Ok(job_id)
    }

    /// Copia del job. El texto y el PDF resaltado se comparten, no se copian.
    pub async fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.lock().await.get(&job_id).cloned()
    }

    /// Registra un job sin pasarlo al worker, para pruebas.
    #[cfg(test)]
    pub async fn insert_queued(&self, filename: &str) -> Uuid {
        let job_id = Uuid::new_v4();
        self.jobs
            .lock()
            .await
            .insert(job_id, Job::queued(job_id, filename.to_string()));
        job_id
    }

    #[cfg(test)]
    pub async fn insert_done(&self, filename: &str, analysis: DocumentAnalysis) -> Uuid {
        let job_id = Uuid::new_v4();
        let mut job = Job::queued(job_id, filename.to_string());
        job.complete(analysis);
        self.jobs.lock().await.insert(job_id, job);
        job_id
    }
}

async fn run_worker(
    analyzer: DocumentAnalyzer,
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    status: Arc<Mutex<Status>>,
    mut receiver: mpsc::UnboundedReceiver<AnalysisRequest>,
    max_finished: usize,
) {
    while let Some(AnalysisRequest { job_id, bytes }) = receiver.recv().await {
        let filename = {
            let mut jobs = jobs.lock().await;
            let Some(job) = jobs.get_mut(&job_id) else {
                continue;
            };
            job.state = JobState::Processing;
            job.filename.clone()
        };
        {
            let mut status = status.lock().await;
            status.is_busy = true;
            status.message = format!("Analizando '{}'...", filename);
            status.progress = 0.0;
        }

        let worker = analyzer.clone();
        let outcome = tokio::task::spawn_blocking(move || worker.analyze(&bytes)).await;

        let message = {
            let mut jobs = jobs.lock().await;
            let Some(job) = jobs.get_mut(&job_id) else {
                continue;
            };
            let message = match outcome {
                Ok(analysis) => {
                    let summary = analysis.summary();
                    job.complete(analysis);
                    info!("Análisis de '{}' completado. {}", filename, summary);
                    format!("¡Análisis completado! {}", summary)
                }
                Err(e) => {
                    error!("Error analizando '{}': {}", filename, e);
                    job.fail(format!("Analysis failed: {e}"));
                    format!("Error en el análisis de '{}': {}", filename, e)
                }
            };

            let evicted = evict_finished(&mut jobs, max_finished);
            if evicted > 0 {
                debug!("Descartados {} jobs terminados antiguos.", evicted);
            }
            message
        };

        let mut status = status.lock().await;
        status.is_busy = false;
        status.progress = 1.0;
        status.message = message;
    }
    info!("Worker de análisis detenido.");
}

/// Deja como mucho `keep` jobs terminados, descartando los que acabaron antes.
/// Los jobs en cola o en proceso no se tocan.
fn evict_finished(jobs: &mut HashMap<Uuid, Job>, keep: usize) -> usize {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
        .values()
        .filter(|job| job.is_finished())
        .map(|job| (job.finished_at.unwrap_or(job.created_at), job.id))
        .collect();
    if finished.len() <= keep {
        return 0;
    }

    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
    excess
}
