//! Contrato del modelo de preguntas/respuestas y su handle compartido.
//!
//! El modelo se construye una única vez, en la primera consulta, y se reutiliza
//! después desde cualquier tarea. Si la carga falla, el handle queda marcado como
//! no disponible y el sintetizador degrada a la base de conocimiento.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Fragmento extraído por el modelo, con su puntuación en `[0, 1]`.
/// Una respuesta vacía significa "sin respuesta".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanAnswer {
    pub answer: String,
    pub score: f64,
}

#[async_trait]
pub trait QaModel: Send + Sync {
    async fn answer_span(
        &self,
        question: &str,
        context: &str,
        max_answer_length: usize,
        allow_no_answer: bool,
    ) -> Result<SpanAnswer>;
}

/// Construye el modelo. Se invoca como mucho una vez por proceso.
#[async_trait]
pub trait QaModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn QaModel>>;
}

/// Handle perezoso al modelo, inyectado en el sintetizador.
#[derive(Clone)]
pub struct SharedQaModel {
    loader: Arc<dyn QaModelLoader>,
    cell: Arc<OnceCell<Option<Arc<dyn QaModel>>>>,
}

impl SharedQaModel {
    pub fn new(loader: Arc<dyn QaModelLoader>) -> Self {
        Self {
            loader,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Devuelve el modelo, cargándolo en la primera llamada. Las llamadas
    /// concurrentes durante la carga esperan a la misma instancia.
    pub async fn get(&self) -> Option<Arc<dyn QaModel>> {
        self.cell
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(model) => {
                        info!("Modelo de QA cargado.");
                        Some(model)
                    }
                    Err(e) => {
                        warn!("Modelo de QA no disponible, se usarán respuestas basadas en reglas: {e:#}");
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

#[cfg(test)]
pub mod testing {
    //! Dobles de prueba para el modelo y su cargador.

    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Falla en todas las llamadas.
    pub struct FailingModel;

    #[async_trait]
    impl QaModel for FailingModel {
        async fn answer_span(&self, _: &str, _: &str, _: usize, _: bool) -> Result<SpanAnswer> {
            Err(anyhow!("inferencia fallida"))
        }
    }

    /// Responde según la primera regla cuyo marcador aparece en el contexto y
    /// registra cada contexto recibido.
    #[derive(Default)]
    pub struct ScriptedModel {
        rules: Vec<(String, Result<SpanAnswer, String>)>,
        pub contexts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer_when(mut self, marker: &str, answer: &str, score: f64) -> Self {
            self.rules.push((
                marker.to_string(),
                Ok(SpanAnswer {
                    answer: answer.to_string(),
                    score,
                }),
            ));
            self
        }

        pub fn fail_when(mut self, marker: &str) -> Self {
            self.rules.push((marker.to_string(), Err("fallo simulado".to_string())));
            self
        }

        pub fn calls(&self) -> usize {
            self.contexts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl QaModel for ScriptedModel {
        async fn answer_span(&self, _: &str, context: &str, _: usize, _: bool) -> Result<SpanAnswer> {
            self.contexts.lock().unwrap().push(context.to_string());
            for (marker, outcome) in &self.rules {
                if context.contains(marker.as_str()) {
                    return outcome.clone().map_err(|e| anyhow!(e));
                }
            }
            Ok(SpanAnswer {
                answer: String::new(),
                score: 0.0,
            })
        }
    }

    /// Cargador que cuenta cuántas veces se ejecuta.
    pub struct CountingLoader {
        model: Option<Arc<dyn QaModel>>,
        pub loads: AtomicUsize,
    }

    impl CountingLoader {
        pub fn with(model: Arc<dyn QaModel>) -> Self {
            Self {
                model: Some(model),
                loads: AtomicUsize::new(0),
            }
        }

        pub fn unavailable() -> Self {
            Self {
                model: None,
                loads: AtomicUsize::new(0),
            }
        }

        pub fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QaModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn QaModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.model.clone().ok_or_else(|| anyhow!("modelo no instalado"))
        }
    }

    pub fn shared(model: Arc<dyn QaModel>) -> SharedQaModel {
        SharedQaModel::new(Arc::new(CountingLoader::with(model)))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_load() {
        let loader = Arc::new(CountingLoader::with(Arc::new(ScriptedModel::new())));
        let shared = SharedQaModel::new(loader.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.get().await.is_some() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(loader.load_count(), 1);
    }

    #[test]
    fn failed_load_is_cached_as_unavailable() {
        let loader = Arc::new(CountingLoader::unavailable());
        let shared = SharedQaModel::new(loader.clone());

        assert!(tokio_test::block_on(shared.get()).is_none());
        assert!(tokio_test::block_on(shared.get()).is_none());
        assert_eq!(loader.load_count(), 1);
    }
}
