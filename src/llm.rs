//! Adaptador de QA sobre Rig: el LLM actúa como extractor de fragmentos puntuados.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{AppConfig, LlmProvider};
use crate::qa_model::{QaModel, QaModelLoader, SpanAnswer};
use crate::retrieval::clip;

const SPAN_PROMPT: &str = r#"
You are an extractive question-answering model for legal contracts.
Answer ONLY with a span copied verbatim from the context. Do not paraphrase.
Return a single valid JSON object with two keys:
- "answer": the exact span from the context, or "" if the context does not contain the answer.
- "score": your confidence between 0.0 and 1.0.
Do not include explanations, only the JSON.
"#;

#[derive(Debug, Deserialize)]
struct JsonSpan {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    score: f64,
}

/// Modelo de QA respaldado por un LLM de chat.
#[derive(Debug, Clone)]
pub struct LlmQaModel {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmQaModel {
    async fn prompt_openai(&self, input: &str) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(SPAN_PROMPT)
            .temperature(0.0)
            .build();

        Ok(agent.prompt(input).await?)
    }
}

#[async_trait]
impl QaModel for LlmQaModel {
    async fn answer_span(
        &self,
        question: &str,
        context: &str,
        max_answer_length: usize,
        allow_no_answer: bool,
    ) -> Result<SpanAnswer> {
        let input = format!("Context:\n{}\n\nQuestion:\n{}", context, question);
        let response = match self.provider {
            LlmProvider::OpenAI => self.prompt_openai(&input).await?,
            ref other => bail!("Proveedor LLM {:?} aún no implementado para QA", other),
        };

        let span = parse_span(&response, context, max_answer_length)?;
        if span.answer.is_empty() && !allow_no_answer {
            bail!("El modelo no encontró respuesta y no se admite respuesta vacía");
        }
        debug!("Respuesta del modelo con puntuación {:.2}", span.score);
        Ok(span)
    }
}

/// Interpreta la salida JSON del LLM. Los fragmentos que no aparecen literalmente
/// en el contexto ven su puntuación reducida a la mitad.
fn parse_span(response: &str, context: &str, max_answer_length: usize) -> Result<SpanAnswer> {
    // Limpiar la respuesta del LLM para asegurar que solo contenga el JSON
    let json_response = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: JsonSpan = serde_json::from_str(json_response).map_err(|e| {
        warn!("No se pudo parsear la respuesta del modelo: {}. Respuesta LLM: '{}'", e, response);
        anyhow!("Respuesta del modelo no válida: {e}")
    })?;

    let answer = clip(parsed.answer.trim(), max_answer_length).to_string();
    let mut score = if parsed.score.is_finite() {
        parsed.score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if !answer.is_empty() && !context.to_lowercase().contains(&answer.to_lowercase()) {
        score /= 2.0;
    }

    Ok(SpanAnswer { answer, score })
}

/// Cargador del modelo a partir de la configuración.
#[derive(Debug, Clone)]
pub struct LlmLoader {
    provider: LlmProvider,
    chat_model: String,
}

impl LlmLoader {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        }
    }
}

#[async_trait]
impl QaModelLoader for LlmLoader {
    async fn load(&self) -> Result<Arc<dyn QaModel>> {
        match self.provider {
            LlmProvider::OpenAI => {
                // `Client::from_env` aborta si falta la clave; se comprueba antes.
                if std::env::var("OPENAI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
                    bail!("Falta OPENAI_API_KEY en el entorno");
                }
                Ok(Arc::new(LlmQaModel {
                    provider: self.provider.clone(),
                    chat_model: self.chat_model.clone(),
                }))
            }
            LlmProvider::Disabled => Err(anyhow!("Modelo de QA desactivado por configuración")),
            ref other => Err(anyhow!("Proveedor LLM {:?} aún no implementado para QA", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = "Payment is due within thirty days of the invoice date.";

    #[test]
    fn parses_fenced_json() {
        let response = "```json\n{\"answer\": \"within thirty days\", \"score\": 0.82}\n```";
        let span = parse_span(response, CONTEXT, 100).unwrap();
        assert_eq!(span.answer, "within thirty days");
        assert!((span.score - 0.82).abs() < f64::EPSILON);
    }

    #[test]
    fn paraphrased_answers_lose_confidence() {
        let response = r#"{"answer": "in a month", "score": 0.8}"#;
        let span = parse_span(response, CONTEXT, 100).unwrap();
        assert!((span.score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn answers_are_truncated_and_scores_clamped() {
        let response = r#"{"answer": "Payment is due within thirty days", "score": 3.5}"#;
        let span = parse_span(response, CONTEXT, 7).unwrap();
        assert_eq!(span.answer, "Payment");
        assert_eq!(span.score, 1.0);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_span("I think it is thirty days", CONTEXT, 100).is_err());
    }

    #[tokio::test]
    async fn disabled_provider_cannot_load() {
        let loader = LlmLoader {
            provider: LlmProvider::Disabled,
            chat_model: String::new(),
        };
        assert!(loader.load().await.is_err());
    }
}
