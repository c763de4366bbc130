//! Carga y gestión de configuración de la aplicación (servidor + LLM + detección).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::clause_detector::DEFAULT_MAX_CLAUSES;
use crate::synthesizer::ClauseSelection;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
    Disabled,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "none" | "disabled" => Ok(Self::Disabled),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    pub qa_min_confidence: f64,
    /// Límite por llamada al modelo, en segundos. 0 lo desactiva.
    pub qa_timeout_secs: u64,
    pub qa_max_answer_chars: usize,

    pub max_clauses: usize,
    pub highlight_clauses: bool,
    pub max_upload_bytes: usize,
    /// Jobs terminados que se conservan en memoria.
    pub max_finished_jobs: usize,
    pub clause_selection: ClauseSelection,
    pub samples_dir: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr = var_or("SERVER_ADDR", "127.0.0.1:3322");
        let llm_provider = LlmProvider::from_str(&var_or("LLM_PROVIDER", "openai"))?;
        let llm_chat_model = var_or("LLM_CHAT_MODEL", "gpt-4o-mini");

        let qa_min_confidence: f64 = parse_var(&lookup, "QA_MIN_CONFIDENCE", 0.1)?;
        if !(0.0..=1.0).contains(&qa_min_confidence) {
            return Err(anyhow!("QA_MIN_CONFIDENCE debe estar entre 0 y 1"));
        }
        let qa_timeout_secs = parse_var(&lookup, "QA_TIMEOUT_SECS", 60)?;
        let qa_max_answer_chars = parse_var(&lookup, "QA_MAX_ANSWER_CHARS", 300)?;
        let max_clauses = parse_var(&lookup, "MAX_CLAUSES", DEFAULT_MAX_CLAUSES)?;
        if !(1..=DEFAULT_MAX_CLAUSES).contains(&max_clauses) {
            return Err(anyhow!("MAX_CLAUSES debe estar entre 1 y {DEFAULT_MAX_CLAUSES}"));
        }
        let highlight_clauses = parse_var(&lookup, "HIGHLIGHT_CLAUSES", true)?;
        let max_upload_bytes = parse_var(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?;
        let max_finished_jobs = parse_var(&lookup, "MAX_FINISHED_JOBS", 100)?;
        if max_finished_jobs == 0 {
            return Err(anyhow!("MAX_FINISHED_JOBS debe ser al menos 1"));
        }

        let clause_selection = match var_or("CLAUSE_SELECTION", "first").to_lowercase().as_str() {
            "first" => ClauseSelection::FirstDetected,
            "best" => ClauseSelection::HighestScore,
            other => return Err(anyhow!("CLAUSE_SELECTION no soportado: {other}")),
        };

        let samples_dir = var_or("SAMPLES_DIR", "samples");

        Ok(Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            qa_min_confidence,
            qa_timeout_secs,
            qa_max_answer_chars,
            max_clauses,
            highlight_clauses,
            max_upload_bytes,
            max_finished_jobs,
            clause_selection,
            samples_dir,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:3322");
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);
        assert_eq!(cfg.max_clauses, 30);
        assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.max_finished_jobs, 100);
        assert!(cfg.highlight_clauses);
        assert_eq!(cfg.clause_selection, ClauseSelection::FirstDetected);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("LLM_PROVIDER", "none"),
            ("QA_MIN_CONFIDENCE", "0.25"),
            ("CLAUSE_SELECTION", "best"),
            ("MAX_CLAUSES", "10"),
            ("HIGHLIGHT_CLAUSES", "false"),
            ("MAX_FINISHED_JOBS", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::Disabled);
        assert!((cfg.qa_min_confidence - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.clause_selection, ClauseSelection::HighestScore);
        assert_eq!(cfg.max_clauses, 10);
        assert!(!cfg.highlight_clauses);
        assert_eq!(cfg.max_finished_jobs, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("LLM_PROVIDER", "bard")]).is_err());
        assert!(config_from(&[("MAX_CLAUSES", "muchas")]).is_err());
        assert!(config_from(&[("QA_MIN_CONFIDENCE", "1.5")]).is_err());
        assert!(config_from(&[("MAX_FINISHED_JOBS", "0")]).is_err());
        assert!(config_from(&[("HIGHLIGHT_CLAUSES", "maybe")]).is_err());
    }

    #[test]
    fn clause_cap_must_stay_within_limit() {
        assert!(config_from(&[("MAX_CLAUSES", "0")]).is_err());
        assert!(config_from(&[("MAX_CLAUSES", "100")]).is_err());
        assert_eq!(config_from(&[("MAX_CLAUSES", "1")]).unwrap().max_clauses, 1);
        assert_eq!(config_from(&[("MAX_CLAUSES", "30")]).unwrap().max_clauses, DEFAULT_MAX_CLAUSES);
    }
}
