//! Modelos de dominio: cláusulas detectadas, intención de la pregunta y respuesta final.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tipos de cláusula reconocidos por el detector.
/// El orden de `ClauseType::ALL` es el orden de registro de patrones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClauseType {
    #[serde(rename = "Document Name")]
    DocumentName,
    #[serde(rename = "Parties")]
    Parties,
    #[serde(rename = "Effective Date")]
    EffectiveDate,
    #[serde(rename = "Governing Law")]
    GoverningLaw,
    #[serde(rename = "Termination")]
    Termination,
    #[serde(rename = "Confidentiality")]
    Confidentiality,
    #[serde(rename = "Anti-Assignment")]
    AntiAssignment,
    #[serde(rename = "Indemnification")]
    Indemnification,
    #[serde(rename = "Force Majeure")]
    ForceMajeure,
    #[serde(rename = "Dispute Resolution")]
    DisputeResolution,
    #[serde(rename = "Severability")]
    Severability,
    #[serde(rename = "Entire Agreement")]
    EntireAgreement,
    #[serde(rename = "Amendment")]
    Amendment,
    #[serde(rename = "Waiver")]
    Waiver,
    #[serde(rename = "Notices")]
    Notices,
    #[serde(rename = "Assignment")]
    Assignment,
    #[serde(rename = "Insurance")]
    Insurance,
}

impl ClauseType {
    pub const ALL: [ClauseType; 17] = [
        Self::DocumentName,
        Self::Parties,
        Self::EffectiveDate,
        Self::GoverningLaw,
        Self::Termination,
        Self::Confidentiality,
        Self::AntiAssignment,
        Self::Indemnification,
        Self::ForceMajeure,
        Self::DisputeResolution,
        Self::Severability,
        Self::EntireAgreement,
        Self::Amendment,
        Self::Waiver,
        Self::Notices,
        Self::Assignment,
        Self::Insurance,
    ];

    /// Nombre legible, el mismo que se usa en JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentName => "Document Name",
            Self::Parties => "Parties",
            Self::EffectiveDate => "Effective Date",
            Self::GoverningLaw => "Governing Law",
            Self::Termination => "Termination",
            Self::Confidentiality => "Confidentiality",
            Self::AntiAssignment => "Anti-Assignment",
            Self::Indemnification => "Indemnification",
            Self::ForceMajeure => "Force Majeure",
            Self::DisputeResolution => "Dispute Resolution",
            Self::Severability => "Severability",
            Self::EntireAgreement => "Entire Agreement",
            Self::Amendment => "Amendment",
            Self::Waiver => "Waiver",
            Self::Notices => "Notices",
            Self::Assignment => "Assignment",
            Self::Insurance => "Insurance",
        }
    }
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rectángulo `[x0, y0, x1, y1]` en coordenadas de página.
/// Todo a cero cuando no se ha podido localizar el texto.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    pub const ZERO: BoundingBox = BoundingBox([0.0; 4]);

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Una instancia de cláusula detectada en el documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseRecord {
    #[serde(rename = "type")]
    pub clause_type: ClauseType,
    /// Ventana de contexto alrededor de la coincidencia, con espacios normalizados.
    pub text: String,
    /// Número de página, empezando en 1.
    pub page: u32,
    #[serde(rename = "bbox")]
    pub bounding_box: BoundingBox,
    /// Peso fijo según la vía de detección, no una probabilidad aprendida.
    pub score: f64,
}

/// Texto extraído de una página del PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// Clasificación de una pregunta del usuario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionIntent {
    GeneralContract,
    GeneralQuestion,
    Clause(ClauseType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Etiqueta de presentación derivada de la puntuación del modelo.
/// No influye en el enrutado de la pregunta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::High => "High Confidence Answer:",
            Self::Medium => "Answer:",
            Self::Low => "Answer (Low Confidence):",
        }
    }
}

/// Respuesta a una pregunta, con la cláusula citada si la hay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer_text: String,
    pub cited_clause_text: Option<String>,
    pub cited_clause_type: Option<ClauseType>,
    pub cited_page: Option<u32>,
    pub confidence_label: Option<ConfidenceBand>,
    /// Estrategia de contexto ganadora cuando la respuesta viene del modelo.
    pub strategy: Option<String>,
}

impl AnswerResult {
    /// Respuesta sin cita ni puntuación (mensajes fijos, resúmenes).
    pub fn plain(answer_text: impl Into<String>) -> Self {
        Self {
            answer_text: answer_text.into(),
            cited_clause_text: None,
            cited_clause_type: None,
            cited_page: None,
            confidence_label: None,
            strategy: None,
        }
    }

    pub fn citing(mut self, clause: &ClauseRecord) -> Self {
        self.cited_clause_text = Some(clause.text.clone());
        self.cited_clause_type = Some(clause.clause_type);
        self.cited_page = Some(clause.page);
        self
    }
}
