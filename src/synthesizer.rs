//! Síntesis de respuestas a partir de las cláusulas detectadas.
//!
//! Según la intención de la pregunta:
//!   - Contrato en general: resumen estructurado, o el modelo sobre un digest de cláusulas.
//!   - Cláusula concreta: riesgo de la base de conocimiento + cita de la cláusula.
//!   - Pregunta libre: el modelo sobre varios contextos alternativos; gana la
//!     respuesta con mayor confianza.
//!
//! Los fallos del modelo nunca se propagan: se degradan a respuestas basadas en
//! reglas o a un mensaje explícito.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::knowledge_base;
use crate::models::{AnswerResult, ClauseRecord, ClauseType, ConfidenceBand, QuestionIntent, Severity};
use crate::qa_model::{QaModel, SharedQaModel, SpanAnswer};
use crate::question_router;
use crate::retrieval::{self, clip, TopicFocus};

pub const NO_CLAUSES_DETECTED: &str =
    "No contract clauses were detected. Please ensure the contract was properly analyzed.";
pub const NO_RELEVANT_CLAUSE: &str = "No relevant clause found for this question.";
pub const NO_EXPLANATION: &str = "No explanation available";
pub const COULD_NOT_FIND: &str = "I couldn't find information about that in the contract.";

const CANONICAL_SUMMARY_QUESTIONS: [&str; 3] = [
    "what is the contract about",
    "what is this contract about",
    "contract summary",
];
/// Preguntas que cierran el resumen de respaldo con un párrafo general.
const ABOUT_QUESTIONS: [&str; 2] = ["what is the contract about", "what is this contract about"];
const MIN_MODEL_SUMMARY_CHARS: usize = 20;

/// Política para elegir qué instancia citar cuando hay varias del mismo tipo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseSelection {
    /// La primera en orden de detección (página ascendente).
    FirstDetected,
    /// La de mayor puntuación; en empate, la primera detectada.
    HighestScore,
}

impl ClauseSelection {
    pub fn select(self, clauses: &[ClauseRecord], clause_type: ClauseType) -> Option<&ClauseRecord> {
        let mut matching = clauses.iter().filter(|c| c.clause_type == clause_type);
        match self {
            Self::FirstDetected => matching.next(),
            Self::HighestScore => matching.fold(None, |best: Option<&ClauseRecord>, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub min_confidence: f64,
    pub max_answer_chars: usize,
    pub model_timeout: Option<Duration>,
    pub max_context_chars: usize,
    pub relevant_clause_limit: usize,
    pub keyword_sentence_limit: usize,
    pub focused_sentence_limit: usize,
    pub manual_sentence_limit: usize,
    pub selection: ClauseSelection,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.1,
            max_answer_chars: 300,
            model_timeout: Some(Duration::from_secs(60)),
            max_context_chars: 4000,
            relevant_clause_limit: 5,
            keyword_sentence_limit: 8,
            focused_sentence_limit: 6,
            manual_sentence_limit: 3,
            selection: ClauseSelection::FirstDetected,
        }
    }
}

impl SynthesisOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            min_confidence: cfg.qa_min_confidence,
            max_answer_chars: cfg.qa_max_answer_chars,
            model_timeout: (cfg.qa_timeout_secs > 0).then(|| Duration::from_secs(cfg.qa_timeout_secs)),
            selection: cfg.clause_selection,
            ..Self::default()
        }
    }
}

/// Contexto alternativo para una pregunta libre, etiquetado con su estrategia.
#[derive(Debug, Clone, PartialEq)]
struct ContextCandidate {
    strategy: String,
    context: String,
}

/// Rechaza listas de cláusulas mal formadas antes de responder.
pub fn validate_clauses(clauses: &[ClauseRecord]) -> Result<()> {
    for (i, clause) in clauses.iter().enumerate() {
        if clause.page == 0 {
            bail!("Cláusula {i} ({}) con página 0: las páginas empiezan en 1", clause.clause_type);
        }
        if clause.text.trim().is_empty() {
            bail!("Cláusula {i} ({}) sin texto", clause.clause_type);
        }
        if !(clause.score > 0.0 && clause.score <= 1.0) {
            bail!("Cláusula {i} ({}) con puntuación fuera de (0, 1]: {}", clause.clause_type, clause.score);
        }
        if !clause.bounding_box.is_finite() {
            bail!("Cláusula {i} ({}) con caja no finita", clause.clause_type);
        }
    }
    Ok(())
}

fn is_usable(answer: &str) -> bool {
    let answer = answer.trim();
    !answer.is_empty() && answer != NO_EXPLANATION
}

fn is_canonical_summary_question(question: &str) -> bool {
    let normalized = question.trim().to_lowercase();
    let normalized = normalized.trim_end_matches(['?', '.', '!']).trim();
    CANONICAL_SUMMARY_QUESTIONS.contains(&normalized)
}

pub struct AnswerSynthesizer {
    qa: SharedQaModel,
    options: SynthesisOptions,
}

impl AnswerSynthesizer {
    pub fn new(qa: SharedQaModel, options: SynthesisOptions) -> Self {
        Self { qa, options }
    }

    /// Responde a una pregunta sobre un documento ya analizado.
    /// Sólo falla si la lista de cláusulas está mal formada.
    pub async fn answer(
        &self,
        question: &str,
        clauses: &[ClauseRecord],
        document_text: &str,
    ) -> Result<AnswerResult> {
        validate_clauses(clauses)?;

        let intent = question_router::classify(question);
        info!("Pregunta clasificada como {:?}", intent);

        let result = match intent {
            QuestionIntent::GeneralContract => self.answer_general_contract(question, clauses).await,
            QuestionIntent::Clause(clause_type) => {
                self.answer_clause(question, clause_type, clauses).await
            }
            QuestionIntent::GeneralQuestion => {
                self.answer_general_question(question, clauses, document_text).await
            }
        };
        Ok(result)
    }

    /// Llamada al modelo con el límite de tiempo configurado. Cualquier fallo
    /// se registra y se trata como "sin respuesta".
    async fn query_model(
        &self,
        model: &dyn QaModel,
        question: &str,
        context: &str,
        strategy: &str,
    ) -> Option<SpanAnswer> {
        let call = model.answer_span(question, context, self.options.max_answer_chars, true);
        let result = match self.options.model_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("El modelo superó el límite de {:?} en la estrategia '{}'", limit, strategy);
                    return None;
                }
            },
            None => call.await,
        };

        match result {
            Ok(span) => Some(span),
            Err(e) => {
                warn!("Error del modelo en la estrategia '{}': {:#}", strategy, e);
                None
            }
        }
    }

    // ---------------------------------------------------------------------
    // CONTRATO EN GENERAL
    // ---------------------------------------------------------------------

    async fn answer_general_contract(&self, question: &str, clauses: &[ClauseRecord]) -> AnswerResult {
        if clauses.is_empty() {
            return AnswerResult::plain(NO_CLAUSES_DETECTED);
        }

        let groups = group_by_type(clauses);
        if is_canonical_summary_question(question) {
            return AnswerResult::plain(rule_based_summary(&groups));
        }

        let digest = clause_digest(clauses.len(), &groups);
        if let Some(model) = self.qa.get().await {
            if let Some(span) = self.query_model(model.as_ref(), question, &digest, "clause_digest").await {
                let answer = span.answer.trim();
                if is_usable(answer) && answer.chars().count() > MIN_MODEL_SUMMARY_CHARS {
                    let band = ConfidenceBand::from_score(span.score);
                    return AnswerResult {
                        answer_text: format!("{} {}", band.prefix(), answer),
                        confidence_label: Some(band),
                        strategy: Some("clause_digest".to_string()),
                        ..AnswerResult::plain("")
                    };
                }
            }
        }

        debug!("Sin respuesta útil del modelo; se usa el resumen estructurado.");
        AnswerResult::plain(fallback_summary(&groups, question))
    }

    // ---------------------------------------------------------------------
    // CLÁUSULA CONCRETA
    // ---------------------------------------------------------------------

    pub(crate) async fn answer_clause(
        &self,
        question: &str,
        clause_type: ClauseType,
        clauses: &[ClauseRecord],
    ) -> AnswerResult {
        let Some(clause) = self.options.selection.select(clauses, clause_type) else {
            return AnswerResult::plain(NO_RELEVANT_CLAUSE);
        };

        match knowledge_base::lookup(clause_type) {
            Some(entry) => {
                if let Some(trigger) = entry.matching_trigger(&clause.text) {
                    debug!("La cláusula {} contiene redacción de riesgo: '{}'", clause_type, trigger);
                }
                AnswerResult::plain(format!(
                    "The {} risk with this clause is: {} In your contract, the clause states: '{}...' [Source: {}]",
                    entry.severity.as_str().to_lowercase(),
                    entry.risk_text,
                    clip(&clause.text, 100),
                    entry.source_citation
                ))
                .citing(clause)
            }
            None => self.explain_unlisted_clause(question, clause).await,
        }
    }

    /// Tipo sin entrada en la base de conocimiento: se pregunta al modelo con el
    /// texto de la propia cláusula como contexto.
    async fn explain_unlisted_clause(&self, question: &str, clause: &ClauseRecord) -> AnswerResult {
        if let Some(model) = self.qa.get().await {
            if let Some(span) = self.query_model(model.as_ref(), question, &clause.text, "clause_text").await {
                if is_usable(&span.answer) {
                    let band = ConfidenceBand::from_score(span.score);
                    return AnswerResult {
                        answer_text: format!("LLM Analysis: {}", span.answer.trim()),
                        confidence_label: Some(band),
                        strategy: Some("clause_text".to_string()),
                        ..AnswerResult::plain("")
                    }
                    .citing(clause);
                }
            }
        }
        AnswerResult::plain(format!(
            "No risk information available for {}.",
            clause.clause_type
        ))
        .citing(clause)
    }

    // ---------------------------------------------------------------------
    // PREGUNTA LIBRE
    // ---------------------------------------------------------------------

    fn context_candidates(
        &self,
        question: &str,
        clauses: &[ClauseRecord],
        document_text: &str,
    ) -> Vec<ContextCandidate> {
        let max = self.options.max_context_chars;
        let mut candidates: Vec<ContextCandidate> = Vec::new();
        let mut push = |strategy: String, context: &str| {
            let context = clip(context.trim(), max).to_string();
            if !context.is_empty() && !candidates.iter().any(|c| c.context == context) {
                candidates.push(ContextCandidate { strategy, context });
            }
        };

        push("full_document".to_string(), document_text);

        let clause_context = retrieval::relevant_clauses(clauses, question, self.options.relevant_clause_limit)
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        push("relevant_clauses".to_string(), &clause_context);

        let sentences =
            retrieval::find_relevant_sentences(document_text, question, self.options.keyword_sentence_limit);
        push("keyword_sentences".to_string(), &sentences.join(". "));

        if let Some(topic) = TopicFocus::detect(question) {
            let focused = topic.extract(document_text, question, self.options.focused_sentence_limit);
            push(format!("focused_{}", topic.name()), &focused.join(". "));
        }

        candidates
    }

    async fn answer_general_question(
        &self,
        question: &str,
        clauses: &[ClauseRecord],
        document_text: &str,
    ) -> AnswerResult {
        let candidates = self.context_candidates(question, clauses, document_text);
        if candidates.is_empty() {
            info!("Sin contexto para la pregunta; no se consulta al modelo.");
            return AnswerResult::plain(NO_RELEVANT_CLAUSE);
        }

        let Some(model) = self.qa.get().await else {
            return AnswerResult::plain(format!(
                "{NO_EXPLANATION}: the question-answering model is not available."
            ));
        };

        let mut best: Option<(&ContextCandidate, SpanAnswer)> = None;
        for candidate in &candidates {
            let Some(span) = self
                .query_model(model.as_ref(), question, &candidate.context, &candidate.strategy)
                .await
            else {
                continue;
            };
            if !is_usable(&span.answer) || span.score < self.options.min_confidence {
                debug!(
                    "Estrategia '{}' descartada (puntuación {:.2})",
                    candidate.strategy, span.score
                );
                continue;
            }
            if best.as_ref().map_or(true, |(_, b)| span.score > b.score) {
                best = Some((candidate, span));
            }
        }

        if let Some((candidate, span)) = best {
            info!(
                "Estrategia ganadora '{}' con puntuación {:.2}",
                candidate.strategy, span.score
            );
            let band = ConfidenceBand::from_score(span.score);
            let answer = span.answer.trim();
            let result = AnswerResult {
                answer_text: format!("{} {}\n\n[Strategy: {}]", band.prefix(), answer, candidate.strategy),
                confidence_label: Some(band),
                strategy: Some(candidate.strategy.clone()),
                ..AnswerResult::plain("")
            };
            let needle = answer.to_lowercase();
            return match clauses.iter().find(|c| c.text.to_lowercase().contains(&needle)) {
                Some(clause) => result.citing(clause),
                None => result,
            };
        }

        let manual =
            retrieval::sentences_mentioning(document_text, question, self.options.manual_sentence_limit);
        if !manual.is_empty() {
            let bullets: Vec<String> = manual.iter().map(|s| format!("- {s}.")).collect();
            return AnswerResult {
                answer_text: format!("Based on the contract text:\n{}", bullets.join("\n")),
                strategy: Some("manual_extraction".to_string()),
                ..AnswerResult::plain("")
            };
        }

        AnswerResult::plain(COULD_NOT_FIND)
    }
}

// ---------------------------------------------------------------------
// RESÚMENES
// ---------------------------------------------------------------------

type ClauseGroups<'a> = Vec<(ClauseType, Vec<&'a ClauseRecord>)>;

/// Agrupa por tipo conservando el orden de primera aparición.
fn group_by_type(clauses: &[ClauseRecord]) -> ClauseGroups<'_> {
    let mut groups: ClauseGroups = Vec::new();
    for clause in clauses {
        match groups.iter_mut().find(|(t, _)| *t == clause.clause_type) {
            Some((_, members)) => members.push(clause),
            None => groups.push((clause.clause_type, vec![clause])),
        }
    }
    groups
}

fn first_text<'a>(groups: &ClauseGroups<'a>, clause_type: ClauseType) -> Option<&'a str> {
    groups
        .iter()
        .find(|(t, _)| *t == clause_type)
        .and_then(|(_, members)| members.first().copied())
        .map(|c| c.text.as_str())
}

/// Tipos de `order` presentes en el documento, en ese orden.
fn present(groups: &ClauseGroups<'_>, order: &[ClauseType]) -> Vec<&'static str> {
    order
        .iter()
        .filter(|t| groups.iter().any(|(g, _)| g == *t))
        .map(|t| t.as_str())
        .collect()
}

const LEGAL_FRAMEWORK: [ClauseType; 6] = [
    ClauseType::GoverningLaw,
    ClauseType::Termination,
    ClauseType::Confidentiality,
    ClauseType::AntiAssignment,
    ClauseType::Indemnification,
    ClauseType::ForceMajeure,
];
const BUSINESS_TERMS: [ClauseType; 5] = [
    ClauseType::EffectiveDate,
    ClauseType::Insurance,
    ClauseType::Notices,
    ClauseType::Amendment,
    ClauseType::Waiver,
];
const PROCEDURES: [ClauseType; 3] = [
    ClauseType::DisputeResolution,
    ClauseType::Severability,
    ClauseType::EntireAgreement,
];

/// Orden de presentación de las áreas de riesgo.
const RISK_REVIEW_ORDER: [ClauseType; 7] = [
    ClauseType::AntiAssignment,
    ClauseType::GoverningLaw,
    ClauseType::Termination,
    ClauseType::Indemnification,
    ClauseType::Confidentiality,
    ClauseType::ForceMajeure,
    ClauseType::DisputeResolution,
];

/// Nivel de revisión: la severidad de la base de conocimiento, con la
/// resolución de disputas como riesgo medio y el resto como riesgo bajo.
fn review_tier(clause_type: ClauseType) -> Severity {
    match knowledge_base::lookup(clause_type) {
        Some(entry) => entry.severity,
        None if clause_type == ClauseType::DisputeResolution => Severity::Medium,
        None => Severity::Low,
    }
}

fn risk_areas(groups: &ClauseGroups<'_>, tier: Severity) -> Vec<&'static str> {
    let order: Vec<ClauseType> = RISK_REVIEW_ORDER
        .into_iter()
        .filter(|t| review_tier(*t) == tier)
        .collect();
    present(groups, &order)
}

fn clause_description(clause_type: ClauseType) -> &'static str {
    match clause_type {
        ClauseType::GoverningLaw => "Determines which jurisdiction's laws apply",
        ClauseType::Termination => "Defines how the contract can be ended",
        ClauseType::Confidentiality => "Protects sensitive information",
        ClauseType::AntiAssignment => "Restricts transfer of contract rights",
        ClauseType::Indemnification => "Defines liability and responsibility",
        ClauseType::ForceMajeure => "Covers unexpected events and disruptions",
        ClauseType::DisputeResolution => "Specifies how conflicts will be resolved",
        ClauseType::Insurance => "Defines insurance requirements",
        ClauseType::Severability => "Ensures contract remains valid if parts are invalid",
        ClauseType::EntireAgreement => "States this is the complete agreement",
        ClauseType::Amendment => "Defines how changes can be made",
        ClauseType::Waiver => "Defines rights that can be waived",
        ClauseType::Notices => "Specifies how communications should be sent",
        ClauseType::DocumentName
        | ClauseType::Parties
        | ClauseType::EffectiveDate
        | ClauseType::Assignment => "Legal provision",
    }
}

fn rule_based_summary(groups: &ClauseGroups<'_>) -> String {
    let mut summary = String::from("**Contract Summary**\n\n");

    if let Some(text) = first_text(groups, ClauseType::DocumentName) {
        summary.push_str(&format!("**Document**: {}...\n\n", clip(text, 200)));
    }
    if let Some(text) = first_text(groups, ClauseType::Parties) {
        summary.push_str(&format!("**Parties**: {}...\n\n", clip(text, 200)));
    }

    summary.push_str("**Key Provisions**:\n");
    for (order, label) in [
        (&LEGAL_FRAMEWORK[..], "Legal Framework"),
        (&BUSINESS_TERMS[..], "Business Terms"),
        (&PROCEDURES[..], "Procedures"),
    ] {
        let found = present(groups, order);
        if !found.is_empty() {
            summary.push_str(&format!("• **{}**: {}\n", label, found.join(", ")));
        }
    }

    let high_risk = risk_areas(groups, Severity::High);
    if !high_risk.is_empty() {
        summary.push_str(&format!("\nHigh-Risk Areas: {}\n", high_risk.join(", ")));
    }

    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    summary.push_str(&format!(
        "\nTotal Provisions: {} clauses across {} categories",
        total,
        groups.len()
    ));
    summary
}

/// Resumen cuando el modelo no da una respuesta útil. El párrafo final sólo
/// se añade para las preguntas sobre de qué trata el contrato.
fn fallback_summary(groups: &ClauseGroups<'_>, question: &str) -> String {
    let mut summary = String::from("Based on the contract analysis, here's what I found:\n\n");

    for (clause_type, label) in [
        (ClauseType::DocumentName, "Document Type"),
        (ClauseType::Parties, "Parties"),
        (ClauseType::EffectiveDate, "Effective Date"),
    ] {
        if let Some(text) = first_text(groups, clause_type) {
            summary.push_str(&format!("{}: {}...\n\n", label, clip(text, 100)));
        }
    }

    summary.push_str("Key Clauses Detected:\n");
    for (clause_type, members) in groups {
        if matches!(
            clause_type,
            ClauseType::DocumentName | ClauseType::Parties | ClauseType::EffectiveDate
        ) {
            continue;
        }
        summary.push_str(&format!(
            "  • {}: {} clause(s) - {}\n",
            clause_type,
            members.len(),
            clause_description(*clause_type)
        ));
    }

    let high_risk = risk_areas(groups, Severity::High);
    if !high_risk.is_empty() {
        summary.push_str(&format!("\nHigh-Risk Clauses: {}\n", high_risk.join(", ")));
        summary.push_str("These clauses may require careful review for potential legal risks.\n");
    }
    let medium_risk = risk_areas(groups, Severity::Medium);
    if !medium_risk.is_empty() {
        summary.push_str(&format!("\nMedium-Risk Clauses: {}\n", medium_risk.join(", ")));
        summary.push_str("These clauses should be reviewed for completeness and fairness.\n");
    }

    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    summary.push_str("\nContract Overview:\n");
    summary.push_str(&format!("  • Total clauses detected: {}\n", total));
    summary.push_str(&format!("  • Clause types: {}\n", groups.len()));

    if !ABOUT_QUESTIONS.contains(&question.to_lowercase().as_str()) {
        return summary;
    }
    summary.push_str(&format!(
        "\nSummary: This appears to be a legal contract with {} key provisions covering various aspects of the agreement between the parties.",
        total
    ));
    if !high_risk.is_empty() {
        summary.push_str(&format!(
            " Pay special attention to the {} high-risk clause(s) identified above.",
            high_risk.len()
        ));
    }
    summary.push_str(" Review each clause carefully to understand your rights and obligations.");
    summary
}

/// Digest textual de las cláusulas agrupadas, usado como contexto del modelo.
fn clause_digest(total: usize, groups: &ClauseGroups<'_>) -> String {
    let mut context = String::from("Contract Analysis Summary:\n\n");
    context.push_str(&format!("Total clauses detected: {}\n\n", total));
    for (clause_type, members) in groups {
        context.push_str(&format!("{} clauses ({} found):\n", clause_type, members.len()));
        for clause in members.iter().take(3) {
            context.push_str(&format!("  - Page {}: {}...\n", clause.page, clip(&clause.text, 150)));
        }
        context.push('\n');
    }
    context
}
