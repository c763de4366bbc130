//! Clasificación de preguntas por palabras clave.

use crate::models::{ClauseType, QuestionIntent};

/// Frases que indican una pregunta sobre el contrato en su conjunto.
const GENERAL_CONTRACT_PHRASES: &[&str] = &[
    "what is the contract about",
    "what is this contract",
    "contract about",
    "contract summary",
    "explain the contract",
    "what are the risks",
    "contract risks",
    "overall risks",
    "what does this contract",
    "contract purpose",
    "contract overview",
    "contract details",
    "what is this agreement",
    "agreement about",
    "what does the agreement",
    "agreement summary",
    "tell me about this contract",
    "describe the contract",
    "contract analysis",
];

/// Familias de palabras clave por tipo de cláusula. Gana la primera que aparezca,
/// así que el orden importa cuando una pregunta mezcla varias familias.
const CLAUSE_KEYWORDS: &[(&[&str], ClauseType)] = &[
    (&["assignment", "assign", "transfer"], ClauseType::AntiAssignment),
    (&["governing", "law", "jurisdiction"], ClauseType::GoverningLaw),
    (&["termination", "terminate", "end"], ClauseType::Termination),
    (&["confidential", "proprietary", "secret"], ClauseType::Confidentiality),
    (&["indemnify", "indemnification", "liability"], ClauseType::Indemnification),
    (&["force majeure", "act of god", "disaster"], ClauseType::ForceMajeure),
];

/// Clasifica una pregunta. Función pura y determinista; las coincidencias son
/// por subcadena sobre la pregunta en minúsculas.
pub fn classify(question: &str) -> QuestionIntent {
    let lower = question.to_lowercase();

    if GENERAL_CONTRACT_PHRASES.iter().any(|p| lower.contains(*p)) {
        return QuestionIntent::GeneralContract;
    }

    CLAUSE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(*k)))
        .map_or(QuestionIntent::GeneralQuestion, |(_, clause_type)| {
            QuestionIntent::Clause(*clause_type)
        })
}
