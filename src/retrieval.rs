//! Recuperación de contexto por solapamiento de palabras clave.
//!
//! Todas las estrategias (búsqueda general, extractores por tema, ranking de
//! cláusulas) comparten el mismo `SentenceScorer`, configurado con una tabla de
//! palabras clave y pesos distinta en cada caso.

use crate::models::ClauseRecord;

const MIN_SENTENCE_CHARS: usize = 20;
/// Las palabras de la pregunta deben superar esta longitud para contar.
const MIN_QUESTION_WORD_CHARS: usize = 3;
const CONTRACT_TERMS: [&str; 4] = ["agreement", "contract", "terms", "conditions"];
const CONTRACT_BONUS: u32 = 3;
const GENERIC_VOCABULARY: [&str; 5] = ["agreement", "contract", "terms", "conditions", "purpose"];

const STOPWORDS: &[&str] = &[
    "what", "which", "when", "where", "does", "this", "that", "with", "about", "there", "have",
    "tell", "please", "explain",
];

/// Grupos de sinónimos por concepto legal.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("termination", &["terminate", "end", "expire", "cancel", "termination"]),
    ("payment", &["payment", "pay", "fee", "fees", "compensation", "invoice", "price"]),
    ("liability", &["liability", "liable", "damages", "indemnify", "indemnification"]),
    ("confidentiality", &["confidential", "confidentiality", "proprietary", "secret", "disclose"]),
    ("governing law", &["governing", "law", "jurisdiction", "court"]),
    ("assignment", &["assign", "assignment", "transfer"]),
    ("parties", &["party", "parties", "company"]),
    ("duration", &["term", "duration", "period", "renewal"]),
];

/// Prefijo de `text` con como mucho `max_chars` caracteres.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Divide en frases por `.`, `!` y `?`, descartando fragmentos cortos.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Palabras significativas de la pregunta (longitud y stopwords).
pub fn question_words(question: &str) -> Vec<String> {
    let mut words = Vec::new();
    for word in tokenize(question) {
        if word.chars().count() > MIN_QUESTION_WORD_CHARS
            && !STOPWORDS.contains(&word.as_str())
            && !words.contains(&word)
        {
            words.push(word);
        }
    }
    words
}

/// `needle` aparece como palabra aislada (no sólo como subcadena).
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Keyword {
    term: String,
    weight: u32,
}

/// Puntuador de frases parametrizado por una tabla de palabras clave.
///
/// Por cada palabra clave de peso `w`: `+w` si aparece como subcadena, `+2w` si
/// aparece como palabra aislada y `+w` si la frase empieza por ella. Además suma
/// un bono fijo si la frase menciona vocabulario contractual.
#[derive(Debug, Clone)]
pub struct SentenceScorer {
    keywords: Vec<Keyword>,
    contract_bonus: u32,
}

impl SentenceScorer {
    pub fn new() -> Self {
        Self {
            keywords: Vec::new(),
            contract_bonus: CONTRACT_BONUS,
        }
    }

    pub fn keyword(mut self, term: &str, weight: u32) -> Self {
        let term = term.to_lowercase();
        if !term.is_empty() && !self.keywords.iter().any(|k| k.term == term) {
            self.keywords.push(Keyword { term, weight });
        }
        self
    }

    pub fn keywords<'a, I>(self, terms: I, weight: u32) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        terms.into_iter().fold(self, |scorer, term| scorer.keyword(term, weight))
    }

    #[cfg(test)]
    pub fn contract_bonus(mut self, bonus: u32) -> Self {
        self.contract_bonus = bonus;
        self
    }

    /// Conjunto de palabras clave derivado de la pregunta: sinónimos de los
    /// conceptos mencionados, palabras largas de la pregunta y, para preguntas
    /// generales ("what is", "about"), vocabulario contractual genérico.
    pub fn for_question(question: &str) -> Self {
        let lower = question.to_lowercase();
        let tokens = tokenize(&lower);

        let mut scorer = Self::new();
        for (concept, synonyms) in SYNONYMS {
            let mentioned = lower.contains(*concept)
                || synonyms.iter().any(|s| tokens.iter().any(|t| t.as_str() == *s));
            if mentioned {
                scorer = scorer.keywords(synonyms.iter().copied(), 1);
            }
        }

        let words = question_words(question);
        scorer = scorer.keywords(words.iter().map(String::as_str), 1);

        if lower.contains("what is") || lower.contains("about") {
            scorer = scorer.keywords(GENERIC_VOCABULARY, 1);
        }
        scorer
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn score(&self, sentence: &str) -> u32 {
        let lower = sentence.to_lowercase();
        let head = lower.trim_start();

        let mut score = 0;
        for Keyword { term, weight } in &self.keywords {
            if !lower.contains(term.as_str()) {
                continue;
            }
            score += weight;
            if contains_word(&lower, term) {
                score += 2 * weight;
            }
            if head.starts_with(term.as_str()) {
                score += weight;
            }
        }

        if CONTRACT_TERMS.iter().any(|t| lower.contains(*t)) {
            score += self.contract_bonus;
        }
        score
    }

    /// Frases con puntuación positiva, de mayor a menor. Los empates conservan
    /// el orden original.
    pub fn rank<'a, I>(&self, sentences: I, limit: usize) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut scored: Vec<(u32, &'a str)> = sentences
            .into_iter()
            .map(|s| (self.score(s), s))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, s)| s).collect()
    }
}

impl Default for SentenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Frases del documento más relevantes para la pregunta.
pub fn find_relevant_sentences(full_text: &str, question: &str, limit: usize) -> Vec<String> {
    let scorer = SentenceScorer::for_question(question);
    if scorer.is_empty() {
        return Vec::new();
    }
    scorer
        .rank(split_sentences(full_text), limit)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Cláusulas cuyo texto puntúa mejor contra la pregunta.
pub fn relevant_clauses<'a>(
    clauses: &'a [ClauseRecord],
    question: &str,
    limit: usize,
) -> Vec<&'a ClauseRecord> {
    let scorer = SentenceScorer::for_question(question);
    let mut scored: Vec<(u32, &ClauseRecord)> = clauses
        .iter()
        .map(|c| (scorer.score(&c.text), c))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

/// Último recurso: frases que contienen alguna palabra de la pregunta, en el
/// orden del documento.
pub fn sentences_mentioning(full_text: &str, question: &str, limit: usize) -> Vec<String> {
    let words = question_words(question);
    if words.is_empty() {
        return Vec::new();
    }
    split_sentences(full_text)
        .into_iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            words.iter().any(|w| lower.contains(w.as_str()))
        })
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Extractores especializados por tema: prefiltran frases por una lista fija de
/// términos antes de puntuarlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFocus {
    Payment,
    Termination,
    Liability,
    Confidentiality,
}

impl TopicFocus {
    pub const ALL: [TopicFocus; 4] = [
        Self::Payment,
        Self::Termination,
        Self::Liability,
        Self::Confidentiality,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Termination => "termination",
            Self::Liability => "liability",
            Self::Confidentiality => "confidentiality",
        }
    }

    fn triggers(&self) -> &'static [&'static str] {
        match self {
            Self::Payment => &["payment", "pay", "fee", "cost", "price", "invoice", "compensation"],
            Self::Termination => &["terminate", "termination", "cancel", "expire", "end the"],
            Self::Liability => &["liability", "liable", "damages", "indemn"],
            Self::Confidentiality => &["confidential", "secret", "disclose", "proprietary"],
        }
    }

    fn filter_terms(&self) -> &'static [&'static str] {
        match self {
            Self::Payment => &["pay", "fee", "invoice", "price", "compensation", "amount", "due", "$"],
            Self::Termination => &["terminat", "cancel", "expir", "notice", "end of"],
            Self::Liability => &["liab", "damages", "indemn", "hold harmless", "limitation"],
            Self::Confidentiality => &["confidential", "proprietary", "disclos", "secret", "non-public"],
        }
    }

    /// Primer tema cuya lista de disparadores aparece en la pregunta.
    pub fn detect(question: &str) -> Option<Self> {
        let lower = question.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|topic| topic.triggers().iter().any(|t| lower.contains(*t)))
    }

    pub fn extract(&self, full_text: &str, question: &str, limit: usize) -> Vec<String> {
        let filter = self.filter_terms();
        let candidates: Vec<&str> = split_sentences(full_text)
            .into_iter()
            .filter(|s| {
                let lower = s.to_lowercase();
                filter.iter().any(|t| lower.contains(*t))
            })
            .collect();

        SentenceScorer::for_question(question)
            .keywords(filter.iter().copied(), 1)
            .rank(candidates, limit)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, ClauseType};

    #[test]
    fn payment_sentence_outranks_unrelated_one() {
        let text = "The payment is due monthly. This is an unrelated sentence about weather.";
        let ranked = find_relevant_sentences(text, "what are the payment terms", 5);
        assert_eq!(ranked.first().map(String::as_str), Some("The payment is due monthly"));
        let scorer = SentenceScorer::for_question("what are the payment terms");
        assert!(
            scorer.score("The payment is due monthly.")
                > scorer.score("This is an unrelated sentence about weather.")
        );
    }

    #[test]
    fn short_fragments_are_dropped() {
        let sentences = split_sentences("Too short. This sentence is long enough to count! Ok?");
        assert_eq!(sentences, vec!["This sentence is long enough to count"]);
    }

    #[test]
    fn scoring_rewards_whole_words_and_leading_keywords() {
        let scorer = SentenceScorer::new().contract_bonus(0).keyword("fee", 1);
        // Subcadena sola.
        assert_eq!(scorer.score("The coffee machine is broken"), 1);
        // Palabra aislada.
        assert_eq!(scorer.score("A late fee applies"), 3);
        // Palabra aislada al inicio.
        assert_eq!(scorer.score("Fee waived for members"), 4);
    }

    #[test]
    fn contract_vocabulary_adds_flat_bonus() {
        let scorer = SentenceScorer::new();
        assert_eq!(scorer.score("This agreement binds both sides"), CONTRACT_BONUS);
        assert_eq!(scorer.score("Nothing relevant here at all"), 0);
    }

    #[test]
    fn ties_keep_document_order() {
        let scorer = SentenceScorer::new().contract_bonus(0).keyword("notice", 1);
        let ranked = scorer.rank(
            ["First notice sentence goes here", "Second notice sentence goes here"],
            5,
        );
        assert_eq!(ranked[0], "First notice sentence goes here");
    }

    #[test]
    fn synonyms_expand_termination_questions() {
        let scorer = SentenceScorer::for_question("How can I terminate?");
        assert!(scorer.score("The contract may expire after two years") > 0);
    }

    #[test]
    fn question_words_skip_stopwords_and_short_words() {
        assert_eq!(
            question_words("What is the notice period about?"),
            vec!["notice".to_string(), "period".to_string()]
        );
    }

    #[test]
    fn topic_detection_and_focused_extraction() {
        assert_eq!(TopicFocus::detect("When do I pay the invoice?"), Some(TopicFocus::Payment));
        assert_eq!(TopicFocus::detect("Is the data kept secret?"), Some(TopicFocus::Confidentiality));
        assert_eq!(TopicFocus::detect("Who signs first?"), None);

        let text = "Customer shall pay each invoice within thirty days. \
                    The weather in Madrid is usually sunny in summer. \
                    Late payments accrue a fee of two percent per month.";
        let focused = TopicFocus::Payment.extract(text, "When do I pay?", 5);
        assert_eq!(focused.len(), 2);
        assert!(focused.iter().all(|s| !s.contains("weather")));
    }

    #[test]
    fn clauses_are_ranked_against_question() {
        let clause = |t: ClauseType, text: &str| ClauseRecord {
            clause_type: t,
            text: text.to_string(),
            page: 1,
            bounding_box: BoundingBox::ZERO,
            score: 0.8,
        };
        let clauses = vec![
            clause(ClauseType::Notices, "Notices go to the registered address"),
            clause(ClauseType::Termination, "Either side may terminate with notice"),
        ];
        let ranked = relevant_clauses(&clauses, "Can I terminate early?", 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].clause_type, ClauseType::Termination);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("señoría", 3), "señ");
        assert_eq!(clip("abc", 10), "abc");
    }
}
