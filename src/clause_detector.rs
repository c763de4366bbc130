//! Detección de cláusulas por patrones sobre el texto de cada página.
//!
//! Flujo:
//!   1. Para cada página, cada tipo de cláusula y cada patrón (en orden de registro),
//!      se busca la primera coincidencia con una ventana de contexto válida.
//!   2. La ventana se amplía ±50 caracteres, se normalizan los espacios y se descarta
//!      si queda por debajo de 20 caracteres.
//!   3. La lista global se corta en `max_clauses` registros, en orden de generación.
//!
//! El resaltado en el PDF es cosmético: sus fallos se registran como eventos y nunca
//! interrumpen la detección.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{BoundingBox, ClauseRecord, ClauseType, PageText};
use crate::retrieval::clip;

pub const PATTERN_SCORE: f64 = 0.8;
pub const DEFAULT_MAX_CLAUSES: usize = 30;
const CONTEXT_RADIUS: usize = 50;
const MIN_CONTEXT_CHARS: usize = 20;
const MAX_CONTEXT_CHARS: usize = 300;

fn patterns_for(clause_type: ClauseType) -> &'static [&'static str] {
    match clause_type {
        ClauseType::DocumentName => &[r"agreement|contract|license|terms"],
        ClauseType::Parties => &[r"party|parties|company|corporation"],
        ClauseType::EffectiveDate => &[r"effective\s+date|commencement"],
        ClauseType::GoverningLaw => &[r"governing\s+law|jurisdiction"],
        ClauseType::Termination => &[r"termination|expiration"],
        ClauseType::Confidentiality => &[r"confidential|proprietary"],
        ClauseType::AntiAssignment => &[r"assignment|transfer"],
        ClauseType::Indemnification => &[r"indemnify|hold\s+harmless"],
        ClauseType::ForceMajeure => &[r"force\s+majeure|act\s+of\s+god"],
        ClauseType::DisputeResolution => &[r"dispute|arbitration"],
        ClauseType::Severability => &[r"severability|invalid"],
        ClauseType::EntireAgreement => &[r"entire\s+agreement"],
        ClauseType::Amendment => &[r"amendment|modification"],
        ClauseType::Waiver => &[r"waiver|waive"],
        ClauseType::Notices => &[r"notice|notification"],
        ClauseType::Assignment => &[r"assign|assignment"],
        ClauseType::Insurance => &[r"insurance|coverage"],
    }
}

/// Detector de cláusulas con la tabla de patrones ya compilada.
pub struct ClauseDetector {
    patterns: Vec<(ClauseType, Vec<Regex>)>,
    max_clauses: usize,
}

impl ClauseDetector {
    /// `max_clauses` se acota a `DEFAULT_MAX_CLAUSES`, el máximo por documento.
    pub fn new(max_clauses: usize) -> Result<Self> {
        let mut patterns = Vec::with_capacity(ClauseType::ALL.len());
        for clause_type in ClauseType::ALL {
            let compiled = patterns_for(clause_type)
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .multi_line(true)
                        .build()
                        .with_context(|| format!("Patrón inválido para {clause_type}: {p}"))
                })
                .collect::<Result<Vec<_>>>()?;
            patterns.push((clause_type, compiled));
        }
        Ok(Self {
            patterns,
            max_clauses: max_clauses.min(DEFAULT_MAX_CLAUSES),
        })
    }

    /// Recorre las páginas en orden y devuelve las cláusulas detectadas.
    /// Un documento sin texto produce una lista vacía, nunca un error.
    pub fn detect(&self, pages: &[PageText]) -> Vec<ClauseRecord> {
        if pages.iter().all(|p| p.text.trim().is_empty()) {
            info!("Documento sin texto extraíble; no se detectan cláusulas.");
            return Vec::new();
        }

        let mut clauses = Vec::new();
        'pages: for page in pages {
            if clauses.len() >= self.max_clauses {
                break;
            }
            if page.text.trim().is_empty() {
                debug!("Página {} vacía, se omite.", page.page);
                continue;
            }
            debug!("Analizando página {} en busca de cláusulas...", page.page);

            for (clause_type, regexes) in &self.patterns {
                for re in regexes {
                    // Sólo la primera ventana aceptada por par tipo-patrón y página.
                    let window = re
                        .find_iter(&page.text)
                        .find_map(|m| context_window(&page.text, m.start(), m.end()));

                    if let Some(text) = window {
                        if clauses.len() >= self.max_clauses {
                            break 'pages;
                        }
                        debug!("Encontrada {} en página {}: {}...", clause_type, page.page, clip(&text, 50));
                        clauses.push(ClauseRecord {
                            clause_type: *clause_type,
                            text,
                            page: page.page,
                            bounding_box: BoundingBox::ZERO,
                            score: PATTERN_SCORE,
                        });
                    }
                }
            }
        }

        info!("Detección completada: {} cláusulas.", clauses.len());
        clauses
    }
}

/// Ventana de ±`CONTEXT_RADIUS` caracteres alrededor de la coincidencia,
/// con los espacios colapsados. `None` si queda demasiado corta.
fn context_window(text: &str, start: usize, end: usize) -> Option<String> {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(CONTEXT_RADIUS)
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_RADIUS)
        .map_or(text.len(), |(i, _)| end + i);

    let normalized = text[from..to].split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() < MIN_CONTEXT_CHARS {
        return None;
    }
    Some(clip(&normalized, MAX_CONTEXT_CHARS).to_string())
}

// ---------------------------------------------------------------------
// RESALTADO
// ---------------------------------------------------------------------

/// Primitivas de la librería PDF para localizar texto y anotarlo.
pub trait PageHighlighter: Send + Sync {
    fn search_text_on_page(&self, page: u32, literal: &str) -> Result<Vec<BoundingBox>>;
    fn add_highlight(&self, page: u32, rect: BoundingBox, label: &str) -> Result<()>;
}

/// Resultado observable de intentar resaltar una cláusula.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HighlightEvent {
    Applied {
        clause_index: usize,
        page: u32,
        rects: usize,
    },
    NotFound {
        clause_index: usize,
        page: u32,
    },
    Failed {
        clause_index: usize,
        page: u32,
        reason: String,
    },
}

/// Intenta resaltar cada cláusula en su página. Si el texto aparece, la primera
/// caja encontrada pasa a ser el `bounding_box` del registro.
pub fn apply_highlights(
    highlighter: &dyn PageHighlighter,
    clauses: &mut [ClauseRecord],
) -> Vec<HighlightEvent> {
    let mut events = Vec::with_capacity(clauses.len());

    for (clause_index, clause) in clauses.iter_mut().enumerate() {
        let page = clause.page;
        let rects = match highlighter.search_text_on_page(page, &clause.text) {
            // Una caja vacía no localiza nada.
            Ok(rects) => rects.into_iter().filter(|r| !r.is_zero()).collect::<Vec<_>>(),
            Err(e) => {
                warn!("No se pudo buscar {} en la página {}: {}", clause.clause_type, page, e);
                events.push(HighlightEvent::Failed {
                    clause_index,
                    page,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let Some(first) = rects.first() else {
            debug!("Texto de {} no localizado en la página {}.", clause.clause_type, page);
            events.push(HighlightEvent::NotFound { clause_index, page });
            continue;
        };
        clause.bounding_box = *first;

        let label = format!("CLAWS: {}", clause.clause_type);
        let failure = rects
            .iter()
            .filter_map(|rect| highlighter.add_highlight(page, *rect, &label).err())
            .last();

        match failure {
            Some(e) => {
                warn!("No se pudo resaltar {} en la página {}: {}", clause.clause_type, page, e);
                events.push(HighlightEvent::Failed {
                    clause_index,
                    page,
                    reason: e.to_string(),
                });
            }
            None => events.push(HighlightEvent::Applied {
                clause_index,
                page,
                rects: rects.len(),
            }),
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            page: n,
            text: text.to_string(),
        }
    }

    fn detector() -> ClauseDetector {
        ClauseDetector::new(DEFAULT_MAX_CLAUSES).unwrap()
    }

    const SAMPLE_CONTRACT: &str = "
    This Software License Agreement is entered into between Company A and Company B.
    The effective date of this agreement is January 1, 2024.
    This agreement shall be governed by the laws of California.
    Either party may terminate this agreement with 30 days notice.
    All confidential information shall be protected.
    Neither party may assign this agreement without written consent.
    Each party shall indemnify the other against all claims.
    Force majeure events shall excuse performance.
    Any disputes shall be resolved through arbitration.
    ";

    #[test]
    fn detects_common_clause_types() {
        let clauses = detector().detect(&[page(1, SAMPLE_CONTRACT)]);
        let types: Vec<ClauseType> = clauses.iter().map(|c| c.clause_type).collect();

        for expected in [
            ClauseType::DocumentName,
            ClauseType::Parties,
            ClauseType::EffectiveDate,
            ClauseType::Confidentiality,
            ClauseType::Indemnification,
            ClauseType::ForceMajeure,
        ] {
            assert!(types.contains(&expected), "falta {expected}");
        }
    }

    #[test]
    fn records_are_well_formed() {
        let clauses = detector().detect(&[page(1, SAMPLE_CONTRACT), page(2, SAMPLE_CONTRACT)]);
        assert!(!clauses.is_empty());
        for clause in &clauses {
            assert!(clause.score > 0.0 && clause.score <= 1.0);
            assert!(clause.page >= 1);
            assert_eq!(clause.bounding_box.0.len(), 4);
            assert!(clause.bounding_box.is_zero());
            assert!(!clause.text.is_empty());
            assert!(!clause.text.contains("  "));
        }
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(detector().detect(&[]).is_empty());
        assert!(detector().detect(&[page(1, ""), page(2, "   \n\t ")]).is_empty());
    }

    #[test]
    fn plain_text_without_legal_terms_yields_nothing() {
        let clauses = detector().detect(&[page(1, "This is just a regular document with no legal content.")]);
        assert!(clauses.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let clauses = detector().detect(&[page(1, "GOVERNING LAW: This agreement is GOVERNED BY California law.")]);
        assert!(clauses.iter().any(|c| c.clause_type == ClauseType::GoverningLaw));
    }

    #[test]
    fn one_record_per_pattern_and_page() {
        let text = "All confidential information stays confidential. Confidential material must be returned.";
        let clauses = detector().detect(&[page(1, text), page(2, text)]);
        let confidential: Vec<_> = clauses
            .iter()
            .filter(|c| c.clause_type == ClauseType::Confidentiality)
            .collect();
        assert_eq!(confidential.len(), 2);
        assert_eq!(confidential[0].page, 1);
        assert_eq!(confidential[1].page, 2);
    }

    #[test]
    fn output_is_capped_in_generation_order() {
        let pages: Vec<PageText> = (1..=6).map(|n| page(n, SAMPLE_CONTRACT)).collect();
        let clauses = detector().detect(&pages);
        assert_eq!(clauses.len(), DEFAULT_MAX_CLAUSES);
        assert_eq!(clauses[0].page, 1);
        assert!(clauses.windows(2).all(|w| w[0].page <= w[1].page));
    }

    #[test]
    fn cap_is_checked_before_each_record() {
        let pages: Vec<PageText> = (1..=10).map(|n| page(n, SAMPLE_CONTRACT)).collect();

        let none = ClauseDetector::new(0).unwrap().detect(&pages);
        assert!(none.is_empty());

        let one = ClauseDetector::new(1).unwrap().detect(&pages);
        assert_eq!(one.len(), 1);

        let oversized = ClauseDetector::new(100).unwrap().detect(&pages);
        assert_eq!(oversized.len(), DEFAULT_MAX_CLAUSES);
    }

    #[test]
    fn detection_is_idempotent() {
        let pages = vec![page(1, SAMPLE_CONTRACT), page(3, "Notices shall be sent by registered mail to the company.")];
        let d = detector();
        assert_eq!(d.detect(&pages), d.detect(&pages));
    }

    #[test]
    fn window_extends_fifty_chars_each_side() {
        let text = format!("{}governing law{}", "x".repeat(100), "y".repeat(100));
        let clauses = detector().detect(&[page(1, &text)]);
        let governing = clauses
            .iter()
            .find(|c| c.clause_type == ClauseType::GoverningLaw)
            .unwrap();
        assert_eq!(governing.text, format!("{}governing law{}", "x".repeat(50), "y".repeat(50)));
    }

    #[test]
    fn short_windows_are_discarded() {
        assert!(context_window("a notice", 2, 8).is_none());
        assert!(context_window("é".repeat(10).as_str(), 0, 2).is_none());
    }

    struct FakeHighlighter {
        fail_search_on_page: Option<u32>,
        annotated: Mutex<Vec<(u32, String)>>,
    }

    impl PageHighlighter for FakeHighlighter {
        fn search_text_on_page(&self, page: u32, literal: &str) -> Result<Vec<BoundingBox>> {
            if Some(page) == self.fail_search_on_page {
                return Err(anyhow!("página corrupta"));
            }
            if literal.contains("governed") {
                Ok(vec![BoundingBox([10.0, 20.0, 200.0, 32.0])])
            } else if literal.to_lowercase().contains("notice") {
                Ok(vec![BoundingBox::ZERO])
            } else {
                Ok(Vec::new())
            }
        }

        fn add_highlight(&self, page: u32, _rect: BoundingBox, label: &str) -> Result<()> {
            self.annotated.lock().unwrap().push((page, label.to_string()));
            Ok(())
        }
    }

    #[test]
    fn highlight_failures_are_reported_not_raised() {
        let mut clauses = detector().detect(&[
            page(1, "This agreement shall be governed by the laws of California."),
            page(2, "All confidential information shall be protected by the parties."),
        ]);
        let highlighter = FakeHighlighter {
            fail_search_on_page: Some(2),
            annotated: Mutex::new(Vec::new()),
        };

        let events = apply_highlights(&highlighter, &mut clauses);
        assert_eq!(events.len(), clauses.len());
        assert!(events
            .iter()
            .any(|e| matches!(e, HighlightEvent::Applied { page: 1, rects: 1, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, HighlightEvent::Failed { page: 2, .. })));

        assert!(clauses
            .iter()
            .filter(|c| c.page == 1)
            .all(|c| c.bounding_box == BoundingBox([10.0, 20.0, 200.0, 32.0])));
        assert!(clauses.iter().filter(|c| c.page == 2).all(|c| c.bounding_box.is_zero()));

        let annotated = highlighter.annotated.lock().unwrap();
        assert!(annotated.iter().all(|(p, label)| *p == 1 && label.starts_with("CLAWS: ")));
    }

    #[test]
    fn empty_boxes_count_as_not_found() {
        let mut clauses = detector().detect(&[page(1, "Notices shall be sent by registered mail to the address below.")]);
        let highlighter = FakeHighlighter {
            fail_search_on_page: None,
            annotated: Mutex::new(Vec::new()),
        };

        let events = apply_highlights(&highlighter, &mut clauses);
        let notices = clauses.iter().position(|c| c.clause_type == ClauseType::Notices).unwrap();
        assert!(events.contains(&HighlightEvent::NotFound {
            clause_index: notices,
            page: 1
        }));
        assert!(highlighter.annotated.lock().unwrap().is_empty());
    }
}
