//! Ingesta de un contrato en PDF: validación de la subida, extracción del texto
//! página a página, detección de cláusulas y resaltado sobre el PDF.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clause_detector::{apply_highlights, ClauseDetector, HighlightEvent, PageHighlighter};
use crate::highlight::PdfHighlighter;
use crate::models::{ClauseRecord, PageText};

/// Cabecera que debe traer cualquier fichero PDF.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Motivo por el que se rechaza una subida antes de analizarla.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRejection {
    Empty,
    TooLarge { size: usize, max: usize },
    NotPdf,
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "No data uploaded"),
            Self::TooLarge { .. } => write!(f, "File too large"),
            Self::NotPdf => write!(f, "Not a valid PDF file"),
        }
    }
}

impl std::error::Error for UploadRejection {}

pub fn validate_upload(bytes: &[u8], max_bytes: usize) -> Result<(), UploadRejection> {
    if bytes.is_empty() {
        return Err(UploadRejection::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadRejection::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(UploadRejection::NotPdf);
    }
    Ok(())
}

/// Extrae el texto de cada página, numeradas desde 1. Un PDF ilegible se trata
/// como un documento sin texto: se registra y se devuelve una lista vacía.
pub fn extract_page_texts(bytes: &[u8]) -> Vec<PageText> {
    // pdf-extract puede entrar en pánico con ficheros corruptos.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes));

    match extracted {
        Ok(Ok(pages)) => pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText {
                page: i as u32 + 1,
                text,
            })
            .collect(),
        Ok(Err(e)) => {
            warn!("No se pudo extraer texto del PDF: {}. Se analiza como documento vacío.", e);
            Vec::new()
        }
        Err(_) => {
            warn!("El extractor de PDF falló de forma inesperada. Se analiza como documento vacío.");
            Vec::new()
        }
    }
}

/// Resultado completo del análisis de un documento.
#[derive(Debug, Clone, Default)]
pub struct DocumentAnalysis {
    pub pages: Vec<PageText>,
    pub clauses: Vec<ClauseRecord>,
    /// Texto de todas las páginas unido por saltos de línea.
    pub document_text: String,
    pub highlight_events: Vec<HighlightEvent>,
    /// El PDF original con una anotación por caja resaltada, si hubo alguna.
    pub highlighted_pdf: Option<Vec<u8>>,
}

impl DocumentAnalysis {
    pub fn summary(&self) -> AnalysisSummary {
        let clause_types: HashSet<_> = self.clauses.iter().map(|c| c.clause_type).collect();
        AnalysisSummary {
            pages: self.pages.len(),
            pages_with_text: self.pages.iter().filter(|p| !p.text.trim().is_empty()).count(),
            clauses: self.clauses.len(),
            clause_types: clause_types.len(),
            highlighted: self
                .highlight_events
                .iter()
                .filter(|e| matches!(e, HighlightEvent::Applied { .. }))
                .count(),
        }
    }
}

/// Resumen de un análisis, pensado para el log y el mensaje de estado.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub pages: usize,
    pub pages_with_text: usize,
    pub clauses: usize,
    pub clause_types: usize,
    pub highlighted: usize,
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resumen: {} páginas ({} con texto), {} cláusulas de {} tipos, {} resaltadas.",
            self.pages, self.pages_with_text, self.clauses, self.clause_types, self.highlighted
        )
    }
}

/// Orquesta extracción, detección y resaltado. Es síncrono: el llamador decide
/// en qué hilo se ejecuta.
#[derive(Clone)]
pub struct DocumentAnalyzer {
    detector: Arc<ClauseDetector>,
    highlight: bool,
}

impl DocumentAnalyzer {
    pub fn new(detector: ClauseDetector) -> Self {
        Self {
            detector: Arc::new(detector),
            highlight: true,
        }
    }

    pub fn with_highlighting(mut self, enabled: bool) -> Self {
        self.highlight = enabled;
        self
    }

    pub fn analyze(&self, bytes: &[u8]) -> DocumentAnalysis {
        let pages = extract_page_texts(bytes);
        if !self.highlight || pages.is_empty() {
            return self.analyze_pages(pages, None);
        }

        let highlighter = match PdfHighlighter::load(bytes) {
            Ok(highlighter) => highlighter,
            Err(e) => {
                warn!("Resaltado desactivado para este documento: {:#}", e);
                return self.analyze_pages(pages, None);
            }
        };

        let mut analysis = self.analyze_pages(pages, Some(&highlighter));
        if highlighter.annotation_count() > 0 {
            match highlighter.to_pdf_bytes() {
                Ok(pdf) => analysis.highlighted_pdf = Some(pdf),
                Err(e) => warn!("No se pudo generar el PDF resaltado: {:#}", e),
            }
        }
        analysis
    }

    /// Detección sobre texto ya extraído; resalta sólo si se pasa un `highlighter`.
    pub fn analyze_pages(&self, pages: Vec<PageText>, highlighter: Option<&dyn PageHighlighter>) -> DocumentAnalysis {
        let mut clauses = self.detector.detect(&pages);
        let highlight_events = match highlighter {
            Some(highlighter) => apply_highlights(highlighter, &mut clauses),
            None => Vec::new(),
        };
        let document_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let analysis = DocumentAnalysis {
            pages,
            clauses,
            document_text,
            highlight_events,
            highlighted_pdf: None,
        };
        info!("{}", analysis.summary());
        analysis
    }
}
