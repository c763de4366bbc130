//! Resaltado de cláusulas sobre el propio PDF.
//!
//! pdf-extract recorre el contenido de cada página y entrega la posición de cada
//! glifo; con eso se localiza el texto de una cláusula. Las anotaciones se
//! escriben con lopdf (re-exportado por pdf-extract) y el documento anotado se
//! serializa en memoria.
//!
//! Las cajas están en puntos PDF, con el origen en la esquina inferior izquierda.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use pdf_extract::{output_doc_page, Dictionary, Document, MediaBox, Object, ObjectId, OutputDev, OutputError, Transform};
use tracing::debug;

use crate::clause_detector::PageHighlighter;
use crate::models::BoundingBox;

type DevResult = std::result::Result<(), OutputError>;

const HIGHLIGHT_COLOR: [f32; 3] = [1.0, 1.0, 0.0];
// Fracción del cuerpo de letra por debajo y por encima de la línea base.
const DESCENT: f64 = 0.2;
const ASCENT: f64 = 0.8;

#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    baseline: f64,
    size: f64,
    rect: [f64; 4],
}

/// Recoge la posición de cada glifo visible de una página.
#[derive(Default)]
struct GlyphCollector {
    glyphs: Vec<Glyph>,
}

impl OutputDev for GlyphCollector {
    fn begin_page(&mut self, _page_num: u32, _media_box: &MediaBox, _art_box: Option<(f64, f64, f64, f64)>) -> DevResult {
        Ok(())
    }

    fn end_page(&mut self) -> DevResult {
        Ok(())
    }

    fn output_character(&mut self, trm: &Transform, width: f64, _spacing: f64, font_size: f64, text: &str) -> DevResult {
        if text.trim().is_empty() {
            return Ok(());
        }
        // Cuerpo efectivo: el de la fuente pasado por la matriz de texto.
        let sx = font_size * (trm.m11 + trm.m21);
        let sy = font_size * (trm.m12 + trm.m22);
        let size = (sx * sy).abs().sqrt();
        let (x, y) = (trm.m31, trm.m32);
        if !(size.is_finite() && x.is_finite() && y.is_finite()) {
            return Ok(());
        }

        self.glyphs.push(Glyph {
            text: text.to_lowercase(),
            baseline: y,
            size,
            rect: [x, y - DESCENT * size, x + width * size, y + ASCENT * size],
        });
        Ok(())
    }

    fn begin_word(&mut self) -> DevResult {
        Ok(())
    }

    fn end_word(&mut self) -> DevResult {
        Ok(())
    }

    fn end_line(&mut self) -> DevResult {
        Ok(())
    }
}

/// Cajas de cada aparición de `literal`, una por línea ocupada. Se compara sin
/// espacios y en minúsculas: la extracción de texto añade o pierde espacios.
fn find_rects(glyphs: &[Glyph], literal: &str) -> Vec<BoundingBox> {
    let needle: Vec<char> = literal
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .collect();
    if needle.is_empty() {
        return Vec::new();
    }

    let haystack: Vec<(char, usize)> = glyphs
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.text.chars().filter(|c| !c.is_whitespace()).map(move |c| (c, i)))
        .collect();

    let mut rects = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        let window = &haystack[start..start + needle.len()];
        if window.iter().map(|(c, _)| c).eq(needle.iter()) {
            let first = window[0].1;
            let last = window[window.len() - 1].1;
            rects.extend(line_rects(&glyphs[first..=last]));
            start += needle.len();
        } else {
            start += 1;
        }
    }
    rects
}

fn line_rects(glyphs: &[Glyph]) -> Vec<BoundingBox> {
    let mut lines: Vec<(f64, [f64; 4])> = Vec::new();
    for glyph in glyphs {
        match lines.last_mut() {
            Some((baseline, rect)) if (glyph.baseline - *baseline).abs() <= glyph.size * 0.5 => {
                rect[0] = rect[0].min(glyph.rect[0]);
                rect[1] = rect[1].min(glyph.rect[1]);
                rect[2] = rect[2].max(glyph.rect[2]);
                rect[3] = rect[3].max(glyph.rect[3]);
            }
            _ => lines.push((glyph.baseline, glyph.rect)),
        }
    }
    lines.into_iter().map(|(_, rect)| BoundingBox(rect)).collect()
}

fn highlight_annotation(rect: BoundingBox, label: &str) -> Dictionary {
    let [x0, y0, x1, y1] = rect.0;
    let real = |v: f64| Object::Real(v as f32);

    let mut annotation = Dictionary::new();
    annotation.set("Type", "Annot");
    annotation.set("Subtype", "Highlight");
    annotation.set("Rect", vec![real(x0), real(y0), real(x1), real(y1)]);
    annotation.set(
        "QuadPoints",
        vec![real(x0), real(y1), real(x1), real(y1), real(x0), real(y0), real(x1), real(y0)],
    );
    annotation.set("C", HIGHLIGHT_COLOR.iter().map(|c| Object::Real(*c)).collect::<Vec<_>>());
    annotation.set("T", Object::string_literal(label));
    // Imprimible.
    annotation.set("F", 4i64);
    annotation
}

/// Añade la anotación a `/Annots` de la página, sea un array en línea o una referencia.
fn attach_annotation(document: &mut Document, page_id: ObjectId, annotation_id: ObjectId) -> Result<()> {
    let reference = Object::Reference(annotation_id);
    let existing = document
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| anyhow!("Página ilegible: {e}"))?
        .get(b"Annots")
        .ok()
        .cloned();

    let annots = match existing {
        Some(Object::Reference(array_id)) => {
            document
                .get_object_mut(array_id)
                .and_then(Object::as_array_mut)
                .map_err(|e| anyhow!("Lista de anotaciones ilegible: {e}"))?
                .push(reference);
            return Ok(());
        }
        Some(Object::Array(mut annots)) => {
            annots.push(reference);
            annots
        }
        _ => vec![reference],
    };

    document
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| anyhow!("Página ilegible: {e}"))?
        .set("Annots", annots);
    Ok(())
}

struct HighlightState {
    document: Document,
    glyphs: HashMap<u32, Vec<Glyph>>,
    annotations: usize,
}

impl HighlightState {
    /// Glifos de la página, calculados la primera vez que se piden.
    fn page_glyphs(&mut self, page: u32) -> Result<&[Glyph]> {
        if !self.glyphs.contains_key(&page) {
            let mut collector = GlyphCollector::default();
            let document = &self.document;
            // pdf-extract puede entrar en pánico con contenido corrupto.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| output_doc_page(document, &mut collector, page)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => bail!("No se pudo leer la página {page}: {e}"),
                Err(_) => bail!("El extractor falló en la página {page}"),
            }
            debug!("Página {}: {} glifos localizados.", page, collector.glyphs.len());
            self.glyphs.insert(page, collector.glyphs);
        }
        Ok(self.glyphs.get(&page).map(Vec::as_slice).unwrap_or_default())
    }
}

/// `PageHighlighter` sobre un documento PDF concreto. Se crea uno por análisis.
pub struct PdfHighlighter {
    state: Mutex<HighlightState>,
}

impl PdfHighlighter {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes).map_err(|e| anyhow!("No se pudo abrir el PDF para resaltar: {e}"))?;
        if document.is_encrypted() {
            bail!("El PDF está cifrado; no se resalta");
        }
        Ok(Self {
            state: Mutex::new(HighlightState {
                document,
                glyphs: HashMap::new(),
                annotations: 0,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HighlightState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Estado de resaltado inconsistente tras un pánico"))
    }

    pub fn annotation_count(&self) -> usize {
        self.lock().map(|state| state.annotations).unwrap_or(0)
    }

    /// Serializa el documento con las anotaciones añadidas hasta ahora.
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>> {
        let mut state = self.lock()?;
        let mut buffer = Vec::new();
        state
            .document
            .save_to(&mut buffer)
            .map_err(|e| anyhow!("No se pudo guardar el PDF resaltado: {e}"))?;
        Ok(buffer)
    }
}

impl PageHighlighter for PdfHighlighter {
    fn search_text_on_page(&self, page: u32, literal: &str) -> Result<Vec<BoundingBox>> {
        let mut state = self.lock()?;
        let glyphs = state.page_glyphs(page)?;
        Ok(find_rects(glyphs, literal))
    }

    fn add_highlight(&self, page: u32, rect: BoundingBox, label: &str) -> Result<()> {
        let mut state = self.lock()?;
        let page_id = *state
            .document
            .get_pages()
            .get(&page)
            .ok_or_else(|| anyhow!("La página {page} no existe"))?;
        let annotation_id = state.document.add_object(highlight_annotation(rect, label));
        attach_annotation(&mut state.document, page_id, annotation_id)?;
        state.annotations += 1;
        Ok(())
    }
}

/// Generación de PDFs de texto simples para pruebas.
#[cfg(test)]
pub mod testing {
    use pdf_extract::{Dictionary, Document, Object, Stream};

    /// Un PDF con una página por entrada; cada línea en Courier 12, de arriba abajo
    /// desde (72, 720) con 14 puntos de interlineado.
    pub fn text_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", "Font");
        font.set("Subtype", "Type1");
        font.set("BaseFont", "Courier");
        let font_id = doc.add_object(font);

        let mut fonts = Dictionary::new();
        fonts.set("F1", font_id);
        let mut resources = Dictionary::new();
        resources.set("Font", fonts);

        let mut kids = Vec::new();
        for lines in pages {
            let mut content = String::from("BT /F1 12 Tf 72 720 Td ");
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    content.push_str("0 -14 Td ");
                }
                content.push_str(&format!("({line}) Tj "));
            }
            content.push_str("ET");
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

            let mut page = Dictionary::new();
            page.set("Type", "Page");
            page.set("Parent", pages_id);
            page.set(
                "MediaBox",
                vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            );
            page.set("Contents", content_id);
            page.set("Resources", resources.clone());
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut page_tree = Dictionary::new();
        page_tree.set("Type", "Pages");
        page_tree.set("Count", kids.len() as i64);
        page_tree.set("Kids", kids);
        doc.objects.insert(pages_id, Object::Dictionary(page_tree));

        let mut catalog = Dictionary::new();
        catalog.set("Type", "Catalog");
        catalog.set("Pages", pages_id);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
