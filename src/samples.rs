//! Catálogo de contratos de ejemplo disponibles en disco.

use std::fs;
use std::path::{Component, Path};

use anyhow::{anyhow, bail, Result};
use mime_guess::{mime, MimeGuess};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleContract {
    /// Ruta relativa al directorio de ejemplos, con `/` como separador.
    pub filename: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

fn is_pdf(path: &Path) -> bool {
    MimeGuess::from_path(path).first() == Some(mime::APPLICATION_PDF)
}

/// Lista los PDF del directorio, ordenados por nombre. Un directorio
/// inexistente equivale a un catálogo vacío.
pub fn list_samples(dir: &Path) -> Vec<SampleContract> {
    if !dir.is_dir() {
        info!("Directorio de ejemplos no encontrado: {}", dir.display());
        return Vec::new();
    }

    let mut samples: Vec<SampleContract> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_pdf(e.path()))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(dir).ok()?;
            let filename = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size_bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("No se pudo leer {}: {}", entry.path().display(), e);
                    return None;
                }
            };
            Some(SampleContract {
                filename,
                size_bytes,
                mime_type: mime::APPLICATION_PDF.to_string(),
            })
        })
        .collect();

    samples.sort_by(|a, b| a.filename.cmp(&b.filename));
    samples
}

/// Lee un ejemplo por su nombre relativo. Sólo se aceptan rutas que se queden
/// dentro del directorio de ejemplos.
pub fn read_sample(dir: &Path, filename: &str) -> Result<Vec<u8>> {
    let relative = Path::new(filename);
    let stays_inside = !filename.trim().is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !stays_inside {
        bail!("Nombre de ejemplo no válido: {filename}");
    }
    if !is_pdf(relative) {
        bail!("El ejemplo no es un PDF: {filename}");
    }

    let path = dir.join(relative);
    if !path.is_file() {
        bail!("Ejemplo no encontrado: {filename}");
    }
    fs::read(&path).map_err(|e| anyhow!("Error leyendo {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_pdfs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_affiliate.pdf"), b"%PDF-1.4 b").unwrap();
        fs::write(dir.path().join("a_cobranding.pdf"), b"%PDF-1.4 a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        fs::create_dir(dir.path().join("more")).unwrap();
        fs::write(dir.path().join("more").join("c_license.PDF"), b"%PDF-1.4 c").unwrap();

        let names: Vec<String> = list_samples(dir.path()).into_iter().map(|s| s.filename).collect();
        assert_eq!(names, vec!["a_cobranding.pdf", "b_affiliate.pdf", "more/c_license.PDF"]);
    }

    #[test]
    fn missing_directory_is_empty_catalog() {
        assert!(list_samples(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn reads_samples_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("contract.pdf"), b"%PDF-1.4 body").unwrap();

        assert_eq!(read_sample(dir.path(), "contract.pdf").unwrap(), b"%PDF-1.4 body");
        assert!(read_sample(dir.path(), "../contract.pdf").is_err());
        assert!(read_sample(dir.path(), "/etc/passwd").is_err());
        assert!(read_sample(dir.path(), "missing.pdf").is_err());
        assert!(read_sample(dir.path(), "contract.txt").is_err());
        assert!(read_sample(dir.path(), "").is_err());
    }
}
