use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::model::Document;

const DOCUMENT_EXTENSION: &str = "txt";

pub fn load_corpus(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::<Document>::new();
    for path in discover_documents(dir)? {
        let filename = document_filename(&path)?;
        let content = fs::read_to_string(&path)
            .map_err(|err| RagError::io(format!("failed to read {}", path.display()), err))?;
        documents.push(Document { filename, content });
    }
    Ok(documents)
}

pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::Configuration(format!(
            "corpus directory not found: {}",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir)
        .map_err(|err| RagError::io(format!("failed to read {}", dir.display()), err))?;

    let mut paths = Vec::<PathBuf>::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| RagError::io(format!("failed to read entry in {}", dir.display()), err))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map_err(|err| {
                RagError::io(format!("failed to inspect file type: {}", path.display()), err)
            })?
            .is_file();
        if !is_file {
            continue;
        }

        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
            .unwrap_or(false);
        if is_text {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Only bare file names are accepted so a name can never escape `dir`.
pub fn read_document(dir: &Path, name: &str) -> Result<Document> {
    let trimmed = name.trim();
    let filename = if trimmed
        .to_ascii_lowercase()
        .ends_with(&format!(".{DOCUMENT_EXTENSION}"))
    {
        trimmed.to_string()
    } else {
        format!("{trimmed}.{DOCUMENT_EXTENSION}")
    };

    let is_bare_name = Path::new(&filename)
        .file_name()
        .map(|component| component == filename.as_str())
        .unwrap_or(false);
    if trimmed.is_empty() || !is_bare_name {
        return Err(RagError::Configuration(format!(
            "invalid document name: '{trimmed}'"
        )));
    }

    let path = dir.join(&filename);
    let content = fs::read_to_string(&path)
        .map_err(|err| RagError::io(format!("document '{filename}' not found"), err))?;
    Ok(Document { filename, content })
}

fn document_filename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RagError::Configuration(format!("invalid UTF-8 filename: {}", path.display()))
        })
}
