use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ProviderError, RagError, Result};
use crate::model::{Chunk, Document, IndexRecord};
use crate::provider::ModelProvider;
use crate::semantic::{chunk_text, ChunkingConfig};

pub fn chunk_document(document: &Document, config: ChunkingConfig) -> Vec<Chunk> {
    chunk_text(&document.content, config)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| Chunk {
            source_filename: document.filename.clone(),
            sequence_index,
            text,
        })
        .collect()
}

/// Chunks are sent to the provider in batches of at most `batch_size` per
/// document. Any provider failure aborts the build.
pub fn build_index(
    provider: &dyn ModelProvider,
    documents: &[Document],
    config: ChunkingConfig,
    batch_size: usize,
) -> Result<Vec<IndexRecord>> {
    let batch_size = batch_size.max(1);
    let mut records = Vec::<IndexRecord>::new();
    let mut dimensions: Option<usize> = None;

    for document in documents {
        let chunks = chunk_document(document, config);
        debug!(filename = %document.filename, chunks = chunks.len(), "document chunked");

        for batch in chunks.chunks(batch_size) {
            let texts = batch
                .iter()
                .map(|chunk| chunk.text.clone())
                .collect::<Vec<String>>();
            let embeddings = provider.embed_batch(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(RagError::Provider(ProviderError::Malformed(format!(
                    "requested {} embeddings for {}, received {}",
                    batch.len(),
                    document.filename,
                    embeddings.len()
                ))));
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let expected = *dimensions.get_or_insert(embedding.len());
                if embedding.is_empty() || embedding.len() != expected {
                    return Err(RagError::DataIntegrity {
                        record_id: chunk.record_id(),
                        expected,
                        got: embedding.len(),
                    });
                }

                records.push(IndexRecord {
                    id: chunk.record_id(),
                    filename: chunk.source_filename.clone(),
                    text: chunk.text.clone(),
                    embedding,
                });
            }
        }

        info!(
            filename = %document.filename,
            chunks = chunks.len(),
            total_records = records.len(),
            "document indexed"
        );
    }

    Ok(records)
}

/// Writes the index as a JSON array, replacing any previous file atomically.
pub fn save_index(path: &Path, records: &[IndexRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                RagError::io(format!("failed to create directory: {}", parent.display()), err)
            })?;
        }
    }

    let staging_path = staging_path(path);
    if let Err(err) = write_staged(&staging_path, path, records) {
        // A failed save never leaves the staging file behind.
        let _ = fs::remove_file(&staging_path);
        return Err(err);
    }

    info!(path = %path.display(), records = records.len(), "index saved");
    Ok(())
}

fn write_staged(staging_path: &Path, path: &Path, records: &[IndexRecord]) -> Result<()> {
    let file = File::create(staging_path).map_err(|err| {
        RagError::io(format!("failed to create {}", staging_path.display()), err)
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, records).map_err(|err| {
        RagError::serialization(format!("failed to serialize index {}", path.display()), err)
    })?;
    writer
        .flush()
        .map_err(|err| RagError::io(format!("failed to write {}", staging_path.display()), err))?;
    drop(writer);

    fs::rename(staging_path, path)
        .map_err(|err| RagError::io(format!("failed to replace index {}", path.display()), err))
}

pub fn load_index(path: &Path) -> Result<Vec<IndexRecord>> {
    let file = File::open(path).map_err(|err| {
        RagError::io(
            format!(
                "failed to open index {}; run the `index` command first",
                path.display()
            ),
            err,
        )
    })?;
    let records: Vec<IndexRecord> = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| RagError::serialization(format!("failed to parse {}", path.display()), err))?;

    debug!(path = %path.display(), records = records.len(), "index loaded");
    Ok(records)
}

pub fn index_dimensions(records: &[IndexRecord]) -> Result<Option<usize>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let expected = first.embedding.len();
    for record in records {
        if record.embedding.len() != expected {
            return Err(RagError::DataIntegrity {
                record_id: record.id.clone(),
                expected,
                got: record.embedding.len(),
            });
        }
    }
    Ok(Some(expected))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
