use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::IndexArgs;
use crate::corpus::load_corpus;
use crate::index::{build_index, index_dimensions, save_index};
use crate::model::IndexRunManifest;
use crate::provider::select_provider;
use crate::semantic::ChunkingConfig;
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: IndexArgs) -> Result<()> {
    let config = ChunkingConfig::new(args.chunk_size, args.chunk_overlap)?;
    let provider = select_provider(&args.provider)?;
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| default_manifest_path(&args.index_path));

    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("index-{}", utc_compact_string(Utc::now()));

    let documents = load_corpus(&args.corpus_dir)?;
    if documents.is_empty() {
        warn!(corpus_dir = %args.corpus_dir.display(), "no .txt documents found; writing an empty index");
    }
    info!(
        run_id = %run_id,
        corpus_dir = %args.corpus_dir.display(),
        documents = documents.len(),
        embedding_model = %provider.embedding_model(),
        chunk_size = config.size(),
        chunk_overlap = config.overlap(),
        "index build started"
    );

    let records = build_index(provider.as_ref(), &documents, config, args.batch_size)
        .context("index build aborted")?;
    let embedding_dim = index_dimensions(&records)?.unwrap_or(0);
    save_index(&args.index_path, &records)?;

    let manifest = IndexRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        index_path: args.index_path.display().to_string(),
        corpus_dir: args.corpus_dir.display().to_string(),
        embedding_model: provider.embedding_model().to_string(),
        embedding_dim,
        document_count: documents.len(),
        chunk_count: records.len(),
        chunk_size: config.size(),
        chunk_overlap: config.overlap(),
        index_sha256: sha256_file(&args.index_path)?,
        duration_ms: started.elapsed().as_millis(),
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %manifest.run_id,
        documents = manifest.document_count,
        chunks = manifest.chunk_count,
        embedding_dim,
        index_path = %args.index_path.display(),
        manifest_path = %manifest_path.display(),
        duration_ms = manifest.duration_ms as u64,
        "index build completed"
    );

    Ok(())
}

fn default_manifest_path(index_path: &Path) -> PathBuf {
    let mut raw = index_path.as_os_str().to_owned();
    raw.push(".manifest.json");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::cli::{ProviderArgs, ProviderKind};
    use crate::index::load_index;

    fn local_provider_args() -> ProviderArgs {
        ProviderArgs {
            provider: ProviderKind::Local,
            api_key: None,
            api_base: "http://unused".to_string(),
            embedding_model: "unused".to_string(),
            chat_model: "unused".to_string(),
            timeout_ms: 1_000,
            max_retries: 0,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 0,
            local_embedding_dim: 64,
        }
    }

    #[test]
    fn manifest_path_sits_next_to_index() {
        assert_eq!(
            default_manifest_path(Path::new("out/kb-index.json")),
            PathBuf::from("out/kb-index.json.manifest.json")
        );
    }

    #[test]
    fn run_writes_index_and_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let corpus_dir = dir.path().join("kb");
        fs::create_dir(&corpus_dir).expect("mkdir");
        fs::write(corpus_dir.join("a.txt"), "one two three four five six").expect("write");
        fs::write(corpus_dir.join("b.txt"), "seven eight").expect("write");
        let index_path = dir.path().join("index.json");

        run(IndexArgs {
            corpus_dir: corpus_dir.clone(),
            index_path: index_path.clone(),
            manifest_path: None,
            chunk_size: 4,
            chunk_overlap: 1,
            batch_size: 2,
            provider: local_provider_args(),
        })
        .expect("index command succeeds");

        let records = load_index(&index_path).expect("index loads");
        let ids = records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a.txt-chunk-0", "a.txt-chunk-1", "b.txt-chunk-0"]);

        let raw = fs::read(default_manifest_path(&index_path)).expect("manifest exists");
        let manifest: serde_json::Value = serde_json::from_slice(&raw).expect("manifest parses");
        assert_eq!(manifest["chunk_count"], 3);
        assert_eq!(manifest["document_count"], 2);
        assert_eq!(manifest["embedding_dim"], 64);
        assert_eq!(manifest["embedding_model"], "local-hash-v1");
        assert_eq!(
            manifest["index_sha256"],
            sha256_file(&index_path).expect("hash").as_str()
        );
    }

    #[test]
    fn invalid_chunking_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = run(IndexArgs {
            corpus_dir: dir.path().join("missing"),
            index_path: dir.path().join("index.json"),
            manifest_path: None,
            chunk_size: 10,
            chunk_overlap: 10,
            batch_size: 2,
            provider: local_provider_args(),
        });
        assert!(result.is_err());
        assert!(!dir.path().join("index.json").exists());
    }
}
