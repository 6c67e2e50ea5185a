mod config;
mod extractor;
mod walker;

use std::collections::HashMap;
use std::io::Write;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use structopt::StructOpt;

use dupesketch::{
    build_report, document_key, function_document_key, index_corpus, query_document, report,
    sketch, BlobId, CancellationToken, DocumentToIndex, Feature, FeatureRecord, LmdbStore,
    MetaRow, OrderedDocFreq, ParamsBlob, SketchConfig, SkipCounts, Store,
};

use config::{Command, Granularity, Opt};

#[cfg(target_os = "linux")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    stderrlog::new()
        .verbosity(opt.verbose)
        .show_level(false)
        .timestamp(stderrlog::Timestamp::Off)
        .init()?;

    let store = LmdbStore::open(&opt.database, opt.database_size.get_bytes() as usize)?;

    match &opt.command {
        Command::Hash { path, repo, commit } => {
            let repo_name = repo.clone().unwrap_or_else(|| {
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".into())
            });
            run_hash(&store, path, &repo_name, commit, opt.mode)
        }
        Command::Query { path, similarity_floor } => run_query(&store, path.as_str(), *similarity_floor),
        Command::Report { similarity_floor } => run_report(&store, *similarity_floor),
    }
}

/// One document folded into the corpus, whichever run produced it.
struct PendingDocument {
    meta: MetaRow,
    term_frequencies: HashMap<String, u32>,
}

/// `hash <path>`: walk `path` as repository `repo`, extract features, fold
/// the result into whatever the store already holds, and rebuild the whole
/// corpus's DocFreq, sketches, and bands over the union (§8 property 6:
/// adding documents forces re-sketching the whole corpus, since token
/// positions can shift).
fn run_hash(
    store: &LmdbStore,
    path: &std::path::Path,
    repo: &str,
    commit: &str,
    mode: Granularity,
) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("the path ({}) does not exist", path.display());
    }
    let started = Instant::now();

    let mut skips = SkipCounts::new();

    let mut documents: HashMap<String, PendingDocument> = HashMap::new();
    let meta_rows = store.scan_meta()?;
    let mut existing_features: HashMap<String, HashMap<String, u32>> =
        store.scan_features()?.into_iter().map(|(k, tf)| (k, tf.into_iter().collect())).collect();
    for (document_key, meta) in meta_rows {
        if let Some(term_frequencies) = existing_features.remove(&document_key) {
            documents.insert(document_key, PendingDocument { meta, term_frequencies });
        }
    }

    let walked = walker::walk_repository(path, repo, commit)?;
    let progress = ProgressBar::new(walked.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} files extracted") {
        progress.set_style(style);
    }

    for file in walked {
        progress.inc(1);
        if file.is_binary {
            skips.record("ExtractorSkipped");
            continue;
        }

        let blob_id = BlobId::of_bytes(&file.bytes);
        let key = match mode {
            Granularity::File => document_key(repo, &file.path, &blob_id),
            Granularity::Function => {
                let name = std::path::Path::new(&file.path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.path.clone());
                function_document_key(repo, &file.path, &blob_id, &name, 1)
            }
        };

        let features = match extractor::extract_features(&file.bytes) {
            Some(features) => features,
            None => {
                skips.record("ExtractorSkipped");
                continue;
            }
        };

        documents.insert(
            key,
            PendingDocument {
                meta: MetaRow {
                    blob_id: blob_id.to_hex(),
                    repo: file.repo,
                    commit: file.commit,
                    path: file.path,
                },
                term_frequencies: extractor::term_frequencies(&features),
            },
        );
    }
    progress.finish_and_clear();

    let records: Vec<FeatureRecord> = documents
        .iter()
        .map(|(key, doc)| FeatureRecord {
            document_key: key.clone(),
            features: doc
                .term_frequencies
                .iter()
                .map(|(token, &weight)| Feature { token: token.clone(), weight })
                .collect(),
        })
        .collect();

    let docfreq = OrderedDocFreq::build(records);
    let config = store.get_params()?.map(|(config, _)| config).unwrap_or_else(SketchConfig::default_32x4);
    let params_blob =
        ParamsBlob::generate(sketch::DEFAULT_SEED, docfreq.vocabulary_size(), config.k, config.memory_ceiling_bytes);

    store.put_docfreq(&docfreq)?;
    store.put_params(config, &params_blob.to_bincode()?)?;
    let params = params_blob.into_source(config.memory_ceiling_bytes);

    let indexed = docfreq.indexed();
    let to_index: Vec<DocumentToIndex> = documents
        .into_iter()
        .filter_map(|(key, doc)| {
            BlobId::from_hex(&doc.meta.blob_id).map(|blob_id| DocumentToIndex {
                document_key: key,
                blob_id,
                repo: doc.meta.repo,
                commit: doc.meta.commit,
                path: doc.meta.path,
                term_frequencies: doc.term_frequencies,
            })
        })
        .collect();

    let cancellation = CancellationToken::new();
    let write_skips = index_corpus(store, params.as_ref(), &indexed, &config, &to_index, &cancellation)?;
    skips.merge(&write_skips);
    debug!("indexed {} documents in {:.02?}", to_index.len(), started.elapsed());

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    if skips.is_empty() {
        writeln!(out, "indexed {} documents, no skips", to_index.len())?;
    } else {
        writeln!(out, "indexed {} documents, {} skipped:", to_index.len(), skips.total())?;
        for (reason, count) in skips.iter() {
            writeln!(out, "  {}: {}", reason, count)?;
        }
    }

    Ok(())
}

/// `query <path>[:identifier:line]`: the `:identifier:line` selector is
/// accepted (§6) but the bundled tokenizer extractor is file-grained, so it
/// is parsed and otherwise ignored — a real function-aware extractor would
/// use it to carve out the sub-tree to feature-extract (§9).
fn run_query(store: &LmdbStore, raw_path: &str, similarity_floor: f64) -> anyhow::Result<()> {
    let (file_path, _selector) = split_selector(raw_path);

    let docfreq = match store.get_docfreq()? {
        Some(docfreq) => docfreq,
        None => anyhow::bail!("no index has been built yet; run `hash` first"),
    };
    let (config, params_bytes) = match store.get_params()? {
        Some(pair) => pair,
        None => anyhow::bail!("no index has been built yet; run `hash` first"),
    };
    let params = ParamsBlob::from_bincode(&params_bytes)?.into_source(config.memory_ceiling_bytes);
    let indexed = docfreq.indexed();

    let bytes =
        std::fs::read(&file_path).map_err(|e| anyhow::anyhow!("could not read input {}: {}", file_path, e))?;
    let term_frequencies = match extractor::extract_features(&bytes) {
        Some(features) => extractor::term_frequencies(&features),
        None => HashMap::new(),
    };

    let report =
        query_document(store, params.as_ref(), &indexed, &config, &bytes, &term_frequencies, similarity_floor)?;
    serde_json::to_writer_pretty(std::io::stdout(), &report)?;
    println!();
    Ok(())
}

/// `report`: enumerate duplicate clusters and near-duplicate components
/// across the whole index.
fn run_report(store: &LmdbStore, similarity_floor: f64) -> anyhow::Result<()> {
    if store.get_docfreq()?.is_none() {
        anyhow::bail!("no index has been built yet; run `hash` first");
    }
    let built = build_report(store, Some(similarity_floor), report::DEFAULT_MAX_BUCKET_MEMBERS)?;
    serde_json::to_writer_pretty(std::io::stdout(), &built)?;
    println!();
    Ok(())
}

/// Split a `path[:name:line]` selector (§6 CLI surface) into the
/// filesystem path and an optional `(name, line)` suffix.
fn split_selector(raw: &str) -> (String, Option<(String, u32)>) {
    let parts: Vec<&str> = raw.splitn(3, ':').collect();
    match parts.as_slice() {
        [path, name, line] => match line.parse::<u32>() {
            Ok(line) => (path.to_string(), Some((name.to_string(), line))),
            Err(_) => (raw.to_string(), None),
        },
        _ => (raw.to_string(), None),
    }
}
