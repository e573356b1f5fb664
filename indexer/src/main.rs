use anyhow::{Context, Result};
use boolrank_core::config::{DEFAULT_INDEX_FILE, DEFAULT_MIN_TERM_LEN};
use boolrank_core::query::resolve_total_documents;
use boolrank_core::store::{load_from_path, load_meta, save_meta, save_to_path, IndexMeta, IndexPaths};
use boolrank_core::{
    CollectionMarkers, CollectionParser, EnglishNormalizer, IndexBuilder, InvertedIndex, QueryEngine, RetrievalMode,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "boolrank")]
#[command(about = "Build a term index over a Cranfield-style collection and answer boolean or ranked queries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the collection, build the inverted index and write it to disk
    Build {
        /// Collection file
        #[arg(long, env = "BOOLRANK_COLLECTION")]
        collection: PathBuf,
        #[command(flatten)]
        index: IndexArgs,
        /// Count document terms on all cores
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Answer queries read from stdin (or --queries): terms on a line are ANDed, lines are ORed
    Query {
        #[command(flatten)]
        index: IndexArgs,
        /// Build the index from this collection first if the index file does not exist
        #[arg(long, env = "BOOLRANK_COLLECTION")]
        collection: Option<PathBuf>,
        /// File with one query clause per line instead of stdin
        #[arg(long)]
        queries: Option<PathBuf>,
        /// boolean or ranked
        #[arg(long, default_value_t = RetrievalMode::Boolean)]
        mode: RetrievalMode,
        /// Collection size used for idf; defaults to the size recorded at build time
        #[arg(long)]
        total_docs: Option<u32>,
        /// Print id:score pairs
        #[arg(long, default_value_t = false)]
        scores: bool,
        /// Keep only the first k results
        #[arg(long)]
        top: Option<usize>,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Print vocabulary and postings statistics for an index
    Stats {
        #[command(flatten)]
        index: IndexArgs,
        /// Number of most frequent terms to list
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Emit JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
struct IndexArgs {
    /// Index file
    #[arg(long = "index", env = "BOOLRANK_INDEX", default_value = DEFAULT_INDEX_FILE)]
    path: PathBuf,
    /// Drop words shorter than this many characters (build default 4; queries
    /// follow the value recorded when the index was built)
    #[arg(long)]
    min_term_len: Option<usize>,
}

#[derive(Args)]
struct MarkerArgs {
    /// Document-start marker
    #[arg(long, default_value = ".I")]
    doc_marker: String,
    /// Title marker
    #[arg(long, default_value = ".T")]
    title_marker: String,
    /// Body marker
    #[arg(long, default_value = ".W")]
    body_marker: String,
    /// Markers that close the title field (author, bibliography)
    #[arg(long, value_delimiter = ',', default_values_t = [".A".to_string(), ".B".to_string()])]
    end_markers: Vec<String>,
}

impl MarkerArgs {
    fn markers(&self) -> Result<CollectionMarkers> {
        let ends: Vec<&str> = self.end_markers.iter().map(String::as_str).collect();
        Ok(CollectionMarkers::new(&self.doc_marker, &self.title_marker, &self.body_marker, &ends)?)
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { collection, index, parallel, markers } => {
            build_index(&collection, &index, parallel, &markers.markers()?).map(|_| ())
        }
        Commands::Query { index, collection, queries, mode, total_docs, scores, top, markers } => {
            let lines = read_query_lines(queries.as_deref())?;
            let opts = QueryOptions { mode, total_docs, scores, top };
            let line = run_query(&index, collection.as_deref(), &markers.markers()?, &lines, &opts)?;
            let mut out = io::stdout().lock();
            writeln!(out, "{line}")?;
            Ok(())
        }
        Commands::Stats { index, top, json } => print_stats(&index, top, json),
    }
}

fn build_index(collection: &Path, args: &IndexArgs, parallel: bool, markers: &CollectionMarkers) -> Result<InvertedIndex> {
    let parser = CollectionParser::new(markers.clone())?;
    let parsed = parser
        .parse_file(collection)
        .with_context(|| format!("reading collection {}", collection.display()))?;
    if !parsed.malformed.is_empty() {
        tracing::warn!(count = parsed.malformed.len(), "skipped malformed collection records");
    }
    let min_term_len = args.min_term_len.unwrap_or(DEFAULT_MIN_TERM_LEN);
    let normalizer = EnglishNormalizer::with_min_len(min_term_len);
    let index = IndexBuilder::new().parallel(parallel).index_collection(&parsed, &normalizer);

    let paths = IndexPaths::new(&args.path);
    save_to_path(&index, &paths).with_context(|| format!("writing index {}", args.path.display()))?;
    let meta = IndexMeta::new(
        parsed.num_docs() as u32,
        index.len() as u32,
        time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
    )
    .with_min_term_len(min_term_len);
    save_meta(&paths, &meta)?;
    tracing::info!(output = %args.path.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "index build complete");
    Ok(index)
}

fn read_query_lines(file: Option<&Path>) -> Result<Vec<String>> {
    let lines = match file {
        Some(path) => {
            let f = File::open(path).with_context(|| format!("opening queries {}", path.display()))?;
            BufReader::new(f).lines().collect::<io::Result<Vec<_>>>()?
        }
        None => io::stdin().lock().lines().collect::<io::Result<Vec<_>>>()?,
    };
    Ok(lines)
}

struct QueryOptions {
    mode: RetrievalMode,
    total_docs: Option<u32>,
    scores: bool,
    top: Option<usize>,
}

/// Load the index (building it first when missing and a collection is
/// known), evaluate the query lines and format the result line.
fn run_query(
    args: &IndexArgs,
    collection: Option<&Path>,
    markers: &CollectionMarkers,
    lines: &[String],
    opts: &QueryOptions,
) -> Result<String> {
    let paths = IndexPaths::new(&args.path);
    let index = match collection {
        Some(collection) if !paths.exists() => {
            tracing::info!(index = %args.path.display(), "index not found, building it");
            build_index(collection, args, true, markers)?
        }
        _ => load_from_path(&paths).with_context(|| format!("loading index {}", args.path.display()))?,
    };
    let meta = load_meta(&paths)?;
    let n = resolve_total_documents(opts.total_docs, meta.as_ref(), &index);

    let min_term_len = match (meta.as_ref(), args.min_term_len) {
        (Some(meta), Some(asked)) if asked != meta.min_term_len => {
            tracing::warn!(asked, built = meta.min_term_len, "index was built with a different --min-term-len, using the build value");
            meta.min_term_len
        }
        (Some(meta), _) => meta.min_term_len,
        (None, asked) => asked.unwrap_or(DEFAULT_MIN_TERM_LEN),
    };
    let normalizer = EnglishNormalizer::with_min_len(min_term_len);
    let engine = QueryEngine::new(&index, opts.mode, n);
    let mut result = engine.search_lines(&normalizer, lines)?;
    if let Some(k) = opts.top {
        result.truncate(k);
    }
    tracing::info!(clauses = lines.len(), hits = result.len(), mode = %opts.mode, "query complete");
    Ok(if opts.scores { result.to_scored_line() } else { result.to_line() })
}

fn print_stats(args: &IndexArgs, top: usize, json: bool) -> Result<()> {
    let paths = IndexPaths::new(&args.path);
    let index = load_from_path(&paths).with_context(|| format!("loading index {}", args.path.display()))?;
    let meta = load_meta(&paths)?;
    let num_docs = resolve_total_documents(None, meta.as_ref(), &index);

    let mut by_df: Vec<(&str, u32)> = index.iter().map(|(t, e)| (t, e.document_frequency())).collect();
    by_df.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    by_df.truncate(top);

    let mut out = io::stdout().lock();
    if json {
        let value = serde_json::json!({
            "num_docs": num_docs,
            "num_terms": index.len(),
            "num_postings": index.total_postings(),
            "top_terms": by_df.iter().map(|(t, df)| serde_json::json!({ "term": t, "df": df })).collect::<Vec<_>>(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "documents: {num_docs}")?;
        writeln!(out, "terms:     {}", index.len())?;
        writeln!(out, "postings:  {}", index.total_postings())?;
        for (term, df) in by_df {
            writeln!(out, "{df:>6}  {term}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const COLLECTION: &str = "\
.I 1
.T
supersonic flow over wings
.A
someone
.W
supersonic wings experience shock waves .
.I 2
.T
heat transfer in laminar flow
.W
laminar boundary layers and heat transfer .
";

    fn args(dir: &std::path::Path) -> IndexArgs {
        IndexArgs { path: dir.join("cran.ind"), min_term_len: None }
    }

    fn opts(mode: RetrievalMode) -> QueryOptions {
        QueryOptions { mode, total_docs: None, scores: false, top: None }
    }

    #[test]
    fn query_builds_missing_index_then_reuses_it() {
        let dir = tempdir().unwrap();
        let collection = dir.path().join("cran.all");
        fs::write(&collection, COLLECTION).unwrap();
        let a = args(dir.path());
        let markers = CollectionMarkers::default();

        let lines = vec!["flow".to_string()];
        let line = run_query(&a, Some(collection.as_path()), &markers, &lines, &opts(RetrievalMode::Boolean)).unwrap();
        assert_eq!(line, "1 2");
        assert!(a.path.exists());

        let meta = load_meta(&IndexPaths::new(&a.path)).unwrap().unwrap();
        assert_eq!(meta.num_docs, 2);

        fs::remove_file(&collection).unwrap();
        let lines = vec!["supersonic shock".to_string(), "laminar".to_string()];
        let line = run_query(&a, Some(collection.as_path()), &markers, &lines, &opts(RetrievalMode::Boolean)).unwrap();
        assert_eq!(line, "1 2");
    }

    #[test]
    fn ranked_query_orders_by_score() {
        let dir = tempdir().unwrap();
        let collection = dir.path().join("cran.all");
        fs::write(&collection, COLLECTION).unwrap();
        let a = args(dir.path());
        build_index(&collection, &a, false, &CollectionMarkers::default()).unwrap();

        let lines = vec!["heat transfer".to_string(), "flow".to_string()];
        let mut o = opts(RetrievalMode::Ranked);
        o.total_docs = Some(1400);
        let line = run_query(&a, None, &CollectionMarkers::default(), &lines, &o).unwrap();
        assert_eq!(line, "2 1");

        o.top = Some(1);
        assert_eq!(run_query(&a, None, &CollectionMarkers::default(), &lines, &o).unwrap(), "2");
    }

    #[test]
    fn no_match_prints_empty_line() {
        let dir = tempdir().unwrap();
        let collection = dir.path().join("cran.all");
        fs::write(&collection, COLLECTION).unwrap();
        let a = args(dir.path());
        let lines = vec!["propeller".to_string()];
        let line = run_query(&a, Some(collection.as_path()), &CollectionMarkers::default(), &lines, &opts(RetrievalMode::Boolean)).unwrap();
        assert_eq!(line, "");
    }

    #[test]
    fn query_uses_min_term_len_recorded_at_build() {
        let dir = tempdir().unwrap();
        let collection = dir.path().join("cran.all");
        fs::write(&collection, COLLECTION).unwrap();
        let mut a = args(dir.path());
        build_index(&collection, &a, false, &CollectionMarkers::default()).unwrap();
        let meta = load_meta(&IndexPaths::new(&a.path)).unwrap().unwrap();
        assert_eq!(meta.min_term_len, DEFAULT_MIN_TERM_LEN);

        // At 5 "flow" would be dropped from the query; the build value of 4 keeps it.
        a.min_term_len = Some(5);
        let lines = vec!["flow".to_string()];
        assert_eq!(run_query(&a, None, &CollectionMarkers::default(), &lines, &opts(RetrievalMode::Boolean)).unwrap(), "1 2");
    }

    #[test]
    fn missing_index_without_collection_fails() {
        let dir = tempdir().unwrap();
        let a = args(dir.path());
        let lines = vec!["flow".to_string()];
        assert!(run_query(&a, None, &CollectionMarkers::default(), &lines, &opts(RetrievalMode::Boolean)).is_err());
    }
}
