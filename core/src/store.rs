//! On-disk form of the index: one JSON object per line, one term per object.
//!
//! ```text
//! {"alpha":{"df":2,"postings":{"1":1,"2":1}}}
//! {"beta":{"df":1,"postings":{"1":2}}}
//! ```
//!
//! A `<index>.meta.json` sidecar records collection-level facts that have no
//! place in a per-term record.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::marker::PhantomData;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{DEFAULT_MIN_TERM_LEN, INDEX_FORMAT_VERSION};
use crate::error::{IrError, Result};
use crate::index::{DocId, InvertedIndex, TermFreq};

#[derive(Serialize)]
struct TermRecordRef<'a> {
    df: u32,
    postings: &'a BTreeMap<DocId, TermFreq>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TermRecord {
    df: u32,
    postings: StrictMap<DocId, TermFreq>,
}

/// A JSON object read into a map that refuses repeated keys instead of
/// letting the last one win.
struct StrictMap<K, V>(BTreeMap<K, V>);

impl<'de, K, V> Deserialize<'de> for StrictMap<K, V>
where
    K: Deserialize<'de> + Ord + fmt::Debug,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StrictMapVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for StrictMapVisitor<K, V>
        where
            K: Deserialize<'de> + Ord + fmt::Debug,
            V: Deserialize<'de>,
        {
            type Value = StrictMap<K, V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map without repeated keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<K, V>()? {
                    if map.contains_key(&key) {
                        return Err(de::Error::custom(format!("repeated key {key:?}")));
                    }
                    map.insert(key, value);
                }
                Ok(StrictMap(map))
            }
        }

        deserializer.deserialize_map(StrictMapVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
    /// Shortest word the normalizer kept at build time. Queries must use
    /// the same value or their terms will not line up with the index.
    #[serde(default = "default_min_term_len")]
    pub min_term_len: usize,
}

fn default_min_term_len() -> usize {
    DEFAULT_MIN_TERM_LEN
}

impl IndexMeta {
    pub fn new(num_docs: u32, num_terms: u32, created_at: impl Into<String>) -> Self {
        Self {
            num_docs,
            num_terms,
            created_at: created_at.into(),
            version: INDEX_FORMAT_VERSION,
            min_term_len: DEFAULT_MIN_TERM_LEN,
        }
    }

    pub fn with_min_term_len(mut self, min_term_len: usize) -> Self {
        self.min_term_len = min_term_len;
        self
    }
}

pub struct IndexPaths {
    pub index: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(index: P) -> Self {
        Self { index: index.as_ref().to_path_buf() }
    }

    pub fn meta(&self) -> PathBuf {
        let mut name = self.index.as_os_str().to_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.index.is_file()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write every term, in ascending term order. Refuses any term that
/// [`load`] would reject, before writing its line.
pub fn save<W: Write>(index: &InvertedIndex, writer: W) -> Result<()> {
    let mut w = BufWriter::new(writer);
    for term in index.sorted_terms() {
        let Some(entry) = index.get(term) else { continue };
        if entry.postings().is_empty() {
            return Err(IrError::EmptyPostings { term: term.to_string() });
        }
        if term.is_empty() {
            return Err(IrError::InvalidTerm { term: String::new(), reason: "empty term".into() });
        }
        if let Some((doc, tf)) = invalid_posting(entry.postings()) {
            return Err(IrError::InvalidTerm { term: term.to_string(), reason: format!("invalid posting {doc}:{tf}") });
        }
        let record = TermRecordRef { df: entry.document_frequency(), postings: entry.postings() };
        let line = serde_json::to_string(&BTreeMap::from([(term, record)]))?;
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}

/// Read an index written by [`save`]. Any bad line aborts the whole load.
pub fn load<R: BufRead>(reader: R) -> Result<InvertedIndex> {
    let mut index = InvertedIndex::new();
    for (i, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let lineno = i + 1;
        let line = std::str::from_utf8(&bytes)
            .map_err(|e| IrError::malformed_index(lineno, format!("not valid UTF-8: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let (term, postings) = parse_record(lineno, line)?;
        if index.get(&term).is_some() {
            return Err(IrError::malformed_index(lineno, format!("term {term:?} appears twice")));
        }
        index.insert_term(term, postings);
    }
    Ok(index)
}

fn parse_record(lineno: usize, line: &str) -> Result<(String, BTreeMap<DocId, TermFreq>)> {
    let StrictMap(record): StrictMap<String, TermRecord> =
        serde_json::from_str(line).map_err(|e| IrError::malformed_index(lineno, e.to_string()))?;
    if record.len() != 1 {
        return Err(IrError::malformed_index(lineno, format!("expected exactly one term, found {}", record.len())));
    }
    let Some((term, rec)) = record.into_iter().next() else {
        return Err(IrError::malformed_index(lineno, "empty record"));
    };
    if term.is_empty() {
        return Err(IrError::malformed_index(lineno, "empty term"));
    }
    let StrictMap(postings) = rec.postings;
    if rec.df == 0 || rec.df as usize != postings.len() {
        return Err(IrError::malformed_index(
            lineno,
            format!("df {} does not match {} postings for {term:?}", rec.df, postings.len()),
        ));
    }
    if let Some((doc, tf)) = invalid_posting(&postings) {
        return Err(IrError::malformed_index(lineno, format!("invalid posting {doc}:{tf} for {term:?}")));
    }
    Ok((term, postings))
}

/// First posting with a zero document id or a zero frequency.
fn invalid_posting(postings: &BTreeMap<DocId, TermFreq>) -> Option<(DocId, TermFreq)> {
    postings.iter().map(|(d, tf)| (*d, *tf)).find(|(doc, tf)| *doc == 0 || *tf == 0)
}

/// Write to `<path>.tmp` then rename over `path`.
pub fn save_to_path(index: &InvertedIndex, paths: &IndexPaths) -> Result<()> {
    if let Some(parent) = paths.index.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(&paths.index);
    save(index, File::create(&tmp)?)?;
    fs::rename(&tmp, &paths.index)?;
    tracing::info!(path = %paths.index.display(), num_terms = index.len(), "saved index");
    Ok(())
}

pub fn load_from_path(paths: &IndexPaths) -> Result<InvertedIndex> {
    let f = File::open(&paths.index).map_err(|e| IrError::source_unavailable(&paths.index, e))?;
    let index = load(BufReader::new(f))?;
    tracing::info!(path = %paths.index.display(), num_terms = index.len(), "loaded index");
    Ok(index)
}

pub fn save_meta(paths: &IndexPaths, meta: &IndexMeta) -> Result<()> {
    let path = paths.meta();
    let tmp = tmp_path(&path);
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// `Ok(None)` when the index was written without a sidecar.
pub fn load_meta(paths: &IndexPaths) -> Result<Option<IndexMeta>> {
    let path = paths.meta();
    let buf = match fs::read_to_string(&path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IrError::source_unavailable(path, e)),
    };
    Ok(Some(serde_json::from_str(&buf)?))
}
