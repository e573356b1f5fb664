use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::aggregate::{eval_disjunction, DisjunctionResult};
use crate::error::{IrError, Result};
use crate::index::{DocId, InvertedIndex, TermEntry, TermFreq};
use crate::normalize::Normalizer;
use crate::store::IndexMeta;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Unscored matching, results ordered by document id.
    #[default]
    Boolean,
    /// tf-idf scored matching, results ordered by descending score.
    Ranked,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(RetrievalMode::Boolean),
            "ranked" | "tfidf" => Ok(RetrievalMode::Ranked),
            other => Err(format!("unknown retrieval mode {other:?}, expected boolean or ranked")),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Boolean => f.write_str("boolean"),
            RetrievalMode::Ranked => f.write_str("ranked"),
        }
    }
}

/// Documents matching one AND clause. Scores are `None` in boolean mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConjunctionResult {
    hits: BTreeMap<DocId, Option<f64>>,
}

impl ConjunctionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.hits.contains_key(&doc_id)
    }

    pub fn score(&self, doc_id: DocId) -> Option<f64> {
        self.hits.get(&doc_id).copied().flatten()
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.hits.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, Option<f64>)> + '_ {
        self.hits.iter().map(|(d, s)| (*d, *s))
    }
}

impl FromIterator<(DocId, Option<f64>)> for ConjunctionResult {
    fn from_iter<I: IntoIterator<Item = (DocId, Option<f64>)>>(iter: I) -> Self {
        Self { hits: iter.into_iter().collect() }
    }
}

/// `1 + log10(tf)`.
pub fn tf_weight(tf: TermFreq) -> f64 {
    1.0 + (tf as f64).log10()
}

/// `log10(n / df)`; refuses a df of zero or larger than the collection.
pub fn idf_weight(term: &str, df: u32, n: u32) -> Result<f64> {
    if df == 0 || n < df {
        return Err(IrError::DegenerateIdf { term: term.to_string(), df, n });
    }
    Ok((n as f64 / df as f64).log10())
}

/// Explicit value first, then the metadata sidecar, then the number of
/// distinct documents found in the postings.
pub fn resolve_total_documents(explicit: Option<u32>, meta: Option<&IndexMeta>, index: &InvertedIndex) -> u32 {
    explicit
        .or_else(|| meta.map(|m| m.num_docs))
        .unwrap_or_else(|| index.document_ids().len() as u32)
}

/// Split each query line on whitespace and normalize it into one clause.
pub fn parse_clauses<N, I, S>(normalizer: &N, lines: I) -> Vec<Vec<String>>
where
    N: Normalizer,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| normalizer.normalize(line.as_ref().split_whitespace()))
        .collect()
}

/// Evaluates queries against a borrowed, immutable index.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    index: &'a InvertedIndex,
    mode: RetrievalMode,
    total_documents: u32,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a InvertedIndex, mode: RetrievalMode, total_documents: u32) -> Self {
        Self { index, mode, total_documents }
    }

    pub fn boolean(index: &'a InvertedIndex) -> Self {
        Self::new(index, RetrievalMode::Boolean, 0)
    }

    pub fn ranked(index: &'a InvertedIndex, total_documents: u32) -> Self {
        Self::new(index, RetrievalMode::Ranked, total_documents)
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// Documents containing every term. An empty term list, or any term
    /// missing from the index, gives an empty result.
    ///
    /// In ranked mode a document scores the sum of `tf_weight * idf_weight`
    /// over the terms, counting a repeated query term once per occurrence.
    pub fn eval_conjunction<S: AsRef<str>>(&self, terms: &[S]) -> Result<ConjunctionResult> {
        if terms.is_empty() {
            return Ok(ConjunctionResult::empty());
        }
        let mut entries: Vec<(&str, &TermEntry)> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref();
            match self.index.get(term) {
                Some(entry) => entries.push((term, entry)),
                None => {
                    tracing::debug!(term, "term not in index, clause is empty");
                    return Ok(ConjunctionResult::empty());
                }
            }
        }

        // Walk the shortest postings list and probe the others.
        let Some(shortest) = entries.iter().map(|(_, e)| *e).min_by_key(|e| e.postings().len()) else {
            return Ok(ConjunctionResult::empty());
        };
        let matching: Vec<DocId> = shortest
            .postings()
            .keys()
            .copied()
            .filter(|doc| entries.iter().all(|(_, e)| e.contains(*doc)))
            .collect();
        if matching.is_empty() {
            return Ok(ConjunctionResult::empty());
        }

        let result: ConjunctionResult = match self.mode {
            RetrievalMode::Boolean => matching.into_iter().map(|doc| (doc, None)).collect(),
            RetrievalMode::Ranked => {
                let mut idfs = Vec::with_capacity(entries.len());
                for (term, entry) in &entries {
                    idfs.push(idf_weight(term, entry.document_frequency(), self.total_documents)?);
                }
                matching
                    .into_iter()
                    .map(|doc| {
                        let score: f64 = entries
                            .iter()
                            .zip(&idfs)
                            .filter_map(|((_, e), idf)| e.term_frequency(doc).map(|tf| tf_weight(tf) * idf))
                            .sum();
                        (doc, Some(score))
                    })
                    .collect()
            }
        };
        tracing::debug!(terms = entries.len(), hits = result.len(), mode = %self.mode, "evaluated conjunction");
        Ok(result)
    }

    /// OR together one conjunction per clause. Clauses are evaluated on the
    /// rayon pool; the aggregation waits for all of them.
    pub fn search<S: AsRef<str> + Sync>(&self, clauses: &[Vec<S>]) -> Result<DisjunctionResult> {
        let results: Vec<ConjunctionResult> =
            clauses.par_iter().map(|clause| self.eval_conjunction(clause)).collect::<Result<_>>()?;
        Ok(eval_disjunction(results, self.mode))
    }

    /// Normalize raw query lines and run them.
    pub fn search_lines<N, S>(&self, normalizer: &N, lines: &[S]) -> Result<DisjunctionResult>
    where
        N: Normalizer,
        S: AsRef<str>,
    {
        let clauses = parse_clauses(normalizer, lines);
        self.search(&clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        idx.insert_term("alpha", BTreeMap::from([(1, 1), (2, 1)]));
        idx.insert_term("beta", BTreeMap::from([(1, 2)]));
        idx.insert_term("gamma", BTreeMap::from([(2, 1)]));
        idx
    }

    fn ids(r: &ConjunctionResult) -> Vec<DocId> {
        r.doc_ids().collect()
    }

    #[test]
    fn boolean_intersection() {
        let idx = toy();
        let engine = QueryEngine::boolean(&idx);
        assert_eq!(ids(&engine.eval_conjunction(&["alpha", "beta"]).unwrap()), vec![1]);
        assert_eq!(ids(&engine.eval_conjunction(&["alpha"]).unwrap()), vec![1, 2]);
        assert_eq!(engine.eval_conjunction(&["alpha"]).unwrap().score(1), None);
    }

    #[test]
    fn missing_term_or_no_terms_is_empty() {
        let idx = toy();
        let engine = QueryEngine::boolean(&idx);
        assert!(engine.eval_conjunction(&["alpha", "delta"]).unwrap().is_empty());
        assert!(engine.eval_conjunction::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn ranked_scores_sum_tf_idf() {
        let idx = toy();
        let engine = QueryEngine::ranked(&idx, 10);
        let r = engine.eval_conjunction(&["alpha", "beta"]).unwrap();
        let expected = 1.0 * (10f64 / 2.0).log10() + (1.0 + 2f64.log10()) * (10f64 / 1.0).log10();
        let got = r.score(1).unwrap();
        assert!((got - expected).abs() < 1e-12, "{got} != {expected}");
    }

    #[test]
    fn repeated_query_term_counts_twice() {
        let idx = toy();
        let engine = QueryEngine::ranked(&idx, 10);
        let once = engine.eval_conjunction(&["beta"]).unwrap().score(1).unwrap();
        let twice = engine.eval_conjunction(&["beta", "beta"]).unwrap().score(1).unwrap();
        assert!((twice - 2.0 * once).abs() < 1e-12);
    }

    #[test]
    fn degenerate_idf_fails_fast() {
        let mut idx = toy();
        idx.insert_term("ghost", BTreeMap::new());
        let engine = QueryEngine::ranked(&idx, 10);
        // An empty postings list matches nothing, so nothing is scored.
        assert!(engine.eval_conjunction(&["ghost"]).unwrap().is_empty());
        let tiny = QueryEngine::ranked(&idx, 1);
        assert!(matches!(tiny.eval_conjunction(&["alpha"]), Err(IrError::DegenerateIdf { df: 2, n: 1, .. })));
        assert!(matches!(idf_weight("x", 0, 10), Err(IrError::DegenerateIdf { .. })));
    }

    #[test]
    fn higher_tf_never_lowers_score() {
        let mut prev = f64::MIN;
        for tf in 1..50u32 {
            let mut idx = toy();
            idx.insert_term("beta", BTreeMap::from([(1, tf)]));
            let s = QueryEngine::ranked(&idx, 1400).eval_conjunction(&["alpha", "beta"]).unwrap().score(1).unwrap();
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Ranked".parse::<RetrievalMode>(), Ok(RetrievalMode::Ranked));
        assert_eq!("boolean".parse::<RetrievalMode>(), Ok(RetrievalMode::Boolean));
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn total_documents_resolution_order() {
        let idx = toy();
        let meta = IndexMeta::new(1400, 3, "2024-01-01T00:00:00Z");
        assert_eq!(resolve_total_documents(Some(7), Some(&meta), &idx), 7);
        assert_eq!(resolve_total_documents(None, Some(&meta), &idx), 1400);
        assert_eq!(resolve_total_documents(None, None, &idx), 2);
    }
}
