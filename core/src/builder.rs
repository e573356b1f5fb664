use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::collection::ParsedCollection;
use crate::index::{DocId, DocTerms, InvertedIndex, TermFreq};
use crate::normalize::Normalizer;

/// Builds an [`InvertedIndex`] in a single pass over the documents.
///
/// Each document's title and body terms are counted locally, then written
/// into the postings of every term the document contains. Documents present
/// in only one of the two field maps are treated as having an empty other
/// field.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    parallel: bool,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count per-document terms on the rayon pool. The merge into postings
    /// stays sequential, so the result equals the single-threaded build.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn build(&self, bodies: &DocTerms, titles: &DocTerms) -> InvertedIndex {
        let doc_ids: Vec<DocId> = bodies.keys().chain(titles.keys()).copied().collect::<BTreeSet<_>>().into_iter().collect();
        let counted: Vec<(DocId, HashMap<&str, TermFreq>)> = if self.parallel {
            doc_ids
                .par_iter()
                .map(|id| {
                    let (b, t) = doc_fields(*id, bodies, titles);
                    (*id, count_terms(b, t))
                })
                .collect()
        } else {
            doc_ids
                .iter()
                .map(|id| {
                    let (b, t) = doc_fields(*id, bodies, titles);
                    (*id, count_terms(b, t))
                })
                .collect()
        };

        let mut index = InvertedIndex::new();
        for (doc_id, counts) in counted {
            for (term, tf) in counts {
                index.record_posting(term, doc_id, tf);
            }
        }
        tracing::info!(
            num_docs = doc_ids.len(),
            num_terms = index.len(),
            num_postings = index.total_postings(),
            parallel = self.parallel,
            "built inverted index"
        );
        index
    }

    /// Normalize both fields of every parsed document, then build.
    pub fn index_collection<N: Normalizer + Sync>(&self, parsed: &ParsedCollection, normalizer: &N) -> InvertedIndex {
        let bodies = self.normalize_field(&parsed.bodies, normalizer);
        let titles = self.normalize_field(&parsed.titles, normalizer);
        self.build(&bodies, &titles)
    }

    fn normalize_field<N: Normalizer + Sync>(&self, field: &DocTerms, normalizer: &N) -> DocTerms {
        if self.parallel {
            field.par_iter().map(|(id, tokens)| (*id, normalizer.normalize(tokens.iter()))).collect()
        } else {
            field.iter().map(|(id, tokens)| (*id, normalizer.normalize(tokens.iter()))).collect()
        }
    }
}

fn doc_fields<'a>(id: DocId, bodies: &'a DocTerms, titles: &'a DocTerms) -> (&'a [String], &'a [String]) {
    let body = bodies.get(&id).map(Vec::as_slice).unwrap_or(&[]);
    let title = titles.get(&id).map(Vec::as_slice).unwrap_or(&[]);
    (body, title)
}

fn count_terms<'a>(body: &'a [String], title: &'a [String]) -> HashMap<&'a str, TermFreq> {
    let mut counts: HashMap<&str, TermFreq> = HashMap::new();
    for term in body.iter().chain(title) {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    counts
}
