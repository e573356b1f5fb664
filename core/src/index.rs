use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type DocId = u32;
pub type TermFreq = u32;

/// Per-document term sequences, keyed by document id.
pub type DocTerms = BTreeMap<DocId, Vec<String>>;

/// Postings of a single term: document id -> term frequency, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermEntry {
    postings: BTreeMap<DocId, TermFreq>,
}

impl TermEntry {
    pub fn new(postings: BTreeMap<DocId, TermFreq>) -> Self {
        Self { postings }
    }

    /// Number of distinct documents containing the term. Always equal to the
    /// number of postings since it is derived from them.
    pub fn document_frequency(&self) -> u32 {
        self.postings.len() as u32
    }

    pub fn postings(&self) -> &BTreeMap<DocId, TermFreq> {
        &self.postings
    }

    pub fn term_frequency(&self, doc_id: DocId) -> Option<TermFreq> {
        self.postings.get(&doc_id).copied()
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.postings.contains_key(&doc_id)
    }
}

/// Term -> postings. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvertedIndex {
    terms: HashMap<String, TermEntry>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a term with its postings as-is, replacing any previous entry.
    ///
    /// No invariant is checked here; [`IndexBuilder`](crate::IndexBuilder)
    /// and the store loader only ever pass non-empty postings with tf >= 1.
    pub fn insert_term(&mut self, term: impl Into<String>, postings: BTreeMap<DocId, TermFreq>) {
        self.terms.insert(term.into(), TermEntry::new(postings));
    }

    pub(crate) fn record_posting(&mut self, term: &str, doc_id: DocId, tf: TermFreq) {
        match self.terms.get_mut(term) {
            Some(entry) => {
                entry.postings.insert(doc_id, tf);
            }
            None => {
                self.terms.insert(term.to_string(), TermEntry::new(BTreeMap::from([(doc_id, tf)])));
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.terms.get(term).map_or(0, TermEntry::document_frequency)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TermEntry)> {
        self.terms.iter().map(|(t, e)| (t.as_str(), e))
    }

    /// Terms in ascending order, for deterministic output.
    pub fn sorted_terms(&self) -> Vec<&str> {
        let mut terms: Vec<&str> = self.terms.keys().map(String::as_str).collect();
        terms.sort_unstable();
        terms
    }

    /// Distinct document ids that appear in at least one posting.
    pub fn document_ids(&self) -> BTreeSet<DocId> {
        self.terms.values().flat_map(|e| e.postings.keys().copied()).collect()
    }

    pub fn total_postings(&self) -> usize {
        self.terms.values().map(|e| e.postings.len()).sum()
    }
}
