use serde::Serialize;
use std::collections::BTreeMap;

use crate::index::DocId;
use crate::query::{ConjunctionResult, RetrievalMode};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: DocId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Final answer to a multi-line query, already in output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisjunctionResult {
    hits: Vec<Hit>,
}

impl DisjunctionResult {
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }

    pub fn truncate(&mut self, k: usize) {
        self.hits.truncate(k);
    }

    /// Space separated ids, no trailing space. Empty string for no hits.
    pub fn to_line(&self) -> String {
        self.hits.iter().map(|h| h.doc_id.to_string()).collect::<Vec<_>>().join(" ")
    }

    /// Like [`to_line`](Self::to_line) with `id:score` pairs; boolean hits
    /// print the bare id.
    pub fn to_scored_line(&self) -> String {
        self.hits
            .iter()
            .map(|h| match h.score {
                Some(s) => format!("{}:{s:.6}", h.doc_id),
                None => h.doc_id.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Union of the clause results.
///
/// A document matched by several clauses appears once; in ranked mode it
/// keeps its best clause score rather than the sum. Boolean output is sorted
/// by id, ranked output by descending score with ascending id on ties.
pub fn eval_disjunction<I>(results: I, mode: RetrievalMode) -> DisjunctionResult
where
    I: IntoIterator<Item = ConjunctionResult>,
{
    let mut merged: BTreeMap<DocId, Option<f64>> = BTreeMap::new();
    for result in results {
        for (doc_id, score) in result.iter() {
            match mode {
                RetrievalMode::Boolean => {
                    merged.insert(doc_id, None);
                }
                RetrievalMode::Ranked => {
                    let score = score.unwrap_or(0.0);
                    let best = merged.entry(doc_id).or_insert(Some(score));
                    if best.map_or(true, |b| score > b) {
                        *best = Some(score);
                    }
                }
            }
        }
    }

    let mut hits: Vec<Hit> = merged.into_iter().map(|(doc_id, score)| Hit { doc_id, score }).collect();
    if mode == RetrievalMode::Ranked {
        // Stable sort keeps the ascending-id order among equal scores.
        hits.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
    }
    DisjunctionResult { hits }
}
