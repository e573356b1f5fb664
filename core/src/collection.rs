//! Reader for line-oriented collections in the Cranfield layout.
//!
//! ```text
//! .I 1
//! .T
//! experimental investigation of the aerodynamics of a
//! wing in a slipstream .
//! .A
//! brenckmann,m.
//! .W
//! an experimental study of a wing in a propeller slipstream ...
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::CollectionMarkers;
use crate::error::{IrError, Result};
use crate::index::{DocId, DocTerms};

lazy_static! {
    static ref DOC_ID: Regex = Regex::new(r"[0-9]+").expect("valid regex");
}

/// Raw tokens of every document, split by field.
///
/// Every document id seen on a valid document-start line has an entry in both
/// maps, even when the field itself was absent.
#[derive(Debug, Default)]
pub struct ParsedCollection {
    pub titles: DocTerms,
    pub bodies: DocTerms,
    /// Malformed lines encountered, as `IrError::MalformedRecord` values.
    pub malformed: Vec<IrError>,
}

impl ParsedCollection {
    pub fn num_docs(&self) -> usize {
        self.titles.keys().chain(self.bodies.keys()).collect::<BTreeSet<_>>().len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Field {
    #[default]
    None,
    Title,
    Body,
}

pub struct CollectionParser {
    markers: CollectionMarkers,
}

impl Default for CollectionParser {
    fn default() -> Self {
        Self { markers: CollectionMarkers::default() }
    }
}

impl CollectionParser {
    pub fn new(markers: CollectionMarkers) -> Result<Self> {
        markers.validate()?;
        Ok(Self { markers })
    }

    pub fn markers(&self) -> &CollectionMarkers {
        &self.markers
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<ParsedCollection> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| IrError::source_unavailable(path, e))?;
        let parsed = self.parse(BufReader::new(f))?;
        tracing::info!(
            path = %path.display(),
            num_docs = parsed.num_docs(),
            malformed = parsed.malformed.len(),
            "parsed collection"
        );
        Ok(parsed)
    }

    pub fn parse_str(&self, text: &str) -> ParsedCollection {
        let mut state = ParseState::default();
        for (i, line) in text.lines().enumerate() {
            self.feed(&mut state, i + 1, line);
        }
        state.out
    }

    /// Only I/O failures are fatal; structural problems end up in
    /// [`ParsedCollection::malformed`].
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<ParsedCollection> {
        let mut state = ParseState::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            self.feed(&mut state, i + 1, &line);
        }
        Ok(state.out)
    }

    fn feed(&self, state: &mut ParseState, lineno: usize, line: &str) {
        let m = &self.markers;
        if let Some(rest) = line.strip_prefix(m.document.as_str()) {
            state.field = Field::None;
            state.doc = match DOC_ID.find(rest).and_then(|d| d.as_str().parse::<DocId>().ok()) {
                Some(id) if id > 0 => {
                    if state.out.titles.contains_key(&id) {
                        tracing::warn!(doc_id = id, line = lineno, "duplicate document id, replacing earlier content");
                    }
                    state.out.titles.insert(id, Vec::new());
                    state.out.bodies.insert(id, Vec::new());
                    Some(id)
                }
                _ => {
                    state.malformed(lineno, format!("no valid document id in {line:?}"));
                    None
                }
            };
            return;
        }

        // Once inside a body only a document-start line ends it.
        if state.field != Field::Body {
            if let Some(rest) = line.strip_prefix(m.title.as_str()) {
                state.field = Field::Title;
                state.push(rest);
                return;
            }
            if let Some(rest) = line.strip_prefix(m.body.as_str()) {
                state.field = Field::Body;
                state.push(rest);
                return;
            }
            if m.terminators.iter().any(|t| line.starts_with(t.as_str())) {
                state.field = Field::None;
                return;
            }
        }
        state.push(line);
    }
}

#[derive(Default)]
struct ParseState {
    out: ParsedCollection,
    doc: Option<DocId>,
    field: Field,
}

impl ParseState {
    fn push(&mut self, text: &str) {
        let Some(doc) = self.doc else { return };
        let target = match self.field {
            Field::Title => self.out.titles.entry(doc).or_default(),
            Field::Body => self.out.bodies.entry(doc).or_default(),
            Field::None => return,
        };
        target.extend(text.split_whitespace().map(str::to_string));
    }

    fn malformed(&mut self, line: usize, reason: String) {
        tracing::warn!(line, %reason, "malformed collection record");
        self.out.malformed.push(IrError::MalformedRecord { line, reason });
    }
}
