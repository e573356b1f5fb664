//! Collection markers and the defaults shared by the CLI and the server.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, Result};

/// File name used when no index path is given.
pub const DEFAULT_INDEX_FILE: &str = "cran.ind";

/// Size of the Cranfield collection, used as N when nothing better is known.
pub const DEFAULT_TOTAL_DOCUMENTS: u32 = 1400;

/// Terms shorter than this are dropped by the English normalizer.
pub const DEFAULT_MIN_TERM_LEN: usize = 4;

/// Version written into the index metadata sidecar.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Line prefixes that give a collection file its structure.
///
/// `terminators` are markers (author, bibliography, ...) whose only role is to
/// close an open title field; their content is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMarkers {
    pub document: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub terminators: Vec<String>,
}

impl Default for CollectionMarkers {
    fn default() -> Self {
        Self {
            document: ".I".into(),
            title: ".T".into(),
            body: ".W".into(),
            terminators: vec![".A".into(), ".B".into()],
        }
    }
}

impl CollectionMarkers {
    pub fn new(document: &str, title: &str, body: &str, terminators: &[&str]) -> Result<Self> {
        let markers = Self {
            document: document.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            terminators: terminators.iter().map(|t| t.to_string()).collect(),
        };
        markers.validate()?;
        Ok(markers)
    }

    /// Every marker must be one or two characters and all of them distinct.
    pub fn validate(&self) -> Result<()> {
        let all: Vec<&str> = [self.document.as_str(), self.title.as_str(), self.body.as_str()]
            .into_iter()
            .chain(self.terminators.iter().map(String::as_str))
            .collect();
        for (i, m) in all.iter().enumerate() {
            let len = m.chars().count();
            if len == 0 || len > 2 {
                return Err(IrError::InvalidMarkers(format!("marker {m:?} must be 1 or 2 characters")));
            }
            if all[..i].contains(m) {
                return Err(IrError::InvalidMarkers(format!("marker {m:?} is used twice")));
            }
        }
        Ok(())
    }
}
