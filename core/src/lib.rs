pub mod aggregate;
pub mod builder;
pub mod collection;
pub mod config;
pub mod error;
pub mod index;
pub mod normalize;
pub mod query;
pub mod store;

pub use aggregate::{eval_disjunction, DisjunctionResult, Hit};
pub use builder::IndexBuilder;
pub use collection::{CollectionParser, ParsedCollection};
pub use config::CollectionMarkers;
pub use error::{IrError, Result};
pub use index::{DocId, DocTerms, InvertedIndex, TermEntry, TermFreq};
pub use normalize::{EnglishNormalizer, Normalizer};
pub use query::{ConjunctionResult, QueryEngine, RetrievalMode};
