//! Vietnamese Wikipedia pipeline: dump extraction, Hadoop Streaming mappers and reducer,
//! Elasticsearch indexing and a terminal dashboard.

pub mod constant;
pub mod error;
pub mod config;
pub mod model;
pub mod misc;
pub mod dump;
pub mod clean;
pub mod token;
pub mod lexicon;
pub mod mapper;
pub mod reducer;
pub mod es;
pub mod source;
pub mod index;
pub mod dashboard;

pub use config::{Config, SourceMode};
pub use error::WikiError;
pub use es::{EsClient, MemoryBackend, SearchBackend};
