//! Defect RAG - retrieval of similar historical defects for defect analysis
//!
//! This library provides the retrieval core of the defect analysis tool:
//! - Knowledge base loading and record validation
//! - Vector index construction over defect descriptions
//! - Category-scoped nearest-neighbor retrieval with a sparsity fallback
//! - A content-addressed, TTL-bounded result cache
//! - Context and prompt assembly for the generation step
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Batch pipeline                      │
//! │   DefectQuery  →  BatchRow (context + prompts)       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Retriever                         │
//! │   ResultCache  │  ScopedIndex memo  │  timeout       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          VectorIndex  ←  EmbeddingProvider           │
//! │   KnowledgeBase  →  DefectRecord                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod knowledge;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod similarity;

pub use cache::{CacheKey, ResultCache};
pub use config::{CategoryProfile, CategoryTable, Config};
pub use context::{NO_SIMILAR_CASE, assemble};
pub use embedding::{Embedder, EmbeddingProvider};
pub use error::{Error, Result};
pub use index::{BuildReport, IndexedEntry, Neighbor, ScopedIndex, VectorIndex};
pub use knowledge::{DefectMetadata, DefectRecord, KnowledgeBase, RawDefect};
pub use pipeline::{BatchRow, BatchRunner, DefectQuery, RowStatus};
pub use prompt::{PromptPair, PromptTemplates};
pub use retrieval::{RankedCase, Retrieval, RetrievalSource, Retriever, SearchHit, SearchResult};
pub use similarity::similarity;
