//! Historical defect knowledge base
//!
//! - **record**: raw and validated defect records
//! - **loader**: reading the knowledge base file produced by the spreadsheet converter

mod loader;
mod record;

pub use loader::{KnowledgeBase, KnowledgeBaseInfo, KnowledgeStats};
pub use record::{DefectMetadata, DefectRecord, RawDefect, RawProvenance};
