//! Workspace extraction and normalization for zenrag.
//!
//! Pipeline stages, in order:
//! 1. [`extract`] — paginate a workspace's issues/epics into [`RawItem`]s
//! 2. [`resolver`] — build the epic/dependency/pipeline lookup graph
//! 3. [`filter`] — apply user inclusion criteria
//! 4. [`normalize`] — map items into [`CanonicalRecord`]s
//! 5. [`jsonl`] — serialize records for the output stream
//!
//! [`RawItem`]: zenrag_shared::RawItem
//! [`CanonicalRecord`]: zenrag_shared::CanonicalRecord

pub mod extract;
pub mod filter;
pub mod jsonl;
pub mod normalize;
pub mod resolver;

pub use extract::{ExtractProgress, Extraction, FetchPage, SilentExtract, WorkspaceExtractor};
pub use filter::matches;
pub use jsonl::{ValidationReport, read_jsonl, validate_jsonl, write_jsonl};
pub use normalize::{canonical_timestamp, normalize};
pub use resolver::{RelationshipGraph, StageInfo, resolve};
