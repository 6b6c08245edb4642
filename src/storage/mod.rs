//! Storage seam: repository trait plus in-memory and JSONL backends.

mod jsonl;
mod memory;
mod traits;

pub use jsonl::JsonlRepository;
pub use memory::MemoryRepository;
pub use traits::{
    ExtractionMethod, MentionMatch, MentionPartition, ResolutionRepository, SkillMention,
};
