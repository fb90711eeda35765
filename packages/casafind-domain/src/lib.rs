pub mod embedding;
pub mod search_text;
pub mod types;

pub use embedding::{EmbeddingVector, VectorError};
pub use search_text::{AmenityFlags, SearchTextInput, build_search_text, normalize_text};
pub use types::{
	Badge, BoostLevel, ListingKind, RelaxationLevel, VisibilityStatus, segment_key,
};
