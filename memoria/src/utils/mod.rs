//! Small helpers used across the engine: timestamp parsing for
//! oracle-reported validity dates, cosine scoring and ranking, and string
//! cleanup (whitespace, relation labels, JSON recovery).

pub mod datetime;
pub mod similarity;
pub mod text;

pub use datetime::{format_timestamp, parse_flexible_datetime};
pub use similarity::{cosine_similarity, rank_by_similarity};
pub use text::{extract_json_from_response, normalize_label, normalize_whitespace};
