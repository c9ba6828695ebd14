//! Graph edges. A single type, [`EntityEdge`], carries all factual content
//! together with its validity window.

pub mod entity;

pub use entity::EntityEdge;
