//! Graph nodes: [`EntityNode`] for the real-world things facts connect,
//! [`EpisodicNode`] for the raw inputs those facts came from.

pub mod entity;
pub mod episodic;

pub use entity::EntityNode;
pub use episodic::{EpisodeType, EpisodicNode};
