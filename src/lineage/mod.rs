//! Session lineage: tree reconstruction, layout and projection.

pub mod builder;
pub mod layout;
pub mod projector;
pub mod types;

pub use builder::{ChildOrder, LineageError};
pub use layout::TreeLayout;
pub use projector::{project, LineageConfig, Projection};
pub use types::{Hyperparameters, ModelGroup, ModelGroupId, ParameterRecord, SessionRecord};
