pub mod feature;
pub mod level;
pub mod mesh;
pub mod picking;
pub mod selection;

pub use feature::{FeatureGeometry, LayerFeature};
pub use level::{Aggregation, LevelType};
pub use mesh::{KnotFunction, Mesh, MeshComponent};
pub use selection::SelectionSet;
