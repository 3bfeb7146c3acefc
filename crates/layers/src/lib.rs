pub mod buildings;
pub mod heatmap;
pub mod info;
pub mod layer;
pub mod lines;
pub mod link;
pub mod manager;
pub mod points;
pub mod symbology;
pub mod triangles;
pub mod vector;

pub use info::{LayerInfo, LayerPayload, LayerType};
pub use layer::{Layer, LayerCore, ScreenSize};
pub use link::{JoinedJson, JoinedLayer, JoinedObjects, Knot, LinkDescription, Predicate};
pub use manager::{LayerManager, MapLayer};
pub use symbology::MapStyle;
