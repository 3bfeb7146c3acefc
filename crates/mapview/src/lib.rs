//! Interactive map on top of the layer stack: camera, input routing and the
//! frame loop.

pub mod camera;
pub mod config;
pub mod context;
pub mod input;
pub mod map_view;

pub use camera::Camera;
pub use config::{CameraConfig, EngineConfig};
pub use context::EngineContext;
pub use input::{InputAction, InputState, MapViewStatus, Modifiers, PointerButton, PointerEvent};
pub use map_view::{FrameReport, LayerPick, MapView};
