use layers::{LayerManager, MapStyle};

use crate::camera::Camera;
use crate::config::CameraConfig;

/// Everything one map instance mutates: its camera, its layers and the theme
/// they are colored with.
#[derive(Debug)]
pub struct EngineContext {
    pub camera: Camera,
    pub layers: LayerManager,
    pub style: MapStyle,
}

impl EngineContext {
    pub fn new(camera: &CameraConfig, style: MapStyle) -> Self {
        Self {
            camera: Camera::new(camera),
            layers: LayerManager::new(),
            style,
        }
    }

    /// World position every layer mesh is recentered on.
    pub fn centroid(&self) -> [f64; 3] {
        let origin = self.camera.origin();
        [origin.x, origin.y, 0.0]
    }
}
