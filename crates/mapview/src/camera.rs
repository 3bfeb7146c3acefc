//! Perspective camera over the projected world.
//!
//! x/y are world units relative to the world origin. z is stored in world
//! units too: the init payload gives heights in meters and they are divided by
//! the ground resolution once, on construction. The model matrix applies the
//! same scale to geometry z so meshes can keep meters.

use foundation::math::{LatLng, Mat4, Vec2, Vec3, project_latlng, unproject_world, world_unit_meters};
use gpu::FrameUniforms;
use tracing::debug;

use crate::config::CameraConfig;

const FOV_Y: f64 = 45.0 * std::f64::consts::PI / 180.0;
const NEAR_METERS: f64 = 1.0;
const FAR_METERS: f64 = 1e10;

/// Share of the eye height moved by one zoom step.
const ZOOM_STEP: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct Camera {
    origin: Vec2,
    ground_res: f64,
    eye: Vec3,
    look_at: Vec3,
    up: Vec3,
    eye_dir: Vec3,
    eye_length: f64,
    near: f64,
    far: f64,
    viewport: (u32, u32),

    model: Mat4,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        let origin = project_latlng(config.origin);
        let ground_res = world_unit_meters(config.origin.lat);
        let to_world = |p: [f64; 3]| Vec3::new(p[0], p[1], p[2] / ground_res);

        let mut camera = Self {
            origin,
            ground_res,
            eye: to_world(config.eye),
            look_at: to_world(config.look_at),
            up: Vec3::from_array(config.up).normalize(),
            eye_dir: Vec3::new(0.0, 0.0, -1.0),
            eye_length: 0.0,
            near: NEAR_METERS / ground_res,
            far: FAR_METERS / ground_res,
            viewport: (1, 1),
            model: Mat4::identity(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
        };
        camera.update_eye_dir_and_length();
        camera
    }

    fn update_eye_dir_and_length(&mut self) {
        let d = self.look_at - self.eye;
        self.eye_length = d.length();
        if self.eye_length > 0.0 {
            self.eye_dir = d * (1.0 / self.eye_length);
        }
    }

    fn sync_look_at(&mut self) {
        self.look_at = self.eye + self.eye_dir * self.eye_length;
    }

    fn right(&self) -> Vec3 {
        self.eye_dir.cross(self.up).normalize()
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn ground_resolution(&self) -> f64 {
        self.ground_res
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn look_at(&self) -> Vec3 {
        self.look_at
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn eye_dir(&self) -> Vec3 {
        self.eye_dir
    }

    pub fn eye_length(&self) -> f64 {
        self.eye_length
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Move along the camera's right and up axes, scaled by the eye height.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        let scale = self.eye.z;
        self.eye = self.eye + self.right() * (dx * scale) + self.up * (dy * scale);
        self.sync_look_at();
    }

    /// Step toward the ground point under the normalized screen position
    /// `(x, y)` (origin bottom-left). Positive `delta` zooms in.
    pub fn zoom(&mut self, delta: f64, x: f64, y: f64) {
        let step = ZOOM_STEP * self.eye.z;
        let step = if delta > 0.0 { step } else { -step };
        let dir = self.screen_to_world_dir(x, y);
        self.eye = self.eye + dir * step;
        self.sync_look_at();
    }

    /// Turn around the world vertical axis.
    pub fn yaw(&mut self, delta: f64) {
        self.eye_dir = self.eye_dir.rotate_z(delta);
        self.up = self.up.rotate_z(delta);
        self.sync_look_at();
    }

    /// Tilt around the camera's right axis.
    pub fn pitch(&mut self, delta: f64) {
        let (s, c) = (-delta).sin_cos();
        self.eye_dir = (self.up * s + self.eye_dir * c).normalize();
        self.sync_look_at();
        self.up = self.eye_dir.cross(self.up).cross(self.eye_dir).normalize();
    }

    /// Recompute model, view and projection. Runs once per frame before any
    /// layer pass.
    pub fn update(&mut self) {
        self.model = Mat4::scale(Vec3::new(1.0, 1.0, 1.0 / self.ground_res));
        self.view = if (self.look_at - self.eye).length() > 0.0 {
            Mat4::look_at(self.eye, self.look_at, self.up)
        } else {
            Mat4::identity()
        };
        self.projection = Mat4::perspective(FOV_Y, 1.0, self.near, self.far);
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        self.view.mul(&self.model)
    }

    /// Matrices handed to every shader this frame.
    pub fn frame_uniforms(&self) -> FrameUniforms {
        FrameUniforms::from_columns(
            self.model_view_matrix().to_f32(),
            self.projection.to_f32(),
            self.origin.to_array(),
        )
    }

    /// Unit ray from the eye through normalized screen position `(x, y)`,
    /// `(0.5, 0.5)` being the view center.
    pub fn screen_to_world_dir(&self, x: f64, y: f64) -> Vec3 {
        let half = (FOV_Y / 2.0).tan();
        let offset = self.up * (half * (y - 0.5) * 2.0) + self.right() * (half * (x - 0.5) * 2.0);
        (self.eye_dir + offset).normalize()
    }

    /// Geographic position of the ground (z = 0) under `(x, y)`. `None` when
    /// the ray points away from the ground.
    pub fn screen_to_geo(&self, x: f64, y: f64) -> Option<LatLng> {
        let dir = self.screen_to_world_dir(x, y);
        if dir.z == 0.0 {
            return None;
        }
        let t = -self.eye.z / dir.z;
        if t <= 0.0 {
            return None;
        }
        let hit = self.eye + dir * t;
        Some(unproject_world(Vec2::new(hit.x, hit.y) + self.origin))
    }

    /// Move the eye horizontally to world position `(x, y)`, keeping height
    /// and direction.
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.eye.x = x - self.origin.x;
        self.eye.y = y - self.origin.y;
        self.sync_look_at();
        debug!(x, y, "camera moved");
    }

    /// Current state in the shape of the init payload, heights in meters.
    pub fn state(&self) -> CameraConfig {
        let to_meters = |p: Vec3| [p.x, p.y, p.z * self.ground_res];
        CameraConfig {
            origin: unproject_world(self.origin),
            eye: to_meters(self.eye),
            look_at: to_meters(self.look_at),
            up: self.up.to_array(),
        }
    }
}
