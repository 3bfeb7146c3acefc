//! One interactive map: owns the device, the engine context and the input
//! state, and runs the frame loop.

use foundation::bounds::Aabb2;
use foundation::math::LatLng;
use foundation::Result;
use gpu::{ClearRequest, RenderDevice};
use layers::{Knot, Layer, LayerPayload, ScreenSize};
use scene::picking::PickOutcome;
use tracing::{debug, error, info};

use crate::config::{CameraConfig, EngineConfig};
use crate::context::EngineContext;
use crate::input::{InputAction, InputState, PointerEvent};

/// A pick resolved during a frame and the layer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPick {
    pub layer: String,
    pub outcome: PickOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub layers_drawn: usize,
    /// Layers whose pass failed this frame; the others still rendered.
    pub failed_layers: Vec<String>,
    pub picks: Vec<LayerPick>,
}

pub struct MapView<D: RenderDevice> {
    device: D,
    context: EngineContext,
    input: InputState,
    screen: ScreenSize,
}

impl<D: RenderDevice> MapView<D> {
    /// Map without layers. The canvas takes the device's current viewport.
    pub fn new(device: D, context: EngineContext) -> Self {
        let (width, height) = device.viewport();
        let mut map = Self {
            device,
            context,
            input: InputState::new(),
            screen: ScreenSize::square(1),
        };
        map.resize(width, height);
        map
    }

    /// Build the map described by `config`: viewport, layers, then knots.
    pub fn from_config(device: D, config: EngineConfig) -> Result<Self> {
        let context = EngineContext::new(&config.camera, config.style);
        let mut map = Self::new(device, context);
        map.resize(config.viewport[0], config.viewport[1]);
        map.init_layers(config.layers)?;
        for knot in &config.knots {
            map.load_knot(knot)?;
        }
        Ok(map)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn init_layers(&mut self, payloads: Vec<LayerPayload>) -> Result<usize> {
        let centroid = self.context.centroid();
        let EngineContext { layers, style, .. } = &mut self.context;
        let added = layers.init_layers(&mut self.device, payloads, centroid, style)?;
        info!(added, total = layers.len(), "layers initialized");
        Ok(added)
    }

    /// Add one layer on top. Returns `false` when its type is unknown.
    pub fn add_layer(&mut self, payload: LayerPayload) -> Result<bool> {
        Ok(self.init_layers(vec![payload])? == 1)
    }

    pub fn load_knot(&mut self, knot: &Knot) -> Result<()> {
        self.context.layers.load_knot(knot)
    }

    /// Draw one frame: clear, refresh the camera, then every visible layer in
    /// ascending z-order.
    pub fn render(&mut self) -> Result<FrameReport> {
        self.device.clear(ClearRequest::all(self.context.style.sky()));
        self.context.camera.update();
        let frame = self.context.camera.frame_uniforms();

        let mut report = FrameReport::default();
        for layer in self.context.layers.layers_mut() {
            let layer = layer.as_layer_mut();
            if !layer.is_visible() {
                continue;
            }
            match layer.render(&mut self.device, &frame) {
                Ok(picks) => {
                    report.layers_drawn += 1;
                    report.picks.extend(picks.into_iter().map(|outcome| LayerPick {
                        layer: layer.id().to_string(),
                        outcome,
                    }));
                }
                Err(e) => {
                    error!(layer = %layer.id(), error = %e, "layer pass failed");
                    report.failed_layers.push(layer.id().to_string());
                }
            }
        }
        self.device.finish_frame()?;
        debug!(drawn = report.layers_drawn, picks = report.picks.len(), "frame rendered");
        Ok(report)
    }

    /// The drawing viewport is the square of side `max(width, height)`;
    /// picking targets are rebuilt on their next pass.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        let side = width.max(height);
        self.device.set_viewport(side, side);
        self.context.camera.set_viewport(width, height);
        self.screen = ScreenSize {
            client: (width as f64, height as f64),
            device: (width, height),
        };
        for layer in self.context.layers.layers_mut() {
            layer.as_layer_mut().mark_resized();
        }
        debug!(width, height, side, "viewport resized");
    }

    fn each_layer(&mut self, mut f: impl FnMut(&mut dyn Layer, ScreenSize) -> bool) -> usize {
        let screen = self.screen;
        let mut answered = 0;
        for layer in self.context.layers.layers_mut() {
            if f(layer.as_layer_mut(), screen) {
                answered += 1;
            }
        }
        answered
    }

    /// Queue an object pick at a CSS pixel. Returns how many layers will
    /// answer it on the next frame. Hidden layers are not asked.
    pub fn pick(&mut self, x: f64, y: f64) -> usize {
        self.each_layer(|l, screen| l.is_visible() && l.pick_object(x, y, screen))
    }

    pub fn pick_region(&mut self, pointer: (f64, f64), anchor: (f64, f64)) -> usize {
        self.each_layer(|l, screen| l.is_visible() && l.pick_region(pointer, anchor, screen))
    }

    pub fn pick_filter(&mut self, pointer: (f64, f64), anchor: (f64, f64)) -> usize {
        self.each_layer(|l, screen| l.is_visible() && l.pick_filter(pointer, anchor, screen))
    }

    /// Turn every layer's brushing selection into its highlight.
    pub fn apply_brushing(&mut self) {
        self.each_layer(|l, _| !l.apply_brushing().is_empty());
    }

    pub fn clear_picking(&mut self) {
        self.each_layer(|l, _| {
            l.clear_picking();
            true
        });
    }

    /// The union of the layers' filter selections becomes the filter; no
    /// selection clears it.
    pub fn commit_filter(&mut self) {
        let bbox = self
            .context
            .layers
            .layers()
            .iter()
            .filter_map(|l| l.as_layer().selected_filtering().ok().flatten())
            .reduce(Aabb2::union);
        info!(?bbox, "filter brushing committed");
        self.context.layers.set_filter_bbox(bbox);
    }

    pub fn reset_filter(&mut self) {
        self.each_layer(|l, _| {
            l.reset_filter_selection();
            true
        });
        self.context.layers.set_filter_bbox(None);
    }

    /// Geographic position under a CSS pixel, `None` above the horizon.
    pub fn screen_to_geo(&self, x: f64, y: f64) -> Option<LatLng> {
        let (w, h) = self.screen.client;
        let max_axis = w.max(h);
        self.context.camera.screen_to_geo(x / max_axis, (h - y) / max_axis)
    }

    /// Recenter the camera on world position `(x, y)`.
    pub fn set_camera_position(&mut self, x: f64, y: f64) {
        self.context.camera.set_position(x, y);
    }

    pub fn camera_state(&self) -> CameraConfig {
        self.context.camera.state()
    }

    pub fn pointer_down(&mut self, event: &PointerEvent) {
        let actions = self.input.pointer_down(event);
        self.apply(actions);
    }

    pub fn pointer_move(&mut self, event: &PointerEvent) {
        let actions = self.input.pointer_move(event, self.screen.client);
        self.apply(actions);
    }

    pub fn pointer_up(&mut self) {
        let actions = self.input.pointer_up();
        self.apply(actions);
    }

    pub fn wheel(&mut self, x: f64, y: f64, delta_y: f64) {
        let actions = self.input.wheel(x, y, delta_y, self.screen.client);
        self.apply(actions);
    }

    pub fn key_up(&mut self, key: &str) {
        let actions = self.input.key_up(key);
        self.apply(actions);
    }

    fn apply(&mut self, actions: Vec<InputAction>) {
        for action in actions {
            match action {
                InputAction::Translate { dx, dy } => self.context.camera.translate(dx, dy),
                InputAction::Rotate { yaw, pitch } => {
                    self.context.camera.yaw(yaw);
                    self.context.camera.pitch(pitch);
                }
                InputAction::Zoom { delta, x, y } => self.context.camera.zoom(delta, x, y),
                InputAction::PickObject { x, y } => {
                    self.pick(x, y);
                }
                InputAction::PickRegion { pointer, anchor } => {
                    self.pick_region(pointer, anchor);
                }
                InputAction::PickFilter { pointer, anchor } => {
                    self.pick_filter(pointer, anchor);
                }
                InputAction::CommitFilter => self.commit_filter(),
                InputAction::ResetFilter => self.reset_filter(),
                InputAction::ApplyBrushing => self.apply_brushing(),
                InputAction::ClearPicking => self.clear_picking(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerPick, MapView};
    use crate::config::{CameraConfig, EngineConfig};
    use crate::context::EngineContext;
    use crate::input::{Modifiers, PointerButton, PointerEvent};
    use foundation::math::LatLng;
    use gpu::recording::{Command, RecordingDevice};
    use gpu::{ClearRequest, Primitive, RenderStyle};
    use layers::{Layer, LayerInfo, LayerPayload, LayerType, MapStyle};
    use pretty_assertions::assert_eq;
    use scene::picking::{PickOutcome, PickRect};
    use scene::{FeatureGeometry, LayerFeature};

    fn camera() -> CameraConfig {
        CameraConfig {
            origin: LatLng::new(0.0, 0.0),
            eye: [0.0, 0.0, 1000.0],
            look_at: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
        }
    }

    fn map() -> MapView<RecordingDevice> {
        MapView::new(
            RecordingDevice::new(8, 8),
            EngineContext::new(&camera(), MapStyle::default()),
        )
    }

    /// Two unit triangles side by side, in world coordinates around `c`.
    fn zips(c: [f64; 3], styles: Vec<RenderStyle>) -> LayerPayload {
        let triangle = |x: f64| {
            LayerFeature::new(FeatureGeometry::with_triangles(
                vec![c[0] + x, c[1], c[0] + x + 1.0, c[1], c[0] + x, c[1] + 1.0],
                vec![0, 1, 2],
            ))
        };
        let mut info = LayerInfo::new("zip", LayerType::Triangles2dLayer, styles);
        info.selectable = true;
        LayerPayload {
            info,
            data: vec![triangle(0.0), triangle(2.0)],
            joined: None,
        }
    }

    fn roads(c: [f64; 3]) -> LayerPayload {
        LayerPayload {
            info: LayerInfo::new("roads", LayerType::Lines2dLayer, vec![RenderStyle::FlatColor]),
            data: vec![LayerFeature::new(FeatureGeometry::with_coordinates(vec![
                c[0],
                c[1],
                c[0] + 1.0,
                c[1],
            ]))],
            joined: None,
        }
    }

    #[test]
    fn frame_clears_then_draws_layers_in_z_order() {
        let mut map = map();
        let c = map.context().centroid();
        map.init_layers(vec![zips(c, vec![RenderStyle::FlatColor]), roads(c)]).unwrap();

        let report = map.render().unwrap();
        assert_eq!(report.layers_drawn, 2);
        assert!(report.failed_layers.is_empty());

        let sky = MapStyle::default().sky();
        let first_clear = map.device().commands().iter().find_map(|c| match c {
            Command::Clear(r) => Some(*r),
            _ => None,
        });
        assert_eq!(first_clear, Some(ClearRequest::all(sky)));
        let primitives: Vec<_> = map.device().draws().iter().map(|d| d.primitive).collect();
        assert_eq!(primitives, vec![Primitive::Triangles, Primitive::LineStrip]);
        assert!(matches!(map.device().commands().last(), Some(Command::FinishFrame)));
    }

    #[test]
    fn hidden_layers_are_skipped() {
        let mut map = map();
        let c = map.context().centroid();
        map.init_layers(vec![zips(c, vec![RenderStyle::FlatColor]), roads(c)]).unwrap();
        map.context_mut().layers.layers_mut()[0].as_layer_mut().set_visible(false);

        let report = map.render().unwrap();
        assert_eq!(report.layers_drawn, 1);
        let primitives: Vec<_> = map.device().draws().iter().map(|d| d.primitive).collect();
        assert_eq!(primitives, vec![Primitive::LineStrip]);
    }

    #[test]
    fn ctrl_click_resolves_on_the_next_frame() {
        let mut map = map();
        let c = map.context().centroid();
        map.init_layers(vec![zips(c, vec![RenderStyle::SmoothColorMap, RenderStyle::Picking])])
            .unwrap();

        map.device_mut().paint_id(2, 6, 1);
        let ctrl = Modifiers { ctrl: true, ..Modifiers::default() };
        map.pointer_down(&PointerEvent::new(2.0, 1.0, PointerButton::Left).with_modifiers(ctrl));
        let report = map.render().unwrap();
        assert_eq!(
            report.picks,
            vec![LayerPick { layer: "zip".into(), outcome: PickOutcome::Object(Some(1)) }]
        );

        let zip = map.context().layers.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.last_picked_element(), Some(1));

        map.key_up("r");
        let zip = map.context().layers.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.last_picked_element(), None);
    }

    #[test]
    fn hidden_layers_do_not_queue_picks() {
        let mut map = map();
        let c = map.context().centroid();
        map.init_layers(vec![zips(c, vec![RenderStyle::SmoothColorMap, RenderStyle::Picking])])
            .unwrap();
        map.context_mut().layers.layers_mut()[0].as_layer_mut().set_visible(false);

        assert_eq!(map.pick(2.0, 1.0), 0);
        assert_eq!(map.pick_region((0.0, 0.0), (8.0, 8.0)), 0);

        map.context_mut().layers.layers_mut()[0].as_layer_mut().set_visible(true);
        map.device_mut().paint_id(2, 6, 1);
        let report = map.render().unwrap();
        assert!(report.picks.is_empty());
        assert_eq!(map.pick(2.0, 1.0), 1);
    }

    #[test]
    fn filter_brushing_commits_on_release() {
        let mut map = map();
        let c = map.context().centroid();
        map.init_layers(vec![zips(c, vec![RenderStyle::FlatColorMap, RenderStyle::Picking])])
            .unwrap();
        map.device_mut().paint_rect(PickRect { x: 0, y: 0, width: 8, height: 8 }, 0);

        let alt = Modifiers { alt: true, ..Modifiers::default() };
        map.pointer_down(&PointerEvent::new(0.0, 0.0, PointerButton::Right).with_modifiers(alt));
        map.pointer_move(&PointerEvent::new(0.0, 0.0, PointerButton::Right).with_modifiers(alt));
        map.pointer_move(&PointerEvent::new(8.0, 8.0, PointerButton::Right).with_modifiers(alt));
        map.render().unwrap();
        map.pointer_move(&PointerEvent::new(8.0, 8.0, PointerButton::Right));

        let bbox = map.context().layers.filter_bbox().unwrap();
        assert_eq!(bbox.to_array(), [c[0], c[1], c[0] + 1.0, c[1] + 1.0]);
        let zip = map.context().layers.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.mesh().filtered(), &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);

        map.key_up("q");
        assert!(map.context().layers.filter_bbox().is_none());
    }

    #[test]
    fn resize_uses_a_square_viewport() {
        let mut map = map();
        map.resize(300, 200);
        assert_eq!(map.context().camera.viewport(), (300, 200));
        assert!(map
            .device()
            .commands()
            .contains(&Command::SetViewport { width: 300, height: 300 }));
    }

    #[test]
    fn screen_center_maps_to_the_origin() {
        let mut map = map();
        map.resize(100, 100);
        let geo = map.screen_to_geo(50.0, 50.0).unwrap();
        assert!(geo.lat.abs() < 1e-6 && geo.lng.abs() < 1e-6, "{geo:?}");

        let origin = map.context().camera.origin();
        map.set_camera_position(origin.x + 5.0, origin.y);
        let eye = map.camera_state().eye;
        assert!((eye[0] - 5.0).abs() < 1e-6, "{eye:?}");
    }

    #[test]
    fn scene_file_builds_layers_and_knots() {
        let config = EngineConfig::from_json(
            r#"{
                "camera": {"origin": {"lat": 0, "lng": 0}, "eye": [0, 0, 1000], "lookAt": [0, 0, 0]},
                "viewport": [16, 8],
                "layers": [{"id": "voxels", "type": "VOXEL_LAYER"}]
            }"#,
        )
        .unwrap();
        let map = MapView::from_config(RecordingDevice::new(1, 1), config).unwrap();
        assert!(map.context().layers.is_empty());
        assert_eq!(map.screen().client, (16.0, 8.0));
    }
}
