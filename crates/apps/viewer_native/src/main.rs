mod wgpu_device;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use foundation::math::{project, unproject, world_unit_meters};
use gpu::{RecordingDevice, RenderDevice};
use layers::Layer;
use mapview::{EngineConfig, FrameReport, MapView};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::wgpu_device::WgpuDevice;

#[derive(Parser)]
#[command(name = "viewer_native", about = "Render map scenes headlessly and inspect the projection")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a scene file, render it and print what was drawn and picked.
    Render {
        scene: PathBuf,
        #[arg(long, value_enum, default_value_t = Backend::Recording)]
        backend: Backend,
        #[arg(long, default_value_t = 1)]
        frames: u32,
        /// Object pick at a CSS pixel, `X,Y`.
        #[arg(long, value_parser = parse_point)]
        pick: Option<(f64, f64)>,
        /// Brushing rectangle between a pointer and an anchor, `X,Y,AX,AY`.
        #[arg(long, value_parser = parse_region)]
        region: Option<[f64; 4]>,
    },
    /// Latitude/longitude to world coordinates.
    #[command(allow_negative_numbers = true)]
    Project { lat: f64, lng: f64 },
    /// World coordinates to latitude/longitude.
    #[command(allow_negative_numbers = true)]
    Unproject { x: f64, y: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Backend {
    Recording,
    Wgpu,
}

fn parse_numbers(raw: &str, expected: usize) -> Result<Vec<f64>, String> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(format!("expected {expected} comma-separated numbers, got {}", values.len()));
    }
    Ok(values)
}

fn parse_point(raw: &str) -> Result<(f64, f64), String> {
    let v = parse_numbers(raw, 2)?;
    Ok((v[0], v[1]))
}

fn parse_region(raw: &str) -> Result<[f64; 4], String> {
    let v = parse_numbers(raw, 4)?;
    Ok([v[0], v[1], v[2], v[3]])
}

struct RenderRequest {
    frames: u32,
    pick: Option<(f64, f64)>,
    region: Option<[f64; 4]>,
}

fn render<D: RenderDevice>(
    mut map: MapView<D>,
    request: &RenderRequest,
    draw_calls: impl Fn(&D) -> usize,
) -> Result<(), Box<dyn Error>> {
    println!("layers: {}", map.context().layers.len());
    for layer in map.context().layers.layers() {
        let layer = layer.as_layer();
        println!(
            "  {} ({}) z={} coords={} visible={}",
            layer.id(),
            layer.kind(),
            layer.z_order(),
            layer.mesh().total_number_of_coords(),
            layer.is_visible()
        );
    }

    if let Some((x, y)) = request.pick {
        let layers = map.pick(x, y);
        info!(x, y, layers, "object pick queued");
    }
    if let Some([x, y, ax, ay]) = request.region {
        let layers = map.pick_region((x, y), (ax, ay));
        info!(layers, "region pick queued");
    }

    let mut last = FrameReport::default();
    for _ in 0..request.frames.max(1) {
        last = map.render()?;
    }
    if request.region.is_some() {
        map.apply_brushing();
    }

    println!("frames: {}", request.frames.max(1));
    println!("draw calls: {}", draw_calls(map.device()));
    println!("layers drawn (last frame): {}", last.layers_drawn);
    for failed in &last.failed_layers {
        println!("  failed: {failed}");
    }
    for pick in &last.picks {
        println!("pick {}: {:?}", pick.layer, pick.outcome);
    }
    let camera = map.camera_state();
    println!(
        "camera: eye={:?} look_at={:?} origin=({}, {})",
        camera.eye, camera.look_at, camera.origin.lat, camera.origin.lng
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            scene,
            backend,
            frames,
            pick,
            region,
        } => {
            let config = EngineConfig::load(&scene)?;
            info!(scene = %scene.display(), ?backend, layers = config.layers.len(), "scene loaded");
            let [width, height] = config.viewport;
            let request = RenderRequest { frames, pick, region };
            match backend {
                Backend::Recording => {
                    let map = MapView::from_config(RecordingDevice::new(width, height), config)?;
                    render(map, &request, |d| d.draws().len())?;
                }
                Backend::Wgpu => {
                    let map = MapView::from_config(WgpuDevice::new(width, height)?, config)?;
                    render(map, &request, |d| d.draw_count() as usize)?;
                }
            }
        }
        Command::Project { lat, lng } => {
            let p = project(lat, lng);
            println!("{} {}", p.x, p.y);
            println!("meters per world unit: {}", world_unit_meters(lat));
        }
        Command::Unproject { x, y } => {
            let p = unproject(x, y);
            println!("{} {}", p.lat, p.lng);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_point, parse_region};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_pick_arguments() {
        assert_eq!(parse_point("12, 4.5").unwrap(), (12.0, 4.5));
        assert_eq!(parse_region("0,0,8,8").unwrap(), [0.0, 0.0, 8.0, 8.0]);
        assert!(parse_point("1,2,3").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }
}
