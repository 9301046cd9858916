//! Prim stress test
//!
//! Headless run of the stage the way a script-heavy world drives it:
//! thousands of primitives spawned, animated, recoloured, rebuilt and
//! deleted every frame, with batch statistics logged as it goes.
//!
//! Usage: `prim_stress [--config stage.toml] [--frames 600] [--prims 5000]`

use clap::Parser;
use rand::Rng;
use stage_engine::foundation::logging;
use stage_engine::prelude::*;

const FRAME_DELTA: f32 = 1.0 / 60.0;
const COLORS: [&str; 6] = ["#ff4040", "#40ff40", "#4040ff", "gold", "hsl(280, 60%, 55%)", "rgb(0, 200, 200)"];

#[derive(Debug, thiserror::Error)]
enum StressError {
    #[error("config: {0}")]
    Config(#[from] stage_engine::config::ConfigError),
    #[error("node: {0}")]
    Node(#[from] stage_engine::scene::NodeError),
    #[error("stage: {0}")]
    Stage(#[from] StageError),
}

/// Headless primitive churn benchmark
#[derive(Debug, Parser)]
#[command(name = "prim_stress", version)]
struct Args {
    /// Stage configuration file (.toml or .ron)
    #[arg(short, long)]
    config: Option<String>,

    /// Frames to simulate
    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    /// Live primitives kept in the scene
    #[arg(short, long, default_value_t = 5_000)]
    prims: usize,
}

struct Spinner {
    node: NodeId,
    origin: Vec3,
    phase: f32,
}

/// Scripted behavior run from the frame hooks
struct StressScript {
    target: usize,
    spinners: Vec<Spinner>,
    time: f32,
    spawned: usize,
    removed: usize,
}

impl StressScript {
    fn new(target: usize) -> Self {
        Self {
            target,
            spinners: Vec::with_capacity(target),
            time: 0.0,
            spawned: 0,
            removed: 0,
        }
    }

    fn spawn(&mut self, world: &mut World, rng: &mut impl Rng) -> Result<(), StressError> {
        let kind = PrimitiveKind::ALL[rng.gen_range(0..PrimitiveKind::ALL.len())];
        let color = COLORS[rng.gen_range(0..COLORS.len())];
        let size = rng.gen_range(0.2..1.5);
        let mut prim = PrimNode::new(kind).with_size(&[size])?.with_color(color)?;
        if rng.gen_bool(0.05) {
            prim = prim.with_emissive(color, rng.gen_range(0.5..4.0))?;
        }
        let origin = Vec3::new(
            rng.gen_range(-60.0..60.0),
            rng.gen_range(0.0..20.0),
            rng.gen_range(-60.0..60.0),
        );
        let node = world.add(None, SceneNode::new(NodeKind::Prim(prim)))?;
        world.set_position(node, origin)?;
        self.spinners.push(Spinner {
            node,
            origin,
            phase: rng.gen_range(0.0..std::f32::consts::TAU),
        });
        self.spawned += 1;
        Ok(())
    }

    fn churn(&mut self, world: &mut World, rng: &mut impl Rng) -> Result<(), StressError> {
        while self.spinners.len() < self.target {
            self.spawn(world, rng)?;
        }
        if self.spinners.is_empty() {
            return Ok(());
        }

        for spinner in self.spinners.iter().step_by(3) {
            let bob = (self.time * 2.0 + spinner.phase).sin();
            world.set_position(spinner.node, spinner.origin + Vec3::new(0.0, bob, 0.0))?;
        }

        for _ in 0..20 {
            let spinner = &self.spinners[rng.gen_range(0..self.spinners.len())];
            world.set_prim_color(spinner.node, COLORS[rng.gen_range(0..COLORS.len())])?;
        }

        for _ in 0..5 {
            let spinner = &self.spinners[rng.gen_range(0..self.spinners.len())];
            let kind = PrimitiveKind::ALL[rng.gen_range(0..PrimitiveKind::ALL.len())];
            world.set_prim_kind(spinner.node, kind.as_str())?;
        }

        for _ in 0..self.spinners.len().min(10) {
            let index = rng.gen_range(0..self.spinners.len());
            let spinner = self.spinners.swap_remove(index);
            world.remove(spinner.node)?;
            self.removed += 1;
        }
        Ok(())
    }
}

struct Hooks {
    script: StressScript,
    rng: rand::rngs::ThreadRng,
    error: Option<StressError>,
}

impl FrameHooks for Hooks {
    fn update(&mut self, world: &mut World, delta: f32) {
        self.script.time += delta;
        if self.error.is_none() {
            if let Err(err) = self.script.churn(world, &mut self.rng) {
                self.error = Some(err);
            }
        }
    }
}

fn run(args: &Args) -> Result<(), StressError> {
    let config = match &args.config {
        Some(path) => StageConfig::load_from_file(path)?,
        None => StageConfig::default(),
    };
    let (frames, prims) = (args.frames, args.prims);

    log::info!("Running {} frames with {} prims", frames, prims);
    let mut world = World::new(config)?;
    world.stage_mut().set_viewport(Some(Viewport::new(1280.0, 720.0)));
    world.stage_mut().camera_mut().position = Vec3::new(0.0, 40.0, 120.0);

    let mut hooks = Hooks {
        script: StressScript::new(prims),
        rng: rand::thread_rng(),
        error: None,
    };

    let started = std::time::Instant::now();
    for _ in 0..frames {
        let report = world.tick(FRAME_DELTA, &mut hooks);
        if let Some(err) = hooks.error.take() {
            return Err(err);
        }
        if report.frame % 60 == 0 {
            let stats = world.stage().stats();
            log::info!(
                "frame {}: {} instances in {} draw calls ({} batches), {} triangles, {} rebuilt, {} moved",
                report.frame,
                stats.instances,
                stats.draw_calls,
                stats.batches,
                stats.triangles,
                report.update.rebuilt,
                report.update.moved
            );
            let hits = world.raycast_reticle(None, 0.0, f32::INFINITY)?;
            if let Some(hit) = hits.first() {
                log::debug!("Reticle hit {:?} at {:.2}", hit.node, hit.distance);
            }
        }
    }

    let elapsed = started.elapsed();
    log::info!(
        "Done: {} spawned, {} removed, {:.2} ms/frame",
        hooks.script.spawned,
        hooks.script.removed,
        elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64
    );
    world.destroy();
    Ok(())
}

fn main() {
    let args = Args::parse();
    logging::init_with_level(log::LevelFilter::Info);
    if let Err(err) = run(&args) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["prim_stress"]).unwrap();
        assert!(args.config.is_none());
        assert_eq!(args.frames, 600);
        assert_eq!(args.prims, 5_000);
    }

    #[test]
    fn test_args_overrides() {
        let args =
            Args::try_parse_from(["prim_stress", "--config", "stage.ron", "--frames", "10", "-p", "50"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("stage.ron"));
        assert_eq!(args.frames, 10);
        assert_eq!(args.prims, 50);
    }

    #[test]
    fn test_args_reject_non_numeric_frames() {
        assert!(Args::try_parse_from(["prim_stress", "--frames", "many"]).is_err());
    }

    #[test]
    fn test_short_run_churns_prims() {
        let args = Args::try_parse_from(["prim_stress", "--frames", "3", "--prims", "40"]).unwrap();
        assert!(run(&args).is_ok());
    }
}
