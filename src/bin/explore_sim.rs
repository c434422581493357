//! Exploration simulation
//!
//! Runs the planner in a box-shaped world with spherical obstacles. The agent
//! observes everything within its sensor range, executes the first segment of
//! the best branch and replans from there.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=info cargo run --bin explore_sim -- config/explore_sim.toml
//! ```

use std::path::Path;

use log::{info, warn};

use active_planner::maps::SphereWorld;
use active_planner::{ModuleArgs, ModuleFactory, NextStep, Planner, PlannerConfig, PlanningResult, Position, TrajectoryPoint};

const SENSOR_RANGE: f64 = 3.0;
const MAX_STEPS: usize = 60;
const WORLD_MIN: [f64; 3] = [0.0, 0.0, 0.0];
const WORLD_MAX: [f64; 3] = [20.0, 20.0, 4.0];

fn default_config() -> PlannerConfig {
    PlannerConfig {
        min_new_segments: 20,
        max_new_segments: 200,
        expand_batch: 5,
        trajectory_generator: ModuleArgs::of_type("rrt_star")
            .with("max_extension_range", 1.5)
            .with("seed", 11_i64)
            .with_module(
                "bounding_volume",
                ModuleArgs::of_type("box").with("min", WORLD_MIN.to_vec()).with("max", WORLD_MAX.to_vec()),
            )
            .with_module("generator_updater", ModuleArgs::of_type("recheck_collision")),
        trajectory_evaluator: ModuleArgs::of_type("rrt_star_adapter").with_module(
            "following_evaluator",
            ModuleArgs::of_type("simple")
                .with("sensor_range", SENSOR_RANGE)
                .with("cost_weight", 0.5)
                .with("value_model", "exponential")
                .with("reevaluate", true),
        ),
        ..Default::default()
    }
}

fn build_world() -> SphereWorld {
    let mut world = SphereWorld::new(SENSOR_RANGE);
    let obstacles = [
        ([5.0, 5.0, 2.0], 1.5),
        ([12.0, 4.0, 1.0], 2.0),
        ([8.0, 13.0, 2.0], 2.5),
        ([16.0, 15.0, 2.0], 1.0),
    ];
    for (center, radius) in obstacles {
        world.add_obstacle(Position::from(center), radius);
    }
    world
}

/// Fraction of free lattice cells of the world that have been observed
fn coverage(world: &SphereWorld, resolution: f64) -> f64 {
    let mut total = 0usize;
    let mut seen = 0usize;
    let mut x = WORLD_MIN[0];
    while x <= WORLD_MAX[0] {
        let mut y = WORLD_MIN[1];
        while y <= WORLD_MAX[1] {
            let mut z = WORLD_MIN[2];
            while z <= WORLD_MAX[2] {
                let p = Position::new(x, y, z);
                if world.obstacle_distance(&p) > 0.0 {
                    total += 1;
                    if world.is_observed(&p) {
                        seen += 1;
                    }
                }
                z += resolution;
            }
            y += resolution;
        }
        x += resolution;
    }
    if total == 0 {
        return 0.0;
    }
    seen as f64 / total as f64
}

fn main() -> PlanningResult<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = if args.len() > 1 {
        info!("Loading configuration from {}", args[1]);
        PlannerConfig::from_file(Path::new(&args[1]))?
    } else {
        info!("Using default configuration");
        default_config()
    };

    let mut world = build_world();
    let mut current = TrajectoryPoint::from_xyz(1.0, 1.0, 1.0);
    world.observe(current.position, SENSOR_RANGE);

    let mut planner = Planner::new(config, ModuleFactory::with_defaults(), current)?;
    let mut travelled = 0.0;

    for step in 0..MAX_STEPS {
        let cycles = planner.run_until_ready(&world, &current.position)?;
        match planner.request_next(&world, &current)? {
            NextStep::Execute(trajectory) => {
                for point in &trajectory {
                    world.observe(point.position, SENSOR_RANGE);
                }
                if let Some(last) = trajectory.last() {
                    travelled += (last.position - current.position).norm();
                    current = last.at_start();
                }
                info!(
                    "step {:>3}: {} cycles, tree {:>3}, at ({:.1}, {:.1}, {:.1}), coverage {:.1}%",
                    step,
                    cycles,
                    planner.tree().len(),
                    current.position.x,
                    current.position.y,
                    current.position.z,
                    100.0 * coverage(&world, 0.5)
                );
            }
            NextStep::Replan => warn!("step {:>3}: nothing to execute, replanning", step),
        }
    }

    println!(
        "Explored {:.1}% of the free space in {} steps, travelled {:.1}m",
        100.0 * coverage(&world, 0.5),
        MAX_STEPS,
        travelled
    );
    Ok(())
}
