//! Auto-evo CLI - Evolve a world described in JSON.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use auto_evo::{AutoEvo, AutoEvoConfig, Collaborators, PatchMap, Run, WorldDescription};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <world.json> [generations]", args[0]);
        eprintln!();
        eprintln!("Run auto-evo on a world described in JSON.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  world.json   Path to world description file");
        eprintln!("  generations  Number of auto-evo runs to apply (default: 1)");
        eprintln!();
        eprintln!("Settings are read from <world>.config.json when present.");
        eprintln!("Example world is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_world();
        return;
    }

    let world_path = PathBuf::from(&args[1]);
    let generations: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);

    let world_str = fs::read_to_string(&world_path).unwrap_or_else(|e| {
        eprintln!("Error reading world file: {}", e);
        std::process::exit(1);
    });

    let description: WorldDescription = serde_json::from_str(&world_str).unwrap_or_else(|e| {
        eprintln!("Error parsing world: {}", e);
        std::process::exit(1);
    });

    let world = description.build().unwrap_or_else(|e| {
        eprintln!("Invalid world: {}", e);
        std::process::exit(1);
    });

    let config_path = world_path.with_extension("config.json");
    let config = if config_path.exists() {
        AutoEvoConfig::from_json_file(&config_path).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        })
    } else {
        AutoEvoConfig::default()
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    println!("Auto-evo");
    println!("========");
    println!("Species: {}", world.species.len());
    println!("Patches: {}", world.map.len());
    println!("Generations: {}", generations);
    println!();

    let map = Arc::new(world.map);
    print_populations(&map);

    let collaborators = Collaborators::with_defaults(&config);
    let scheduler = AutoEvo::new(&config).unwrap_or_else(|e| {
        eprintln!("Error starting auto-evo: {}", e);
        std::process::exit(1);
    });

    let start = Instant::now();

    for generation in 1..=generations {
        let run = Arc::new(
            Run::standard(Arc::clone(&map), &collaborators, &config)
                .with_label(format!("generation {generation}")),
        );
        if let Err(e) = scheduler.enqueue(Arc::clone(&run)) {
            eprintln!("Error queuing run: {}", e);
            std::process::exit(1);
        }

        let mut last_status = String::new();
        while run.in_progress() {
            let status = scheduler.status_string();
            if status != last_status {
                println!("  [{}] {}", run.label(), status);
                last_status = status;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let Some(results) = run.take_results() else {
            eprintln!("Run {} did not finish: {}", run.label(), run.status_string());
            std::process::exit(1);
        };

        println!();
        println!("Generation {}:", generation);
        for line in results.make_summary(Some(&map)).lines() {
            println!("  {}", line);
        }
        results.apply_results(&map, collaborators.applier.as_ref(), false);
        println!();
    }

    let elapsed = start.elapsed();

    print_populations(&map);
    println!(
        "Time: {:.2}s ({:.2}s per generation)",
        elapsed.as_secs_f32(),
        elapsed.as_secs_f32() / generations.max(1) as f32
    );
}

fn print_populations(map: &PatchMap) {
    println!("Populations:");
    for patch in map.patches() {
        println!("  {} (#{}):", patch.name(), patch.id());
        let populations = patch.populations();
        if populations.is_empty() {
            println!("    (empty)");
        }
        for (species, population) in populations {
            println!("    {}: {}", species, population);
        }
    }
    println!();
}

fn print_example_world() {
    let world = WorldDescription::default();
    let json = serde_json::to_string_pretty(&world).unwrap_or_else(|e| {
        eprintln!("Error serializing example world: {}", e);
        std::process::exit(1);
    });
    println!("{}", json);
}
