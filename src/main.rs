//! Upgrade Search CLI - Search for an upgrade path from a JSON run file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use upgrade_search::{
    evolution::{SearchEngine, from_definition},
    schema::{
        ComponentDefinition, EvaluatorDefinition, RunFile, SearchConfig, SourceDefinition,
        SystemDefinition,
    },
    system::Goal,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <run.json> [max_generations] [--csv <path>] [--checkout]",
            args[0]
        );
        eprintln!();
        eprintln!("Search for a sequence of upgrades that takes every component of a");
        eprintln!("system to its newest version.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json         System definition, search settings and evaluator");
        eprintln!("  max_generations  Override the generation budget");
        eprintln!("  --csv <path>     Write every plan's score per generation");
        eprintln!("  --checkout       Check out the best plan's final configuration");
        eprintln!();
        eprintln!("Example run file is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_run();
        return;
    }

    let run_path = PathBuf::from(&args[1]);
    let mut max_generations: Option<usize> = None;
    let mut csv_path: Option<PathBuf> = None;
    let mut checkout = false;

    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--csv" => match rest.next() {
                Some(path) => csv_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--csv needs a path");
                    std::process::exit(1);
                }
            },
            "--checkout" => checkout = true,
            other => match other.parse() {
                Ok(n) => max_generations = Some(n),
                Err(_) => {
                    eprintln!("Unexpected argument: {other}");
                    std::process::exit(1);
                }
            },
        }
    }

    // Load run file
    let run_str = fs::read_to_string(&run_path).unwrap_or_else(|e| {
        eprintln!("Error reading run file: {}", e);
        std::process::exit(1);
    });

    let mut run: RunFile = serde_json::from_str(&run_str).unwrap_or_else(|e| {
        eprintln!("Error parsing run file: {}", e);
        std::process::exit(1);
    });
    if let Some(n) = max_generations {
        run.search.population.max_generations = n;
    }

    // Resolve the system
    let start = run.system.build().unwrap_or_else(|e| {
        eprintln!("Error loading system: {}", e);
        std::process::exit(1);
    });
    let goal = Goal::latest_version(&start).unwrap_or_else(|e| {
        eprintln!("Error deriving goal: {}", e);
        std::process::exit(1);
    });
    let start = Arc::new(start);
    let goal = Arc::new(goal);

    println!("Upgrade Search");
    println!("==============");
    for (component, target) in start.components().iter().zip(goal.target().components()) {
        println!(
            "  {}: {} -> {} ({} versions)",
            component.name(),
            component.version_id().unwrap_or("?"),
            target.version_id().unwrap_or("?"),
            component.version_count()
        );
    }
    println!("Population: {}", run.search.population.size);
    println!("Generations: {}", run.search.population.max_generations);
    println!();

    let evaluator = from_definition(&run.evaluator, Arc::clone(&start), Arc::clone(&goal));
    let mut engine = SearchEngine::new(Arc::clone(&start), goal, run.search, evaluator)
        .unwrap_or_else(|e| {
            eprintln!("Error creating search: {}", e);
            std::process::exit(1);
        });
    println!("Seed: {}", engine.seed());

    let result = engine
        .run_with_callback(|progress| {
            println!(
                "  Generation {}/{}: best={:.4}, avg={:.4}, worst={:.4}, variance={:.4}",
                progress.generation,
                progress.max_generations,
                progress.generation_best,
                progress.avg_score,
                progress.worst_score,
                progress.variance
            );
        })
        .unwrap_or_else(|e| {
            eprintln!("Search failed: {}", e);
            std::process::exit(1);
        });

    println!();
    println!("Stopped: {:?}", result.stats.stop_reason);
    println!("Best score: {:.4}", result.stats.best_score);
    println!(
        "Evaluations: {} in {:.2}s ({:.1}/s)",
        result.stats.total_evaluations,
        result.stats.elapsed_seconds,
        result.stats.evaluations_per_second
    );
    println!();
    match serde_json::to_string_pretty(&result.best) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing best plan: {}", e),
    }

    if let Some(path) = csv_path {
        let written = File::create(&path)
            .and_then(|file| result.history.write_csv(BufWriter::new(file)));
        if let Err(e) = written {
            eprintln!("Error writing {}: {}", path.display(), e);
            std::process::exit(1);
        }
        println!("Scores written to {}", path.display());
    }

    if checkout {
        let Some(end) = result.best.steps.last() else {
            eprintln!("Best plan has no steps");
            std::process::exit(1);
        };
        let mut config = (*start).clone();
        if let Err(e) = config.restore(end).and_then(|_| config.materialize()) {
            eprintln!("Error checking out best plan: {}", e);
            std::process::exit(1);
        }
        println!("Checked out the best plan's final configuration");
    }
}

fn print_example_run() {
    let inline = |name: &str, versions: &[&str]| ComponentDefinition {
        name: name.to_string(),
        source: SourceDefinition::Inline {
            versions: versions.iter().map(|v| v.to_string()).collect(),
        },
        installed: true,
        start_version: None,
    };

    let run = RunFile {
        system: SystemDefinition {
            components: vec![
                inline("zlib", &["1.2.11", "1.2.12", "1.2.13", "1.3", "1.3.1"]),
                inline("openssl", &["1.1.1", "3.0.0", "3.1.0", "3.2.0"]),
            ],
        },
        search: SearchConfig {
            random_seed: Some(42),
            ..Default::default()
        },
        evaluator: EvaluatorDefinition::Command {
            program: "./build-and-test.sh".to_string(),
            args: Vec::new(),
        },
    };

    println!("Example run file (run.json):");
    match serde_json::to_string_pretty(&run) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
