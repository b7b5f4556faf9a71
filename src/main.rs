//! cosim-bridge: replay planner/compute-core traffic through one adapter

use std::env;
use std::path::Path;

use cosim_bridge::observe::{LogObserver, Observer};
use cosim_bridge::script::Script;
use cosim_bridge::{Config, CosimAdapter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let files: Vec<&str> = args
        .iter()
        .skip(1)
        .filter(|a| !a.starts_with('-'))
        .map(|s| s.as_str())
        .collect();

    let (config_path, script_path) = match files.as_slice() {
        [script] => (None, *script),
        [config, script] => (Some(Path::new(*config)), *script),
        _ => {
            eprintln!("Usage: {} [config.toml] <script.toml>", args[0]);
            eprintln!("       {} --sample-config", args[0]);
            if let Some(path) = Config::user_config_path() {
                eprintln!("User config: {}", path.display());
            }
            std::process::exit(2);
        }
    };

    let config = Config::load(config_path)?;
    let script = Script::from_file(Path::new(script_path))?;

    let mut adapter = CosimAdapter::with_observer(&config, LogObserver)?;
    let seen = script.run(&mut adapter)?;

    println!("Adapter: {} (core {})", adapter.name(), adapter.engine().core());
    println!("Events:  {}", adapter.engine().events().names().join(", "));
    println!();
    println!("Reports:");
    for entry in &seen {
        println!(
            "  [{:4}] {} -> {}",
            entry.cycle,
            entry.report.src,
            entry.report.dst.join(",")
        );
    }

    print_summary(&adapter);
    Ok(())
}

/// Print engine counters and anything still in flight.
fn print_summary<O: Observer>(adapter: &CosimAdapter<O>) {
    let engine = adapter.engine();
    let stats = engine.stats();

    println!();
    println!("Summary after {} cycles", adapter.cycle());
    println!("======================");
    println!("  Dispatches bound:  {}", stats.dispatches_bound);
    println!("  Config consumed:   {}", stats.config_consumed);
    println!("  Events consumed:   {}", stats.events_consumed);
    println!("  Reports emitted:   {}", stats.reports_emitted);
    println!("  Cliques created:   {}", stats.cliques_created);
    println!("  Cliques retired:   {}", stats.cliques_retired);

    if !engine.cliques().is_empty() {
        println!();
        println!("Cliques still pending:");
        for (_, clique) in engine.cliques().iter() {
            println!("  {:20} pending={} members={}", clique.name, clique.pending, clique.members.len());
        }
    }

    let busy: Vec<_> = engine
        .events()
        .iter()
        .filter(|(_, rec)| rec.job_tag.is_some())
        .map(|(_, rec)| rec.name.as_str())
        .collect();
    if !busy.is_empty() {
        println!();
        println!("Events still bound: {}", busy.join(", "));
    }
}
