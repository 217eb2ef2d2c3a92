use anyhow::Result;
use bioelectric_common::SimulationConfig;
use bioelectric_engine::{export_series, export_vm_csv, RunKind, Simulator};
use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// Initialize the tissue and equilibrate it.
    Init,
    /// Continue from the cached init phase.
    Sim,
    /// Init followed by sim.
    Both,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulation configuration (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Which phases to run
    #[arg(short, long, value_enum, default_value_t = RunMode::Both)]
    run: RunMode,

    /// Directory for exported time series
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("Simulation failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    info!("Starting bioelectric simulation engine...");
    let config = SimulationConfig::load(&args.config)?;
    let params = config.get_sim_params();
    debug!("Simulation parameters: {:#?}", params);

    let cache_dir = PathBuf::from(&config.output.cache_dir);
    let start_time = Instant::now();
    let mut sim = Simulator::new(params)?;

    if matches!(args.run, RunMode::Init | RunMode::Both) {
        sim.initialize()?;
        run_phase(&mut sim, RunKind::Init, &config, &cache_dir, &args.output_dir)?;
    }

    if matches!(args.run, RunMode::Sim | RunMode::Both) {
        if config.timing.sim_tsteps == 0 {
            warn!("timing.sim_tsteps is 0; skipping the sim phase.");
        } else {
            sim.load_init(&cache_dir)?;
            run_phase(&mut sim, RunKind::Sim, &config, &cache_dir, &args.output_dir)?;
        }
    }

    info!("All phases finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn run_phase(
    sim: &mut Simulator,
    kind: RunKind,
    config: &SimulationConfig,
    cache_dir: &Path,
    output_dir: &Path,
) -> Result<()> {
    sim.run_loop(kind)?;
    sim.save(cache_dir, kind)?;

    info!("Saving recorded data...");
    export_series(sim.series(), &config.output, output_dir, kind)?;
    if config.output.save_vm_csv {
        let path = output_dir.join(format!("{}_{}_vm.csv", config.output.base_filename, kind));
        export_vm_csv(sim.series(), &path)?;
    }
    Ok(())
}
