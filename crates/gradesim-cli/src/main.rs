use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gradesim::{SimTime, SimulationOutcome};
use grader::{generate, population_rng, run_network, NetworkConfig, Topology, TopologyKind};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gradesim",
    about = "Discrete-event simulation of an automated grading pipeline",
    version
)]
struct Cli {
    /// Log every commit transition (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one network and print its metrics.
    Run {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Print the snapshot as JSON instead of key=value lines.
        #[arg(long)]
        json: bool,
        /// Print every sample row as a JSON line after the metrics.
        #[arg(long)]
        trace: bool,
    },
    /// Perform determinism qualification: run the same scenario repeatedly
    /// and compare the observations.
    Check {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Number of identical runs to compare.
        #[arg(long, default_value_t = 2)]
        runs: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TopologyArg {
    Unbounded,
    Bounded,
    Backup,
    Regulated,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Network JSON file; replaces every network flag below.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = TopologyArg::Unbounded)]
    topology: TopologyArg,
    /// Number of test servers.
    #[arg(long, default_value_t = 4)]
    servers: usize,
    /// Test duration in ticks.
    #[arg(long, default_value_t = 6)]
    process_time: SimTime,
    /// Result delivery duration in ticks.
    #[arg(long, default_value_t = 2)]
    result_time: SimTime,
    /// Failed submissions allowed per rate-limit window.
    #[arg(long, default_value_t = 5)]
    tag_limit: usize,
    /// Exercises each user must pass.
    #[arg(long, default_value_t = 5)]
    exercises: u32,
    /// Test stage capacity.
    #[arg(long, default_value_t = 10)]
    ks: usize,
    /// Result stage capacity.
    #[arg(long, default_value_t = 5)]
    kf: usize,
    /// Dam closing duration in ticks.
    #[arg(long, default_value_t = 60)]
    tb: SimTime,
    /// Enforce the dam on the fast population.
    #[arg(long)]
    block: bool,
    /// Number of users.
    #[arg(long, default_value_t = 50)]
    users: usize,
    /// Share of the fast population.
    #[arg(long, default_value_t = 0.5)]
    ratio: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Stop at this tick instead of waiting for every user to finish.
    #[arg(long)]
    until: Option<SimTime>,
}

impl ScenarioArgs {
    fn network(&self) -> Result<NetworkConfig> {
        if let Some(path) = &self.config {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading network config {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("parsing network config {}", path.display()));
        }

        let (ks, kf, tb) = (self.ks, self.kf, self.tb);
        let topology = match self.topology {
            TopologyArg::Unbounded => TopologyKind::Unbounded,
            TopologyArg::Bounded => TopologyKind::Bounded { ks, kf },
            TopologyArg::Backup => TopologyKind::Backup { ks, kf },
            TopologyArg::Regulated => TopologyKind::Regulated {
                ks,
                kf,
                tb,
                block_option: self.block,
            },
        };
        Ok(NetworkConfig {
            servers: self.servers,
            process_time: self.process_time,
            result_time: self.result_time,
            tag_limit: self.tag_limit,
            nb_exos: self.exercises,
            topology,
        })
    }

    fn simulate(&self) -> Result<SimulationOutcome<Topology>> {
        let network = self.network()?;
        let users = generate(self.users, self.ratio, &mut population_rng(self.seed))?;
        Ok(run_network(network, users, self.seed, self.until)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            scenario,
            json,
            trace,
        } => handle_run(&scenario, json, trace),
        Commands::Check { scenario, runs } => handle_check(&scenario, runs),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_run(scenario: &ScenarioArgs, json: bool, trace: bool) -> Result<()> {
    let outcome = scenario.simulate()?;
    let snapshot = outcome.observe();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let network = &outcome.config.system_config.network;
        println!("seed={}", outcome.config.seed);
        println!("topology={}", network.topology.label());
        println!("users={}", outcome.system.users().len());
        println!("finished_at={}", outcome.summary.finished_at);
        println!("events={}", outcome.summary.events);
        println!("all_finished={}", outcome.system.all_finished());
        println!("total_requests={}", snapshot.total_requests);
        println!("throughput={:.6}", snapshot.throughput);
        for (stage, stats) in [
            ("test", &snapshot.test_queue),
            ("result", &snapshot.result_queue),
        ] {
            println!("{stage}.avg_length={:.4}", stats.avg_length);
            println!("{stage}.var_length={:.4}", stats.var_length);
            println!("{stage}.max_length={}", stats.max_length);
            println!("{stage}.avg_utilization={:.4}", stats.avg_utilization);
            println!("{stage}.var_utilization={:.4}", stats.var_utilization);
            println!("{stage}.blocking_rate={:.4}", stats.blocking_rate);
        }
        let sojourn = &snapshot.sojourn_times;
        for (stage, spread) in [
            ("test", &sojourn.test_queue),
            ("result", &sojourn.result_queue),
            ("total", &sojourn.total),
        ] {
            println!(
                "sojourn.{stage}={{avg: {:.2}, var: {:.2}, min: {}, max: {}}}",
                spread.avg, spread.var, spread.min, spread.max
            );
        }
        for (population, spread) in &snapshot.sojourn_by_population {
            println!("sojourn.{population:?}.avg={:.2}", spread.avg);
        }
        println!("backup.stored={}", snapshot.backup.stored);
        println!("backup.avg_length={:.4}", snapshot.backup.avg_length);
        println!("backup.max_length={}", snapshot.backup.max_length);
        println!("dam_deferrals={}", snapshot.dam_deferrals);
        println!("status=ok");
    }

    if trace {
        for sample in outcome.system.metrics().samples() {
            println!("{}", serde_json::to_string(sample)?);
        }
    }
    Ok(())
}

fn handle_check(scenario: &ScenarioArgs, runs: usize) -> Result<()> {
    if runs < 2 {
        bail!("determinism qualification needs at least two runs, got {runs}");
    }

    let reference = scenario.simulate()?;
    let expected = reference.observe();
    for run in 1..runs {
        let outcome = scenario.simulate()?;
        let consistent = outcome.summary == reference.summary
            && outcome.observe() == expected
            && outcome.system.metrics().samples() == reference.system.metrics().samples();
        if !consistent {
            println!("seed={}", scenario.seed);
            println!("diverged_at_run={run}");
            println!("status=nondeterministic");
            bail!("run {run} diverged from the reference run");
        }
        info!(run, "run matches reference");
    }

    println!("seed={}", scenario.seed);
    println!("runs={runs}");
    println!("events={}", reference.summary.events);
    println!("status=deterministic");
    Ok(())
}
