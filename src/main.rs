//! Demo runner for the encrypted matmul, convolution and activation programs

use ckks_tensor::{
    CkksParameters, Error, Pipeline, PipelineConfig, SecurityLevel, ToleranceReport, Tolerances,
    Workload,
};
use clap::{Args, Parser, Subcommand};
use log::error;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Encrypted tensor evaluation over RNS-CKKS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// [[1,2],[3,4]] times [[5,6],[7,8]]
    Matmul,
    /// 3x3 input convolved with a 2x2 identity-like kernel
    Conv,
    /// Convolution followed by square and SiLU surrogates
    Activation,
    /// Every program, one after the other
    All,
}

/// Flags that replace the per-program defaults.
#[derive(Args, Debug)]
struct Overrides {
    /// Multiplicative depth
    #[arg(long, global = true)]
    depth: Option<usize>,

    /// Bits of the scaling primes (and of the fixed-point scale)
    #[arg(long, global = true)]
    scale_bits: Option<u32>,

    /// Bits of the first prime
    #[arg(long, global = true)]
    first_mod_bits: Option<u32>,

    /// Ring dimension; derived from the security level when absent
    #[arg(long, global = true)]
    ring_dim: Option<usize>,

    /// Slot count; validated against N/2
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// 128, 192, 256 or none
    #[arg(long, global = true)]
    security: Option<SecurityLevel>,

    /// Absolute tolerance for every comparison
    #[arg(long, global = true)]
    tolerance: Option<f64>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,
}

impl Overrides {
    fn config(&self, workload: &Workload) -> PipelineConfig {
        let defaults = workload.default_parameters();
        let params = CkksParameters {
            multiplicative_depth: self.depth.unwrap_or(defaults.multiplicative_depth),
            scaling_mod_size: self.scale_bits.unwrap_or(defaults.scaling_mod_size),
            first_mod_size: self.first_mod_bits.unwrap_or(defaults.first_mod_size),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            ring_dim: self.ring_dim.or(defaults.ring_dim),
            security_level: self.security.unwrap_or(defaults.security_level),
        };
        let tolerances = self.tolerance.map_or_else(Tolerances::default, Tolerances::uniform);
        PipelineConfig { params, tolerances }
    }
}

fn workloads(command: Command) -> Result<Vec<Workload>, Error> {
    Ok(match command {
        Command::Matmul => vec![Workload::matmul_example()?],
        Command::Conv => vec![Workload::convolution_example()?],
        Command::Activation => vec![Workload::activation_example()?],
        Command::All => vec![
            Workload::matmul_example()?,
            Workload::convolution_example()?,
            Workload::activation_example()?,
        ],
    })
}

fn run(cli: &Cli) -> Result<Vec<ToleranceReport>, Error> {
    let mut reports = Vec::new();
    for workload in workloads(cli.command)? {
        let config = cli.overrides.config(&workload);
        let start = Instant::now();
        let run = Pipeline::new(config).run(&workload)?;
        if !cli.overrides.json {
            for report in &run {
                println!("{report}\n");
            }
            println!("{} finished in {:?}\n", workload.name(), start.elapsed());
        }
        reports.extend(run);
    }
    Ok(reports)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let reports = match run(&cli) {
        Ok(reports) => reports,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.overrides.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        }
    }

    let passed = reports.iter().all(ToleranceReport::success);
    if !cli.overrides.json {
        println!("{}", if passed { "PASS" } else { "FAIL" });
    }
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
