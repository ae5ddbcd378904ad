use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::error;

use geosense::region::Governorate;
use geosense::request::ModuleKind;
use geosense::{init_default_config, print_run_summary, run_dashboard, utils, Args, Outcome};

fn print_catalogue() {
    println!("Governorates:");
    for governorate in Governorate::ALL {
        println!("- {} (GAUL: {})", governorate, governorate.gaul_name());
    }
    println!("\nModules:");
    for kind in ModuleKind::ALL {
        if let Some(value) = clap::ValueEnum::to_possible_value(&kind) {
            println!("- {}: {}", value.get_name(), kind.title());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);

    if args.init {
        let path = init_default_config(Path::new("."))?;
        println!("Created {} with default settings", path.display());
        return Ok(());
    }

    if args.list {
        print_catalogue();
        return Ok(());
    }

    utils::validate_args(&args)?;

    match run_dashboard(&args) {
        Ok(summary) => {
            print_run_summary(&summary);
            if matches!(summary.outcome, Outcome::Failure { .. }) {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
