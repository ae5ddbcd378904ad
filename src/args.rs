use clap::Parser;
use std::path::PathBuf;

use crate::request::{parse_month, ModuleKind, Pollutant, SpectralIndex};

#[derive(Parser, Debug)]
#[command(
    name = "geosense",
    about = "Earth Engine satellite dashboard for Jordanian governorates",
    version,
    long_about = None
)]
pub struct Args {
    /// Governorate to analyze (see --list)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Year of observation (defaults to last month's year)
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Month as a number or English name (defaults to last month)
    #[arg(short, long, value_parser = parse_month)]
    pub month: Option<u32>,

    /// Analysis module to run
    #[arg(long, value_enum, default_value_t = ModuleKind::Terrain)]
    pub module: ModuleKind,

    /// Pollutant for the air-quality module
    #[arg(long, value_enum)]
    pub pollutant: Option<Pollutant>,

    /// Spectral index for the indices module
    #[arg(long, value_enum)]
    pub index: Option<SpectralIndex>,

    /// Also chart the monthly series for the whole year
    #[arg(long)]
    pub time_series: bool,

    /// Write a PDF report, optionally into DIR
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    pub report: Option<Option<PathBuf>>,

    /// Write an HTML map viewer with the result layers
    #[arg(long, value_name = "PATH")]
    pub map: Option<PathBuf>,

    /// Service-account key file
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Service-account key JSON content
    #[arg(long, env = "GEE_JSON", hide_env_values = true, hide = true)]
    pub credentials_json: Option<String>,

    /// Path to a configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Initialize geosense.toml with default settings
    #[arg(long)]
    pub init: bool,

    /// List governorates and modules
    #[arg(long)]
    pub list: bool,

    /// Number of worker threads for the monthly series
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_dir_is_optional() {
        let args = Args::parse_from(["geosense", "-r", "Amman", "--report"]);
        assert_eq!(args.report, Some(None));

        let args = Args::parse_from(["geosense", "-r", "Amman", "--report", "out"]);
        assert_eq!(args.report, Some(Some(PathBuf::from("out"))));

        let args = Args::parse_from(["geosense", "-r", "Amman"]);
        assert_eq!(args.report, None);
        assert_eq!(args.module, ModuleKind::Terrain);
    }

    #[test]
    fn module_options_parse() {
        let args = Args::parse_from([
            "geosense",
            "--region",
            "Zarqa",
            "--month",
            "Aug",
            "--module",
            "air-quality",
            "--pollutant",
            "so2",
        ]);
        assert_eq!(args.month, Some(8));
        assert_eq!(args.module, ModuleKind::AirQuality);
        assert_eq!(args.pollutant, Some(Pollutant::So2));
    }

    #[test]
    fn bad_month_is_rejected() {
        assert!(Args::try_parse_from(["geosense", "--month", "Smarch"]).is_err());
    }
}
