use anyhow::{Context, Result};
use chrono::{Datelike, Local, Months};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::dispatch;
use crate::auth::{authenticate, load_service_account};
use crate::backend::{Backend, EarthEngine};
use crate::config::{load_config, Config};
use crate::error::{AnalysisError, ReportError};
use crate::outcome::Outcome;
use crate::region::resolve_region;
use crate::request::{AnalysisModule, AnalysisRequest, Period, MONTH_NAMES};
use crate::session::Session;
use crate::timeseries::{self, TimeSeries};
use crate::{chart, map, report, utils, Args};

/// One invocation's choices, with defaults filled in.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub region: String,
    pub period: Period,
    pub module: AnalysisModule,
    pub time_series: bool,
    pub workers: usize,
    pub report_dir: Option<PathBuf>,
    pub map_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl RunOptions {
    pub fn from_args(args: &Args, config: &Config) -> Result<Self> {
        let last_month = Local::now().date_naive() - Months::new(1);
        let year = args.year.unwrap_or(last_month.year());
        let month = args.month.unwrap_or(last_month.month());
        let period = Period::new(year, month).map_err(anyhow::Error::msg)?;
        let region = args
            .region
            .clone()
            .context("--region is required (see --list for governorates)")?;

        Ok(Self {
            region,
            period,
            module: AnalysisModule::from_selection(args.module, args.pollutant, args.index),
            time_series: args.time_series,
            workers: args.workers.unwrap_or_else(utils::default_workers),
            report_dir: args
                .report
                .clone()
                .map(|dir| dir.unwrap_or_else(|| config.output.dir.clone())),
            map_path: args.map.clone(),
            output_dir: config.output.dir.clone(),
        })
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub request: AnalysisRequest,
    pub outcome: Outcome,
    /// Present when a series was requested; an unsupported module or a
    /// year with every month failing is kept as the error.
    pub series: Option<Result<TimeSeries, AnalysisError>>,
    pub chart: Option<PathBuf>,
    pub map: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Resolves the region, runs one module and writes whatever artifacts
/// were asked for.
pub fn execute(
    backend: &dyn Backend,
    options: &RunOptions,
    session: &mut Session,
) -> Result<RunSummary> {
    let total_start_time = Instant::now();
    info!(action = "start", component = "dashboard", "Starting analysis run");

    let request = AnalysisRequest {
        region: resolve_region(backend, &options.region),
        period: options.period,
        module: options.module,
    };
    let outcome = dispatch(backend, &request);
    session.record(&request, &outcome);

    let mut series = None;
    let mut chart_path = None;
    if options.time_series && !matches!(outcome, Outcome::Failure { .. }) {
        match timeseries::extract(
            backend,
            &request.region.roi,
            request.module,
            request.period.year(),
            options.workers,
        ) {
            Ok(s) if s.is_empty() => {
                warn!(action = "time_series", component = "dashboard", "No sufficient data for a time series");
                series = Some(Ok(s));
            }
            Ok(s) => {
                let dir = options.report_dir.as_deref().unwrap_or(&options.output_dir);
                let path = chart::write_chart(&s, &request.region.name, dir)?;
                session.attach_chart(&path);
                chart_path = Some(path);
                series = Some(Ok(s));
            }
            Err(e) => {
                warn!(action = "time_series", component = "dashboard", error = %e, "Time series unavailable");
                series = Some(Err(e));
            }
        }
    }

    let mut map_path = None;
    if let (Some(path), Outcome::Success(result)) = (&options.map_path, &outcome) {
        let title = format!("{} | {} | {}", request.region.name, request.module, request.period);
        map::write_map(backend, result, &title, path)
            .with_context(|| format!("failed to write map viewer {}", path.display()))?;
        map_path = Some(path.clone());
    }

    let mut report_path = None;
    if let Some(dir) = &options.report_dir {
        match report::compile(session.last(), dir) {
            Ok(path) => report_path = Some(path),
            Err(ReportError::NoCachedRun) => {
                warn!(action = "report", component = "dashboard", "No completed run to report on")
            }
            Err(e) => return Err(e).context("failed to compile report"),
        }
    }

    info!(
        action = "complete",
        component = "dashboard",
        duration_ms = total_start_time.elapsed().as_millis(),
        "Analysis run completed"
    );
    Ok(RunSummary {
        request,
        outcome,
        series,
        chart: chart_path,
        map: map_path,
        report: report_path,
    })
}

/// Loads configuration and credentials, authenticates and runs. An
/// authentication failure ends the invocation before any analysis.
pub fn run_dashboard(args: &Args) -> Result<RunSummary> {
    let config = load_config(args.config.as_deref(), Path::new("."))?;
    let options = RunOptions::from_args(args, &config)?;

    let account = load_service_account(args.credentials.as_deref(), args.credentials_json.clone())
        .context("Google Earth Engine authentication failed")?;
    let project = config
        .earth_engine
        .project
        .clone()
        .or_else(|| account.project_id.clone())
        .context("no Earth Engine project: set earth_engine.project in the config")?;
    let token = authenticate(&account, &config.earth_engine)
        .context("Google Earth Engine authentication failed")?;
    let backend = EarthEngine::new(&config.earth_engine, project, token)?;

    let mut session = Session::new();
    execute(&backend, &options, &mut session)
}

pub fn print_run_summary(summary: &RunSummary) {
    let request = &summary.request;
    println!(
        "\n--- {} | {} | {}/{} ---",
        summary.outcome.module(),
        request.region.name,
        request.period.month_name(),
        request.period.year()
    );
    println!("Region match: {}", request.region.matched);
    if request.region.is_fallback() {
        println!("Warning: statistics cover all of Jordan, not {}", request.region.name);
    }

    match &summary.outcome {
        Outcome::Success(result) => {
            for (label, value) in result.metrics.iter() {
                println!("- {label}: {value}");
            }
            if let Some(url) = &result.download_url {
                println!("Download: {url}");
            }
        }
        Outcome::Empty { reason, .. } => println!("No data: {reason}"),
        Outcome::Failure { error, .. } => println!("Analysis failed: {error}"),
    }

    match &summary.series {
        Some(Ok(series)) => print_series(series),
        Some(Err(e)) => println!("\nTime series: {e}"),
        None => {}
    }

    for (what, path) in [
        ("Chart", &summary.chart),
        ("Map viewer", &summary.map),
        ("Report", &summary.report),
    ] {
        if let Some(path) = path {
            println!("{what} written to {}", path.display());
        }
    }
}

fn print_series(series: &TimeSeries) {
    println!("\n{} ({}):", series.label, series.year);
    if series.is_empty() {
        println!("No sufficient data for a time series");
    }
    for (month, value) in &series.points {
        println!("- {}: {:.4}", MONTH_NAMES[(*month - 1) as usize], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{full_stats, respond};
    use crate::backend::fake::ScriptedBackend;
    use crate::region::RegionMatch;
    use crate::request::Pollutant;
    use clap::Parser;
    use serde_json::json;

    fn options(dir: &Path, module: AnalysisModule) -> RunOptions {
        RunOptions {
            region: "Zarqa".to_string(),
            period: Period::new(2023, 7).unwrap(),
            module,
            time_series: false,
            workers: 2,
            report_dir: None,
            map_path: None,
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn successful_run_writes_requested_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(respond(4, full_stats()));
        let mut opts = options(dir.path(), AnalysisModule::AirQuality(Pollutant::O3));
        opts.time_series = true;
        opts.report_dir = Some(dir.path().join("reports"));
        opts.map_path = Some(dir.path().join("map.html"));

        let mut session = Session::new();
        let summary = execute(&backend, &opts, &mut session).unwrap();

        assert!(matches!(summary.outcome, Outcome::Success(_)));
        assert_eq!(summary.request.region.name, "Zarqa");
        assert_eq!(summary.request.region.matched, RegionMatch::Exact);
        assert_eq!(
            summary.series.as_ref().unwrap().as_ref().unwrap().points.len(),
            12
        );
        assert!(summary.chart.as_ref().unwrap().exists());
        assert!(summary.map.as_ref().unwrap().exists());
        assert_eq!(
            summary.report.as_ref().unwrap().file_name().unwrap(),
            "GeoSense_Report_Zarqa_2023.pdf"
        );

        let cached = session.last().unwrap();
        assert_eq!(cached.chart, summary.chart);
        assert_eq!(cached.request.module, AnalysisModule::AirQuality(Pollutant::O3));
    }

    #[test]
    fn empty_run_is_cached_as_status() {
        let dir = tempfile::tempdir().unwrap();
        // Region lookup succeeds, the module's collection is empty.
        let backend = ScriptedBackend::new(|expr: &crate::ee::Expr| {
            if expr.mentions("FAO/GAUL/2015/level1") {
                Ok(json!(1))
            } else {
                Ok(json!(0))
            }
        });
        let mut session = Session::new();
        let opts = options(dir.path(), AnalysisModule::Rainfall);
        let summary = execute(&backend, &opts, &mut session).unwrap();

        assert!(matches!(summary.outcome, Outcome::Empty { .. }));
        assert!(session.last().unwrap().metrics.get("Status").is_some());
    }

    #[test]
    fn unsupported_series_is_kept_in_summary() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(respond(4, full_stats()));
        let mut opts = options(dir.path(), AnalysisModule::Flood);
        opts.time_series = true;

        let mut session = Session::new();
        let summary = execute(&backend, &opts, &mut session).unwrap();

        assert!(matches!(summary.outcome, Outcome::Success(_)));
        assert!(matches!(
            summary.series,
            Some(Err(AnalysisError::TimeSeriesUnsupported(_)))
        ));
        assert_eq!(summary.chart, None);
        assert_eq!(session.last().unwrap().chart, None);
    }

    #[test]
    fn failed_run_skips_report() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(|_: &crate::ee::Expr| {
            Err(crate::error::BackendError::Transport("offline".to_string()))
        });
        let mut opts = options(dir.path(), AnalysisModule::Flood);
        opts.report_dir = Some(dir.path().to_path_buf());

        let mut session = Session::new();
        let summary = execute(&backend, &opts, &mut session).unwrap();

        assert!(summary.request.region.is_fallback());
        assert!(matches!(summary.outcome, Outcome::Failure { .. }));
        assert!(summary.report.is_none());
        assert!(session.last().is_none());
    }

    #[test]
    fn options_fill_defaults_from_config() {
        let config = load_config(None, tempfile::tempdir().unwrap().path()).unwrap();
        let args = Args::parse_from([
            "geosense", "--region", "Irbid", "--year", "2022", "--month", "feb", "--module",
            "indices", "--report",
        ]);
        let opts = RunOptions::from_args(&args, &config).unwrap();
        assert_eq!(opts.period, Period::new(2022, 2).unwrap());
        assert_eq!(
            opts.module,
            AnalysisModule::SpectralIndices(crate::request::SpectralIndex::Ndvi)
        );
        assert_eq!(opts.report_dir, Some(config.output.dir.clone()));
        assert!((1..=8).contains(&opts.workers));
    }
}
