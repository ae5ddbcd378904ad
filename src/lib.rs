pub mod analysis;
pub mod args;
pub mod auth;
pub mod backend;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod ee;
pub mod error;
pub mod map;
pub mod outcome;
pub mod region;
pub mod report;
pub mod request;
pub mod session;
pub mod timeseries;
pub mod utils;

pub use args::Args;
pub use config::init_default_config;
pub use dashboard::{print_run_summary, run_dashboard, RunSummary};
pub use outcome::{AnalysisResult, Metrics, Outcome};
pub use session::Session;
