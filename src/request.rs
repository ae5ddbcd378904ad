use chrono::{Datelike, Local, Month, Months, NaiveDate};
use clap::ValueEnum;
use std::fmt;

use crate::ee::{self, Expr};
use crate::region::Region;

pub const FIRST_YEAR: i32 = 2018;

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar month of observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        let latest = Local::now().year();
        if !(FIRST_YEAR..=latest).contains(&year) {
            return Err(format!("year must be between {FIRST_YEAR} and {latest}, got {year}"));
        }
        if !(1..=12).contains(&month) {
            return Err(format!("month must be between 1 and 12, got {month}"));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Exclusive end of the month.
    pub fn end_day(&self) -> NaiveDate {
        self.first_day() + Months::new(1)
    }

    pub fn start(&self) -> Expr {
        ee::date(self.first_day())
    }

    pub fn end(&self) -> Expr {
        ee::date(self.end_day())
    }

    /// Start of a window reaching `months` back from this month.
    pub fn widened_start(&self, months: u32) -> Expr {
        ee::date(self.first_day() - Months::new(months))
    }

    pub fn months_of_year(year: i32) -> impl Iterator<Item = Period> {
        (1..=12).map(move |month| Period { year, month })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.year)
    }
}

/// Parses `3`, `03`, `Mar` or `March`.
pub fn parse_month(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u32>() {
        return if (1..=12).contains(&n) {
            Ok(n)
        } else {
            Err(format!("month must be between 1 and 12, got {n}"))
        };
    }
    s.parse::<Month>()
        .map(|m| m.number_from_month())
        .map_err(|_| format!("unrecognised month '{s}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Pollutant {
    #[value(name = "no2")]
    No2,
    #[value(name = "co")]
    Co,
    #[value(name = "o3")]
    O3,
    #[value(name = "so2")]
    So2,
}

impl Pollutant {
    pub fn label(self) -> &'static str {
        match self {
            Pollutant::No2 => "NO2",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O3",
            Pollutant::So2 => "SO2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SpectralIndex {
    #[value(name = "ndvi")]
    Ndvi,
    #[value(name = "ndwi")]
    Ndwi,
    #[value(name = "ndbi")]
    Ndbi,
    #[value(name = "mndwi")]
    Mndwi,
}

impl SpectralIndex {
    pub fn label(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Ndbi => "NDBI",
            SpectralIndex::Mndwi => "MNDWI",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "Vegetation Health",
            SpectralIndex::Ndwi => "Water Content",
            SpectralIndex::Ndbi => "Urban/Built-up",
            SpectralIndex::Mndwi => "Open Water",
        }
    }
}

/// Module selector as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ModuleKind {
    Terrain,
    Flood,
    Indices,
    AirQuality,
    Lst,
    Wildfire,
    LandCover,
    Rainfall,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 8] = [
        ModuleKind::Terrain,
        ModuleKind::Flood,
        ModuleKind::Indices,
        ModuleKind::AirQuality,
        ModuleKind::Lst,
        ModuleKind::Wildfire,
        ModuleKind::LandCover,
        ModuleKind::Rainfall,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ModuleKind::Terrain => "Terrain Analysis (DEM / Slope / Aspect)",
            ModuleKind::Flood => "Flood Mapping & Risk (SAR)",
            ModuleKind::Indices => "Spectral Indices & Environmental Metrics",
            ModuleKind::AirQuality => "Air Quality Monitoring (Sentinel-5P)",
            ModuleKind::Lst => "Land Surface Temperature (LST)",
            ModuleKind::Wildfire => "Active Wildfires (FIRMS)",
            ModuleKind::LandCover => "Land Cover Classification",
            ModuleKind::Rainfall => "Precipitation Analysis (GPM)",
        }
    }
}

/// A module together with its typed options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisModule {
    Terrain,
    Flood,
    SpectralIndices(SpectralIndex),
    AirQuality(Pollutant),
    LandSurfaceTemperature,
    Wildfire,
    LandCover,
    Rainfall,
}

impl AnalysisModule {
    pub fn from_selection(
        kind: ModuleKind,
        pollutant: Option<Pollutant>,
        index: Option<SpectralIndex>,
    ) -> Self {
        match kind {
            ModuleKind::Terrain => AnalysisModule::Terrain,
            ModuleKind::Flood => AnalysisModule::Flood,
            ModuleKind::Indices => {
                AnalysisModule::SpectralIndices(index.unwrap_or(SpectralIndex::Ndvi))
            }
            ModuleKind::AirQuality => {
                AnalysisModule::AirQuality(pollutant.unwrap_or(Pollutant::No2))
            }
            ModuleKind::Lst => AnalysisModule::LandSurfaceTemperature,
            ModuleKind::Wildfire => AnalysisModule::Wildfire,
            ModuleKind::LandCover => AnalysisModule::LandCover,
            ModuleKind::Rainfall => AnalysisModule::Rainfall,
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            AnalysisModule::Terrain => ModuleKind::Terrain,
            AnalysisModule::Flood => ModuleKind::Flood,
            AnalysisModule::SpectralIndices(_) => ModuleKind::Indices,
            AnalysisModule::AirQuality(_) => ModuleKind::AirQuality,
            AnalysisModule::LandSurfaceTemperature => ModuleKind::Lst,
            AnalysisModule::Wildfire => ModuleKind::Wildfire,
            AnalysisModule::LandCover => ModuleKind::LandCover,
            AnalysisModule::Rainfall => ModuleKind::Rainfall,
        }
    }
}

impl fmt::Display for AnalysisModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisModule::SpectralIndices(index) => {
                write!(f, "{} - {}", self.kind().title(), index.label())
            }
            AnalysisModule::AirQuality(pollutant) => {
                write!(f, "{} - {}", self.kind().title(), pollutant.label())
            }
            _ => f.write_str(self.kind().title()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub region: Region,
    pub period: Period,
    pub module: AnalysisModule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_bounds_are_validated() {
        assert!(Period::new(2017, 5).is_err());
        assert!(Period::new(2020, 0).is_err());
        assert!(Period::new(2020, 13).is_err());
        assert!(Period::new(Local::now().year() + 1, 1).is_err());
        assert!(Period::new(2020, 12).is_ok());
    }

    #[test]
    fn december_ends_in_next_year() {
        let period = Period::new(2023, 12).unwrap();
        assert_eq!(period.first_day(), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(period.end_day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(period.month_name(), "Dec");
        assert_eq!(period.to_string(), "12/2023");
    }

    #[test]
    fn months_parse_by_number_or_name() {
        assert_eq!(parse_month("3"), Ok(3));
        assert_eq!(parse_month("03"), Ok(3));
        assert_eq!(parse_month("Mar"), Ok(3));
        assert_eq!(parse_month("september"), Ok(9));
        assert!(parse_month("13").is_err());
        assert!(parse_month("Ju").is_err());
        assert!(parse_month("Smarch").is_err());
        assert_eq!(parse_month("DECEMBER"), Ok(12));
        assert!(parse_month("Marchxyz").is_err());
        assert!(parse_month("Mayday").is_err());
    }

    #[test]
    fn selection_defaults_sub_options() {
        assert_eq!(
            AnalysisModule::from_selection(ModuleKind::AirQuality, None, None),
            AnalysisModule::AirQuality(Pollutant::No2)
        );
        assert_eq!(
            AnalysisModule::from_selection(ModuleKind::Indices, None, Some(SpectralIndex::Ndbi)),
            AnalysisModule::SpectralIndices(SpectralIndex::Ndbi)
        );
        for kind in ModuleKind::ALL {
            assert_eq!(AnalysisModule::from_selection(kind, None, None).kind(), kind);
        }
    }
}
