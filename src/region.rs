use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::ee::{self, filter, Expr};
use crate::error::BackendError;

const GAUL_LEVEL1: &str = "FAO/GAUL/2015/level1";
const COUNTRY_BOUNDARIES: &str = "USDOS/LSIB_SIMPLE/2017";
const COUNTRY: &str = "Jordan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Governorate {
    Amman,
    Irbid,
    Zarqa,
    Aqaba,
    Madaba,
    Mafraq,
    Balqa,
    Jerash,
    Karak,
    Maan,
    Tafilah,
    Ajloun,
}

impl Governorate {
    pub const ALL: [Governorate; 12] = [
        Governorate::Amman,
        Governorate::Irbid,
        Governorate::Zarqa,
        Governorate::Aqaba,
        Governorate::Madaba,
        Governorate::Mafraq,
        Governorate::Balqa,
        Governorate::Jerash,
        Governorate::Karak,
        Governorate::Maan,
        Governorate::Tafilah,
        Governorate::Ajloun,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Governorate::Amman => "Amman",
            Governorate::Irbid => "Irbid",
            Governorate::Zarqa => "Zarqa",
            Governorate::Aqaba => "Aqaba",
            Governorate::Madaba => "Madaba",
            Governorate::Mafraq => "Mafraq",
            Governorate::Balqa => "Balqa",
            Governorate::Jerash => "Jerash",
            Governorate::Karak => "Karak",
            Governorate::Maan => "Ma'an",
            Governorate::Tafilah => "Tafilah",
            Governorate::Ajloun => "Ajloun",
        }
    }

    /// Spelling used by the GAUL `ADM1_NAME` property.
    pub fn gaul_name(self) -> &'static str {
        match self {
            Governorate::Amman => "Amman",
            Governorate::Irbid => "Irbid",
            Governorate::Zarqa => "Az Zarqa",
            Governorate::Aqaba => "Al Aqabah",
            Governorate::Madaba => "Madaba",
            Governorate::Mafraq => "Al Mafraq",
            Governorate::Balqa => "Al Balqa",
            Governorate::Jerash => "Jarash",
            Governorate::Karak => "Al Karak",
            Governorate::Maan => "Ma'an",
            Governorate::Tafilah => "At Tafilah",
            Governorate::Ajloun => "Ajlun",
        }
    }

    /// Case-insensitive lookup by common or GAUL spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = fold(name);
        Self::ALL
            .into_iter()
            .find(|g| fold(g.name()) == wanted || fold(g.gaul_name()) == wanted)
    }
}

impl fmt::Display for Governorate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn fold(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strips an Arabic article prefix and a trailing "governorate" so the
/// substring search has a chance against GAUL spellings.
fn core_name(name: &str) -> String {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    let (article, suffix) = PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)^\s*(?:al|az|at|as|an|ar|ad|el)[\s'-]+").expect("static regex"),
            Regex::new(r"(?i)\s+governorate\s*$").expect("static regex"),
        )
    });
    let name = article.replace(name, "");
    suffix.replace(&name, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionMatch {
    Exact,
    Partial { matched_on: String },
    CountryFallback { reason: String },
}

impl fmt::Display for RegionMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionMatch::Exact => f.write_str("exact GAUL match"),
            RegionMatch::Partial { matched_on } => {
                write!(f, "partial GAUL match on '{matched_on}'")
            }
            RegionMatch::CountryFallback { reason } => {
                write!(f, "country-level fallback ({reason})")
            }
        }
    }
}

/// A resolved region of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub roi: Expr,
    pub matched: RegionMatch,
}

impl Region {
    pub fn is_fallback(&self) -> bool {
        matches!(self.matched, RegionMatch::CountryFallback { .. })
    }
}

fn admin_units() -> Expr {
    ee::feature_collection(GAUL_LEVEL1).filter(filter::eq("ADM0_NAME", COUNTRY))
}

pub fn country_roi() -> Expr {
    ee::feature_collection(COUNTRY_BOUNDARIES).filter(filter::eq("country_na", COUNTRY))
}

fn count(backend: &dyn Backend, collection: &Expr) -> Result<i64, BackendError> {
    let value = backend.compute(&collection.clone().size())?;
    value
        .as_i64()
        .ok_or_else(|| BackendError::Decode(format!("collection size was {value}")))
}

fn lookup(backend: &dyn Backend, name: &str) -> Result<Option<(Expr, RegionMatch)>, BackendError> {
    let search_name = Governorate::from_name(name)
        .map(Governorate::gaul_name)
        .unwrap_or(name);

    let exact = admin_units().filter(filter::eq("ADM1_NAME", search_name));
    if count(backend, &exact)? > 0 {
        return Ok(Some((exact, RegionMatch::Exact)));
    }

    let core = core_name(name);
    if core.is_empty() {
        return Ok(None);
    }
    let partial = admin_units().filter(filter::string_contains("ADM1_NAME", &core));
    if count(backend, &partial)? > 0 {
        return Ok(Some((partial, RegionMatch::Partial { matched_on: core })));
    }

    Ok(None)
}

/// Resolves a place name to a GAUL level-1 polygon. Never fails: when no
/// unit matches, or the backend errors, the country outline is returned
/// and the fallback is recorded in [`Region::matched`].
pub fn resolve_region(backend: &dyn Backend, name: &str) -> Region {
    let start_time = Instant::now();
    info!(action = "start", component = "region_resolver", place = name, "Resolving region");

    let (roi, matched) = match lookup(backend, name) {
        Ok(Some(found)) => found,
        Ok(None) => (
            country_roi(),
            RegionMatch::CountryFallback {
                reason: format!("no governorate matches '{name}'"),
            },
        ),
        Err(e) => (
            country_roi(),
            RegionMatch::CountryFallback {
                reason: e.to_string(),
            },
        ),
    };

    if let RegionMatch::CountryFallback { reason } = &matched {
        warn!(action = "fallback", component = "region_resolver", place = name, reason = %reason, "Using country-level region");
    }
    info!(
        action = "complete",
        component = "region_resolver",
        place = name,
        matched = %matched,
        duration_ms = start_time.elapsed().as_millis(),
        "Region resolved"
    );

    let name = Governorate::from_name(name)
        .map(|g| g.name().to_string())
        .unwrap_or_else(|| name.trim().to_string());
    Region { name, roi, matched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use serde_json::json;

    #[test]
    fn every_governorate_resolves_exactly() {
        for governorate in Governorate::ALL {
            let backend = ScriptedBackend::new(move |expr: &Expr| {
                let hit = expr.calls("Filter.equals") && expr.mentions(governorate.gaul_name());
                Ok(json!(if hit { 1 } else { 0 }))
            });
            let region = resolve_region(&backend, governorate.name());
            assert_eq!(region.matched, RegionMatch::Exact, "{governorate}");
            assert_eq!(region.name, governorate.name());
            assert!(region.roi.mentions(governorate.gaul_name()));
            assert_eq!(backend.computed().len(), 1);
        }
    }

    #[test]
    fn substring_search_follows_failed_exact_match() {
        let backend = ScriptedBackend::new(|expr: &Expr| {
            Ok(json!(if expr.calls("Filter.stringContains") { 1 } else { 0 }))
        });
        let region = resolve_region(&backend, "Al Zarqa Governorate");
        assert_eq!(
            region.matched,
            RegionMatch::Partial {
                matched_on: "Zarqa".to_string()
            }
        );
        assert_eq!(backend.computed().len(), 2);
    }

    #[test]
    fn unknown_name_falls_back_to_country() {
        let backend = ScriptedBackend::new(|_: &Expr| Ok(json!(0)));
        let region = resolve_region(&backend, "Atlantis");
        assert!(region.is_fallback());
        assert!(region.roi.mentions(COUNTRY_BOUNDARIES));
        assert_eq!(region.name, "Atlantis");
    }

    #[test]
    fn backend_error_falls_back_to_country() {
        let backend = ScriptedBackend::new(|_: &Expr| {
            Err(BackendError::Transport("connection refused".to_string()))
        });
        let region = resolve_region(&backend, "Irbid");
        match region.matched {
            RegionMatch::CountryFallback { reason } => {
                assert!(reason.contains("connection refused"))
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn lookup_accepts_gaul_spelling_and_case() {
        assert_eq!(Governorate::from_name("al karak"), Some(Governorate::Karak));
        assert_eq!(Governorate::from_name("MAAN"), Some(Governorate::Maan));
        assert_eq!(Governorate::from_name("ma'an"), Some(Governorate::Maan));
        assert_eq!(Governorate::from_name("Petra"), None);
    }

    #[test]
    fn core_name_strips_article_and_suffix() {
        assert_eq!(core_name("At Tafilah"), "Tafilah");
        assert_eq!(core_name("Irbid governorate"), "Irbid");
        assert_eq!(core_name("Amman"), "Amman");
    }
}
