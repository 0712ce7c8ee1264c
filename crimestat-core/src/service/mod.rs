//! Service façade
//!
//! The single entry point of the analytical core. A request names a service
//! and carries raw string parameters; the façade validates them, runs the
//! matching queries and metrics, generates the recommendation text and
//! returns a [`ServiceResponse`].
//!
//! ## Adding a service
//!
//! 1. Implement [`Service`] for a unit struct
//! 2. Add its [`ServiceKind`] variant and name
//! 3. Register it in [`ServiceFacade::new`]
//!
//! Failures never escape [`ServiceFacade::invoke`]: every error becomes a
//! response with an error status and a message safe to show to a user.

pub mod explore;
pub mod predictive;
pub mod security;
pub mod table;
pub mod territorial;

pub use table::{ChartKind, ChartSpec, ResultTable};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, ErrorKind, Result};
use crate::metrics::Thresholds;
use crate::queries::{rows, Param, QueryLibrary, QueryParams};
use crate::recommend::{self, Metrics};
use crate::types::{normalize_year, Observation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

// ============================================
// Service kinds
// ============================================

/// Every analysis the façade can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    TrendProjection,
    EmergingRisk,
    NeighborhoodAlert,
    RealEstateSecurity,
    BusinessSecurity,
    InsuranceOptimization,
    TransportSecurity,
    SeasonalProfile,
    RegionalDiagnostic,
    RegionalComparison,
    RegionalEvolution,
    PredefinedQuery,
    FreeformQuery,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 13] = [
        ServiceKind::TrendProjection,
        ServiceKind::EmergingRisk,
        ServiceKind::NeighborhoodAlert,
        ServiceKind::RealEstateSecurity,
        ServiceKind::BusinessSecurity,
        ServiceKind::InsuranceOptimization,
        ServiceKind::TransportSecurity,
        ServiceKind::SeasonalProfile,
        ServiceKind::RegionalDiagnostic,
        ServiceKind::RegionalComparison,
        ServiceKind::RegionalEvolution,
        ServiceKind::PredefinedQuery,
        ServiceKind::FreeformQuery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::TrendProjection => "trend_projection",
            ServiceKind::EmergingRisk => "emerging_risk",
            ServiceKind::NeighborhoodAlert => "neighborhood_alert",
            ServiceKind::RealEstateSecurity => "real_estate_security",
            ServiceKind::BusinessSecurity => "business_security",
            ServiceKind::InsuranceOptimization => "insurance_optimization",
            ServiceKind::TransportSecurity => "transport_security",
            ServiceKind::SeasonalProfile => "seasonal_profile",
            ServiceKind::RegionalDiagnostic => "regional_diagnostic",
            ServiceKind::RegionalComparison => "regional_comparison",
            ServiceKind::RegionalEvolution => "regional_evolution",
            ServiceKind::PredefinedQuery => "predefined_query",
            ServiceKind::FreeformQuery => "freeform_query",
        }
    }

    /// Parse a service name.
    ///
    /// Case, spaces and dashes are not significant: `Real estate security`
    /// and `real-estate-security` both name [`ServiceKind::RealEstateSecurity`].
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self::ALL.into_iter().find(|k| k.name() == normalized)
    }

    /// Parameters the service cannot run without.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            ServiceKind::TrendProjection => &["department_code", "target_year"],
            ServiceKind::EmergingRisk
            | ServiceKind::BusinessSecurity
            | ServiceKind::SeasonalProfile => &["department_code"],
            ServiceKind::NeighborhoodAlert
            | ServiceKind::RealEstateSecurity
            | ServiceKind::InsuranceOptimization => &["department_code", "year"],
            ServiceKind::TransportSecurity => &["department_code", "dest_department"],
            ServiceKind::RegionalDiagnostic | ServiceKind::RegionalEvolution => &["region_code"],
            ServiceKind::RegionalComparison => &["region_code", "comparison_region_code"],
            ServiceKind::PredefinedQuery => &["query_name"],
            ServiceKind::FreeformQuery => &["sql"],
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================
// Request parameters
// ============================================

/// Raw request parameters, as a presentation layer collects them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServiceParams {
    values: BTreeMap<String, String>,
}

impl ServiceParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Value of `name`, trimmed; blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check that every name in `names` is present.
    pub fn require_all(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "missing parameters: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::Validation(format!("missing parameters: {name}")))
    }

    /// Optional year, normalised to four digits.
    pub fn year(&self, name: &str) -> Result<Option<i32>> {
        self.get(name)
            .map(|raw| {
                raw.parse::<i32>()
                    .map(normalize_year)
                    .map_err(|_| Error::Validation(format!("{name} must be a year, got {raw:?}")))
            })
            .transpose()
    }

    pub fn require_year(&self, name: &str) -> Result<i32> {
        self.require(name)?;
        self.year(name)?
            .ok_or_else(|| Error::Validation(format!("missing parameters: {name}")))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServiceParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================
// Service trait
// ============================================

/// Handles a service needs while it runs.
pub struct ServiceContext<'a> {
    pub db: &'a Database,
    pub queries: &'a QueryLibrary,
    pub config: &'a Config,
}

impl ServiceContext<'_> {
    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    /// Run an analytical query returning the observation column set.
    pub fn observations(&self, query: &str, params: &QueryParams) -> Result<Vec<Observation>> {
        self.queries.fetch(self.db, query, params, rows::observation)
    }

    /// Every yearly observation of one department.
    pub fn department_observations(&self, department: &str) -> Result<Vec<Observation>> {
        self.observations(
            "department_observations",
            &QueryParams::new().with(Param::DepartmentCode, department.to_string()),
        )
    }
}

/// Result of one service run, before text generation.
#[derive(Debug, Clone, Default)]
pub struct Computed {
    pub table: ResultTable,
    /// Typed metrics for the recommendation generator
    pub metrics: Option<Metrics>,
    /// Text used when there are no metrics to describe
    pub summary: Option<String>,
    pub charts: Vec<ChartSpec>,
}

/// One analysis reachable through the façade.
///
/// Implementations validate their own parameters and return
/// [`Error::InsufficientData`] when the selection is empty.
pub trait Service: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn run(&self, params: &ServiceParams, ctx: &ServiceContext<'_>) -> Result<Computed>;
}

// ============================================
// Responses
// ============================================

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    /// The selection matched no data, or too little to compute anything
    Empty,
    Error { kind: ErrorKind },
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseStatus::Error { .. })
    }

    /// Error kind of a non-ok status.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ResponseStatus::Ok => None,
            ResponseStatus::Empty => Some(ErrorKind::InsufficientData),
            ResponseStatus::Error { kind } => Some(*kind),
        }
    }
}

/// Everything a presentation layer needs to show one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    pub service: String,
    #[serde(flatten)]
    pub status: ResponseStatus,
    pub table: ResultTable,
    pub text: String,
    pub charts: Vec<ChartSpec>,
}

impl ServiceResponse {
    fn failed(service: &str, err: &Error) -> Self {
        let status = match err.kind() {
            ErrorKind::InsufficientData => ResponseStatus::Empty,
            kind => ResponseStatus::Error { kind },
        };
        Self {
            service: service.to_string(),
            status,
            table: ResultTable::default(),
            text: err.user_message(),
            charts: Vec::new(),
        }
    }
}

// ============================================
// Façade
// ============================================

/// Owns the store, the query catalog and the registered services.
pub struct ServiceFacade {
    db: Database,
    config: Config,
    queries: QueryLibrary,
    services: Vec<Box<dyn Service>>,
}

impl ServiceFacade {
    /// Create a façade with every built-in service registered.
    pub fn new(db: Database, config: Config) -> Self {
        let mut facade = Self::empty(db, config);
        facade.register(Box::new(predictive::TrendProjection));
        facade.register(Box::new(predictive::EmergingRisk));
        facade.register(Box::new(predictive::SeasonalProfile));
        facade.register(Box::new(security::NeighborhoodAlert));
        facade.register(Box::new(security::RealEstateSecurity));
        facade.register(Box::new(security::BusinessSecurity));
        facade.register(Box::new(security::InsuranceOptimization));
        facade.register(Box::new(security::TransportSecurity));
        facade.register(Box::new(territorial::RegionalDiagnostic));
        facade.register(Box::new(territorial::RegionalComparison));
        facade.register(Box::new(territorial::RegionalEvolution));
        facade.register(Box::new(explore::PredefinedQuery));
        facade.register(Box::new(explore::FreeformQuery));
        facade
    }

    /// Create a façade without services.
    pub fn empty(db: Database, config: Config) -> Self {
        Self {
            db,
            config,
            queries: QueryLibrary::new(),
            services: Vec::new(),
        }
    }

    /// Register a service, replacing any earlier one of the same kind.
    pub fn register(&mut self, service: Box<dyn Service>) {
        let kind = service.kind();
        self.services.retain(|s| s.kind() != kind);
        tracing::info!(service = %kind, "Registered service");
        self.services.push(service);
    }

    /// Kinds of the registered services, in registration order.
    pub fn services(&self) -> Vec<ServiceKind> {
        self.services.iter().map(|s| s.kind()).collect()
    }

    pub fn has_service(&self, kind: ServiceKind) -> bool {
        self.services.iter().any(|s| s.kind() == kind)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queries(&self) -> &QueryLibrary {
        &self.queries
    }

    /// Run a service; failures come back as an error response.
    pub fn invoke(&self, service: &str, params: &ServiceParams) -> ServiceResponse {
        let span = tracing::info_span!(
            "service",
            request_id = %uuid::Uuid::new_v4(),
            service = service
        );
        span.in_scope(|| match self.try_invoke(service, params) {
            Ok(response) => response,
            Err(err) => {
                match err.kind() {
                    ErrorKind::Storage => tracing::error!(
                        service,
                        params = ?params,
                        error = %err,
                        "Service request failed"
                    ),
                    kind => tracing::warn!(
                        service,
                        params = ?params,
                        kind = kind.as_str(),
                        error = %err,
                        "Service request rejected"
                    ),
                }
                ServiceResponse::failed(service, &err)
            }
        })
    }

    /// Run a service and return its failure as an [`Error`].
    pub fn try_invoke(&self, service: &str, params: &ServiceParams) -> Result<ServiceResponse> {
        let kind = ServiceKind::from_name(service)
            .ok_or_else(|| Error::NotFound(format!("service {service}")))?;
        let handler = self
            .services
            .iter()
            .find(|s| s.kind() == kind)
            .ok_or_else(|| Error::NotFound(format!("service {kind} is not registered")))?;

        params.require_all(kind.required_params())?;

        let ctx = ServiceContext {
            db: &self.db,
            queries: &self.queries,
            config: &self.config,
        };
        let started = Instant::now();
        let computed = handler.run(params, &ctx)?;
        let text = match &computed.metrics {
            Some(metrics) => recommend::generate(metrics, &self.config.thresholds),
            None => computed.summary.clone().unwrap_or_default(),
        };

        tracing::debug!(
            service = %kind,
            rows = computed.table.len(),
            charts = computed.charts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Service completed"
        );

        Ok(ServiceResponse {
            service: kind.name().to_string(),
            status: ResponseStatus::Ok,
            table: computed.table,
            text,
            charts: computed.charts,
        })
    }
}

/// Return `InsufficientData` when `items` is empty.
pub(crate) fn non_empty<T>(items: Vec<T>, what: impl FnOnce() -> String) -> Result<Vec<T>> {
    if items.is_empty() {
        Err(Error::InsufficientData(what()))
    } else {
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> ServiceFacade {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        ServiceFacade::new(db, Config::default())
    }

    #[test]
    fn test_service_names_roundtrip() {
        for kind in ServiceKind::ALL {
            assert_eq!(ServiceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(
            ServiceKind::from_name("Real estate security"),
            Some(ServiceKind::RealEstateSecurity)
        );
        assert_eq!(ServiceKind::from_name("horoscope"), None);
    }

    #[test]
    fn test_all_services_registered() {
        let facade = facade();
        assert_eq!(facade.services().len(), ServiceKind::ALL.len());
        for kind in ServiceKind::ALL {
            assert!(facade.has_service(kind), "{kind} missing");
        }
    }

    #[test]
    fn test_params_year_normalization() {
        let params = ServiceParams::new().with("year", "22").with("bad", "x");
        assert_eq!(params.year("year").unwrap(), Some(2022));
        assert_eq!(params.year("absent").unwrap(), None);
        assert!(matches!(params.year("bad"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_params_blank_counts_as_missing() {
        let params = ServiceParams::new().with("department_code", "  ");
        let err = params
            .require_all(&["department_code", "year"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameters: missing parameters: department_code, year"
        );
    }

    #[test]
    fn test_unknown_service_is_not_found() {
        let response = facade().invoke("horoscope", &ServiceParams::new());
        assert_eq!(
            response.status,
            ResponseStatus::Error {
                kind: ErrorKind::NotFound
            }
        );
        assert!(response.table.is_empty());
        assert!(response.text.contains("not recognized"));
    }

    #[test]
    fn test_missing_params_are_validation_errors() {
        let response = facade().invoke("real_estate_security", &ServiceParams::new());
        assert_eq!(response.status.kind(), Some(ErrorKind::Validation));
        assert!(response.text.contains("department_code"));
        assert!(response.text.contains("year"));
    }

    #[test]
    fn test_empty_store_gives_empty_status() {
        let params = ServiceParams::new()
            .with("department_code", "75")
            .with("year", "2022");
        let response = facade().invoke("real_estate_security", &params);
        assert_eq!(response.status, ResponseStatus::Empty);
        assert!(!response.status.is_error());
        assert_eq!(response.text, recommend::NO_DATA_MESSAGE);
    }
}
