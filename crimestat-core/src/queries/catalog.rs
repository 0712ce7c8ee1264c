//! Static catalog of named queries.
//!
//! Statements use positional placeholders (`?1`, `?2`, ...) in the order of
//! their `params` list.

/// A named request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Param {
    DepartmentCode,
    DestDepartment,
    RegionCode,
    ComparisonRegion,
    CrimeType,
    Year,
}

impl Param {
    pub const ALL: [Param; 6] = [
        Param::DepartmentCode,
        Param::DestDepartment,
        Param::RegionCode,
        Param::ComparisonRegion,
        Param::CrimeType,
        Param::Year,
    ];

    /// Stable name used in requests and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Param::DepartmentCode => "department_code",
            Param::DestDepartment => "dest_department",
            Param::RegionCode => "region_code",
            Param::ComparisonRegion => "comparison_region_code",
            Param::CrimeType => "crime_type",
            Param::Year => "year",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Who the query is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Listed in the user-facing catalog
    Predefined,
    /// Base row sets the services feed to the metric engine
    Analytical,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Predefined => "predefined",
            Visibility::Analytical => "analytical",
        }
    }
}

/// Definition of one named query.
#[derive(Debug, Clone)]
pub struct QueryDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub params: &'static [Param],
    pub visibility: Visibility,
    pub sql: &'static str,
}

/// Columns of the observation row set shared by the analytical queries.
macro_rules! observation_select {
    () => {
        "SELECT y.department AS department,
                d.region_code AS region_code,
                y.category AS category,
                y.year AS year,
                y.incident_count AS incident_count,
                COALESCE(y.rate_per_mille,
                         y.incident_count * 1000.0 / NULLIF(d.population, 0)) AS rate_per_mille,
                d.population AS population,
                d.housing_units AS housing_units
         FROM yearly_statistics y
         JOIN departments d ON d.code = y.department"
    };
}

pub(crate) const QUERIES: &[QueryDefinition] = &[
    // ============================================
    // Predefined
    // ============================================
    QueryDefinition {
        name: "department_analysis",
        title: "Department analysis",
        description: "Every crime category of one department for one year.",
        params: &[Param::DepartmentCode, Param::Year],
        visibility: Visibility::Predefined,
        sql: "SELECT d.code AS department,
                     d.region_code AS region_code,
                     y.category AS category,
                     y.incident_count AS incident_count,
                     y.rate_per_mille AS rate_per_mille,
                     d.population AS population,
                     y.year AS year
              FROM yearly_statistics y
              JOIN departments d ON d.code = y.department
              WHERE y.department = ?1 AND y.year = ?2
              ORDER BY y.category",
    },
    QueryDefinition {
        name: "crime_type_evolution",
        title: "Crime type evolution",
        description: "National yearly totals and mean rate of one crime category.",
        params: &[Param::CrimeType],
        visibility: Visibility::Predefined,
        sql: "SELECT y.year AS year,
                     SUM(y.incident_count) AS total_incidents,
                     ROUND(AVG(y.rate_per_mille), 4) AS mean_rate
              FROM yearly_statistics y
              WHERE y.category = ?1
              GROUP BY y.year
              ORDER BY y.year",
    },
    QueryDefinition {
        name: "regional_comparison",
        title: "Regional comparison",
        description: "Totals of one crime category per region for one year, largest first.",
        params: &[Param::CrimeType, Param::Year],
        visibility: Visibility::Predefined,
        sql: "SELECT d.region_code AS region_code,
                     y.category AS category,
                     y.year AS year,
                     SUM(y.incident_count) AS total_incidents,
                     ROUND(AVG(y.rate_per_mille), 4) AS mean_rate,
                     SUM(d.population) AS total_population
              FROM yearly_statistics y
              JOIN departments d ON d.code = y.department
              WHERE y.category = ?1 AND y.year = ?2
              GROUP BY d.region_code, y.category, y.year
              ORDER BY total_incidents DESC, d.region_code",
    },
    QueryDefinition {
        name: "top_departments",
        title: "Top 10 departments",
        description: "The ten departments with the highest rate for one category and year.",
        params: &[Param::CrimeType, Param::Year],
        visibility: Visibility::Predefined,
        sql: "SELECT d.code AS department,
                     d.region_code AS region_code,
                     y.category AS category,
                     y.incident_count AS incident_count,
                     y.rate_per_mille AS rate_per_mille,
                     d.population AS population,
                     ROUND(y.incident_count * 100000.0 / NULLIF(d.population, 0), 2) AS per_100k
              FROM yearly_statistics y
              JOIN departments d ON d.code = y.department
              WHERE y.category = ?1 AND y.year = ?2
              ORDER BY y.rate_per_mille DESC, d.code
              LIMIT 10",
    },
    QueryDefinition {
        name: "housing_density",
        title: "Housing density",
        description: "Incidents next to the housing-per-inhabitant ratio of each department.",
        params: &[Param::Year],
        visibility: Visibility::Predefined,
        sql: "SELECT d.code AS department,
                     y.category AS category,
                     y.incident_count AS incident_count,
                     d.housing_units AS housing_units,
                     d.population AS population,
                     ROUND(d.housing_units * 1.0 / NULLIF(d.population, 0), 4) AS housing_ratio,
                     y.rate_per_mille AS rate_per_mille
              FROM yearly_statistics y
              JOIN departments d ON d.code = y.department
              WHERE y.year = ?1
              ORDER BY housing_ratio DESC, d.code, y.category",
    },
    // ============================================
    // Analytical
    // ============================================
    QueryDefinition {
        name: "department_observations",
        title: "Department observations",
        description: "All yearly observations of one department.",
        params: &[Param::DepartmentCode],
        visibility: Visibility::Analytical,
        sql: concat!(
            observation_select!(),
            " WHERE y.department = ?1 ORDER BY y.category, y.year"
        ),
    },
    QueryDefinition {
        name: "region_observations",
        title: "Region observations",
        description: "All yearly observations of the departments of one region.",
        params: &[Param::RegionCode],
        visibility: Visibility::Analytical,
        sql: concat!(
            observation_select!(),
            " WHERE d.region_code = ?1 ORDER BY y.category, y.year, y.department"
        ),
    },
    QueryDefinition {
        name: "region_pair_observations",
        title: "Region pair observations",
        description: "All yearly observations of the departments of two regions.",
        params: &[Param::RegionCode, Param::ComparisonRegion],
        visibility: Visibility::Analytical,
        sql: concat!(
            observation_select!(),
            " WHERE d.region_code IN (?1, ?2)
              ORDER BY d.region_code, y.category, y.year, y.department"
        ),
    },
    QueryDefinition {
        name: "route_observations",
        title: "Route observations",
        description: "All yearly observations of an origin and a destination department.",
        params: &[Param::DepartmentCode, Param::DestDepartment],
        visibility: Visibility::Analytical,
        sql: concat!(
            observation_select!(),
            " WHERE y.department IN (?1, ?2) ORDER BY y.department, y.category, y.year"
        ),
    },
    QueryDefinition {
        name: "national_totals",
        title: "National totals",
        description: "Incidents and population of reporting departments per category and year.",
        params: &[],
        visibility: Visibility::Analytical,
        sql: "SELECT y.category AS category,
                     y.year AS year,
                     SUM(y.incident_count) AS total_incidents,
                     SUM(d.population) AS total_population
              FROM yearly_statistics y
              JOIN departments d ON d.code = y.department
              GROUP BY y.category, y.year
              ORDER BY y.category, y.year",
    },
    QueryDefinition {
        name: "department_monthly",
        title: "Department monthly series",
        description: "Monthly counts of one department.",
        params: &[Param::DepartmentCode],
        visibility: Visibility::Analytical,
        sql: "SELECT m.category AS category,
                     m.year AS year,
                     m.month AS month,
                     m.incident_count AS incident_count
              FROM monthly_statistics m
              WHERE m.department = ?1
              ORDER BY m.category, m.year, m.month",
    },
];
