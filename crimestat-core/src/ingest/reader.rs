//! Readers for the departmental CSV exports.
//!
//! Files are `;`-separated with a header row and French decimal commas.
//! Rows with a missing key or an unparsable number are skipped and counted;
//! only a missing column fails the whole file.

use crate::error::{Error, Result};
use crate::metrics::baseline::rate_per_mille;
use crate::types::{
    normalize_year, CrimeCategory, Department, MonthlyStatistic, Region, YearlyStatistic,
};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// Column names of the yearly export.
pub mod columns {
    pub const DEPARTMENT: &str = "Code.département";
    pub const REGION: &str = "Code.région";
    pub const YEAR: &str = "annee";
    pub const CATEGORY: &str = "classe";
    pub const UNIT: &str = "unité.de.compte";
    pub const INCIDENTS: &str = "faits";
    pub const POPULATION: &str = "POP";
    pub const HOUSING: &str = "LOG";
    pub const RATE: &str = "tauxpourmille";
    pub const MONTH: &str = "mois";
}

/// Everything read from one yearly file.
#[derive(Debug, Default)]
pub struct YearlyBatch {
    pub regions: Vec<Region>,
    pub departments: Vec<Department>,
    pub categories: Vec<CrimeCategory>,
    pub statistics: Vec<YearlyStatistic>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// One line per skipped row, capped
    pub warnings: Vec<String>,
}

/// Everything read from one monthly file.
#[derive(Debug, Default)]
pub struct MonthlyBatch {
    pub statistics: Vec<MonthlyStatistic>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub warnings: Vec<String>,
}

const MAX_WARNINGS: usize = 20;

/// Positions of the named columns in the header row.
struct Header {
    index: HashMap<String, usize>,
}

impl Header {
    fn new(record: &StringRecord) -> Self {
        let index = record
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), i))
            .collect();
        Self { index }
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::Validation(format!("missing column {name}")))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

fn field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a number written with a decimal comma and optional digit grouping.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{202f}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a non-negative count; `12,0` is accepted, `12,5` is not.
pub fn parse_count(raw: &str) -> Option<i64> {
    let value = parse_decimal(raw)?;
    if value < 0.0 || value.fract() != 0.0 {
        return None;
    }
    Some(value as i64)
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input)
}

fn skip(warnings: &mut Vec<String>, line: u64, reason: &str) {
    if warnings.len() < MAX_WARNINGS {
        warnings.push(format!("line {line}: {reason}"));
    }
}

/// Read a yearly export.
pub fn read_yearly<R: Read>(input: R) -> Result<YearlyBatch> {
    let mut rdr = reader(input);
    let header = Header::new(rdr.headers()?);
    let department_idx = header.require(columns::DEPARTMENT)?;
    let region_idx = header.require(columns::REGION)?;
    let year_idx = header.require(columns::YEAR)?;
    let category_idx = header.require(columns::CATEGORY)?;
    let unit_idx = header.require(columns::UNIT)?;
    let incidents_idx = header.require(columns::INCIDENTS)?;
    let population_idx = header.require(columns::POPULATION)?;
    let housing_idx = header.require(columns::HOUSING)?;
    let rate_idx = header.optional(columns::RATE);

    let mut batch = YearlyBatch::default();
    let mut regions: BTreeMap<String, Region> = BTreeMap::new();
    let mut departments: BTreeMap<String, Department> = BTreeMap::new();
    let mut categories: BTreeMap<String, CrimeCategory> = BTreeMap::new();

    for record in rdr.records() {
        let record = record?;
        batch.rows_read += 1;
        let line = record.position().map_or(0, |p| p.line());

        let (Some(department), Some(region), Some(category)) = (
            field(&record, department_idx),
            field(&record, region_idx),
            field(&record, category_idx),
        ) else {
            batch.rows_skipped += 1;
            skip(&mut batch.warnings, line, "missing department, region or category");
            continue;
        };
        let year = field(&record, year_idx).and_then(|y| y.parse::<i32>().ok());
        let incidents = field(&record, incidents_idx).and_then(parse_count);
        let population = field(&record, population_idx).and_then(parse_count);
        let housing = field(&record, housing_idx).and_then(parse_count);
        let (Some(year), Some(incidents), Some(population), Some(housing)) =
            (year, incidents, population, housing)
        else {
            batch.rows_skipped += 1;
            skip(&mut batch.warnings, line, "unparsable year or count");
            continue;
        };
        let year = normalize_year(year);

        let rate = match rate_idx.and_then(|i| field(&record, i)) {
            Some(raw) => match parse_decimal(raw) {
                Some(rate) if rate >= 0.0 => Some(rate),
                _ => {
                    batch.rows_skipped += 1;
                    skip(&mut batch.warnings, line, "unparsable rate");
                    continue;
                }
            },
            None => rate_per_mille(incidents, population),
        };

        regions
            .entry(region.to_string())
            .or_insert_with(|| Region {
                code: region.to_string(),
                name: Region::default_name(region),
            });
        let latest = departments
            .get(department)
            .map_or(true, |d| year >= d.reference_year);
        if latest {
            departments.insert(
                department.to_string(),
                Department {
                    code: department.to_string(),
                    region_code: region.to_string(),
                    population,
                    housing_units: housing,
                    reference_year: year,
                },
            );
        }
        categories
            .entry(category.to_string())
            .or_insert_with(|| CrimeCategory {
                name: category.to_string(),
                unit_label: field(&record, unit_idx).unwrap_or_default().to_string(),
            });

        batch.statistics.push(YearlyStatistic {
            category: category.to_string(),
            year,
            department: department.to_string(),
            incident_count: incidents,
            rate_per_mille: rate,
        });
    }

    batch.regions = regions.into_values().collect();
    batch.departments = departments.into_values().collect();
    batch.categories = categories.into_values().collect();
    Ok(batch)
}

/// Read a monthly export.
pub fn read_monthly<R: Read>(input: R) -> Result<MonthlyBatch> {
    let mut rdr = reader(input);
    let header = Header::new(rdr.headers()?);
    let department_idx = header.require(columns::DEPARTMENT)?;
    let category_idx = header.require(columns::CATEGORY)?;
    let year_idx = header.require(columns::YEAR)?;
    let month_idx = header.require(columns::MONTH)?;
    let incidents_idx = header.require(columns::INCIDENTS)?;

    let mut batch = MonthlyBatch::default();
    for record in rdr.records() {
        let record = record?;
        batch.rows_read += 1;
        let line = record.position().map_or(0, |p| p.line());

        let department = field(&record, department_idx);
        let category = field(&record, category_idx);
        let year = field(&record, year_idx).and_then(|y| y.parse::<i32>().ok());
        let month = field(&record, month_idx)
            .and_then(|m| m.parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m));
        let incidents = field(&record, incidents_idx).and_then(parse_count);

        let (Some(department), Some(category), Some(year), Some(month), Some(incidents)) =
            (department, category, year, month, incidents)
        else {
            batch.rows_skipped += 1;
            skip(&mut batch.warnings, line, "missing key, bad month or unparsable count");
            continue;
        };

        batch.statistics.push(MonthlyStatistic {
            category: category.to_string(),
            year: normalize_year(year),
            month,
            department: department.to_string(),
            incident_count: incidents,
        });
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Code.département;Code.région;annee;classe;unité.de.compte;faits;POP;LOG;tauxpourmille\n";

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(parse_decimal("4,56"), Some(4.56));
        assert_eq!(parse_decimal("1 234,5"), Some(1234.5));
        assert_eq!(parse_decimal("NA"), None);
        assert_eq!(parse_count("12,0"), Some(12));
        assert_eq!(parse_count("12,5"), None);
        assert_eq!(parse_count("-3"), None);
    }

    #[test]
    fn test_read_yearly_rows() {
        let data = format!(
            "{HEADER}75;11;22;Vols;infraction;4600;2100000;1400000;2,19\n\
             75;11;21;Vols;infraction;4200;2150000;1390000;\n"
        );
        let batch = read_yearly(data.as_bytes()).unwrap();
        assert_eq!(batch.rows_read, 2);
        assert_eq!(batch.rows_skipped, 0);
        assert_eq!(batch.statistics.len(), 2);
        assert_eq!(batch.statistics[0].year, 2022);
        assert_eq!(batch.statistics[0].rate_per_mille, Some(2.19));

        // Missing rate is derived from the population.
        let derived = batch.statistics[1].rate_per_mille.unwrap();
        assert!((derived - 4200.0 * 1000.0 / 2_150_000.0).abs() < 1e-9);

        // Department figures come from the most recent year.
        assert_eq!(batch.departments.len(), 1);
        assert_eq!(batch.departments[0].population, 2_100_000);
        assert_eq!(batch.departments[0].reference_year, 2022);
        assert_eq!(batch.regions[0].name, "Region 11");
        assert_eq!(batch.categories[0].unit_label, "infraction");
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let data = format!(
            "{HEADER}75;11;22;Vols;infraction;abc;2100000;1400000;\n\
             ;11;22;Vols;infraction;10;2100000;1400000;\n\
             13;93;22;Vols;infraction;10;2000000;1000000;\n"
        );
        let batch = read_yearly(data.as_bytes()).unwrap();
        assert_eq!(batch.rows_read, 3);
        assert_eq!(batch.rows_skipped, 2);
        assert_eq!(batch.statistics.len(), 1);
        assert_eq!(batch.warnings.len(), 2);
    }

    #[test]
    fn test_missing_column_fails() {
        let err = read_yearly("annee;classe\n22;Vols\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("Code.département")));
    }

    #[test]
    fn test_read_monthly() {
        let data = "Code.département;classe;annee;mois;faits\n\
                    75;Vols;21;1;300\n\
                    75;Vols;21;13;300\n";
        let batch = read_monthly(data.as_bytes()).unwrap();
        assert_eq!(batch.statistics.len(), 1);
        assert_eq!(batch.statistics[0].year, 2021);
        assert_eq!(batch.rows_skipped, 1);
    }
}
