use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info, warn};

use super::category::Category;
use crate::error::DataError;

/// Four-digit calendar years; anything else is treated like a non-numeric year.
const VALID_YEARS: RangeInclusive<i32> = 1000..=9999;

const REQUIRED_COLUMNS: [&str; 4] = ["REF_DATE", "GEO", "Violations", "Actual_incidents"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub category: Category,
    pub year: i32,
    pub incidents: f64,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "REF_DATE")]
    ref_date: Option<String>,
    #[serde(rename = "GEO")]
    geo: Option<String>,
    #[serde(rename = "Violations")]
    violation: Option<String>,
    #[serde(rename = "Actual_incidents")]
    actual_incidents: Option<String>,
}

/// Yearly incident counts for one region, indexed by category.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    region: String,
    series: BTreeMap<Category, BTreeMap<i32, f64>>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>, region: &str) -> Result<Self, DataError> {
        let path = path.as_ref();
        info!("Loading dataset from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, region)
    }

    pub fn from_reader<R: Read>(reader: R, region: &str) -> Result<Self, DataError> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = reader.headers()?.clone();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| !headers.iter().any(|h| h == **col))
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataError::MissingColumns(missing));
        }

        let mut observations = Vec::new();
        let mut dropped = 0usize;

        for record in reader.deserialize::<RawRecord>() {
            let record = record?;

            if record.geo.as_deref() != Some(region) {
                continue;
            }
            let Some(category) = record
                .violation
                .as_deref()
                .and_then(|v| v.parse::<Category>().ok())
            else {
                continue;
            };

            match (
                record.ref_date.as_deref().and_then(parse_year),
                record.actual_incidents.as_deref().and_then(parse_count),
            ) {
                (Some(year), Some(incidents)) => observations.push(Observation {
                    category,
                    year,
                    incidents,
                }),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("Dropped {} rows with a non-numeric year or missing count", dropped);
        }

        let dataset = Self::from_observations(region, observations);
        info!(
            "Loaded {} observations across {} categories for {}",
            dataset.len(),
            dataset.series.len(),
            region
        );
        Ok(dataset)
    }

    pub fn from_observations(
        region: &str,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Self {
        let mut series: BTreeMap<Category, BTreeMap<i32, f64>> = BTreeMap::new();

        for obs in observations {
            let years = series.entry(obs.category).or_default();
            if years.insert(obs.year, obs.incidents).is_some() {
                warn!(
                    "Duplicate observation for {} in {}, keeping the later row",
                    obs.category, obs.year
                );
            }
        }

        Self {
            region: region.to_string(),
            series,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// (year, incidents) pairs for the category, sorted by year.
    pub fn series(&self, category: Category) -> Vec<(i32, f64)> {
        self.series
            .get(&category)
            .map(|years| years.iter().map(|(&y, &v)| (y, v)).collect())
            .unwrap_or_default()
    }

    pub fn value(&self, category: Category, year: i32) -> Option<f64> {
        self.series.get(&category)?.get(&year).copied()
    }

    pub fn year_range(&self, category: Category) -> Option<(i32, i32)> {
        let years = self.series.get(&category)?;
        let first = *years.keys().next()?;
        let last = *years.keys().next_back()?;
        Some((first, last))
    }

    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    let year = match raw.parse::<i32>() {
        Ok(year) => year,
        Err(_) => {
            let value = raw.parse::<f64>().ok()?;
            if !value.is_finite() || value.fract() != 0.0 {
                return None;
            }
            i32::try_from(value as i64).ok()?
        }
    };
    VALID_YEARS.contains(&year).then_some(year)
}

fn parse_count(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
REF_DATE,GEO,Violations,Actual_incidents,Unemployment_rate
2012,Ontario [35],Total robbery [160],3000,7.9
2010,Ontario [35],Total robbery [160],3200,8.7
2011,Ontario [35],Total robbery [160],3100,7.8
2011,Quebec [24],Total robbery [160],1500,7.8
2011,Ontario [35],Total arson [999],12,7.8
n/a,Ontario [35],Total mischief [250],40000,7.8
2013,Ontario [35],Total mischief [250],,7.5
2014.0,Ontario [35],Total mischief [250],41000,7.3
";

    #[test]
    fn filters_region_categories_and_bad_rows() {
        let dataset = Dataset::from_reader(CSV.as_bytes(), "Ontario [35]").unwrap();

        assert_eq!(dataset.region(), "Ontario [35]");
        assert_eq!(
            dataset.series(Category::Robbery),
            vec![(2010, 3200.0), (2011, 3100.0), (2012, 3000.0)]
        );
        assert_eq!(dataset.series(Category::Mischief), vec![(2014, 41000.0)]);
        assert!(dataset.series(Category::DrugViolations).is_empty());
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn year_range_and_lookup() {
        let dataset = Dataset::from_reader(CSV.as_bytes(), "Ontario [35]").unwrap();

        assert_eq!(dataset.year_range(Category::Robbery), Some((2010, 2012)));
        assert_eq!(dataset.year_range(Category::CriminalHarassment), None);
        assert_eq!(dataset.value(Category::Robbery, 2011), Some(3100.0));
        assert_eq!(dataset.value(Category::Robbery, 2013), None);
    }

    #[test]
    fn missing_columns_are_fatal() {
        let csv = "REF_DATE,GEO,Violations\n2010,Ontario [35],Total robbery [160]\n";
        match Dataset::from_reader(csv.as_bytes(), "Ontario [35]") {
            Err(DataError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["Actual_incidents".to_string()])
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_year_keeps_later_row() {
        let dataset = Dataset::from_observations(
            "Ontario [35]",
            vec![
                Observation {
                    category: Category::Robbery,
                    year: 2010,
                    incidents: 1.0,
                },
                Observation {
                    category: Category::Robbery,
                    year: 2010,
                    incidents: 2.0,
                },
            ],
        );
        assert_eq!(dataset.series(Category::Robbery), vec![(2010, 2.0)]);
    }

    #[test]
    fn parses_integral_float_years_only() {
        assert_eq!(parse_year("2019"), Some(2019));
        assert_eq!(parse_year("2019.0"), Some(2019));
        assert_eq!(parse_year("2019.5"), None);
        assert_eq!(parse_year("abc"), None);
    }

    #[test]
    fn out_of_window_years_are_dropped() {
        assert_eq!(parse_year("3000000000"), None);
        assert_eq!(parse_year("3000000000.0"), None);
        assert_eq!(parse_year("-2019"), None);
        assert_eq!(parse_year("20190"), None);

        let csv = "\
REF_DATE,GEO,Violations,Actual_incidents
2010,Ontario [35],Total robbery [160],11
2011,Ontario [35],Total robbery [160],12
2012,Ontario [35],Total robbery [160],13
2013,Ontario [35],Total robbery [160],14
3000000000,Ontario [35],Total robbery [160],15
";
        let dataset = Dataset::from_reader(csv.as_bytes(), "Ontario [35]").unwrap();
        assert_eq!(dataset.year_range(Category::Robbery), Some((2010, 2013)));
        assert_eq!(dataset.len(), 4);
    }
}
