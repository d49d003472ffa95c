#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crime_forecast::config::Config;
use crime_forecast::data::Category;

pub const REGION: &str = "Ontario [35]";

/// Deterministic yearly counts with a mild trend and wobble per category.
pub fn incidents(category: Category, year: i32) -> f64 {
    let idx = Category::ALL.iter().position(|c| *c == category).unwrap_or(0) as f64;
    let t = (year - 2010) as f64;
    let base = 500.0 * (idx + 1.0);
    (base - 12.0 * t + 25.0 * ((year % 4) as f64)).max(1.0)
}

pub fn write_dataset(path: &Path, years: std::ops::RangeInclusive<i32>) {
    let mut csv = String::from("REF_DATE,GEO,Violations,Actual_incidents,Unemployment_rate\n");
    for category in Category::ALL {
        for year in years.clone() {
            writeln!(
                csv,
                "{},\"{}\",\"{}\",{},6.5",
                year,
                REGION,
                category,
                incidents(category, year)
            )
            .unwrap();
            // Another region that must be ignored
            writeln!(csv, "{},\"Quebec [24]\",\"{}\",99999,6.5", year, category).unwrap();
        }
    }
    fs::write(path, csv).unwrap();
}

pub fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data.path = dir.join("data.csv");
    config.models.dir = dir.join("models");
    config
}
