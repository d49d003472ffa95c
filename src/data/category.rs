use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The crime categories ("violations") the service trains and serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    Robbery,
    PropertyCrime,
    TheftUnder5000,
    MotorVehicleTheft,
    Mischief,
    DrugViolations,
    AggravatedSexualAssault,
    ParentalAbduction,
    CriminalHarassment,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Robbery,
        Category::PropertyCrime,
        Category::TheftUnder5000,
        Category::MotorVehicleTheft,
        Category::Mischief,
        Category::DrugViolations,
        Category::AggravatedSexualAssault,
        Category::ParentalAbduction,
        Category::CriminalHarassment,
    ];

    /// Name as it appears in the `Violations` column of the dataset.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Robbery => "Total robbery [160]",
            Category::PropertyCrime => "Total property crime violations [200]",
            Category::TheftUnder5000 => "Total theft under $5,000 (non-motor vehicle) [240]",
            Category::MotorVehicleTheft => "Total theft of motor vehicle [220]",
            Category::Mischief => "Total mischief [250]",
            Category::DrugViolations => "Total drug violations [401]",
            Category::AggravatedSexualAssault => "Sexual assault, level 3, aggravated [1310]",
            Category::ParentalAbduction => "Abduction under age 14, by parent or guardian [1560]",
            Category::CriminalHarassment => "Criminal harassment [1625]",
        }
    }

    /// File-name friendly form of the name.
    pub fn slug(self) -> String {
        self.as_str()
            .replace(' ', "_")
            .replace('/', "_")
            .replace(['[', ']'], "")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown violation: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl TryFrom<String> for Category {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}
