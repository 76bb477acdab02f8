//! Risk-factor categories and the mixed-radix code the engine consumes.
//!
//! Each model orders its dimensions; category 0 of every dimension means
//! unknown. The code is `sum(c_i * prod_{j<i}(n_j + 1))`, so the first
//! dimension is the least significant digit.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::settings::Model;

/// Errors raised while mapping a textual value to a category.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskFactorParseError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("range '{value}' for {key} spans more than one category")]
    AmbiguousRange { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Dimension {
    MenarcheAge,
    Parity,
    FirstLiveBirth,
    OralContraception,
    /// Ovarian-model oral contraception, categorised by duration of use.
    OralContraceptionDuration,
    Mht,
    /// Ovarian-model MHT: never/former versus current.
    MhtCurrent,
    Bmi,
    /// Ovarian-model BMI bands.
    BmiOc,
    AlcoholIntake,
    AgeOfMenopause,
    Height,
    TubalLigation,
    Endometriosis,
}

const BC_DIMENSIONS: &[Dimension] = &[
    Dimension::MenarcheAge,
    Dimension::Parity,
    Dimension::FirstLiveBirth,
    Dimension::OralContraception,
    Dimension::Mht,
    Dimension::Bmi,
    Dimension::AlcoholIntake,
    Dimension::AgeOfMenopause,
    Dimension::Height,
];

const OC_DIMENSIONS: &[Dimension] = &[
    Dimension::OralContraceptionDuration,
    Dimension::MhtCurrent,
    Dimension::Parity,
    Dimension::TubalLigation,
    Dimension::Endometriosis,
    Dimension::BmiOc,
    Dimension::Height,
];

/// Header keys that carry risk-factor values.
pub const HEADER_KEYS: &[&str] = &[
    "menarche",
    "parity",
    "first_live_birth",
    "oc_use",
    "mht_use",
    "bmi",
    "alcohol",
    "menopause",
    "height",
    "tl",
    "endo",
];

const EPSILON: f64 = 1e-6;

impl Dimension {
    pub fn name(self) -> &'static str {
        match self {
            Dimension::MenarcheAge => "menarche_age",
            Dimension::Parity => "parity",
            Dimension::FirstLiveBirth => "age_of_first_live_birth",
            Dimension::OralContraception | Dimension::OralContraceptionDuration => {
                "oral_contraception"
            }
            Dimension::Mht | Dimension::MhtCurrent => "mht",
            Dimension::Bmi | Dimension::BmiOc => "bmi",
            Dimension::AlcoholIntake => "alcohol_intake",
            Dimension::AgeOfMenopause => "age_of_menopause",
            Dimension::Height => "height",
            Dimension::TubalLigation => "tubal_ligation",
            Dimension::Endometriosis => "endometriosis",
        }
    }

    pub fn header_key(self) -> &'static str {
        match self {
            Dimension::MenarcheAge => "menarche",
            Dimension::Parity => "parity",
            Dimension::FirstLiveBirth => "first_live_birth",
            Dimension::OralContraception | Dimension::OralContraceptionDuration => "oc_use",
            Dimension::Mht | Dimension::MhtCurrent => "mht_use",
            Dimension::Bmi | Dimension::BmiOc => "bmi",
            Dimension::AlcoholIntake => "alcohol",
            Dimension::AgeOfMenopause => "menopause",
            Dimension::Height => "height",
            Dimension::TubalLigation => "tl",
            Dimension::Endometriosis => "endo",
        }
    }

    /// Category labels; index 0 is always the unknown category.
    pub fn categories(self) -> &'static [&'static str] {
        match self {
            Dimension::MenarcheAge => &["-", "<11", "11", "12", "13", "14", "15", ">15"],
            Dimension::Parity => &["-", "0", "1", "2", ">2"],
            Dimension::FirstLiveBirth => &["-", "<20", "20-24", "25-29", ">29"],
            Dimension::OralContraception => &["-", "never", "former", "current"],
            Dimension::OralContraceptionDuration => &["-", "never", "<5 years", ">=5 years"],
            Dimension::Mht => &["-", "never", "former", "current e-type", "current other"],
            Dimension::MhtCurrent => &["-", "never/former", "current"],
            Dimension::Bmi => &["-", "<18.5", "18.5-24.9", "25-29.9", ">=30"],
            Dimension::BmiOc => &["-", "<22.5", "22.5-29.9", ">=30"],
            Dimension::AlcoholIntake => &["-", "0", "<5", "5-14", "15-24", "25-34", "35-44", ">=45"],
            Dimension::AgeOfMenopause => &["-", "<40", "40-44", "45-49", "50-54", ">54"],
            Dimension::Height => &[
                "-",
                "<152.91",
                "152.91-159.65",
                "159.65-165.90",
                "165.90-172.53",
                ">=172.53",
            ],
            Dimension::TubalLigation | Dimension::Endometriosis => &["-", "no", "yes"],
        }
    }

    /// Number of non-zero categories.
    pub fn size(self) -> usize {
        self.categories().len() - 1
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Dimension::MenarcheAge
                | Dimension::Parity
                | Dimension::FirstLiveBirth
                | Dimension::Bmi
                | Dimension::BmiOc
                | Dimension::AlcoholIntake
                | Dimension::AgeOfMenopause
                | Dimension::Height
        )
    }

    /// Category holding a numeric value. Bands are half-open unless the
    /// label says otherwise.
    fn locate(self, v: f64) -> Option<usize> {
        if v < 0.0 {
            return None;
        }
        let category = match self {
            Dimension::MenarcheAge => match v {
                v if v < 11.0 => 1,
                v if v < 12.0 => 2,
                v if v < 13.0 => 3,
                v if v < 14.0 => 4,
                v if v < 15.0 => 5,
                v if v <= 15.0 => 6,
                _ => 7,
            },
            Dimension::Parity => match v {
                v if v < 1.0 => 1,
                v if v < 2.0 => 2,
                v if v <= 2.0 => 3,
                _ => 4,
            },
            Dimension::FirstLiveBirth => match v {
                v if v < 20.0 => 1,
                v if v < 25.0 => 2,
                v if v <= 29.0 => 3,
                _ => 4,
            },
            Dimension::Bmi => match v {
                v if v < 18.5 => 1,
                v if v < 25.0 => 2,
                v if v < 30.0 => 3,
                _ => 4,
            },
            Dimension::BmiOc => match v {
                v if v < 22.5 => 1,
                v if v < 30.0 => 2,
                _ => 3,
            },
            Dimension::AlcoholIntake => match v {
                v if v <= 0.0 => 1,
                v if v < 5.0 => 2,
                v if v < 15.0 => 3,
                v if v < 25.0 => 4,
                v if v < 35.0 => 5,
                v if v < 45.0 => 6,
                _ => 7,
            },
            Dimension::AgeOfMenopause => match v {
                v if v < 40.0 => 1,
                v if v < 45.0 => 2,
                v if v < 50.0 => 3,
                v if v <= 54.0 => 4,
                _ => 5,
            },
            Dimension::Height => match v {
                v if v < 152.91 => 1,
                v if v < 159.65 => 2,
                v if v < 165.90 => 3,
                v if v < 172.53 => 4,
                _ => 5,
            },
            _ => return None,
        };
        Some(category)
    }

    fn enumerated(self, raw: &str) -> Option<usize> {
        let lower = raw.to_ascii_lowercase();
        match self {
            Dimension::OralContraception => {
                let status = lower.split(':').next().unwrap_or_default();
                match status {
                    "n" | "never" => Some(1),
                    "f" | "former" => Some(2),
                    "c" | "current" => Some(3),
                    _ => None,
                }
            }
            Dimension::OralContraceptionDuration => {
                let (status, years) = match lower.split_once(':') {
                    Some((status, years)) => (status, Some(years)),
                    None => (lower.as_str(), None),
                };
                match status {
                    "n" | "never" => Some(1),
                    "f" | "former" | "c" | "current" => match years {
                        None => Some(0),
                        Some(years) => {
                            let years = years.trim().parse::<f64>().ok()?;
                            if years < 0.0 {
                                None
                            } else if years < 5.0 {
                                Some(2)
                            } else {
                                Some(3)
                            }
                        }
                    },
                    _ => None,
                }
            }
            Dimension::Mht => match lower.as_str() {
                "n" | "never" => Some(1),
                "f" | "former" => Some(2),
                "e" | "current e-type" => Some(3),
                "c" | "current other" | "current" => Some(4),
                _ => None,
            },
            Dimension::MhtCurrent => match lower.as_str() {
                "n" | "never" | "f" | "former" => Some(1),
                "e" | "c" | "current" => Some(2),
                _ => None,
            },
            Dimension::TubalLigation | Dimension::Endometriosis => match lower.as_str() {
                "n" | "no" => Some(1),
                "y" | "yes" => Some(2),
                _ => None,
            },
            _ => None,
        }
    }

    /// Category index for a textual header value.
    pub fn category(self, raw: &str) -> Result<usize, RiskFactorParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("NA") {
            return Ok(0);
        }
        let invalid = || RiskFactorParseError::InvalidValue {
            key: self.header_key(),
            value: trimmed.to_string(),
        };

        if !self.is_numeric() {
            return self.enumerated(trimmed).ok_or_else(invalid);
        }

        let bound = Bound::parse(trimmed).ok_or_else(invalid)?;
        let locate = |v: f64| self.locate(v).ok_or_else(invalid);
        match bound {
            Bound::Exactly(v) | Bound::AtMost(v) | Bound::AtLeast(v) => locate(v),
            Bound::Below(v) => locate(v - EPSILON),
            Bound::Above(v) => locate(v + EPSILON),
            Bound::Between(low, high) => {
                if low > high {
                    return Err(invalid());
                }
                let category = locate(low)?;
                if locate(high)? != category {
                    return Err(RiskFactorParseError::AmbiguousRange {
                        key: self.header_key(),
                        value: trimmed.to_string(),
                    });
                }
                Ok(category)
            }
        }
    }
}

/// A numeric value with an optional comparison prefix.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Exactly(f64),
    Below(f64),
    AtMost(f64),
    Above(f64),
    AtLeast(f64),
    Between(f64, f64),
}

impl Bound {
    fn parse(raw: &str) -> Option<Self> {
        let number = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        if let Some(rest) = raw.strip_prefix("<=") {
            return number(rest).map(Bound::AtMost);
        }
        if let Some(rest) = raw.strip_prefix(">=") {
            return number(rest).map(Bound::AtLeast);
        }
        if let Some(rest) = raw.strip_prefix('<') {
            return number(rest).map(Bound::Below);
        }
        if let Some(rest) = raw.strip_prefix('>') {
            return number(rest).map(Bound::Above);
        }
        if let Some(v) = number(raw) {
            return Some(Bound::Exactly(v));
        }
        let (low, high) = raw.split_once('-')?;
        Some(Bound::Between(number(low)?, number(high)?))
    }
}

/// Encoder/decoder for one model's ordered dimensions.
#[derive(Debug, Clone, Copy)]
pub struct RiskFactorCodec {
    dimensions: &'static [Dimension],
}

impl RiskFactorCodec {
    pub fn for_model(model: Model) -> Self {
        let dimensions = match model {
            Model::Bc => BC_DIMENSIONS,
            Model::Oc => OC_DIMENSIONS,
            Model::Pc => &[],
        };
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &'static [Dimension] {
        self.dimensions
    }

    /// Largest valid code, `prod(n_i + 1) - 1`.
    pub fn max_code(&self) -> u64 {
        self.dimensions
            .iter()
            .map(|d| d.size() as u64 + 1)
            .product::<u64>()
            - 1
    }

    pub fn encode(&self, categories: &[usize]) -> Result<u64> {
        if categories.len() != self.dimensions.len() {
            return Err(Error::RiskFactor(format!(
                "expected {} risk factor categories, found {}",
                self.dimensions.len(),
                categories.len()
            )));
        }
        let mut code = 0u64;
        let mut radix = 1u64;
        for (dimension, &category) in self.dimensions.iter().zip(categories) {
            if category > dimension.size() {
                return Err(Error::RiskFactor(format!(
                    "category {category} out of range for {}",
                    dimension.name()
                )));
            }
            code += category as u64 * radix;
            radix *= dimension.size() as u64 + 1;
        }
        Ok(code)
    }

    pub fn decode(&self, code: u64) -> Result<Vec<usize>> {
        if code > self.max_code() {
            return Err(Error::RiskFactor(format!(
                "risk factor code {code} exceeds maximum {}",
                self.max_code()
            )));
        }
        let mut remaining = code;
        Ok(self
            .dimensions
            .iter()
            .map(|dimension| {
                let radix = dimension.size() as u64 + 1;
                let category = (remaining % radix) as usize;
                remaining /= radix;
                category
            })
            .collect())
    }

    /// Category label per dimension name for a code.
    pub fn labels(&self, code: u64) -> Result<BTreeMap<String, String>> {
        let categories = self.decode(code)?;
        Ok(self
            .dimensions
            .iter()
            .zip(categories)
            .map(|(dimension, category)| {
                (
                    dimension.name().to_string(),
                    dimension.categories()[category].to_string(),
                )
            })
            .collect())
    }

    /// Categories from header `key=value` pairs. Missing keys are unknown.
    pub fn categories_from_values(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<Vec<usize>, RiskFactorParseError> {
        self.dimensions
            .iter()
            .map(|dimension| match values.get(dimension.header_key()) {
                Some(raw) => dimension.category(raw),
                None => Ok(0),
            })
            .collect()
    }

    pub fn code_from_values(&self, values: &BTreeMap<String, String>) -> Result<u64> {
        let categories = self
            .categories_from_values(values)
            .map_err(|e| Error::RiskFactor(e.to_string()))?;
        self.encode(&categories)
    }
}
