use std::fmt;
use std::str::FromStr;

/// Cancer types recorded in a pedigree, in file column order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CancerType {
    FirstBreast,
    ContralateralBreast,
    Ovarian,
    Prostate,
    Pancreatic,
}

impl CancerType {
    pub const ALL: [CancerType; 5] = [
        CancerType::FirstBreast,
        CancerType::ContralateralBreast,
        CancerType::Ovarian,
        CancerType::Prostate,
        CancerType::Pancreatic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CancerType::FirstBreast => "first breast cancer",
            CancerType::ContralateralBreast => "contralateral breast cancer",
            CancerType::Ovarian => "ovarian cancer",
            CancerType::Prostate => "prostate cancer",
            CancerType::Pancreatic => "pancreatic cancer",
        }
    }
}

/// Age at diagnosis of one cancer.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum Diagnosis {
    #[default]
    Unaffected,
    Age(u16),
    /// Affected, age at diagnosis unknown (`AU`).
    AgeUnknown,
}

impl Diagnosis {
    pub fn is_diagnosed(self) -> bool {
        self != Diagnosis::Unaffected
    }

    pub fn age(self) -> Option<u16> {
        match self {
            Diagnosis::Age(age) => Some(age),
            _ => None,
        }
    }
}

impl FromStr for Diagnosis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("AU") {
            return Ok(Diagnosis::AgeUnknown);
        }
        match trimmed.parse::<u16>() {
            Ok(0) => Ok(Diagnosis::Unaffected),
            Ok(age) => Ok(Diagnosis::Age(age)),
            Err(_) => Err(format!("invalid age at diagnosis '{trimmed}'")),
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::Unaffected => f.pad("0"),
            Diagnosis::Age(age) => f.pad(&age.to_string()),
            Diagnosis::AgeUnknown => f.pad("AU"),
        }
    }
}

/// Diagnoses for every [`CancerType`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Cancers([Diagnosis; CancerType::ALL.len()]);

impl Cancers {
    pub fn get(&self, cancer: CancerType) -> Diagnosis {
        self.0[cancer as usize]
    }

    pub fn set(&mut self, cancer: CancerType, diagnosis: Diagnosis) {
        self.0[cancer as usize] = diagnosis;
    }

    pub fn iter(&self) -> impl Iterator<Item = (CancerType, Diagnosis)> + '_ {
        CancerType::ALL
            .into_iter()
            .map(|cancer| (cancer, self.get(cancer)))
    }

    pub fn is_affected(&self) -> bool {
        self.0.iter().any(|diagnosis| diagnosis.is_diagnosed())
    }
}
