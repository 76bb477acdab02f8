//! Result records returned to the caller.
//!
//! A [`PredictionReport`] holds one [`FamilyResult`] per family plus the
//! metadata of the run, and serialises to JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::genetic_test::Gene;
use crate::output::{MutationProbability, RiskAtAge};
use crate::prs::Prs;
use crate::settings::Model;

/// Results for one family. Fields are present only when the calculation
/// ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FamilyResult {
    pub family_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancer_risks: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_cancer_risks: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_cancer_risk: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_lifetime_cancer_risk: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ten_yr_cancer_risk: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_ten_yr_cancer_risk: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ten_yr_nhs_protocol: Option<Vec<RiskAtAge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_probabilities: Option<Vec<MutationProbability>>,
    /// Category label per risk-factor dimension of the code used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<BTreeMap<String, String>>,
    /// Mutation frequencies used, after any population override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_frequency: Option<BTreeMap<Gene, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prs: Option<Prs>,
}

impl FamilyResult {
    pub fn new(family_id: &str) -> Self {
        Self {
            family_id: family_id.to_string(),
            ..Self::default()
        }
    }
}

/// Report for a whole submission.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    /// Engine version string
    pub version: String,
    /// Version of this crate
    pub tool_version: String,
    /// Time of the run (RFC 3339)
    pub timestamp: String,
    pub model: Model,
    pub population: String,
    pub cancer_rates: String,
    pub warnings: Vec<String>,
    pub pedigree_result: Vec<FamilyResult>,
}

impl PredictionReport {
    pub fn new(model: Model, version: String, population: &str, cancer_rates: &str) -> Self {
        Self {
            version,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: timestamp(),
            model,
            population: population.to_string(),
            cancer_rates: cancer_rates.to_string(),
            warnings: Vec::new(),
            pedigree_result: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    /// Write the report as pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        tracing::info!("Wrote prediction report to {}", path.display());
        Ok(())
    }
}

fn timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Probability;

    #[test]
    fn absent_results_are_omitted() {
        let mut result = FamilyResult::new("FAM1");
        result.cancer_risks = Some(vec![RiskAtAge {
            age: 80,
            cancer_risk: Probability::new(0.1, 1),
        }]);
        let json = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["cancer_risks"][0]["age"], 80);
        assert!(object.get("mutation_probabilities").is_none());
    }

    #[test]
    fn frequencies_serialise_by_gene_name() {
        let mut result = FamilyResult::new("FAM1");
        result.mutation_frequency = Some(BTreeMap::from([(Gene::Brca1, 0.008)]));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["mutation_frequency"]["BRCA1"], 0.008);
    }

    #[test]
    fn report_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = PredictionReport::new(Model::Bc, "5.0".into(), "UK", "UK");
        report.pedigree_result.push(FamilyResult::new("FAM1"));
        report.write_json(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["model"], "bc");
        assert_eq!(written["pedigree_result"][0]["family_id"], "FAM1");
        assert!(written["timestamp"].as_str().unwrap().contains('T'));
    }
}
