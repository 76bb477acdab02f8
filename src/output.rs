//! Parser for the engine's sectioned text output.
//!
//! Sections start with a `##` line. Risk sections hold comma-separated rows
//! whose last two fields are the censoring age and the cumulative risk. The
//! probabilities section holds a gene-name row followed by one row of
//! values, the first of which is for no mutation.

use std::str::FromStr;

use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::genetic_test::Gene;

pub const NO_MUTATION: &str = "no mutation";

/// A probability and its percentage rounded for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Probability {
    pub decimal: f64,
    pub percent: f64,
}

impl Probability {
    pub fn new(decimal: f64, places: i32) -> Self {
        let scale = 10f64.powi(places);
        Self {
            decimal,
            percent: (decimal * 100.0 * scale).round() / scale,
        }
    }
}

/// Cumulative cancer risk at one age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAtAge {
    pub age: u16,
    pub cancer_risk: Probability,
}

/// Carrier probability for one gene, or for no mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationProbability {
    pub gene: String,
    pub probability: Probability,
}

impl Serialize for MutationProbability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.gene, &self.probability)?;
        map.end()
    }
}

/// Typed contents of one output file. A section the engine did not write
/// is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub cancer_risks: Option<Vec<RiskAtAge>>,
    pub lifetime_cancer_risk: Option<Vec<RiskAtAge>>,
    pub ten_yr_cancer_risk: Option<Vec<RiskAtAge>>,
    pub ten_yr_nhs_protocol: Option<Vec<RiskAtAge>>,
    pub mutation_probabilities: Option<Vec<MutationProbability>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Section {
    Other,
    RemainingLifetime,
    Lifetime,
    TenYear,
    NhsTenYear,
    Probabilities,
}

impl Section {
    fn from_header(line: &str) -> Self {
        let upper = line.to_ascii_uppercase();
        if upper.contains("REMAINING LIFETIME RISK") {
            Section::RemainingLifetime
        } else if upper.contains("LIFETIME RISK") {
            Section::Lifetime
        } else if upper.contains("10-YEAR RISK") && upper.contains("NHS PROTOCOL") {
            Section::NhsTenYear
        } else if upper.contains("10-YEAR RISK") {
            Section::TenYear
        } else if upper.contains("PROBABILITIES") {
            Section::Probabilities
        } else {
            Section::Other
        }
    }
}

fn malformed(message: String) -> Error {
    Error::Model {
        message,
        stderr: String::new(),
    }
}

/// Parse engine output, checking probability columns against `genes`.
pub fn parse(text: &str, genes: &[Gene]) -> Result<EngineOutput> {
    let gene_header = Regex::new(r"^[\w,]+$")
        .map_err(|e| malformed(format!("gene header pattern: {e}")))?;

    let mut output = EngineOutput::default();
    let mut section = Section::Other;
    let mut header_seen = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("##") {
            section = Section::from_header(line);
            let slot = match section {
                Section::RemainingLifetime => &mut output.cancer_risks,
                Section::Lifetime => &mut output.lifetime_cancer_risk,
                Section::TenYear => &mut output.ten_yr_cancer_risk,
                Section::NhsTenYear => &mut output.ten_yr_nhs_protocol,
                Section::Probabilities | Section::Other => continue,
            };
            slot.get_or_insert_with(Vec::new);
            continue;
        }
        if line.is_empty() || line.contains("Age") {
            continue;
        }

        let rows = match section {
            Section::Other => continue,
            Section::Probabilities => {
                if !header_seen {
                    if gene_header.is_match(line) {
                        check_gene_header(line, genes)?;
                        header_seen = true;
                    }
                } else if output.mutation_probabilities.is_none() {
                    output.mutation_probabilities = Some(probabilities(line, genes)?);
                }
                continue;
            }
            Section::RemainingLifetime => &mut output.cancer_risks,
            Section::Lifetime => &mut output.lifetime_cancer_risk,
            Section::TenYear => &mut output.ten_yr_cancer_risk,
            Section::NhsTenYear => &mut output.ten_yr_nhs_protocol,
        };
        rows.get_or_insert_with(Vec::new).push(risk_row(line)?);
    }

    if header_seen && output.mutation_probabilities.is_none() {
        return Err(malformed(
            "probabilities section has no values row".to_string(),
        ));
    }
    Ok(output)
}

fn risk_row(line: &str) -> Result<RiskAtAge> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let bad = || malformed(format!("unparseable risk row '{line}'"));
    let [.., age, risk] = fields.as_slice() else {
        return Err(bad());
    };
    let age = age
        .parse::<u16>()
        .or_else(|_| {
            age.parse::<f64>()
                .ok()
                .filter(|a| a.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(a))
                .map(|a| a as u16)
                .ok_or(())
        })
        .map_err(|()| bad())?;
    let risk = risk.parse::<f64>().map_err(|_| bad())?;
    Ok(RiskAtAge {
        age,
        cancer_risk: Probability::new(risk, 1),
    })
}

fn check_gene_header(line: &str, genes: &[Gene]) -> Result<()> {
    let mut names: Vec<&str> = line.split(',').map(str::trim).collect();
    if names.first().is_some_and(|n| Gene::from_str(n).is_err()) {
        names.remove(0);
    }
    let parsed: Vec<Gene> = names
        .iter()
        .map(|n| Gene::from_str(n))
        .collect::<Result<_>>()
        .map_err(|e| malformed(format!("probabilities header: {e}")))?;
    if parsed != genes {
        return Err(malformed(format!(
            "probabilities header '{line}' does not match model genes {}",
            genes
                .iter()
                .map(|g| g.name())
                .collect::<Vec<_>>()
                .join(",")
        )));
    }
    Ok(())
}

fn probabilities(line: &str, genes: &[Gene]) -> Result<Vec<MutationProbability>> {
    let values: Vec<f64> = line
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| malformed(format!("unparseable probabilities row '{line}'")))?;
    if values.len() != genes.len() + 1 {
        return Err(malformed(format!(
            "expected {} probabilities, found {}",
            genes.len() + 1,
            values.len()
        )));
    }
    let names = std::iter::once(NO_MUTATION.to_string()).chain(genes.iter().map(|g| g.name().to_string()));
    Ok(names
        .zip(values)
        .map(|(gene, decimal)| MutationProbability {
            gene,
            probability: Probability::new(decimal, 2),
        })
        .collect())
}
