//! Per-model configuration: gene lists, population tables, engine location
//! and pedigree limits.
//!
//! Defaults are compiled in. A JSON settings file is merged over them key by
//! key, so a file may name only the fields it changes, including single
//! fields of one model.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::genetic_test::Gene;

pub const MAX_AGE: u16 = 110;
pub const MAX_AGE_FOR_RISK_CALCS: u16 = 80;
pub const MIN_YOB: u16 = 1850;
pub const MAX_FAMID_LEN: usize = 13;
pub const MAX_PERSON_ID_LEN: usize = 7;
pub const MAX_NAME_LEN: usize = 8;
/// Year-of-birth value the engine reads as "unknown".
pub const NULL_YOB: i32 = -1;
pub const MAX_NICENESS: u32 = 19;

pub const ASHKENAZI: &str = "Ashkenazi";
pub const CUSTOM: &str = "Custom";

/// The three cancer models served.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Breast cancer (BOADICEA)
    Bc,
    /// Ovarian cancer
    Oc,
    /// Prostate cancer
    Pc,
}

impl Model {
    pub fn name(self) -> &'static str {
        match self {
            Model::Bc => "BC",
            Model::Oc => "OC",
            Model::Pc => "PC",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Calculations a caller may request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Calculation {
    #[value(name = "carrier_probs")]
    CarrierProbs,
    #[value(name = "lifetime")]
    Lifetime,
    #[value(name = "ten_year")]
    TenYear,
    #[value(name = "remaining_lifetime")]
    RemainingLifetime,
}

impl Calculation {
    pub const ALL: [Calculation; 4] = [
        Calculation::CarrierProbs,
        Calculation::Lifetime,
        Calculation::TenYear,
        Calculation::RemainingLifetime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Calculation::CarrierProbs => "carrier_probs",
            Calculation::Lifetime => "lifetime",
            Calculation::TenYear => "ten_year",
            Calculation::RemainingLifetime => "remaining_lifetime",
        }
    }
}

impl FromStr for Calculation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Calculation::ALL
            .into_iter()
            .find(|calc| calc.name() == s.trim())
            .ok_or_else(|| Error::Config(format!("unknown calculation '{s}'")))
    }
}

/// Size and range limits applied by the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_age: u16,
    pub max_age_for_risk_calcs: u16,
    pub min_yob: u16,
    pub max_famid_len: usize,
    pub min_pedigree_size: usize,
    pub max_pedigree_size: usize,
    pub max_sibs: usize,
    pub max_sibs_same_yob: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_age: MAX_AGE,
            max_age_for_risk_calcs: MAX_AGE_FOR_RISK_CALCS,
            min_yob: MIN_YOB,
            max_famid_len: MAX_FAMID_LEN,
            min_pedigree_size: 3,
            max_pedigree_size: 275,
            max_sibs: 80,
            max_sibs_same_yob: 10,
        }
    }
}

/// Configuration of one cancer model and its engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub genes: Vec<Gene>,
    /// Mutation frequencies by population name.
    pub populations: BTreeMap<String, BTreeMap<Gene, f64>>,
    pub sensitivities: BTreeMap<Gene, f64>,
    pub cancer_rates: Vec<String>,
    /// Directory holding the engine executable and its data files.
    pub home: PathBuf,
    pub executable: String,
    /// Locus data file, relative to `home`.
    pub locus_file: PathBuf,
    /// Prefix of the incidence-rate files, relative to `home`.
    pub incidence_root: String,
    /// Prefix of the ethnicity reference files, relative to `home`.
    pub ethnicity_root: Option<String>,
    pub calculations: Vec<Calculation>,
    pub timeout_secs: u64,
    pub min_mutation_frequency: f64,
    pub max_mutation_frequency: f64,
}

impl ModelSettings {
    pub fn executable_path(&self) -> PathBuf {
        self.home.join(&self.executable)
    }

    pub fn frequencies(&self, population: &str) -> Option<&BTreeMap<Gene, f64>> {
        self.populations.get(population)
    }

    pub fn incidence_file(&self, cancer_rates: &str) -> PathBuf {
        self.home
            .join(format!("{}{}.nml", self.incidence_root, cancer_rates))
    }

    fn defaults(model: Model) -> Self {
        let genes: Vec<Gene> = match model {
            Model::Bc => vec![
                Gene::Brca1,
                Gene::Brca2,
                Gene::Palb2,
                Gene::Chek2,
                Gene::Atm,
                Gene::Bard1,
                Gene::Rad51d,
                Gene::Rad51c,
                Gene::Brip1,
            ],
            Model::Oc => vec![
                Gene::Brca1,
                Gene::Brca2,
                Gene::Rad51d,
                Gene::Rad51c,
                Gene::Brip1,
                Gene::Palb2,
            ],
            Model::Pc => vec![Gene::Brca1, Gene::Brca2],
        };

        let mut populations = BTreeMap::new();
        populations.insert("UK".to_string(), frequency_table(&genes, &[]));
        populations.insert(
            ASHKENAZI.to_string(),
            frequency_table(&genes, &[(Gene::Brca1, 0.008), (Gene::Brca2, 0.006)]),
        );
        populations.insert(
            "Iceland".to_string(),
            frequency_table(&genes, &[(Gene::Brca2, 0.003)]),
        );

        let sensitivities = genes
            .iter()
            .map(|&gene| (gene, default_sensitivity(gene)))
            .collect();

        let (home, executable, calculations) = match model {
            Model::Bc => ("models/boadicea", "boadicea.exe", Calculation::ALL.to_vec()),
            Model::Oc => ("models/ovarian", "ovarian.exe", Calculation::ALL.to_vec()),
            Model::Pc => (
                "models/prostate",
                "prostate.exe",
                vec![
                    Calculation::CarrierProbs,
                    Calculation::Lifetime,
                    Calculation::RemainingLifetime,
                ],
            ),
        };

        Self {
            genes,
            populations,
            sensitivities,
            cancer_rates: DEFAULT_CANCER_RATES.iter().map(|s| s.to_string()).collect(),
            home: PathBuf::from(home),
            executable: executable.to_string(),
            locus_file: PathBuf::from("Data/locus.loc"),
            incidence_root: "Data/incidences_".to_string(),
            ethnicity_root: (model == Model::Bc).then(|| "Data/ethnicity_".to_string()),
            calculations,
            timeout_secs: 240,
            min_mutation_frequency: 0.0,
            max_mutation_frequency: 0.1,
        }
    }
}

const DEFAULT_CANCER_RATES: &[&str] = &[
    "UK",
    "Australia",
    "Canada",
    "USA",
    "Denmark",
    "Finland",
    "Iceland",
    "New-Zealand",
    "Spain",
    "Sweden",
    "Netherlands",
];

fn uk_frequency(gene: Gene) -> f64 {
    match gene {
        Gene::Brca1 => 0.0006394,
        Gene::Brca2 => 0.00102,
        Gene::Palb2 => 0.000575,
        Gene::Chek2 => 0.002614,
        Gene::Atm => 0.001921,
        Gene::Bard1 => 0.000398,
        Gene::Rad51d => 0.000394,
        Gene::Rad51c => 0.000233,
        Gene::Brip1 => 0.000684,
    }
}

fn default_sensitivity(gene: Gene) -> f64 {
    match gene {
        Gene::Brca1 => 0.7,
        Gene::Brca2 => 0.8,
        Gene::Chek2 => 1.0,
        _ => 0.9,
    }
}

fn frequency_table(genes: &[Gene], overrides: &[(Gene, f64)]) -> BTreeMap<Gene, f64> {
    genes
        .iter()
        .map(|&gene| {
            let frequency = overrides
                .iter()
                .find(|(g, _)| *g == gene)
                .map(|(_, f)| *f)
                .unwrap_or_else(|| uk_frequency(gene));
            (gene, frequency)
        })
        .collect()
}

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bc: ModelSettings,
    pub oc: ModelSettings,
    pub pc: ModelSettings,
    pub limits: Limits,
    /// Root for per-submission working directories; system temp when unset.
    pub work_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bc: ModelSettings::defaults(Model::Bc),
            oc: ModelSettings::defaults(Model::Oc),
            pc: ModelSettings::defaults(Model::Pc),
            limits: Limits::default(),
            work_root: None,
        }
    }
}

impl Settings {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| Error::Config(format!("invalid settings file {}: {e}", path.display())))
    }

    /// Defaults with the objects in `raw` merged over them.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let overrides: Value = serde_json::from_str(raw)?;
        let mut merged = serde_json::to_value(Settings::default())?;
        merge(&mut merged, overrides);
        serde_json::from_value(merged)
    }

    pub fn model(&self, model: Model) -> &ModelSettings {
        match model {
            Model::Bc => &self.bc,
            Model::Oc => &self.oc,
            Model::Pc => &self.pc,
        }
    }

    pub fn model_mut(&mut self, model: Model) -> &mut ModelSettings {
        match model {
            Model::Bc => &mut self.bc,
            Model::Oc => &mut self.oc,
            Model::Pc => &mut self.pc,
        }
    }
}

/// Objects merge key by key; any other value replaces what it overrides.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_model_gene() {
        let settings = Settings::default();
        for model in [Model::Bc, Model::Oc, Model::Pc] {
            let ms = settings.model(model);
            for population in ["UK", ASHKENAZI, "Iceland"] {
                let table = ms.frequencies(population).unwrap();
                assert_eq!(table.len(), ms.genes.len());
            }
            assert_eq!(ms.sensitivities.len(), ms.genes.len());
        }
        assert_eq!(settings.bc.frequencies(ASHKENAZI).unwrap()[&Gene::Brca1], 0.008);
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"limits": {"max_pedigree_size": 10}}"#).unwrap();
        let settings = Settings::from_path(&path).unwrap();
        assert_eq!(settings.limits.max_pedigree_size, 10);
        assert_eq!(settings.limits.min_yob, MIN_YOB);
        assert_eq!(settings.bc.executable, "boadicea.exe");
    }

    #[test]
    fn single_model_field_can_be_overridden() {
        let settings =
            Settings::from_json(r#"{"bc": {"timeout_secs": 60}, "oc": {"populations": {"UK": {"BRCA1": 0.002}}}}"#)
                .unwrap();
        assert_eq!(settings.bc.timeout_secs, 60);
        assert_eq!(settings.bc.genes.len(), 9);
        assert_eq!(settings.bc.executable, "boadicea.exe");
        assert_eq!(settings.oc.executable, "ovarian.exe");
        let uk = settings.oc.frequencies("UK").unwrap();
        assert_eq!(uk[&Gene::Brca1], 0.002);
        assert_eq!(uk.len(), settings.oc.genes.len());
        assert_eq!(settings.pc.timeout_secs, 240);
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"bc": {"timeout_secs": "soon"}}"#).unwrap();
        assert!(matches!(Settings::from_path(&path), Err(Error::Config(_))));
    }

    #[test]
    fn calculation_names_round_trip() {
        for calc in Calculation::ALL {
            assert_eq!(calc.name().parse::<Calculation>().unwrap(), calc);
        }
        assert!("everything".parse::<Calculation>().is_err());
    }
}
