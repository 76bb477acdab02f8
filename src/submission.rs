//! One request for a model: pedigree text plus run parameters.
//!
//! [`process`] checks the request against the model configuration, parses
//! and validates every family, then runs the families in input order. Any
//! error aborts the whole submission.

use std::collections::BTreeMap;
use std::path::Path;

use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::genetic_test::Gene;
use crate::pedigree::Pedigree;
use crate::pedigree_file;
use crate::prediction::{ModelParams, Prediction, PredictionOptions};
use crate::prs::Prs;
use crate::report::PredictionReport;
use crate::risk_factors::RiskFactorCodec;
use crate::runner::Engine;
use crate::settings::{CUSTOM, Calculation, Model, ModelSettings, Settings};
use crate::validate::{current_year, validate};

/// What the caller is allowed to supply or keep.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Permissions {
    pub risk_factors: bool,
    pub prs: bool,
    pub retain_working_files: bool,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub user: String,
    pub model: Model,
    pub pedigree_text: String,
    pub population: String,
    /// Per-gene frequencies, only for the `Custom` population.
    pub mutation_frequencies: Option<BTreeMap<Gene, f64>>,
    /// Overrides of the model's default sensitivities.
    pub mutation_sensitivities: BTreeMap<Gene, f64>,
    pub cancer_rates: String,
    /// Overrides the code derived from the pedigree file header.
    pub risk_factor_code: Option<u64>,
    /// Overrides the PRS for the model's cancer from the header.
    pub prs: Option<Prs>,
    /// Empty means every calculation the model offers.
    pub calculations: Vec<Calculation>,
    pub permissions: Permissions,
}

impl Submission {
    pub fn new(model: Model, pedigree_text: impl Into<String>) -> Self {
        Self {
            user: String::new(),
            model,
            pedigree_text: pedigree_text.into(),
            population: "UK".to_string(),
            mutation_frequencies: None,
            mutation_sensitivities: BTreeMap::new(),
            cancer_rates: "UK".to_string(),
            risk_factor_code: None,
            prs: None,
            calculations: Vec::new(),
            permissions: Permissions::default(),
        }
    }

    fn check_permissions(&self) -> Result<()> {
        if self.risk_factor_code.is_some() && !self.permissions.risk_factors {
            return Err(Error::Permission(format!(
                "user '{}' may not supply risk_factor_code",
                self.user
            )));
        }
        if self.prs.is_some() && !self.permissions.prs {
            return Err(Error::Permission(format!(
                "user '{}' may not supply prs",
                self.user
            )));
        }
        Ok(())
    }

    fn calculations(&self, settings: &ModelSettings) -> Result<Vec<Calculation>> {
        if self.calculations.is_empty() {
            return Ok(settings.calculations.clone());
        }
        if let Some(calc) = self
            .calculations
            .iter()
            .find(|calc| !settings.calculations.contains(calc))
        {
            return Err(Error::Config(format!(
                "calculation '{}' is not available for the {} model",
                calc.name(),
                self.model
            )));
        }
        Ok(self.calculations.clone())
    }

    fn frequencies(&self, settings: &ModelSettings) -> Result<BTreeMap<Gene, f64>> {
        if self.population != CUSTOM {
            return settings
                .frequencies(&self.population)
                .cloned()
                .ok_or_else(|| Error::Config(format!("unknown population '{}'", self.population)));
        }
        let custom = self.mutation_frequencies.as_ref().ok_or_else(|| {
            Error::Config("the Custom population needs mutation frequencies".to_string())
        })?;
        settings
            .genes
            .iter()
            .map(|&gene| {
                let frequency = custom.get(&gene).copied().ok_or_else(|| {
                    Error::Config(format!("no custom mutation frequency for {gene}"))
                })?;
                if !(settings.min_mutation_frequency..=settings.max_mutation_frequency)
                    .contains(&frequency)
                {
                    return Err(Error::Config(format!(
                        "{gene} mutation frequency {frequency} outside [{}, {}]",
                        settings.min_mutation_frequency, settings.max_mutation_frequency
                    )));
                }
                Ok((gene, frequency))
            })
            .collect()
    }

    fn sensitivities(&self, settings: &ModelSettings) -> Result<BTreeMap<Gene, f64>> {
        let mut sensitivities = settings.sensitivities.clone();
        for (&gene, &sensitivity) in &self.mutation_sensitivities {
            if !settings.genes.contains(&gene) {
                return Err(Error::Config(format!(
                    "{gene} is not a gene of the {} model",
                    self.model
                )));
            }
            if !(0.0..=1.0).contains(&sensitivity) {
                return Err(Error::Config(format!(
                    "{gene} mutation sensitivity {sensitivity} outside [0, 1]"
                )));
            }
            sensitivities.insert(gene, sensitivity);
        }
        Ok(sensitivities)
    }

    fn cancer_rates(&self, settings: &ModelSettings) -> Result<()> {
        if settings.cancer_rates.contains(&self.cancer_rates) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "unknown cancer rates '{}'",
                self.cancer_rates
            )))
        }
    }

    /// Target inputs for one family. Header-derived values are used only
    /// under the matching permission; explicit values win.
    fn options(&self, pedigree: &Pedigree, warnings: &mut Vec<String>) -> Result<PredictionOptions> {
        let header = &pedigree.header;
        let model = self.model;
        let header_code = if !self.permissions.risk_factors {
            if header.risk_factor_code(model).ok().flatten().is_some_and(|code| code > 0) {
                warnings.push(format!(
                    "family {}: risk factors in the pedigree file ignored without permission",
                    pedigree.family_id
                ));
            }
            None
        } else if self.risk_factor_code.is_none() {
            header.risk_factor_code(model)?
        } else {
            None
        };
        let header_prs = header.prs(model);
        if !self.permissions.prs && header_prs.is_some() {
            warnings.push(format!(
                "family {}: polygenic risk score in the pedigree file ignored without permission",
                pedigree.family_id
            ));
        }

        let risk_factor_code = if self.permissions.risk_factors {
            self.risk_factor_code.or(header_code).unwrap_or(0)
        } else {
            0
        };
        let codec = RiskFactorCodec::for_model(model);
        if risk_factor_code > codec.max_code() {
            return Err(Error::RiskFactor(format!(
                "risk factor code {risk_factor_code} exceeds maximum {} for the {model} model",
                codec.max_code()
            )));
        }
        let (height, mdensity) = if model == Model::Bc && self.permissions.risk_factors {
            (header.height, header.mdensity)
        } else {
            (None, None)
        };
        let prs = if self.permissions.prs {
            self.prs.or(header_prs)
        } else {
            None
        };
        Ok(PredictionOptions {
            risk_factor_code,
            height,
            mdensity,
            prs,
        })
    }
}

fn work_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("canrisk-");
    let dir = match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Run a submission end to end.
pub fn process(settings: &Settings, submission: Submission) -> Result<PredictionReport> {
    submission.check_permissions()?;

    let model = submission.model;
    let mut model_settings = settings.model(model).clone();
    model_settings.home = std::path::absolute(&model_settings.home)?;
    let calculations = submission.calculations(&model_settings)?;
    let frequencies = submission.frequencies(&model_settings)?;
    let sensitivities = submission.sensitivities(&model_settings)?;
    submission.cancer_rates(&model_settings)?;

    let mut file = pedigree_file::parse(&submission.pedigree_text)?;
    let mut warnings = std::mem::take(&mut file.warnings);
    warnings.extend(validate(&mut file.pedigrees, model, settings, current_year())?);
    tracing::info!(
        user = %submission.user,
        %model,
        families = file.pedigrees.len(),
        "submission validated"
    );

    let dir = work_dir(settings.work_root.as_deref())?;
    let engine = Engine::new(&model_settings);
    let version = engine.version()?;
    let mut report = PredictionReport::new(
        model,
        version,
        &submission.population,
        &submission.cancer_rates,
    );

    for pedigree in &file.pedigrees {
        let options = submission.options(pedigree, &mut warnings)?;
        let params = ModelParams {
            population: submission.population.clone(),
            frequencies: frequencies.clone(),
            sensitivities: sensitivities.clone(),
            cancer_rates: submission.cancer_rates.clone(),
            ethnicity: pedigree.header.ethnicity.clone(),
        };
        let prediction = Prediction::new(
            model,
            &model_settings,
            &settings.limits,
            pedigree,
            params,
            options,
            calculations.clone(),
        );
        let result = prediction.run(&engine, dir.path())?;
        warnings.extend(prediction.warnings);
        report.pedigree_result.push(result);
    }
    report.warnings = warnings;

    if submission.permissions.retain_working_files {
        #[allow(deprecated)]
        let kept = dir.into_path();
        tracing::info!(dir = %kept.display(), "kept working files");
    }
    Ok(report)
}
