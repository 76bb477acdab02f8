//! Per-family orchestration of engine runs.
//!
//! A family gets up to three invocations, in order: the main calculation,
//! a remaining-lifetime baseline and an age-range baseline. The baselines
//! use a one-person pedigree holding only the target with population
//! average risk factors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::engine_input::{EngineInputs, InputFiles, TargetData, censoring_ages};
use crate::error::Result;
use crate::ethnicity::Ethnicity;
use crate::genetic_test::Gene;
use crate::mdensity::MammographicDensity;
use crate::output::{self, EngineOutput};
use crate::pedigree::Pedigree;
use crate::prs::Prs;
use crate::report::FamilyResult;
use crate::risk_factors::RiskFactorCodec;
use crate::runner::{Engine, EngineJob, EngineOptions};
use crate::settings::{ASHKENAZI, Calculation, Limits, Model, ModelSettings};

/// Population-level parameters of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub population: String,
    pub frequencies: BTreeMap<Gene, f64>,
    pub sensitivities: BTreeMap<Gene, f64>,
    pub cancer_rates: String,
    pub ethnicity: Option<Ethnicity>,
}

/// Target-specific inputs applied to the main calculation only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionOptions {
    pub risk_factor_code: u64,
    pub height: Option<f64>,
    pub mdensity: Option<MammographicDensity>,
    pub prs: Option<Prs>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Variant {
    Main,
    RemainingLifetimeBaseline,
    RangeBaseline,
}

impl Variant {
    fn suffix(self) -> &'static str {
        match self {
            Variant::Main => "main",
            Variant::RemainingLifetimeBaseline => "baseline_remaining",
            Variant::RangeBaseline => "baseline_range",
        }
    }
}

/// The prediction for one validated family.
#[derive(Debug, Clone)]
pub struct Prediction<'a> {
    pub model: Model,
    pub settings: &'a ModelSettings,
    pub limits: &'a Limits,
    pub pedigree: &'a Pedigree,
    pub params: ModelParams,
    pub options: PredictionOptions,
    pub calculations: Vec<Calculation>,
    pub warnings: Vec<String>,
}

impl<'a> Prediction<'a> {
    /// Set up a prediction, switching to the Ashkenazi frequency table when
    /// anyone in the family has the Ashkenazi flag.
    pub fn new(
        model: Model,
        settings: &'a ModelSettings,
        limits: &'a Limits,
        pedigree: &'a Pedigree,
        mut params: ModelParams,
        options: PredictionOptions,
        calculations: Vec<Calculation>,
    ) -> Self {
        let mut warnings = Vec::new();
        if pedigree.is_ashkenazi()
            && params.population != ASHKENAZI
            && let Some(table) = settings.frequencies(ASHKENAZI)
        {
            tracing::info!(
                family = %pedigree.family_id,
                from = %params.population,
                "Ashkenazi individual present; using Ashkenazi mutation frequencies"
            );
            warnings.push(format!(
                "family {}: Ashkenazi individuals present, mutation frequencies changed from {} to {ASHKENAZI}",
                pedigree.family_id, params.population
            ));
            params.population = ASHKENAZI.to_string();
            params.frequencies = table.clone();
        }
        Self {
            model,
            settings,
            limits,
            pedigree,
            params,
            options,
            calculations,
            warnings,
        }
    }

    fn requested(&self, calculation: Calculation) -> bool {
        self.calculations.contains(&calculation)
    }

    /// Engine options for the main run, limited to what the target allows.
    pub fn main_options(&self) -> EngineOptions {
        let risks = self.pedigree.is_risks_viable(self.model, self.limits);
        EngineOptions {
            carrier_probs: self.requested(Calculation::CarrierProbs)
                && self.pedigree.is_carrier_probs_viable(),
            remaining_lifetime: risks && self.requested(Calculation::RemainingLifetime),
            lifetime: risks && self.requested(Calculation::Lifetime),
            ten_year: risks && self.requested(Calculation::TenYear),
            nhs_ten_year: self.requested(Calculation::TenYear)
                && self.pedigree.is_nhs_ten_year_viable(self.model, self.limits),
        }
    }

    fn ethnicity_file(&self) -> Option<PathBuf> {
        if self.model != Model::Bc {
            return None;
        }
        let root = self.settings.ethnicity_root.as_ref()?;
        let ethnicity = self
            .params
            .ethnicity
            .as_ref()
            .or(self.pedigree.header.ethnicity.as_ref())?;
        Some(
            self.settings
                .home
                .join(format!("{root}{}", ethnicity.ukbb().file_name())),
        )
    }

    /// Run every applicable variant, writing files into `work_dir`.
    pub fn run(&self, engine: &Engine<'_>, work_dir: &Path) -> Result<FamilyResult> {
        let family_id = &self.pedigree.family_id;
        let mut result = FamilyResult::new(family_id);

        let Some(main_inputs) = build_inputs(Variant::Main, self, None) else {
            tracing::info!(family = %family_id, "no requested calculation applies to the target");
            return Ok(result);
        };
        tracing::info!(family = %family_id, model = %self.model, "starting calculation");
        let main = self.execute(&main_inputs, engine, work_dir)?;

        if let Some(inputs) = build_inputs(Variant::RemainingLifetimeBaseline, self, Some(&main)) {
            result.baseline_cancer_risks = self.execute(&inputs, engine, work_dir)?.cancer_risks;
        }
        if let Some(inputs) = build_inputs(Variant::RangeBaseline, self, Some(&main)) {
            let baseline = self.execute(&inputs, engine, work_dir)?;
            result.baseline_lifetime_cancer_risk = baseline.lifetime_cancer_risk;
            result.baseline_ten_yr_cancer_risk = baseline.ten_yr_cancer_risk;
        }

        let EngineOutput {
            cancer_risks,
            lifetime_cancer_risk,
            ten_yr_cancer_risk,
            mut ten_yr_nhs_protocol,
            mutation_probabilities,
        } = main;
        if lifetime_cancer_risk.is_some() && ten_yr_nhs_protocol.is_none() {
            ten_yr_nhs_protocol.clone_from(&ten_yr_cancer_risk);
        }
        result.cancer_risks = cancer_risks;
        result.lifetime_cancer_risk = lifetime_cancer_risk;
        result.ten_yr_cancer_risk = ten_yr_cancer_risk;
        result.ten_yr_nhs_protocol = ten_yr_nhs_protocol;
        result.mutation_probabilities = mutation_probabilities;
        result.mutation_frequency = Some(self.params.frequencies.clone());
        result.prs = self.options.prs;
        let codec = RiskFactorCodec::for_model(self.model);
        if self.options.risk_factor_code > 0 {
            result.risk_factors = Some(codec.labels(self.options.risk_factor_code)?);
        }

        tracing::info!(family = %family_id, "finished calculation");
        Ok(result)
    }

    fn execute(
        &self,
        inputs: &EngineInputs,
        engine: &Engine<'_>,
        work_dir: &Path,
    ) -> Result<EngineOutput> {
        let files = inputs.write(work_dir, &self.settings.home.join(&self.settings.locus_file))?;
        let text = engine.run(&self.job(inputs, files))?;
        output::parse(&text, &inputs.genes)
    }

    /// Niceness follows the pedigree actually submitted, so baselines run
    /// at the one-person pedigree's priority.
    fn job(&self, inputs: &EngineInputs, files: InputFiles) -> EngineJob {
        EngineJob {
            options: inputs.options,
            output: files.output,
            params: files.params,
            batch: files.batch,
            incidence: self.settings.incidence_file(&self.params.cancer_rates),
            ethnicity: self.ethnicity_file(),
            niceness: inputs.pedigree.niceness(),
        }
    }
}

/// Engine inputs for one variant, or `None` when the variant does not run.
/// Baselines depend on what the main run produced.
pub fn build_inputs(
    variant: Variant,
    prediction: &Prediction<'_>,
    main: Option<&EngineOutput>,
) -> Option<EngineInputs> {
    let target_age = prediction.pedigree.target()?.age;
    let (pedigree, options, target) = match variant {
        Variant::Main => (
            prediction.pedigree.clone(),
            prediction.main_options(),
            TargetData {
                risk_factor_code: prediction.options.risk_factor_code,
                height: prediction.options.height,
                mdensity: prediction.options.mdensity,
                prs: prediction.options.prs,
            },
        ),
        Variant::RemainingLifetimeBaseline => {
            main?.cancer_risks.as_ref()?;
            let options = EngineOptions {
                remaining_lifetime: true,
                ..EngineOptions::default()
            };
            (prediction.pedigree.baseline(true)?, options, TargetData::default())
        }
        Variant::RangeBaseline => {
            let main = main?;
            let options = EngineOptions {
                lifetime: main.lifetime_cancer_risk.is_some(),
                ten_year: main.ten_yr_cancer_risk.is_some(),
                ..EngineOptions::default()
            };
            (prediction.pedigree.baseline(false)?, options, TargetData::default())
        }
    };
    if options.is_empty() {
        return None;
    }

    Some(EngineInputs {
        stem: format!("{}_{}", prediction.pedigree.family_id, variant.suffix()),
        model: prediction.model,
        pedigree,
        target,
        genes: prediction.settings.genes.clone(),
        population: prediction.params.population.clone(),
        frequencies: prediction.params.frequencies.clone(),
        sensitivities: prediction.params.sensitivities.clone(),
        ashkenazi: prediction.pedigree.is_ashkenazi(),
        options,
        censoring_ages: if options.remaining_lifetime {
            censoring_ages(target_age)
        } else {
            Vec::new()
        },
    })
}
