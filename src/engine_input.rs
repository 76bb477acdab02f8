//! Pedigree, batch and parameter files read by the numerical engine.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cancer::CancerType;
use crate::error::{Error, Result};
use crate::genetic_test::Gene;
use crate::mdensity::MammographicDensity;
use crate::pathology::Receptor;
use crate::pedigree::Pedigree;
use crate::person::Person;
use crate::prs::Prs;
use crate::runner::EngineOptions;
use crate::settings::{MAX_AGE_FOR_RISK_CALCS, Model, NULL_YOB};

const FAMILY_FORMAT: &str = "(I3,X,A8)";
const EMPTY_FIELD: &str = "00000000";

/// Default ages at which cumulative risk is reported for a target aged
/// `age`: each of the next five years, every multiple of five up to 80,
/// ten years ahead, and 80 itself.
pub fn censoring_ages(age: u16) -> Vec<u16> {
    let max = MAX_AGE_FOR_RISK_CALCS;
    let mut ages: Vec<u16> = (age + 1..=age + 5).filter(|&a| a <= max).collect();
    ages.extend((age + 6..=max).filter(|a| a % 5 == 0));
    if age + 10 <= max {
        ages.push(age + 10);
    }
    ages.push(max);
    ages.sort_unstable();
    ages.dedup();
    ages
}

/// Data written only on the target's record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetData {
    pub risk_factor_code: u64,
    pub height: Option<f64>,
    pub mdensity: Option<MammographicDensity>,
    pub prs: Option<Prs>,
}

/// Everything needed to write one engine invocation's input files.
#[derive(Debug, Clone)]
pub struct EngineInputs {
    /// File name stem shared by the input and output files.
    pub stem: String,
    pub model: Model,
    pub pedigree: Pedigree,
    pub target: TargetData,
    pub genes: Vec<Gene>,
    pub population: String,
    pub frequencies: BTreeMap<Gene, f64>,
    pub sensitivities: BTreeMap<Gene, f64>,
    pub ashkenazi: bool,
    pub options: EngineOptions,
    /// Ages at which risks are evaluated; empty for a single section at the
    /// target's current age.
    pub censoring_ages: Vec<u16>,
}

/// Paths of the files for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFiles {
    pub pedigree: PathBuf,
    pub batch: PathBuf,
    pub params: PathBuf,
    pub output: PathBuf,
}

impl EngineInputs {
    /// Write the three input files into `dir`.
    pub fn write(&self, dir: &Path, locus_file: &Path) -> Result<InputFiles> {
        let files = InputFiles {
            pedigree: dir.join(format!("{}.ped", self.stem)),
            batch: dir.join(format!("{}.bat", self.stem)),
            params: dir.join(format!("{}.params", self.stem)),
            output: dir.join(format!("{}.out", self.stem)),
        };
        fs::write(&files.pedigree, self.pedigree_text()?)?;
        fs::write(&files.batch, self.batch_text(locus_file, &files.pedigree))?;
        fs::write(&files.params, self.params_text())?;
        tracing::debug!(
            family = %self.pedigree.family_id,
            stem = %self.stem,
            dir = %dir.display(),
            "wrote engine input files"
        );
        Ok(files)
    }

    fn record_format(&self) -> String {
        let height = if self.model == Model::Bc { "1X,F8.4," } else { "" };
        format!(
            "(3(A7,1X),A1,1X,A1,1X,A2,5(1X,A3),1X,I3,{}(1X,I1),1X,I4,5(1X,A1),1X,I2,1X,A8,{height}1X,A8,2(1X,F9.6))",
            self.genes.len()
        )
    }

    /// Fixed-column pedigree file: one block of the whole family per
    /// genotype index.
    pub fn pedigree_text(&self) -> Result<String> {
        let blocks = if self.options.carrier_probs {
            self.genes.len() + 1
        } else {
            1
        };
        let mut out = String::new();
        let _ = writeln!(out, "{FAMILY_FORMAT}");
        let _ = writeln!(out, "{}", self.record_format());
        for genotype in 1..=blocks {
            let _ = writeln!(out, "{:>3} {}", self.pedigree.len(), self.pedigree.family_id);
            for person in self.pedigree.people() {
                let line = self.record(person, genotype)?;
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }

    fn record(&self, person: &Person, genotype: usize) -> Result<String> {
        let mut line = format!(
            "{:<7} {:<7} {:<7} {} {}",
            person.id,
            person.father_id.as_deref().unwrap_or(""),
            person.mother_id.as_deref().unwrap_or(""),
            person.sex(),
            person.mztwin.map_or('0', |tag| tag.as_char()),
        );
        if person.target {
            let _ = write!(line, " {genotype:>2}");
        } else {
            line.push_str("   ");
        }
        for cancer in CancerType::ALL {
            let _ = write!(line, " {:>3}", person.cancers.get(cancer));
        }
        let _ = write!(line, " {:>3}", person.age);
        for &gene in &self.genes {
            let code = person.gtests.get(gene).code().map_err(|e| {
                Error::GeneticTest(format!(
                    "family {}, person {}, {gene}: {e}",
                    person.family_id, person.id
                ))
            })?;
            let _ = write!(line, " {code}");
        }
        let yob = if person.yob == 0 {
            NULL_YOB
        } else {
            i32::from(person.yob)
        };
        let _ = write!(line, " {yob:4}");
        for receptor in Receptor::ALL {
            let _ = write!(line, " {}", person.pathology.engine_code(receptor));
        }

        let target = person.target.then_some(&self.target);
        let proband = match target {
            Some(_) if self.options.carrier_probs => genotype,
            Some(_) => 1,
            None => 0,
        };
        let _ = write!(line, " {proband:>2}");
        match target {
            Some(data) => {
                let _ = write!(line, " {:08}", data.risk_factor_code);
            }
            None => {
                let _ = write!(line, " {EMPTY_FIELD}");
            }
        }
        if self.model == Model::Bc {
            let height = target.and_then(|t| t.height).unwrap_or(0.0);
            let _ = write!(line, " {height:8.4}");
        }
        let mdensity = target
            .and_then(|t| t.mdensity)
            .map_or_else(|| EMPTY_FIELD.to_string(), |md| md.engine_code());
        let _ = write!(line, " {mdensity}");
        let (alpha, zscore) = Prs::engine_fields(target.and_then(|t| t.prs.as_ref()));
        let _ = write!(line, " {alpha:>9} {zscore:>9}");
        Ok(line)
    }

    /// The engine's numeric control menu.
    pub fn batch_text(&self, locus_file: &Path, pedigree_file: &Path) -> String {
        let target_age = self.pedigree.target().map_or(0, |t| t.age);
        let offsets: Vec<i32> = if self.censoring_ages.is_empty() {
            vec![0]
        } else {
            self.censoring_ages
                .iter()
                .map(|&age| i32::from(age) - i32::from(target_age))
                .collect()
        };

        let mut out = String::new();
        let _ = writeln!(out, "2");
        let _ = writeln!(out, "{}", locus_file.display());
        let _ = writeln!(out, "3");
        let _ = writeln!(out, "{}", pedigree_file.display());
        for (i, offset) in offsets.iter().enumerate() {
            let _ = writeln!(out, "9");
            for gene in &self.genes {
                let _ = writeln!(out, "{:10.8}", self.frequencies.get(gene).copied().unwrap_or(0.0));
            }
            for gene in &self.genes {
                let _ = writeln!(out, "{:10.8}", self.sensitivities.get(gene).copied().unwrap_or(1.0));
            }
            let _ = writeln!(out, "{offset}");
            let _ = writeln!(out, "22");
            let more = if i + 1 < offsets.len() { "yes" } else { "no" };
            let _ = writeln!(out, "{more}");
        }
        out
    }

    /// `key = value` parameter declarations.
    pub fn params_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "population = {}", self.population);
        let _ = writeln!(out, "isashk = {}", u8::from(self.ashkenazi));
        for gene in &self.genes {
            let frequency = self.frequencies.get(gene).copied().unwrap_or(0.0);
            let _ = writeln!(out, "{gene}_mutation_frequency = {frequency:.8}");
        }
        for gene in &self.genes {
            let sensitivity = self.sensitivities.get(gene).copied().unwrap_or(1.0);
            let _ = writeln!(out, "{gene}_mutation_sensitivity = {sensitivity:.8}");
        }
        out
    }
}
