//! Reader for BOADICEA v4 and CanRisk 1-4 pedigree files, and a BOADICEA v4
//! writer.
//!
//! The first non-blank line names the format, which fixes the body column
//! count. CanRisk files may carry `##key=value` lines; those seen before the
//! first row of a family are attached to that family.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::cancer::{CancerType, Diagnosis};
use crate::error::{Error, Result};
use crate::ethnicity::Ethnicity;
use crate::genetic_test::{Gene, GeneticTest, TestResult, TestType};
use crate::mdensity::{MammographicDensity, MenopauseStatus};
use crate::pathology::{PathologyTests, Receptor};
use crate::pedigree::{Pedigree, PedigreeHeader};
use crate::person::{Person, Sex, TwinTag, VitalStatus};
use crate::prs::Prs;
use crate::risk_factors::{HEADER_KEYS, RiskFactorCodec};
use crate::settings::Model;

const BOADICEA_V4_HEADER: &str = "BOADICEA import pedigree file format 4.0";
const CANRISK_PREFIX: &str = "##CanRisk";

/// Columns shared by every format, up to and including `Ashkn`.
const COMMON_COLUMNS: usize = 17;

const BOADICEA_V4_GENES: [Gene; 5] = [Gene::Brca1, Gene::Brca2, Gene::Palb2, Gene::Atm, Gene::Chek2];
const CANRISK1_GENES: [Gene; 8] = [
    Gene::Brca1,
    Gene::Brca2,
    Gene::Palb2,
    Gene::Atm,
    Gene::Chek2,
    Gene::Rad51d,
    Gene::Rad51c,
    Gene::Brip1,
];
const CANRISK2_GENES: [Gene; 9] = [
    Gene::Brca1,
    Gene::Brca2,
    Gene::Palb2,
    Gene::Atm,
    Gene::Chek2,
    Gene::Bard1,
    Gene::Rad51d,
    Gene::Rad51c,
    Gene::Brip1,
];

const CANCER_COLUMNS: [CancerType; 5] = [
    CancerType::FirstBreast,
    CancerType::ContralateralBreast,
    CancerType::Ovarian,
    CancerType::Prostate,
    CancerType::Pancreatic,
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileFormat {
    BoadiceaV4,
    /// CanRisk file of the given major version (1..=4).
    CanRisk(u8),
}

impl FileFormat {
    /// Format named by the first non-blank line of a file.
    pub fn detect(first_line: &str) -> Result<Self> {
        let line = first_line.trim();
        if line.starts_with(BOADICEA_V4_HEADER) {
            return Ok(FileFormat::BoadiceaV4);
        }
        if let Some(rest) = line.strip_prefix(CANRISK_PREFIX)
            && let Some(version) = rest.trim_start().chars().next().and_then(|c| c.to_digit(10))
            && (1..=4).contains(&version)
        {
            return Ok(FileFormat::CanRisk(version as u8));
        }
        Err(Error::PedigreeFile(format!(
            "unrecognised pedigree file header '{line}'"
        )))
    }

    /// Genes carried by the body columns, in column order.
    pub fn genes(self) -> &'static [Gene] {
        match self {
            FileFormat::BoadiceaV4 => &BOADICEA_V4_GENES,
            FileFormat::CanRisk(1) => &CANRISK1_GENES,
            FileFormat::CanRisk(_) => &CANRISK2_GENES,
        }
    }

    pub fn columns(self) -> usize {
        match self {
            FileFormat::BoadiceaV4 => COMMON_COLUMNS + 2 * self.genes().len() + Receptor::ALL.len(),
            FileFormat::CanRisk(_) => COMMON_COLUMNS + self.genes().len() + 1,
        }
    }

    fn accepts_header_lines(self) -> bool {
        matches!(self, FileFormat::CanRisk(_))
    }
}

/// A parsed pedigree file.
#[derive(Debug, Clone, PartialEq)]
pub struct PedigreeFile {
    pub format: FileFormat,
    /// Families in order of first appearance.
    pub pedigrees: Vec<Pedigree>,
    /// Problems that did not stop parsing.
    pub warnings: Vec<String>,
}

impl PedigreeFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        parse(&text)
    }
}

struct FamilyRows {
    family_id: String,
    people: Vec<Person>,
    header: PedigreeHeader,
}

/// Parse pedigree text in any supported format.
pub fn parse(text: &str) -> Result<PedigreeFile> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, first) = lines
        .next()
        .ok_or_else(|| Error::PedigreeFile("empty pedigree file".to_string()))?;
    let format = FileFormat::detect(first)?;

    let mut families: Vec<FamilyRows> = Vec::new();
    let mut pending = HeaderBuilder::default();

    for (line_no, line) in lines {
        let trimmed = line.trim();
        if is_column_header(trimmed) {
            continue;
        }
        if let Some(entry) = trimmed.strip_prefix("##") {
            if !format.accepts_header_lines() {
                return Err(Error::PedigreeFile(format!(
                    "line {line_no}: header lines are not allowed in BOADICEA v4 files"
                )));
            }
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                Error::PedigreeFile(format!("line {line_no}: expected '##key=value', found '{trimmed}'"))
            })?;
            pending.add(key.trim(), value.trim(), line_no)?;
            continue;
        }

        let fields = split_row(line, format.columns()).ok_or_else(|| {
            Error::PedigreeFile(format!(
                "line {line_no}: expected {} columns for {format:?}",
                format.columns()
            ))
        })?;
        let person = parse_row(format, &fields, line_no)?;

        match families.iter_mut().find(|f| f.family_id == person.family_id) {
            Some(family) => family.people.push(person),
            None => {
                let header = std::mem::take(&mut pending).finish()?;
                families.push(FamilyRows {
                    family_id: person.family_id.clone(),
                    people: vec![person],
                    header,
                });
            }
        }
    }

    if families.is_empty() {
        return Err(Error::PedigreeFile("no pedigree rows found".to_string()));
    }

    let mut warnings = Vec::new();
    if let Some(line_no) = pending.first_line {
        tracing::warn!(line = line_no, "header lines after the last family ignored");
        warnings.push(format!(
            "line {line_no}: header lines after the last family are ignored"
        ));
    }

    let pedigrees = families
        .into_iter()
        .map(|f| Pedigree::new(&f.family_id, f.people, f.header))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(format = ?format, families = pedigrees.len(), "parsed pedigree file");
    Ok(PedigreeFile {
        format,
        pedigrees,
        warnings,
    })
}

fn is_column_header(line: &str) -> bool {
    let line = line.trim_start_matches('#');
    line.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("FamID"))
}

/// Split on tabs, falling back to any whitespace, whichever yields the
/// expected column count.
fn split_row(line: &str, expected: usize) -> Option<Vec<&str>> {
    let tabbed: Vec<&str> = line.trim().split('\t').map(str::trim).collect();
    if tabbed.len() == expected {
        return Some(tabbed);
    }
    let spaced: Vec<&str> = line.split_whitespace().collect();
    (spaced.len() == expected).then_some(spaced)
}

fn parse_row(format: FileFormat, fields: &[&str], line_no: usize) -> Result<Person> {
    let family_id = fields[0];
    let id = fields[3];
    let file_error = |message: String| Error::PedigreeFile(format!("line {line_no}: {message}"));
    let person_error = |message: String| Error::person(family_id, id, message);

    let sex = Sex::from_code(fields[6])
        .ok_or_else(|| file_error(format!("unknown sex code '{}'", fields[6])))?;
    let mut person = Person::new(family_id, id, sex);
    person.name = fields[1].to_string();
    person.target = match fields[2] {
        "0" => false,
        "1" => true,
        other => return Err(file_error(format!("invalid target flag '{other}'"))),
    };
    person.father_id = parent_id(fields[4]);
    person.mother_id = parent_id(fields[5]);
    person.mztwin = TwinTag::parse(fields[7]).map_err(|()| {
        Error::pedigree(
            family_id,
            format!("person {id}: invalid MZ twin tag '{}'", fields[7]),
        )
    })?;
    person.status = VitalStatus::from_code(fields[8])
        .ok_or_else(|| person_error(format!("invalid vital status '{}'", fields[8])))?;
    person.age = fields[9]
        .parse()
        .map_err(|_| person_error(format!("invalid age '{}'", fields[9])))?;
    person.yob = fields[10]
        .parse()
        .map_err(|_| person_error(format!("invalid year of birth '{}'", fields[10])))?;

    for (cancer, raw) in CANCER_COLUMNS.into_iter().zip(&fields[11..16]) {
        let diagnosis = raw
            .parse::<Diagnosis>()
            .map_err(|message| Error::cancer(family_id, id, message))?;
        person.cancers.set(cancer, diagnosis);
    }

    person.ashkenazi = match fields[16] {
        "0" => false,
        "1" => true,
        other => return Err(person_error(format!("invalid Ashkenazi flag '{other}'"))),
    };

    let genes = format.genes();
    match format {
        FileFormat::BoadiceaV4 => {
            for (i, &gene) in genes.iter().enumerate() {
                let column = COMMON_COLUMNS + 2 * i;
                let test = GeneticTest::new(
                    TestType::from_code(fields[column])?,
                    TestResult::from_code(fields[column + 1])?,
                );
                person.gtests.set(gene, test);
            }
            let start = COMMON_COLUMNS + 2 * genes.len();
            person.pathology = PathologyTests::from_codes(&fields[start..start + Receptor::ALL.len()])?;
        }
        FileFormat::CanRisk(_) => {
            for (i, &gene) in genes.iter().enumerate() {
                person
                    .gtests
                    .set(gene, GeneticTest::parse_pair(fields[COMMON_COLUMNS + i])?);
            }
            person.pathology = PathologyTests::parse_joined(fields[COMMON_COLUMNS + genes.len()])?;
        }
    }

    Ok(person)
}

fn parent_id(raw: &str) -> Option<String> {
    (raw != "0").then(|| raw.to_string())
}

/// Accumulates `##key=value` lines until the next family starts.
#[derive(Debug, Default)]
struct HeaderBuilder {
    /// Line of the first header seen since the last family started.
    first_line: Option<usize>,
    values: BTreeMap<String, String>,
    height: Option<f64>,
    density: Option<(String, String)>,
    menopause: MenopauseStatus,
    ethnicity: Option<Ethnicity>,
    prs_bc: Option<Prs>,
    prs_oc: Option<Prs>,
    prs_pc: Option<Prs>,
}

impl HeaderBuilder {
    fn add(&mut self, key: &str, value: &str, line_no: usize) -> Result<()> {
        self.first_line.get_or_insert(line_no);
        let key = key.to_ascii_lowercase();
        let invalid = |what: &str| {
            Error::PedigreeFile(format!("line {line_no}: invalid {what} '{value}'"))
        };
        match key.as_str() {
            "height" => {
                if !is_unknown(value) {
                    let height = value
                        .parse::<f64>()
                        .ok()
                        .filter(|h| h.is_finite() && *h > 0.0)
                        .ok_or_else(|| invalid("height"))?;
                    self.height = Some(height);
                    self.values.insert(key.clone(), value.to_string());
                }
            }
            "menopause" => match value.to_ascii_lowercase().as_str() {
                "pre" => self.menopause = MenopauseStatus::Pre,
                "post" => self.menopause = MenopauseStatus::Post,
                _ if is_unknown(value) => {}
                _ => {
                    self.menopause = MenopauseStatus::Post;
                    self.values.insert(key.clone(), value.to_string());
                }
            },
            "birads" | "stratus" | "volpara" => {
                if let Some((previous, _)) = &self.density {
                    return Err(Error::PedigreeFile(format!(
                        "line {line_no}: '{key}' given after '{previous}'; at most one mammographic density is allowed"
                    )));
                }
                self.density = Some((key.clone(), value.to_string()));
            }
            "ethnicity" => self.ethnicity = Some(Ethnicity::parse(value)?),
            "prs_bc" => self.prs_bc = Some(Prs::parse(value)?),
            "prs_oc" => self.prs_oc = Some(Prs::parse(value)?),
            "prs_pc" => self.prs_pc = Some(Prs::parse(value)?),
            k if HEADER_KEYS.contains(&k) => {
                self.values.insert(key.clone(), value.to_string());
            }
            _ => {
                return Err(Error::PedigreeFile(format!(
                    "line {line_no}: unknown header key '{key}'"
                )));
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<PedigreeHeader> {
        let to_file_error = |e: Error| Error::PedigreeFile(e.to_string());
        if !self.values.is_empty() {
            // Bands differ between models; reject only values no model reads.
            let [bc, oc] = [Model::Bc, Model::Oc]
                .map(|model| RiskFactorCodec::for_model(model).code_from_values(&self.values));
            if let (Err(e), Err(_)) = (bc, oc) {
                return Err(to_file_error(e));
            }
        }
        let mdensity = self
            .density
            .as_ref()
            .map(|(key, value)| MammographicDensity::parse(key, value, self.menopause))
            .transpose()
            .map_err(to_file_error)?;

        Ok(PedigreeHeader {
            height: self.height,
            mdensity,
            ethnicity: self.ethnicity,
            prs_bc: self.prs_bc,
            prs_oc: self.prs_oc,
            prs_pc: self.prs_pc,
            risk_factor_values: self.values,
        })
    }
}

fn is_unknown(value: &str) -> bool {
    value.is_empty() || value == "-" || value.eq_ignore_ascii_case("NA")
}

/// Render pedigrees as a tab-separated BOADICEA v4 file.
///
/// The format has no header lines and carries only BRCA1, BRCA2, PALB2, ATM
/// and CHEK2 tests; other data is not written.
pub fn write_boadicea_v4(pedigrees: &[Pedigree]) -> String {
    let mut out = String::new();
    out.push_str(BOADICEA_V4_HEADER);
    out.push('\n');

    let mut columns: Vec<String> = [
        "FamID", "Name", "Target", "IndivID", "FathID", "MothID", "Sex", "MZtwin", "Dead", "Age",
        "Yob", "1stBrCa", "2ndBrCa", "OvCa", "ProCa", "PanCa", "Ashkn",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    for gene in BOADICEA_V4_GENES {
        columns.push(format!("{gene}t"));
        columns.push(format!("{gene}r"));
    }
    columns.extend(["ER", "PR", "HER2", "CK14", "CK56"].map(String::from));
    out.push_str(&columns.join("\t"));
    out.push('\n');

    for pedigree in pedigrees {
        for person in pedigree.people() {
            let mut row: Vec<String> = vec![
                person.family_id.clone(),
                person.name.clone(),
                u8::from(person.target).to_string(),
                person.id.clone(),
                person.father_id.clone().unwrap_or_else(|| "0".to_string()),
                person.mother_id.clone().unwrap_or_else(|| "0".to_string()),
                person.sex().to_string(),
                person.mztwin.map_or_else(|| "0".to_string(), |t| t.to_string()),
                person.status.code().to_string(),
                person.age.to_string(),
                person.yob.to_string(),
            ];
            row.extend(CANCER_COLUMNS.iter().map(|&c| person.cancers.get(c).to_string()));
            row.push(u8::from(person.ashkenazi).to_string());
            for gene in BOADICEA_V4_GENES {
                let test = person.gtests.get(gene);
                row.push(test.test_type.code().to_string());
                row.push(test.result.code().to_string());
            }
            row.extend(
                Receptor::ALL
                    .iter()
                    .map(|&r| person.pathology.get(r).code().to_string()),
            );
            let _ = writeln!(out, "{}", row.join("\t"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathology::PathologyStatus;

    const CANRISK2: &str = "##CanRisk 2.0
##menarche=13
##parity=2
##BMI=27.5
##height=163
##birads=3
##Ethnicity=Asian;Chinese
##PRS_BC=alpha=0.45, zscore=1.2
##FamID\tName\tTarget\tIndivID\tFathID\tMothID\tSex\tMZtwin\tDead\tAge\tYob\tBC1\tBC2\tOC\tPRO\tPAN\tAshkn\tBRCA1\tBRCA2\tPALB2\tATM\tCHEK2\tBARD1\tRAD51D\tRAD51C\tBRIP1\tER:PR:HER2:CK14:CK56
XXX\tdad\t0\tf1\t0\t0\tM\t0\t0\t60\t1960\t0\t0\t0\t0\t0\t0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0:0:0:0
XXX\tmum\t0\tm1\t0\t0\tF\t0\t1\t58\t1962\t45\t0\t0\t0\t0\t0\tT:P\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\tP:N:0:0:0
XXX\tme\t1\tch1\tf1\tm1\tF\t0\t0\t30\t1990\t0\t0\t0\t0\t0\t0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0\t0:0:0:0:0
";

    #[test]
    fn parses_canrisk_body_and_header() {
        let file = parse(CANRISK2).unwrap();
        assert_eq!(file.format, FileFormat::CanRisk(2));
        assert_eq!(file.pedigrees.len(), 1);
        let ped = &file.pedigrees[0];
        assert_eq!(ped.family_id, "XXX");
        assert_eq!(ped.len(), 3);

        let mum = ped.get("m1").unwrap();
        assert!(!mum.is_alive());
        assert_eq!(mum.cancers.get(CancerType::FirstBreast), Diagnosis::Age(45));
        assert!(mum.gtests.get(Gene::Brca1).is_positive());
        assert_eq!(mum.pathology.get(Receptor::Er), PathologyStatus::Positive);

        let header = &ped.header;
        assert_eq!(header.height, Some(163.0));
        assert_eq!(header.prs_bc, Some(Prs::new(0.45, 1.2)));
        assert!(header.prs_oc.is_none());
        assert_eq!(header.mdensity, Some(MammographicDensity::Birads(3)));
        let labels = RiskFactorCodec::for_model(Model::Bc)
            .labels(header.risk_factor_code(Model::Bc).unwrap().unwrap())
            .unwrap();
        assert_eq!(labels["menarche_age"], "13");
        assert_eq!(labels["parity"], "2");
        assert_eq!(labels["bmi"], "25-29.9");
    }

    #[test]
    fn headers_attach_to_the_following_family() {
        let text = CANRISK2.replace("##PRS_BC=alpha=0.45, zscore=1.2\n", "")
            + "##parity=0\n"
            + &CANRISK2
                .lines()
                .skip(9)
                .map(|l| l.replacen("XXX", "YYY", 1) + "\n")
                .collect::<String>();
        let file = parse(&text).unwrap();
        assert_eq!(file.pedigrees.len(), 2);
        let second = &file.pedigrees[1].header;
        assert_eq!(second.risk_factor_values.len(), 1);
        assert!(file.pedigrees[0].header.height.is_some());
        assert!(second.height.is_none());
    }

    #[test]
    fn band_of_one_model_does_not_reject_the_file() {
        let text = CANRISK2.replace("##BMI=27.5", "##BMI=18.5-24.9");
        let header = &parse(&text).unwrap().pedigrees[0].header;
        let bc = header.risk_factor_code(Model::Bc).unwrap().unwrap();
        let labels = RiskFactorCodec::for_model(Model::Bc).labels(bc).unwrap();
        assert_eq!(labels["bmi"], "18.5-24.9");
        assert!(matches!(header.risk_factor_code(Model::Oc), Err(Error::RiskFactor(_))));
        assert_eq!(header.risk_factor_code(Model::Pc).unwrap(), None);

        let text = CANRISK2.replace("##BMI=27.5", "##BMI=heavy");
        assert!(matches!(parse(&text), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn trailing_header_lines_are_reported() {
        let file = parse(&format!("{CANRISK2}##parity=1\n")).unwrap();
        assert_eq!(file.pedigrees.len(), 1);
        assert_eq!(file.pedigrees[0].header.risk_factor_values["parity"], "2");
        assert_eq!(file.warnings.len(), 1);
        assert!(file.warnings[0].starts_with("line 13:"));
        assert!(parse(CANRISK2).unwrap().warnings.is_empty());
    }

    #[test]
    fn unknown_header_key_is_a_file_error() {
        let text = CANRISK2.replace("##parity=2", "##shoe_size=9");
        assert!(matches!(parse(&text), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn two_density_measures_are_rejected() {
        let text = CANRISK2.replace("##parity=2", "##stratus=20");
        assert!(matches!(parse(&text), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn menopause_pre_sets_status_only() {
        let text = CANRISK2
            .replace("##parity=2", "##menopause=pre")
            .replace("##birads=3", "##volpara=7.25");
        let file = parse(&text).unwrap();
        let header = &file.pedigrees[0].header;
        assert!(!header.risk_factor_values.contains_key("menopause"));
        assert_eq!(
            header.mdensity.unwrap().engine_code(),
            "21.07250"
        );
    }

    #[test]
    fn row_errors_are_typed() {
        let bad_sex = CANRISK2.replace("\tM\t0\t0\t60", "\tX\t0\t0\t60");
        assert!(matches!(parse(&bad_sex), Err(Error::PedigreeFile(_))));

        let bad_age = CANRISK2.replace("\t60\t1960", "\tsixty\t1960");
        assert!(matches!(parse(&bad_age), Err(Error::Person { .. })));

        let bad_cancer = CANRISK2.replace("\t45\t0\t0", "\tyoung\t0\t0");
        assert!(matches!(parse(&bad_cancer), Err(Error::Cancer { .. })));

        let bad_twin = CANRISK2.replace("\tM\t0\t0\t60", "\tM\t#\t0\t60");
        assert!(matches!(parse(&bad_twin), Err(Error::Pedigree { .. })));

        let short = CANRISK2.replace("\t0:0:0:0:0\n", "\n");
        assert!(matches!(parse(&short), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn duplicate_ids_are_file_errors() {
        let text = CANRISK2.replace("\tch1\t", "\tf1\t");
        assert!(matches!(parse(&text), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(matches!(
            parse("some other format\n"),
            Err(Error::PedigreeFile(_))
        ));
        assert!(matches!(parse("\n\n"), Err(Error::PedigreeFile(_))));
        assert_eq!(FileFormat::detect("##CanRisk 1.0").unwrap().columns(), 26);
        assert_eq!(FileFormat::detect("##CanRisk 4.0").unwrap().columns(), 27);
        assert_eq!(FileFormat::BoadiceaV4.columns(), 32);
    }

    #[test]
    fn boadicea_v4_rejects_header_lines() {
        let text = format!("{BOADICEA_V4_HEADER}\n##height=160\n");
        assert!(matches!(parse(&text), Err(Error::PedigreeFile(_))));
    }

    #[test]
    fn boadicea_v4_round_trips() {
        let mut file = parse(CANRISK2).unwrap();
        for ped in &mut file.pedigrees {
            ped.header = PedigreeHeader::default();
        }
        let written = write_boadicea_v4(&file.pedigrees);
        let reparsed = parse(&written).unwrap();
        assert_eq!(reparsed.format, FileFormat::BoadiceaV4);
        assert_eq!(reparsed.pedigrees, file.pedigrees);
        assert_eq!(write_boadicea_v4(&reparsed.pedigrees), written);
    }

    #[test]
    fn whitespace_separated_rows_are_accepted() {
        let text = CANRISK2.replace('\t', "  ");
        let file = parse(&text).unwrap();
        assert_eq!(file.pedigrees[0].len(), 3);
    }
}
