mod common;

use assert_fs::prelude::*;
use canrisk::{
    ErrorKind, Model, Settings,
    pedigree_file::{FileFormat, PedigreeFile},
    risk_factors::RiskFactorCodec,
    validate::{current_year, validate},
};
use common::*;

fn check(rows: &[Row], model: Model) -> canrisk::Result<Vec<String>> {
    let mut file = read_v4(rows);
    validate(&mut file.pedigrees, model, &Settings::default(), current_year())
}

fn read_v4(rows: &[Row]) -> PedigreeFile {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("pedigree.txt");
    file.write_str(&v4_text(rows)).unwrap();
    PedigreeFile::from_path(file.path()).unwrap()
}

fn with_family(mut rows: Vec<Row>, family: &'static str) -> Vec<Row> {
    for row in &mut rows {
        row.family = family;
    }
    rows
}

#[test]
fn reads_files_from_disk() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("fam.txt");
    file.write_str(&canrisk2_text(&["parity=1"], &nuclear_family(40)))
        .unwrap();
    let parsed = PedigreeFile::from_path(file.path()).unwrap();
    assert_eq!(parsed.format, FileFormat::CanRisk(2));
    assert_eq!(parsed.pedigrees[0].header.risk_factor_values["parity"], "1");
}

#[test]
fn age_boundary() {
    let mut rows = nuclear_family(40);
    rows[0].age = 110;
    assert!(check(&rows, Model::Bc).is_ok());
    rows[0].age = 111;
    assert_eq!(check(&rows, Model::Bc).unwrap_err().kind(), ErrorKind::Person);
}

#[test]
fn year_of_birth_boundary() {
    let year = current_year();
    let mut rows = nuclear_family(40);
    rows.push(Row {
        father: "f1",
        mother: "m1",
        yob: year,
        ..Row::new("baby", "F")
    });
    assert!(check(&rows, Model::Bc).is_ok());
    rows[3].yob = year + 1;
    assert_eq!(check(&rows, Model::Bc).unwrap_err().kind(), ErrorKind::Person);
}

#[test]
fn family_id_boundary() {
    assert!(check(&with_family(nuclear_family(40), "ABCDEFGHIJKLM"), Model::Bc).is_ok());
    let err = check(&with_family(nuclear_family(40), "ABCDEFGHIJKLMN"), Model::Bc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pedigree);
    let err = check(&with_family(nuclear_family(40), "00"), Model::Bc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pedigree);
}

#[test]
fn target_without_parents_gets_founders() {
    let year = current_year();
    let target = Row {
        target: true,
        age: 40,
        yob: year - 40,
        ..Row::new("t1", "F")
    };
    let mut file = read_v4(&[target]);
    validate(&mut file.pedigrees, Model::Bc, &Settings::default(), year).unwrap();
    let pedigree = &file.pedigrees[0];
    assert_eq!(pedigree.len(), 3);
    let target = pedigree.target().unwrap();
    assert!(pedigree.get(target.father_id.as_deref().unwrap()).is_some());
}

#[test]
fn unconnected_person_is_rejected() {
    let mut rows = nuclear_family(40);
    rows.push(Row::new("x1", "M"));
    let err = check(&rows, Model::Bc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pedigree);
    assert!(err.to_string().contains("x1"));
}

#[test]
fn two_targets_are_rejected() {
    let mut rows = nuclear_family(40);
    rows[1].target = true;
    assert_eq!(check(&rows, Model::Bc).unwrap_err().kind(), ErrorKind::Pedigree);
}

#[test]
fn validation_is_idempotent() {
    let mut rows = nuclear_family(40);
    rows[1].cancers[0] = "50";
    let mut file = read_v4(&rows);
    let settings = Settings::default();
    let first = validate(&mut file.pedigrees, Model::Bc, &settings, current_year()).unwrap();
    let snapshot = file.pedigrees.clone();
    let second = validate(&mut file.pedigrees, Model::Bc, &settings, current_year()).unwrap();
    assert_eq!(first, second);
    assert_eq!(snapshot, file.pedigrees);
}

#[test]
fn male_target_cannot_have_breast_cancer_risks_but_can_be_tested() {
    let mut rows = nuclear_family(40);
    rows[2].sex = "M";
    assert!(check(&rows, Model::Bc).is_ok(), "carrier probabilities remain");
    rows[2].brca1 = ("T", "P");
    assert_eq!(check(&rows, Model::Bc).unwrap_err().kind(), ErrorKind::Pedigree);
    assert!(check(&rows, Model::Pc).is_ok());
}

#[test]
fn twins_must_match() {
    let mut rows = nuclear_family(40);
    let yob = rows[2].yob;
    rows.push(Row {
        father: "f1",
        mother: "m1",
        twin: "1",
        age: 40,
        yob,
        ..Row::new("s1", "F")
    });
    rows[2].twin = "1";
    assert!(check(&rows, Model::Bc).is_ok());
    rows[3].yob -= 1;
    assert_eq!(check(&rows, Model::Bc).unwrap_err().kind(), ErrorKind::Pedigree);
}

#[test]
fn largest_risk_factor_code_decodes_to_maxima() {
    let codec = RiskFactorCodec::for_model(Model::Bc);
    let maxima: Vec<usize> = codec.dimensions().iter().map(|d| d.size()).collect();
    assert_eq!(codec.decode(codec.max_code()).unwrap(), maxima);
    let err = codec.decode(codec.max_code() + 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RiskFactor);
}
