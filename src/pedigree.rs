//! A family as an arena of [`Person`] values with an id index.
//!
//! Parent links are resolved once into optional indices so graph walks do
//! not go through string lookups.

use std::collections::{BTreeMap, HashMap};

use crate::cancer::{CancerType, Diagnosis};
use crate::error::{Error, Result};
use crate::ethnicity::Ethnicity;
use crate::genetic_test::{Gene, GeneticTests};
use crate::mdensity::MammographicDensity;
use crate::pathology::PathologyTests;
use crate::person::{Person, Sex, VitalStatus};
use crate::prs::Prs;
use crate::risk_factors::RiskFactorCodec;
use crate::settings::{Limits, MAX_NICENESS, Model};

/// Per-family data carried by `##key=value` header lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PedigreeHeader {
    /// Raw risk-factor values by lower-case key.
    pub risk_factor_values: BTreeMap<String, String>,
    pub height: Option<f64>,
    pub mdensity: Option<MammographicDensity>,
    pub ethnicity: Option<Ethnicity>,
    pub prs_bc: Option<Prs>,
    pub prs_oc: Option<Prs>,
    pub prs_pc: Option<Prs>,
}

impl PedigreeHeader {
    /// Code of the header values under `model`'s dimensions. A value that
    /// only another model can categorise does not affect this one.
    pub fn risk_factor_code(&self, model: Model) -> Result<Option<u64>> {
        if self.risk_factor_values.is_empty() || model == Model::Pc {
            return Ok(None);
        }
        RiskFactorCodec::for_model(model)
            .code_from_values(&self.risk_factor_values)
            .map(Some)
    }

    pub fn prs(&self, model: Model) -> Option<Prs> {
        match model {
            Model::Bc => self.prs_bc,
            Model::Oc => self.prs_oc,
            Model::Pc => self.prs_pc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pedigree {
    pub family_id: String,
    pub header: PedigreeHeader,
    people: Vec<Person>,
    index: HashMap<String, usize>,
    parents: Vec<(Option<usize>, Option<usize>)>,
}

impl Pedigree {
    /// Build the arena. Duplicate person ids are a file error.
    pub fn new(family_id: &str, people: Vec<Person>, header: PedigreeHeader) -> Result<Self> {
        let mut index = HashMap::with_capacity(people.len());
        for (i, person) in people.iter().enumerate() {
            if index.insert(person.id.clone(), i).is_some() {
                return Err(Error::PedigreeFile(format!(
                    "family {family_id}: duplicate person id '{}'",
                    person.id
                )));
            }
        }
        let mut pedigree = Self {
            family_id: family_id.to_string(),
            header,
            people,
            index,
            parents: Vec::new(),
        };
        pedigree.resolve_parents();
        Ok(pedigree)
    }

    fn resolve_parents(&mut self) {
        self.parents = self
            .people
            .iter()
            .map(|person| {
                let lookup = |id: &Option<String>| id.as_ref().and_then(|id| self.index.get(id).copied());
                (lookup(&person.father_id), lookup(&person.mother_id))
            })
            .collect();
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn person(&self, index: usize) -> &Person {
        &self.people[index]
    }

    pub fn get(&self, id: &str) -> Option<&Person> {
        self.index_of(id).map(|i| &self.people[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn father(&self, index: usize) -> Option<usize> {
        self.parents[index].0
    }

    pub fn mother(&self, index: usize) -> Option<usize> {
        self.parents[index].1
    }

    pub fn targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.people
            .iter()
            .enumerate()
            .filter(|(_, p)| p.target)
            .map(|(i, _)| i)
    }

    pub fn target_index(&self) -> Option<usize> {
        self.targets().next()
    }

    pub fn target(&self) -> Option<&Person> {
        self.target_index().map(|i| &self.people[i])
    }

    /// Full siblings: people sharing both parents with `index`.
    pub fn siblings(&self, index: usize) -> Vec<usize> {
        let (father, mother) = self.parents[index];
        if father.is_none() || mother.is_none() {
            return Vec::new();
        }
        (0..self.people.len())
            .filter(|&i| i != index && self.parents[i] == (father, mother))
            .collect()
    }

    pub fn is_ashkenazi(&self) -> bool {
        self.people.iter().any(|p| p.ashkenazi)
    }

    /// Give a founder target synthesised founder parents so the engine sees
    /// a nuclear family. A founder MZ twin of the target gets the same
    /// parents. Returns whether anything was added.
    pub(crate) fn add_target_parents(&mut self) -> bool {
        let Some(target) = self.target_index() else {
            return false;
        };
        if !self.people[target].is_founder() {
            return false;
        }

        let father_id = self.unused_id("XF");
        let mother_id = self.unused_id("XM");

        let family_id = self.people[target].family_id.clone();
        let mut father = Person::new(&family_id, &father_id, Sex::Male);
        father.name = "father".to_string();
        let mut mother = Person::new(&family_id, &mother_id, Sex::Female);
        mother.name = "mother".to_string();

        let twin = self.people[target].mztwin;
        for person in self.people.iter_mut() {
            let is_twin = twin.is_some() && person.mztwin == twin && person.is_founder();
            if person.target || is_twin {
                person.father_id = Some(father_id.clone());
                person.mother_id = Some(mother_id.clone());
            }
        }

        self.index.insert(father_id, self.people.len());
        self.people.push(father);
        self.index.insert(mother_id, self.people.len());
        self.people.push(mother);
        self.resolve_parents();
        tracing::debug!(family = %self.family_id, "added founder parents for target");
        true
    }

    fn unused_id(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{prefix}{n:04}"))
            .find(|id| !self.index.contains_key(id))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Target can have cancer risks computed for `model`.
    pub fn is_risks_viable(&self, model: Model, limits: &Limits) -> bool {
        let Some(target) = self.target() else {
            return false;
        };
        let sex_ok = match model {
            Model::Bc | Model::Oc => target.sex == Sex::Female,
            Model::Pc => target.sex == Sex::Male,
        };
        let cancers = &target.cancers;
        target.is_alive()
            && sex_ok
            && !cancers.get(CancerType::ContralateralBreast).is_diagnosed()
            && !cancers.get(CancerType::Ovarian).is_diagnosed()
            && !cancers.get(CancerType::Pancreatic).is_diagnosed()
            && target.age <= limits.max_age_for_risk_calcs
            && target.yob >= limits.min_yob
    }

    /// Carrier probabilities are meaningful while the target has no
    /// positive genetic test.
    pub fn is_carrier_probs_viable(&self) -> bool {
        self.target()
            .is_some_and(|t| !t.gtests.any_positive(&Gene::ALL))
    }

    /// NHS young-women 10-year protocol applies.
    pub fn is_nhs_ten_year_viable(&self, model: Model, limits: &Limits) -> bool {
        model == Model::Bc
            && self.is_risks_viable(model, limits)
            && self
                .target()
                .is_some_and(|t| t.age < 50 && !t.cancers.is_affected())
    }

    /// Process priority for the engine: larger families yield more.
    pub fn niceness(&self) -> u32 {
        let siblings = self.target_index().map_or(0, |t| self.siblings(t).len());
        let niceness = if siblings > 0 {
            siblings
        } else {
            self.people.len() / 15
        };
        (niceness as u32).min(MAX_NICENESS)
    }

    /// One-person pedigree holding only the target, with tests and
    /// pathology cleared. The first breast cancer is kept when asked.
    pub fn baseline(&self, keep_first_breast: bool) -> Option<Pedigree> {
        let target = self.target()?;
        let mut person = Person::new(&target.family_id, &target.id, target.sex);
        person.name = target.name.clone();
        person.target = true;
        person.status = VitalStatus::Alive;
        person.age = target.age;
        person.yob = target.yob;
        person.gtests = GeneticTests::default();
        person.pathology = PathologyTests::default();
        if keep_first_breast {
            let bc1 = target.cancers.get(CancerType::FirstBreast);
            if bc1 != Diagnosis::Unaffected {
                person.cancers.set(CancerType::FirstBreast, bc1);
            }
        }
        Pedigree::new(&self.family_id, vec![person], PedigreeHeader::default()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> Pedigree {
        let mut father = Person::new("FAM", "f", Sex::Male);
        father.yob = 1950;
        let mut mother = Person::new("FAM", "m", Sex::Female);
        mother.yob = 1952;
        let mut target = Person::new("FAM", "t", Sex::Female);
        target.target = true;
        target.age = 40;
        target.yob = 1985;
        target.father_id = Some("f".into());
        target.mother_id = Some("m".into());
        let mut sister = Person::new("FAM", "s", Sex::Female);
        sister.father_id = Some("f".into());
        sister.mother_id = Some("m".into());
        Pedigree::new("FAM", vec![father, mother, target, sister], PedigreeHeader::default())
            .unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = Person::new("FAM", "x", Sex::Male);
        let b = Person::new("FAM", "x", Sex::Female);
        assert!(matches!(
            Pedigree::new("FAM", vec![a, b], PedigreeHeader::default()),
            Err(Error::PedigreeFile(_))
        ));
    }

    #[test]
    fn resolves_relatives() {
        let ped = family();
        let t = ped.index_of("t").unwrap();
        assert_eq!(ped.father(t), ped.index_of("f"));
        assert_eq!(ped.siblings(t), vec![ped.index_of("s").unwrap()]);
        assert_eq!(ped.niceness(), 1);
    }

    #[test]
    fn viability_follows_target_state() {
        let limits = Limits::default();
        let mut ped = family();
        assert!(ped.is_risks_viable(Model::Bc, &limits));
        assert!(!ped.is_risks_viable(Model::Pc, &limits));
        assert!(ped.is_nhs_ten_year_viable(Model::Bc, &limits));
        assert!(ped.is_carrier_probs_viable());

        let t = ped.index_of("t").unwrap();
        ped.people[t]
            .cancers
            .set(CancerType::Ovarian, Diagnosis::Age(35));
        assert!(!ped.is_risks_viable(Model::Bc, &limits));
    }

    #[test]
    fn founder_target_gets_parents() {
        let mut target = Person::new("FAM", "t", Sex::Female);
        target.target = true;
        let mut ped = Pedigree::new("FAM", vec![target], PedigreeHeader::default()).unwrap();
        assert!(ped.add_target_parents());
        assert_eq!(ped.len(), 3);
        let t = ped.target_index().unwrap();
        assert_eq!(ped.person(ped.father(t).unwrap()).sex, Sex::Male);
        assert_eq!(ped.person(ped.mother(t).unwrap()).id, "XM0001");
        assert!(!ped.add_target_parents());
    }

    #[test]
    fn baseline_keeps_only_the_target() {
        let mut ped = family();
        let t = ped.index_of("t").unwrap();
        ped.people[t]
            .cancers
            .set(CancerType::FirstBreast, Diagnosis::Age(38));
        ped.people[t]
            .cancers
            .set(CancerType::Pancreatic, Diagnosis::Age(39));
        let baseline = ped.baseline(true).unwrap();
        assert_eq!(baseline.len(), 1);
        let target = baseline.target().unwrap();
        assert!(target.is_founder());
        assert_eq!(target.cancers.get(CancerType::FirstBreast), Diagnosis::Age(38));
        assert!(!target.cancers.get(CancerType::Pancreatic).is_diagnosed());
        let range = ped.baseline(false).unwrap();
        assert!(!range.target().unwrap().cancers.is_affected());
    }
}
