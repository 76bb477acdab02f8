//! Structural and semantic checks over parsed pedigrees.
//!
//! Fatal problems are returned as typed errors. Incomplete pathology is
//! reported as warnings. Validation may add founder parents for the target
//! and is idempotent.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::cancer::{CancerType, Diagnosis};
use crate::error::{Error, Result};
use crate::pathology::{PathologyStatus, Receptor};
use crate::pedigree::Pedigree;
use crate::person::{Person, Sex, TwinTag};
use crate::settings::{Limits, MAX_NAME_LEN, MAX_PERSON_ID_LEN, Model, Settings};

/// The calendar year used for year-of-birth checks.
pub fn current_year() -> u16 {
    let year = time::OffsetDateTime::now_utc().year();
    u16::try_from(year).unwrap_or(u16::MAX)
}

/// Validate every pedigree, returning accumulated warnings.
pub fn validate(
    pedigrees: &mut [Pedigree],
    model: Model,
    settings: &Settings,
    current_year: u16,
) -> Result<Vec<String>> {
    let limits = &settings.limits;
    let mut warnings = Vec::new();
    for pedigree in pedigrees.iter_mut() {
        check_pedigree(pedigree, model, limits, current_year)?;
        for index in 0..pedigree.len() {
            let person = pedigree.person(index);
            check_person(pedigree, person, limits, current_year)?;
            check_cancers(person, limits)?;
            check_genetic_tests(person)?;
            warnings.extend(check_pathology(person)?);
        }
        check_sibships(pedigree, limits)?;
        tracing::debug!(family = %pedigree.family_id, size = pedigree.len(), "validated pedigree");
    }
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    Ok(warnings)
}

fn check_pedigree(
    pedigree: &mut Pedigree,
    model: Model,
    limits: &Limits,
    current_year: u16,
) -> Result<()> {
    let family_id = pedigree.family_id.clone();
    let fail = |message: String| Error::pedigree(&family_id, message);

    if !is_valid_family_id(&family_id, limits.max_famid_len) {
        return Err(fail(format!(
            "family id must be 1 to {} letters, digits or hyphens and not all zeros or hyphens",
            limits.max_famid_len
        )));
    }

    match pedigree.targets().count() {
        0 => return Err(fail("no target individual".to_string())),
        1 => {}
        n => return Err(fail(format!("{n} target individuals; exactly one is required"))),
    }

    pedigree.add_target_parents();

    let target = pedigree
        .target_index()
        .ok_or_else(|| fail("no target individual".to_string()))?;

    let unreachable = unconnected(pedigree, target);
    if !unreachable.is_empty() {
        return Err(fail(format!(
            "not connected to the target: {}",
            unreachable.join(", ")
        )));
    }

    if !(limits.min_pedigree_size..=limits.max_pedigree_size).contains(&pedigree.len()) {
        return Err(fail(format!(
            "pedigree size {} outside {}..={}",
            pedigree.len(),
            limits.min_pedigree_size,
            limits.max_pedigree_size
        )));
    }

    let person = pedigree.person(target);
    if person.yob == 0 || person.yob < limits.min_yob || person.yob > current_year {
        return Err(fail(format!(
            "target {} must have a valid year of birth",
            person.id
        )));
    }
    if person.age == 0 {
        return Err(fail(format!("target {} must have an age", person.id)));
    }

    if !pedigree.is_carrier_probs_viable() && !pedigree.is_risks_viable(model, limits) {
        return Err(fail(format!(
            "neither carrier probabilities nor {model} risks can be calculated for target {}",
            person.id
        )));
    }

    check_twins(pedigree)
}

fn is_valid_family_id(family_id: &str, max_len: usize) -> bool {
    !family_id.is_empty()
        && family_id.chars().count() <= max_len
        && family_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !family_id.chars().all(|c| c == '0')
        && !family_id.chars().all(|c| c == '-')
}

/// Ids of people not reachable from the target through parent/child links.
fn unconnected(pedigree: &Pedigree, target: usize) -> Vec<String> {
    let n = pedigree.len();
    let mut neighbours = vec![Vec::new(); n];
    for child in 0..n {
        for parent in [pedigree.father(child), pedigree.mother(child)]
            .into_iter()
            .flatten()
        {
            neighbours[child].push(parent);
            neighbours[parent].push(child);
        }
    }

    let mut seen = vec![false; n];
    seen[target] = true;
    let mut queue = VecDeque::from([target]);
    while let Some(current) = queue.pop_front() {
        for &next in &neighbours[current] {
            if !seen[next] {
                seen[next] = true;
                queue.push_back(next);
            }
        }
    }

    (0..n)
        .filter(|&i| !seen[i])
        .map(|i| pedigree.person(i).id.clone())
        .collect()
}

fn check_twins(pedigree: &Pedigree) -> Result<()> {
    let mut groups: BTreeMap<TwinTag, Vec<&Person>> = BTreeMap::new();
    for person in pedigree.people() {
        if let Some(tag) = person.mztwin {
            groups.entry(tag).or_default().push(person);
        }
    }

    for (tag, members) in groups {
        let fail = |message: String| {
            Error::pedigree(&pedigree.family_id, format!("MZ twin group '{tag}': {message}"))
        };
        let [a, b] = members.as_slice() else {
            return Err(fail(format!(
                "expected exactly two members, found {}",
                members.len()
            )));
        };
        if a.father_id != b.father_id || a.mother_id != b.mother_id {
            return Err(fail("twins must have the same parents".to_string()));
        }
        if a.sex != b.sex {
            return Err(fail("twins must have the same sex".to_string()));
        }
        if a.yob != b.yob {
            return Err(fail("twins must have the same year of birth".to_string()));
        }
        if a.is_alive() && b.is_alive() && a.age != b.age {
            return Err(fail("living twins must have the same age".to_string()));
        }
        for ((gene, x), (_, y)) in a.gtests.iter().zip(b.gtests.iter()) {
            if x.is_tested() && y.is_tested() && x.result != y.result {
                return Err(fail(format!("twins have different {gene} test results")));
            }
        }
    }
    Ok(())
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_PERSON_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn check_person(
    pedigree: &Pedigree,
    person: &Person,
    limits: &Limits,
    current_year: u16,
) -> Result<()> {
    let fail = |message: String| Error::person(&person.family_id, &person.id, message);

    if !is_valid_id(&person.id) {
        return Err(fail(format!(
            "person id must be 1 to {MAX_PERSON_ID_LEN} letters or digits"
        )));
    }
    if !is_valid_name(&person.name) {
        return Err(fail(format!(
            "name '{}' must be 1 to {MAX_NAME_LEN} letters, digits, '_' or '-'",
            person.name
        )));
    }

    match (&person.father_id, &person.mother_id) {
        (None, None) => {}
        (Some(father), Some(mother)) => {
            for (parent, sex, role) in [(father, Sex::Male, "father"), (mother, Sex::Female, "mother")] {
                if !is_valid_id(parent) {
                    return Err(fail(format!("invalid {role} id '{parent}'")));
                }
                if *parent == person.id {
                    return Err(fail(format!("cannot be their own {role}")));
                }
                let found = pedigree
                    .get(parent)
                    .ok_or_else(|| fail(format!("{role} '{parent}' is not in the pedigree")))?;
                if found.sex != sex {
                    return Err(fail(format!("{role} '{parent}' has the wrong sex")));
                }
            }
        }
        _ => return Err(fail("both parents or neither must be given".to_string())),
    }

    if person.age > limits.max_age {
        return Err(fail(format!(
            "age {} exceeds the maximum of {}",
            person.age, limits.max_age
        )));
    }
    if person.yob != 0 && !(limits.min_yob..=current_year).contains(&person.yob) {
        return Err(fail(format!(
            "year of birth {} outside {}..={current_year}",
            person.yob, limits.min_yob
        )));
    }
    Ok(())
}

/// Sibship size caps, overall and per year of birth.
fn check_sibships(pedigree: &Pedigree, limits: &Limits) -> Result<()> {
    let mut sibships: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for i in 0..pedigree.len() {
        if let (Some(father), Some(mother)) = (pedigree.father(i), pedigree.mother(i)) {
            sibships.entry((father, mother)).or_default().push(i);
        }
    }

    for members in sibships.values() {
        let first = pedigree.person(members[0]);
        let fail = |message: String| Error::person(&first.family_id, &first.id, message);
        if members.len() > limits.max_sibs {
            return Err(fail(format!(
                "sibship of {} exceeds the maximum of {}",
                members.len(),
                limits.max_sibs
            )));
        }
        let mut by_yob: HashMap<u16, usize> = HashMap::new();
        for &i in members {
            let yob = pedigree.person(i).yob;
            if yob != 0 {
                *by_yob.entry(yob).or_default() += 1;
            }
        }
        if let Some((yob, count)) = by_yob
            .into_iter()
            .find(|&(_, count)| count > limits.max_sibs_same_yob)
        {
            return Err(fail(format!(
                "{count} siblings born in {yob} exceeds the maximum of {}",
                limits.max_sibs_same_yob
            )));
        }
    }
    Ok(())
}

pub(crate) const BC_ORDER_MESSAGE: &str =
    "age at diagnosis of the first breast cancer exceeds that of the second";

fn check_cancers(person: &Person, limits: &Limits) -> Result<()> {
    let fail = |message: String| Error::cancer(&person.family_id, &person.id, message);
    let cancers = &person.cancers;

    for (cancer, diagnosis) in cancers.iter() {
        if let Diagnosis::Age(age) = diagnosis {
            if age > limits.max_age {
                return Err(fail(format!(
                    "{} diagnosis age {age} exceeds the maximum of {}",
                    cancer.label(),
                    limits.max_age
                )));
            }
            if person.age > 0 && age > person.age {
                return Err(fail(format!(
                    "{} diagnosis age {age} exceeds age at last follow up {}",
                    cancer.label(),
                    person.age
                )));
            }
        }
    }

    let diagnosed = |cancer| cancers.get(cancer).is_diagnosed();
    match person.sex {
        Sex::Male => {
            if diagnosed(CancerType::Ovarian) {
                return Err(fail("males cannot have ovarian cancer".to_string()));
            }
            if diagnosed(CancerType::ContralateralBreast) {
                return Err(fail("males cannot have contralateral breast cancer".to_string()));
            }
        }
        Sex::Female => {
            if diagnosed(CancerType::Prostate) {
                return Err(fail("females cannot have prostate cancer".to_string()));
            }
        }
    }

    let bc1 = cancers.get(CancerType::FirstBreast);
    let bc2 = cancers.get(CancerType::ContralateralBreast);
    if bc2.is_diagnosed() {
        if !bc1.is_diagnosed() {
            return Err(fail(
                "contralateral breast cancer requires a first breast cancer".to_string(),
            ));
        }
        if let (Some(first), Some(second)) = (bc1.age(), bc2.age())
            && first > second
        {
            return Err(fail(BC_ORDER_MESSAGE.to_string()));
        }
    }

    if cancers.is_affected() && person.yob == 0 {
        return Err(fail(
            "a year of birth is required for a person with a cancer diagnosis".to_string(),
        ));
    }
    Ok(())
}

fn check_genetic_tests(person: &Person) -> Result<()> {
    for (gene, test) in person.gtests.iter() {
        test.code().map_err(|e| {
            Error::GeneticTest(format!(
                "family {}, person {}, {gene}: {}",
                person.family_id,
                person.id,
                match e {
                    Error::GeneticTest(message) => message,
                    other => other.to_string(),
                }
            ))
        })?;
    }
    Ok(())
}

fn check_pathology(person: &Person) -> Result<Vec<String>> {
    let pathology = &person.pathology;
    if !pathology.any_known() {
        return Ok(Vec::new());
    }
    let who = format!("family {}, person {}", person.family_id, person.id);
    if !person.cancers.get(CancerType::FirstBreast).is_diagnosed() {
        return Err(Error::Pathology(format!(
            "{who}: pathology results require a first breast cancer"
        )));
    }

    let status = |receptor| pathology.get(receptor);
    let known = |receptor| status(receptor).is_known();
    let ck_known = [Receptor::Ck14, Receptor::Ck56].map(known);
    let triple_negative = [Receptor::Er, Receptor::Pr, Receptor::Her2]
        .into_iter()
        .all(|r| status(r) == PathologyStatus::Negative);

    let mut warnings = Vec::new();
    if !known(Receptor::Er) {
        warnings.push(format!(
            "{who}: ER status is unknown although other pathology markers are given"
        ));
    }
    if status(Receptor::Er) == PathologyStatus::Positive && ck_known.iter().any(|&k| k) {
        warnings.push(format!(
            "{who}: CK14 and CK5/6 are only used for ER-negative tumours"
        ));
    }
    if ck_known.iter().any(|&k| k) && !triple_negative {
        warnings.push(format!(
            "{who}: CK14 and CK5/6 are only used for triple-negative tumours"
        ));
    }
    if ck_known[0] != ck_known[1] {
        warnings.push(format!(
            "{who}: only one of CK14 and CK5/6 is given; both are needed"
        ));
    }
    Ok(warnings)
}
