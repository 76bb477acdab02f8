use std::fmt;

use crate::cancer::Cancers;
use crate::genetic_test::GeneticTests;
use crate::pathology::PathologyTests;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" | "m" => Some(Sex::Male),
            "F" | "f" => Some(Sex::Female),
            _ => None,
        }
    }

    /// Single-character code, `"M"` or `"F"`.
    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum VitalStatus {
    #[default]
    Alive,
    Dead,
}

impl VitalStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(VitalStatus::Alive),
            "1" => Some(VitalStatus::Dead),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            VitalStatus::Alive => '0',
            VitalStatus::Dead => '1',
        }
    }
}

const TWIN_ALPHABET: &[u8] = b"123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Monozygotic twin group, stored as an index into the twin alphabet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TwinTag(u8);

impl TwinTag {
    /// `Ok(None)` for the `0` placeholder, `Err(())` for characters
    /// outside the alphabet.
    pub fn parse(raw: &str) -> Result<Option<Self>, ()> {
        let trimmed = raw.trim();
        if trimmed == "0" {
            return Ok(None);
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c).map(Some).ok_or(()),
            _ => Err(()),
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        u8::try_from(c)
            .ok()
            .and_then(|byte| TWIN_ALPHABET.iter().position(|&b| b == byte))
            .map(|index| TwinTag(index as u8))
    }

    pub fn as_char(self) -> char {
        char::from(TWIN_ALPHABET[usize::from(self.0)])
    }
}

impl fmt::Display for TwinTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One individual of a pedigree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Person {
    pub family_id: String,
    pub name: String,
    pub id: String,
    pub father_id: Option<String>,
    pub mother_id: Option<String>,
    pub sex: Sex,
    pub target: bool,
    pub status: VitalStatus,
    /// Age at last follow-up; 0 means unknown.
    pub age: u16,
    /// Year of birth; 0 means unknown.
    pub yob: u16,
    pub ashkenazi: bool,
    pub mztwin: Option<TwinTag>,
    pub cancers: Cancers,
    pub gtests: GeneticTests,
    pub pathology: PathologyTests,
}

impl Person {
    pub fn new(family_id: &str, id: &str, sex: Sex) -> Self {
        Self {
            family_id: family_id.to_string(),
            name: id.to_string(),
            id: id.to_string(),
            father_id: None,
            mother_id: None,
            sex,
            target: false,
            status: VitalStatus::Alive,
            age: 0,
            yob: 0,
            ashkenazi: false,
            mztwin: None,
            cancers: Cancers::default(),
            gtests: GeneticTests::default(),
            pathology: PathologyTests::default(),
        }
    }

    pub fn sex(&self) -> &'static str {
        self.sex.code()
    }

    pub fn is_founder(&self) -> bool {
        self.father_id.is_none() && self.mother_id.is_none()
    }

    pub fn is_alive(&self) -> bool {
        self.status == VitalStatus::Alive
    }
}
