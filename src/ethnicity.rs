//! ONS census ethnicity and the UK Biobank groups used to pick the engine's
//! ethnicity reference file.

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum OnsGroup {
    White,
    Mixed,
    Asian,
    Black,
    Other,
}

impl OnsGroup {
    fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        let group = match lower.as_str() {
            "white" => OnsGroup::White,
            "mixed" | "mixed or multiple ethnic groups" => OnsGroup::Mixed,
            "asian" | "asian or asian british" => OnsGroup::Asian,
            "black" | "black, african, caribbean or black british" => OnsGroup::Black,
            "other" | "other ethnic group" => OnsGroup::Other,
            _ => return None,
        };
        Some(group)
    }

    /// Backgrounds recognised within the group.
    pub fn backgrounds(self) -> &'static [&'static str] {
        match self {
            OnsGroup::White => &[
                "English/Welsh/Scottish/Northern Irish/British",
                "Irish",
                "Gypsy or Irish Traveller",
                "Other White",
            ],
            OnsGroup::Mixed => &[
                "White and Black Caribbean",
                "White and Black African",
                "White and Asian",
                "Other Mixed",
            ],
            OnsGroup::Asian => &["Indian", "Pakistani", "Bangladeshi", "Chinese", "Other Asian"],
            OnsGroup::Black => &["African", "Caribbean", "Other Black"],
            OnsGroup::Other => &["Arab", "Any other ethnic group"],
        }
    }
}

/// Ethnicity as entered: an ONS group and optional background.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Ethnicity {
    pub group: OnsGroup,
    pub background: Option<String>,
}

impl Ethnicity {
    /// Parse the `group[;background]` header value.
    pub fn parse(raw: &str) -> Result<Self> {
        let (group_raw, background_raw) = match raw.split_once(';') {
            Some((group, background)) => (group, Some(background.trim())),
            None => (raw, None),
        };
        let group = OnsGroup::parse(group_raw)
            .ok_or_else(|| Error::PedigreeFile(format!("unknown ethnic group '{group_raw}'")))?;
        let background = match background_raw {
            None | Some("") => None,
            Some(background) => {
                let known = group
                    .backgrounds()
                    .iter()
                    .find(|b| b.eq_ignore_ascii_case(background))
                    .ok_or_else(|| {
                        Error::PedigreeFile(format!(
                            "unknown ethnic background '{background}' for group {group:?}"
                        ))
                    })?;
                Some(known.to_string())
            }
        };
        Ok(Self { group, background })
    }

    pub fn ukbb(&self) -> UkBiobankEthnicity {
        UkBiobankEthnicity::from(self)
    }
}

/// The eight UK Biobank buckets with engine reference files.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum UkBiobankEthnicity {
    Unspecified,
    White,
    Mixed,
    SouthAsian,
    Chinese,
    OtherAsian,
    Black,
    Other,
}

impl UkBiobankEthnicity {
    /// Reference-data file name, without the configured prefix.
    pub fn file_name(self) -> &'static str {
        match self {
            UkBiobankEthnicity::Unspecified => "UK-pop.nml",
            UkBiobankEthnicity::White => "UK-white.nml",
            UkBiobankEthnicity::Mixed => "UK-mixed.nml",
            UkBiobankEthnicity::SouthAsian => "UK-south-asian.nml",
            UkBiobankEthnicity::Chinese => "UK-chinese.nml",
            UkBiobankEthnicity::OtherAsian => "UK-other-asian.nml",
            UkBiobankEthnicity::Black => "UK-black.nml",
            UkBiobankEthnicity::Other => "UK-other.nml",
        }
    }
}

impl From<&Ethnicity> for UkBiobankEthnicity {
    fn from(ethnicity: &Ethnicity) -> Self {
        match ethnicity.group {
            OnsGroup::White => UkBiobankEthnicity::White,
            OnsGroup::Mixed => UkBiobankEthnicity::Mixed,
            OnsGroup::Black => UkBiobankEthnicity::Black,
            OnsGroup::Other => UkBiobankEthnicity::Other,
            OnsGroup::Asian => match ethnicity.background.as_deref() {
                Some("Indian" | "Pakistani" | "Bangladeshi") => UkBiobankEthnicity::SouthAsian,
                Some("Chinese") => UkBiobankEthnicity::Chinese,
                Some(_) => UkBiobankEthnicity::OtherAsian,
                None => UkBiobankEthnicity::Unspecified,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_ons_to_biobank() {
        let indian = Ethnicity::parse("Asian;Indian").unwrap();
        assert_eq!(indian.ukbb(), UkBiobankEthnicity::SouthAsian);
        let chinese = Ethnicity::parse("asian;chinese").unwrap();
        assert_eq!(chinese.ukbb(), UkBiobankEthnicity::Chinese);
        assert_eq!(chinese.background.as_deref(), Some("Chinese"));
        let asian = Ethnicity::parse("Asian").unwrap();
        assert_eq!(asian.ukbb(), UkBiobankEthnicity::Unspecified);
        let irish = Ethnicity::parse("White;Irish").unwrap();
        assert_eq!(irish.ukbb().file_name(), "UK-white.nml");
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(Ethnicity::parse("Martian").is_err());
        assert!(Ethnicity::parse("Black;Irish").is_err());
    }
}
