use crate::error::{Error, Result};

/// Tumour pathology markers, in file column order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Receptor {
    Er,
    Pr,
    Her2,
    Ck14,
    Ck56,
}

impl Receptor {
    pub const ALL: [Receptor; 5] = [
        Receptor::Er,
        Receptor::Pr,
        Receptor::Her2,
        Receptor::Ck14,
        Receptor::Ck56,
    ];
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum PathologyStatus {
    #[default]
    Unknown,
    Negative,
    Positive,
}

impl PathologyStatus {
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim() {
            "0" => Ok(Self::Unknown),
            "N" | "n" => Ok(Self::Negative),
            "P" | "p" => Ok(Self::Positive),
            other => Err(Error::Pathology(format!(
                "invalid pathology status '{other}'"
            ))),
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Unknown => '0',
            Self::Negative => 'N',
            Self::Positive => 'P',
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Pathology status for all five markers.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct PathologyTests([PathologyStatus; Receptor::ALL.len()]);

impl PathologyTests {
    /// Parse the CanRisk colon-joined form `ER:PR:HER2:CK14:CK56`.
    pub fn parse_joined(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.split(':').collect();
        if fields.len() != Receptor::ALL.len() {
            return Err(Error::Pathology(format!(
                "expected five ':'-separated pathology fields, found '{raw}'"
            )));
        }
        Self::from_codes(&fields)
    }

    pub fn from_codes(codes: &[&str]) -> Result<Self> {
        let mut tests = Self::default();
        for (receptor, code) in Receptor::ALL.into_iter().zip(codes) {
            tests.set(receptor, PathologyStatus::from_code(code)?);
        }
        Ok(tests)
    }

    pub fn get(&self, receptor: Receptor) -> PathologyStatus {
        self.0[receptor as usize]
    }

    pub fn set(&mut self, receptor: Receptor, status: PathologyStatus) {
        self.0[receptor as usize] = status;
    }

    pub fn any_known(&self) -> bool {
        self.0.iter().any(|status| status.is_known())
    }

    /// One-character engine code. CK14 and CK5/6 invert the sense used by
    /// the hormone receptors.
    pub fn engine_code(&self, receptor: Receptor) -> char {
        let status = self.get(receptor);
        match (receptor, status) {
            (_, PathologyStatus::Unknown) => '9',
            (Receptor::Ck14 | Receptor::Ck56, PathologyStatus::Negative) => '0',
            (Receptor::Ck14 | Receptor::Ck56, PathologyStatus::Positive) => '1',
            (_, PathologyStatus::Negative) => '1',
            (_, PathologyStatus::Positive) => '0',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_codes_invert_for_cytokeratins() {
        let tests = PathologyTests::parse_joined("N:P:0:N:P").unwrap();
        let codes: String = Receptor::ALL
            .into_iter()
            .map(|r| tests.engine_code(r))
            .collect();
        assert_eq!(codes, "10901");
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(matches!(
            PathologyTests::parse_joined("N:X:0:0:0"),
            Err(Error::Pathology(_))
        ));
        assert!(PathologyTests::parse_joined("N:P").is_err());
    }
}
