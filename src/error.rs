use std::io;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while parsing, validating or running a calculation.
///
/// Every variant is fatal for the submission that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("pedigree file error: {0}")]
    PedigreeFile(String),
    #[error("family {family_id}: {message}")]
    Pedigree { family_id: String, message: String },
    #[error("family {family_id}, person {person_id}: {message}")]
    Person {
        family_id: String,
        person_id: String,
        message: String,
    },
    #[error("family {family_id}, person {person_id}: {message}")]
    Cancer {
        family_id: String,
        person_id: String,
        message: String,
    },
    #[error("genetic test error: {0}")]
    GeneticTest(String),
    #[error("pathology error: {0}")]
    Pathology(String),
    #[error("risk factor error: {0}")]
    RiskFactor(String),
    #[error("model error: {message}")]
    Model { message: String, stderr: String },
    #[error("calculation exceeded the {seconds}s time limit")]
    Timeout { seconds: u64 },
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Stable tag describing which kind of error occurred.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PedigreeFile,
    Pedigree,
    Person,
    Cancer,
    GeneticTest,
    Pathology,
    RiskFactor,
    Model,
    Timeout,
    Permission,
    Config,
    Io,
}

impl Error {
    pub(crate) fn pedigree(family_id: &str, message: impl Into<String>) -> Self {
        Self::Pedigree {
            family_id: family_id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn person(family_id: &str, person_id: &str, message: impl Into<String>) -> Self {
        Self::Person {
            family_id: family_id.to_string(),
            person_id: person_id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn cancer(family_id: &str, person_id: &str, message: impl Into<String>) -> Self {
        Self::Cancer {
            family_id: family_id.to_string(),
            person_id: person_id.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PedigreeFile(_) => ErrorKind::PedigreeFile,
            Self::Pedigree { .. } => ErrorKind::Pedigree,
            Self::Person { .. } => ErrorKind::Person,
            Self::Cancer { .. } => ErrorKind::Cancer,
            Self::GeneticTest(_) => ErrorKind::GeneticTest,
            Self::Pathology(_) => ErrorKind::Pathology,
            Self::RiskFactor(_) => ErrorKind::RiskFactor,
            Self::Model { .. } => ErrorKind::Model,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// HTTP status a web front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Timeout { .. } => 408,
            Self::Model { .. } | Self::Io(_) => 500,
            _ => 400,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_request_timeout() {
        let err = Error::Timeout { seconds: 240 };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.http_status(), 408);
        assert_eq!(err.to_string(), "calculation exceeded the 240s time limit");
    }

    #[test]
    fn cancer_error_names_family_and_person() {
        let err = Error::cancer("FAM1", "p3", "age too high");
        assert_eq!(err.to_string(), "family FAM1, person p3: age too high");
        assert_eq!(err.http_status(), 400);
    }
}
