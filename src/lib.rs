#![doc = include_str!("../README.md")]

pub mod cancer;
pub mod cli;
pub mod engine_input;
pub mod error;
pub mod ethnicity;
pub mod mdensity;
pub mod output;
pub mod pathology;
pub mod pedigree;
pub mod pedigree_file;
pub mod person;
pub mod prediction;
pub mod prs;
pub mod report;
pub mod risk_factors;
pub mod runner;
pub mod settings;
pub mod submission;
pub mod validate;

pub use error::{Error, ErrorKind, Result};
pub use genetic_test::Gene;
pub use pedigree::Pedigree;
pub use prs::Prs;
pub use report::{FamilyResult, PredictionReport};
pub use settings::{Calculation, Model, Settings};
pub use submission::{Permissions, Submission, process};
