use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Polygenic risk score: the proportion of variance explained and the
/// standardised score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prs {
    pub alpha: f64,
    pub zscore: f64,
}

impl Prs {
    pub fn new(alpha: f64, zscore: f64) -> Self {
        Self { alpha, zscore }
    }

    /// Parse `alpha=<float>, zscore=<float>`. `beta` is accepted as a
    /// deprecated name for `zscore`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut alpha = None;
        let mut zscore = None;
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::PedigreeFile(format!("invalid PRS entry '{part}'")))?;
            let value = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| Error::PedigreeFile(format!("invalid PRS value '{part}'")))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "alpha" => alpha = Some(value),
                "zscore" | "beta" => zscore = Some(value),
                other => {
                    return Err(Error::PedigreeFile(format!("unknown PRS key '{other}'")));
                }
            }
        }
        match (alpha, zscore) {
            (Some(alpha), Some(zscore)) => Ok(Self { alpha, zscore }),
            _ => Err(Error::PedigreeFile(format!(
                "PRS requires alpha and zscore, found '{raw}'"
            ))),
        }
    }

    /// `%7.6f`-formatted alpha and zscore.
    pub fn engine_fields(prs: Option<&Prs>) -> (String, String) {
        let (alpha, zscore) = prs.map_or((0.0, 0.0), |p| (p.alpha, p.zscore));
        (format!("{alpha:7.6}"), format!("{zscore:7.6}"))
    }
}
