use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum MenopauseStatus {
    #[default]
    Unspecified,
    Pre,
    Post,
}

impl MenopauseStatus {
    fn offset(self) -> u8 {
        match self {
            MenopauseStatus::Unspecified => 0,
            MenopauseStatus::Pre => 1,
            MenopauseStatus::Post => 2,
        }
    }
}

/// Mammographic density in one of its three measurement systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MammographicDensity {
    /// BI-RADS category 1..=4.
    Birads(u8),
    /// Stratus percent density.
    Stratus { percent: f64, menopause: MenopauseStatus },
    /// Volpara percent density.
    Volpara { percent: f64, menopause: MenopauseStatus },
}

impl MammographicDensity {
    /// Parse a `birads`, `stratus` or `volpara` header value.
    pub fn parse(key: &str, raw: &str, menopause: MenopauseStatus) -> Result<Self> {
        let raw = raw.trim();
        match key.to_ascii_lowercase().as_str() {
            "birads" => {
                let category = raw
                    .parse::<u8>()
                    .ok()
                    .filter(|c| (1..=4).contains(c))
                    .ok_or_else(|| {
                        Error::RiskFactor(format!("invalid BI-RADS category '{raw}'"))
                    })?;
                Ok(Self::Birads(category))
            }
            "stratus" => Ok(Self::Stratus {
                percent: parse_percent(raw)?,
                menopause,
            }),
            "volpara" => Ok(Self::Volpara {
                percent: parse_percent(raw)?,
                menopause,
            }),
            other => Err(Error::RiskFactor(format!(
                "unknown mammographic density measure '{other}'"
            ))),
        }
    }

    /// Eight-character engine field. BI-RADS fills the integer digit;
    /// Stratus and Volpara pack `1m.PPPPP` and `2m.PPPPP` where `m` is the
    /// menopause status and `PPPPP` the percentage divided by 100.
    pub fn engine_code(&self) -> String {
        match *self {
            Self::Birads(category) => format!("{:8.5}", f64::from(category)),
            Self::Stratus { percent, menopause } => packed(10, percent, menopause),
            Self::Volpara { percent, menopause } => packed(20, percent, menopause),
        }
    }
}

fn packed(base: u8, percent: f64, menopause: MenopauseStatus) -> String {
    let integer = base + menopause.offset();
    let fraction = ((percent * 1000.0).round() as u32).min(99_999);
    format!("{integer:2}.{fraction:05}")
}

fn parse_percent(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|p| (0.0..100.0).contains(p))
        .ok_or_else(|| Error::RiskFactor(format!("invalid percent density '{raw}'")))
}
