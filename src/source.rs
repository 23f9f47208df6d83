//! Bulletin dates and the URLs they resolve to.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid date {input:?}: expected YYYY-MM-DD")]
pub struct InvalidDate {
    pub input: String,
}

/// Publication date of one bulletin issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BulletinDate(NaiveDate);

impl BulletinDate {
    /// Parse a strict `YYYY-MM-DD` date.
    pub fn parse(input: &str) -> Result<Self, InvalidDate> {
        let trimmed = input.trim();
        let well_formed = trimmed.len() == 10
            && trimmed
                .char_indices()
                .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
        if !well_formed {
            return Err(InvalidDate {
                input: input.to_string(),
            });
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| InvalidDate {
                input: input.to_string(),
            })
    }

    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    /// URL of the PDF for this date under `base_url`.
    ///
    /// `https://ru.muenchen.de` + 2024-01-15 →
    /// `https://ru.muenchen.de/pdf/2024/ru-2024-01-15.pdf`
    pub fn pdf_url(&self, base_url: &str) -> String {
        format!(
            "{}/pdf/{}/ru-{}.pdf",
            base_url.trim_end_matches('/'),
            self.0.year(),
            self
        )
    }
}

impl std::fmt::Display for BulletinDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl std::str::FromStr for BulletinDate {
    type Err = InvalidDate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
