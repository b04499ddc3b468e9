//! Booking calendar link
//!
//! Qualified leads are sent to an external calendar page. The page is
//! opaque: the link only carries the lead's name, score and classification
//! as query parameters.

use crate::config::BookingConfig;
use crate::qualification::Classification;
use crate::{Error, Result};

/// Booking link for a lead, or `None` when no calendar is configured
pub fn booking_url(
    config: &BookingConfig,
    name: &str,
    score: u8,
    classification: Classification,
) -> Result<Option<String>> {
    let Some(base) = config.base_url.as_deref() else {
        return Ok(None);
    };

    let score = score.to_string();
    let url = reqwest::Url::parse_with_params(
        base,
        &[
            ("name", name),
            ("score", score.as_str()),
            ("classification", classification.as_str()),
        ],
    )
    .map_err(|e| Error::Config(format!("Invalid booking base URL '{}': {}", base, e)))?;

    Ok(Some(url.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(base: &str) -> BookingConfig {
        BookingConfig {
            base_url: Some(base.to_string()),
        }
    }

    #[test]
    fn test_parameters_are_encoded() {
        let url = booking_url(
            &configured("https://cal.example.com/book"),
            "Ann & Co",
            98,
            Classification::Hot,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            url,
            "https://cal.example.com/book?name=Ann+%26+Co&score=98&classification=hot"
        );
    }

    #[test]
    fn test_existing_query_is_kept() {
        let url = booking_url(
            &configured("https://cal.example.com/book?team=sales"),
            "Bo",
            61,
            Classification::Warm,
        )
        .unwrap()
        .unwrap();
        assert!(url.starts_with("https://cal.example.com/book?team=sales&name=Bo"));
    }

    #[test]
    fn test_unconfigured_gives_none() {
        let url = booking_url(&BookingConfig::default(), "x", 90, Classification::Hot).unwrap();
        assert_eq!(url, None);
    }
}
