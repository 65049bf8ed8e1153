use regex::Regex;
use scraper::{Html, Selector};

use crate::utils::error::{AppError, CheckError};

/// Pulls a numeric price out of rendered page markup.
///
/// Selectors are tried in priority order; the first element with non-empty
/// text decides the outcome. Normalization strips everything except digits
/// and the decimal point, so currency symbols and thousands separators
/// interleaved with the digits fall away ("₹2,499.00" → 2499.0).
pub struct PriceExtractor {
    rules: Vec<Selector>,
    strip_pattern: Regex,
}

impl PriceExtractor {
    pub fn new(selectors: &[String]) -> Result<Self, AppError> {
        let mut rules = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let parsed = Selector::parse(selector).map_err(|_| AppError::Selector {
                selector: selector.clone(),
            })?;
            rules.push(parsed);
        }

        Ok(Self {
            rules,
            strip_pattern: Regex::new(r"[^0-9.]").expect("strip pattern is valid"),
        })
    }

    /// Extract the price from rendered HTML. Deterministic and side-effect-free.
    pub fn extract(&self, html: &str) -> Result<f64, CheckError> {
        let document = Html::parse_document(html);

        for rule in &self.rules {
            for element in document.select(rule) {
                let text = element.text().collect::<Vec<_>>().join(" ");
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                // First non-empty match wins; a bad fragment is a parse
                // failure, not a reason to fall through to later rules.
                return self.normalize(text);
            }
        }

        Err(CheckError::PriceNotFound)
    }

    fn normalize(&self, raw: &str) -> Result<f64, CheckError> {
        let stripped = self.strip_pattern.replace_all(raw, "");
        if stripped.is_empty() {
            return Err(CheckError::PriceParse(raw.to_string()));
        }

        stripped
            .parse::<f64>()
            .ok()
            .filter(|price| price.is_finite())
            .ok_or_else(|| CheckError::PriceParse(raw.to_string()))
    }
}
