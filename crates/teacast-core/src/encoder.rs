//! Categorical encoding.
//!
//! Each [`CategoryDomain`] maps free-text values (elevation tier, processing
//! method, tea type, country, commodity type) to a closed set of integer
//! codes. Whether an unmapped value falls back to an "unknown" code or is
//! rejected is declared per domain through [`UnknownPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Integer code for a categorical value within one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoricalCode(pub u32);

impl CategoricalCode {
    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl std::fmt::Display for CategoricalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalisation applied to raw input before lookup.
///
/// Must match how the bound model's training data was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseNormalization {
    /// Lookup uses the value exactly as given (after trimming).
    #[default]
    AsIs,
    /// Lookup uses the upper-cased value.
    Uppercase,
}

impl CaseNormalization {
    fn apply(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            CaseNormalization::AsIs => trimmed.to_string(),
            CaseNormalization::Uppercase => trimmed.to_uppercase(),
        }
    }
}

/// What to do with a value that has no mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "code")]
pub enum UnknownPolicy {
    /// Resolve to this designated unknown code.
    Fallback(CategoricalCode),
    /// Surface [`ForecastError::InvalidCategory`].
    Reject,
}

/// A closed categorical domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDomain {
    pub name: String,
    #[serde(default)]
    pub case: CaseNormalization,
    pub codes: BTreeMap<String, CategoricalCode>,
    pub unknown: UnknownPolicy,
}

impl CategoryDomain {
    pub fn new(name: impl Into<String>, case: CaseNormalization, unknown: UnknownPolicy) -> Self {
        Self {
            name: name.into(),
            case,
            codes: BTreeMap::new(),
            unknown,
        }
    }

    /// Add a known value. The key is stored normalised.
    pub fn with_value(mut self, raw: &str, code: u32) -> Self {
        let key = self.case.apply(raw);
        self.codes.insert(key, CategoricalCode(code));
        self
    }

    pub fn has_unknown_slot(&self) -> bool {
        matches!(self.unknown, UnknownPolicy::Fallback(_))
    }

    /// Map `raw` to its code, applying the domain's unknown policy.
    pub fn encode(&self, raw: &str) -> Result<CategoricalCode> {
        let key = self.case.apply(raw);
        if let Some(code) = self.codes.get(&key) {
            return Ok(*code);
        }
        match self.unknown {
            UnknownPolicy::Fallback(code) => {
                tracing::debug!(domain = %self.name, value = %raw, code = code.0, "unmapped category, using unknown code");
                Ok(code)
            }
            UnknownPolicy::Reject => Err(ForecastError::InvalidCategory {
                domain: self.name.clone(),
                value: raw.to_string(),
            }),
        }
    }

    /// Reject configurations where the unknown code collides with a known one.
    pub fn validate(&self) -> Result<()> {
        if let UnknownPolicy::Fallback(unknown) = self.unknown {
            if let Some((value, _)) = self.codes.iter().find(|(_, c)| **c == unknown) {
                return Err(ForecastError::InvalidConfig(format!(
                    "domain '{}': unknown code {} is also assigned to {:?}",
                    self.name, unknown, value
                )));
            }
        }
        if self.codes.is_empty() {
            return Err(ForecastError::InvalidConfig(format!(
                "domain '{}' has no known values",
                self.name
            )));
        }
        Ok(())
    }
}

/// Immutable set of categorical domains, keyed by domain name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    domains: BTreeMap<String, CategoryDomain>,
}

impl CategoricalEncoder {
    pub fn new(domains: impl IntoIterator<Item = CategoryDomain>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for domain in domains {
            domain.validate()?;
            if map.insert(domain.name.clone(), domain).is_some() {
                return Err(ForecastError::InvalidConfig(
                    "duplicate categorical domain".to_string(),
                ));
            }
        }
        Ok(Self { domains: map })
    }

    pub fn domain(&self, name: &str) -> Option<&CategoryDomain> {
        self.domains.get(name)
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Encode `raw` in `domain`.
    ///
    /// An unregistered domain is a configuration problem and reported as
    /// [`ForecastError::InvalidConfig`].
    pub fn encode(&self, domain: &str, raw: &str) -> Result<CategoricalCode> {
        let d = self.domains.get(domain).ok_or_else(|| {
            ForecastError::InvalidConfig(format!("categorical domain not registered: {domain}"))
        })?;
        d.encode(raw)
    }

    /// The built-in tea market domains.
    pub fn standard() -> Self {
        Self {
            domains: standard_domains()
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }
}

pub const ELEVATION: &str = "elevation";
pub const PRODUCTION_ELEVATION: &str = "production_elevation";
pub const QUANTITY_TIER: &str = "quantity_tier";
pub const PROCESSING_METHOD: &str = "processing_method";
pub const TEA_TYPE: &str = "tea_type";
pub const COUNTRY: &str = "country";
pub const COMMODITY_TYPE: &str = "commodity_type";

/// Domains used by the standard forecasting operations.
pub fn standard_domains() -> Vec<CategoryDomain> {
    let unknown = |c| UnknownPolicy::Fallback(CategoricalCode(c));
    vec![
        CategoryDomain::new(ELEVATION, CaseNormalization::AsIs, unknown(3))
            .with_value("High grown", 0)
            .with_value("Low grown", 1)
            .with_value("Mid grown", 2),
        CategoryDomain::new(PRODUCTION_ELEVATION, CaseNormalization::AsIs, unknown(3))
            .with_value("High", 0)
            .with_value("Low", 1)
            .with_value("Medium", 2),
        CategoryDomain::new(QUANTITY_TIER, CaseNormalization::Uppercase, unknown(3))
            .with_value("HIGH", 0)
            .with_value("LOW", 1)
            .with_value("MEDIUM", 2),
        CategoryDomain::new(COMMODITY_TYPE, CaseNormalization::Uppercase, unknown(4))
            .with_value("BOP", 0)
            .with_value("BOPF", 1)
            .with_value("DUST", 2)
            .with_value("FBOP", 3),
        CategoryDomain::new(PROCESSING_METHOD, CaseNormalization::AsIs, UnknownPolicy::Reject)
            .with_value("CTC", 0)
            .with_value("Green", 1)
            .with_value("Orthodox", 2),
        CategoryDomain::new(TEA_TYPE, CaseNormalization::Uppercase, UnknownPolicy::Reject)
            .with_value("CTC TEA", 0)
            .with_value("GREEN TEA", 1)
            .with_value("ORTHODOX TEA", 2),
        CategoryDomain::new(COUNTRY, CaseNormalization::AsIs, UnknownPolicy::Reject)
            .with_value("China", 0)
            .with_value("India", 1)
            .with_value("Kenya", 2)
            .with_value("Sri Lanka", 3),
    ]
}
