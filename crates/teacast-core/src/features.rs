//! Feature vector assembly.
//!
//! A [`FeatureSchema`] freezes the field order each predictor was trained
//! with. [`build`] turns a request's numeric inputs and encoded categoricals
//! into a [`FeatureVector`] in exactly that order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::encoder::{CategoricalCode, CategoricalEncoder};
use crate::error::{ForecastError, Result};

/// One slot of a feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureField {
    /// Numeric input passed through unchanged. Optional fields default to zero.
    Numeric {
        name: String,
        #[serde(default)]
        optional: bool,
    },
    /// Free-text input encoded through the named categorical domain.
    Categorical { name: String, domain: String },
}

impl FeatureField {
    pub fn numeric(name: &str) -> Self {
        FeatureField::Numeric {
            name: name.to_string(),
            optional: false,
        }
    }

    pub fn optional(name: &str) -> Self {
        FeatureField::Numeric {
            name: name.to_string(),
            optional: true,
        }
    }

    pub fn categorical(name: &str, domain: &str) -> Self {
        FeatureField::Categorical {
            name: name.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FeatureField::Numeric { name, .. } | FeatureField::Categorical { name, .. } => name,
        }
    }
}

/// Ordered field list for one forecasting operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub operation: String,
    pub fields: Vec<FeatureField>,
}

impl FeatureSchema {
    pub fn new(operation: impl Into<String>, fields: Vec<FeatureField>) -> Self {
        Self {
            operation: operation.into(),
            fields,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn missing(&self, field: &str) -> ForecastError {
        ForecastError::MissingFeature {
            operation: self.operation.clone(),
            field: field.to_string(),
        }
    }

    /// Check field names are unique and every categorical domain exists.
    pub fn validate(&self, encoder: &CategoricalEncoder) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ForecastError::InvalidConfig(format!(
                "operation '{}' has an empty feature schema",
                self.operation
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name()) {
                return Err(ForecastError::InvalidConfig(format!(
                    "operation '{}' declares field '{}' twice",
                    self.operation,
                    field.name()
                )));
            }
            if let FeatureField::Categorical { domain, .. } = field {
                if encoder.domain(domain).is_none() {
                    return Err(ForecastError::InvalidConfig(format!(
                        "operation '{}' references unknown domain '{}'",
                        self.operation, domain
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Raw request fields before encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureInputs {
    #[serde(default)]
    pub numeric: BTreeMap<String, f64>,
    #[serde(default)]
    pub categorical: BTreeMap<String, String>,
}

impl FeatureInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.numeric.insert(name.to_string(), value);
        self
    }

    pub fn with_optional_number(self, name: &str, value: Option<f64>) -> Self {
        match value {
            Some(v) => self.with_number(name, v),
            None => self,
        }
    }

    pub fn with_category(mut self, name: &str, value: &str) -> Self {
        self.categorical.insert(name.to_string(), value.to_string());
        self
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.numeric.get(name).copied()
    }
}

/// Encoded categoricals keyed by field name.
pub type EncodedCategoricals = BTreeMap<String, CategoricalCode>;

/// Encode every categorical field the schema declares.
pub fn encode_inputs(
    schema: &FeatureSchema,
    inputs: &FeatureInputs,
    encoder: &CategoricalEncoder,
) -> Result<EncodedCategoricals> {
    let mut encoded = EncodedCategoricals::new();
    for field in &schema.fields {
        if let FeatureField::Categorical { name, domain } = field {
            let raw = inputs
                .categorical
                .get(name)
                .ok_or_else(|| schema.missing(name))?;
            encoded.insert(name.clone(), encoder.encode(domain, raw)?);
        }
    }
    Ok(encoded)
}

/// Fixed-length numeric input for a predictor. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Assemble the feature vector in schema order.
pub fn build(
    schema: &FeatureSchema,
    inputs: &FeatureInputs,
    encoded: &EncodedCategoricals,
) -> Result<FeatureVector> {
    let mut values = Vec::with_capacity(schema.len());
    for field in &schema.fields {
        let value = match field {
            FeatureField::Numeric { name, optional } => match inputs.number(name) {
                Some(v) => v,
                None if *optional => 0.0,
                None => return Err(schema.missing(name)),
            },
            FeatureField::Categorical { name, .. } => encoded
                .get(name)
                .map(|c| c.as_f64())
                .ok_or_else(|| schema.missing(name))?,
        };
        values.push(value);
    }
    Ok(FeatureVector(values))
}
