//! Country-keyed initial distributions.
//!
//! Built-in table:
//!
//! | country | π |
//! |---------|---|
//! | *(default)* | `[0.2, 0.2, 0.2, 0.2, 0.2]` |
//! | Iraq | `[0.2, 0.2, 0.2, 0.2, 0.2]` |
//! | Nigeria | `[0.025, 0.025, 0.025, 0.025, 0.9]` |

use std::collections::BTreeMap;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::model::check_distribution;
use crate::Result;

/// Lookup table from country name to initial distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryPriors {
    /// Prior used for countries absent from the table
    pub default: Vec<f64>,
    /// Per-country priors
    pub countries: BTreeMap<String, Vec<f64>>,
}

impl Default for CountryPriors {
    fn default() -> Self {
        let uniform = vec![0.2; 5];
        let mut countries = BTreeMap::new();
        countries.insert("Iraq".to_string(), uniform.clone());
        countries.insert("Nigeria".to_string(), vec![0.025, 0.025, 0.025, 0.025, 0.9]);
        Self {
            default: uniform,
            countries,
        }
    }
}

impl CountryPriors {
    /// Prior of `country`. Lookup is case-insensitive.
    pub fn lookup(&self, country: &str) -> &[f64] {
        self.countries
            .get(country)
            .or_else(|| {
                self.countries
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(country))
                    .map(|(_, prior)| prior)
            })
            .map(Vec::as_slice)
            .unwrap_or(&self.default)
    }

    /// Prior of a run over `countries`, keyed on the first one.
    pub fn for_run(&self, countries: &[String]) -> &[f64] {
        match countries.first() {
            Some(first) => self.lookup(first),
            None => &self.default,
        }
    }

    /// Check that every entry is a probability vector.
    pub fn validate(&self) -> Result<()> {
        check_distribution("initial", None, ArrayView1::from(self.default.as_slice()))?;
        for prior in self.countries.values() {
            check_distribution("initial", None, ArrayView1::from(prior.as_slice()))?;
        }
        Ok(())
    }
}
