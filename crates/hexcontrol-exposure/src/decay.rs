//! Logistic decay weights.
//!
//! Every weight is a logistic curve `1 / (1 + exp(-κ + γ·x))`:
//!
//! - distance weight `wd(d)`: κd = 7, γd = 0.35 per kilometer
//! - age weight `wa(a)`: κa = 8, γa = 2.5 per 30 days; ages are in days and
//!   a negative age (the event happens after the decision date) weighs 0
//! - severity weight `wcas(mean, x) = 1 / (1 + exp(-s·(x - mean)))`, s = 0.5
//!
//! With γ > 0 both decay curves are non-increasing in their argument.

use serde::{Deserialize, Serialize};

use crate::{ExposureError, Result};

/// Parameters of the distance, age and severity weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayParams {
    /// Distance curve offset κd. Default: **7**.
    pub kappa_distance: f64,
    /// Distance curve slope γd, per kilometer. Default: **0.35**.
    pub gamma_distance: f64,
    /// Age curve offset κa. Default: **8**.
    pub kappa_age: f64,
    /// Age curve slope γa, per day. Default: **2.5 / 30**.
    pub gamma_age: f64,
    /// Ring radius (in hops) outside which events contribute nothing. Default: **2**.
    pub ring_radius: u32,
    /// Trailing window, in days, for the mean recent fatality count. Default: **90**.
    pub severity_window_days: i64,
    /// Slope of the severity sigmoid. Default: **0.5**.
    pub severity_slope: f64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            kappa_distance: 7.0,
            gamma_distance: 0.35,
            kappa_age: 8.0,
            gamma_age: 2.5 / 30.0,
            ring_radius: hexcontrol_core::DEFAULT_RING_RADIUS,
            severity_window_days: 90,
            severity_slope: 0.5,
        }
    }
}

impl DecayParams {
    /// Check that every curve is finite and decays with its argument.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("kappa_distance", self.kappa_distance),
            ("gamma_distance", self.gamma_distance),
            ("kappa_age", self.kappa_age),
            ("gamma_age", self.gamma_age),
            ("severity_slope", self.severity_slope),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ExposureError::invalid_parameter(name, "must be finite"));
            }
        }
        if self.gamma_distance <= 0.0 {
            return Err(ExposureError::invalid_parameter(
                "gamma_distance",
                "must be > 0 so the distance weight decays",
            ));
        }
        if self.gamma_age <= 0.0 {
            return Err(ExposureError::invalid_parameter(
                "gamma_age",
                "must be > 0 so the age weight decays",
            ));
        }
        if self.severity_slope <= 0.0 {
            return Err(ExposureError::invalid_parameter("severity_slope", "must be > 0"));
        }
        if self.severity_window_days < 0 {
            return Err(ExposureError::invalid_parameter(
                "severity_window_days",
                "must be >= 0",
            ));
        }
        Ok(())
    }

    /// Distance weight `wd` for a distance in kilometers.
    #[inline]
    pub fn distance_weight(&self, distance_km: f64) -> f64 {
        logistic(self.kappa_distance, self.gamma_distance, distance_km)
    }

    /// Age weight `wa` for an age in days. Exactly 0 for future events.
    #[inline]
    pub fn age_weight(&self, age_days: f64) -> f64 {
        if age_days < 0.0 {
            0.0
        } else {
            logistic(self.kappa_age, self.gamma_age, age_days)
        }
    }

    /// Severity weight `wcas` of an event with `fatalities`, centred on the
    /// mean recent fatality count.
    #[inline]
    pub fn severity_weight(&self, mean_recent: f64, fatalities: f64) -> f64 {
        1.0 / (1.0 + (-self.severity_slope * (fatalities - mean_recent)).exp())
    }
}

/// Logistic curve `1 / (1 + exp(-κ + γ·x))`.
#[inline]
pub fn logistic(kappa: f64, gamma: f64, x: f64) -> f64 {
    1.0 / (1.0 + (-kappa + gamma * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_params_valid() {
        DecayParams::default().validate().unwrap();
    }

    #[test]
    fn test_reference_values() {
        let p = DecayParams::default();
        // wd(0) = 1 / (1 + e^-7)
        assert_relative_eq!(p.distance_weight(0.0), 0.999_088_948_805_599, epsilon = 1e-12);
        // centre of the distance curve: 7 / 0.35 = 20 km
        assert_relative_eq!(p.distance_weight(20.0), 0.5, epsilon = 1e-12);
        // centre of the age curve: 8 / (2.5 / 30) = 96 days
        assert_relative_eq!(p.age_weight(96.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.severity_weight(3.0, 3.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_future_events_weigh_zero() {
        let p = DecayParams::default();
        assert_eq!(p.age_weight(-1.0), 0.0);
        assert_eq!(p.age_weight(-1e-9), 0.0);
        assert!(p.age_weight(0.0) > 0.99);
    }

    #[test]
    fn test_rejects_growing_curves() {
        let mut p = DecayParams::default();
        p.gamma_age = -0.1;
        assert!(p.validate().is_err());

        let mut p = DecayParams::default();
        p.gamma_distance = 0.0;
        assert!(p.validate().is_err());

        let mut p = DecayParams::default();
        p.kappa_age = f64::NAN;
        assert!(p.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_distance_weight_non_increasing(a in 0.0f64..2000.0, b in 0.0f64..2000.0) {
            let p = DecayParams::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(p.distance_weight(near) >= p.distance_weight(far));
            prop_assert!(p.distance_weight(far) >= 0.0);
            prop_assert!(p.distance_weight(near) <= 1.0);
        }

        #[test]
        fn prop_age_weight_non_increasing(a in 0.0f64..20000.0, b in 0.0f64..20000.0) {
            let p = DecayParams::default();
            let (young, old) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(p.age_weight(young) >= p.age_weight(old));
            prop_assert!(p.age_weight(young) <= 1.0);
        }

        #[test]
        fn prop_weights_positive_in_working_range(d in 0.0f64..300.0, age in 0.0f64..3000.0) {
            let p = DecayParams::default();
            prop_assert!(p.distance_weight(d) > 0.0);
            prop_assert!(p.age_weight(age) > 0.0);
        }

        #[test]
        fn prop_negative_age_is_exactly_zero(age in -1e9f64..-1e-12) {
            prop_assert_eq!(DecayParams::default().age_weight(age), 0.0);
        }
    }
}
