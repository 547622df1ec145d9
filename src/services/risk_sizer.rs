//! Position sizing from balance, risk profile and stop distance.

use crate::config::RiskProfilesConfig;
use crate::types::RiskProfile;

/// Value of one pip for one standard lot, in account currency.
pub const PIP_VALUE_PER_LOT: f64 = 10.0;

/// Smallest tradable lot.
pub const MIN_LOT: f64 = 0.01;

/// Converts (balance, profile, stop distance) into a bounded lot size.
#[derive(Debug, Clone, Copy)]
pub struct RiskSizer {
    profiles: RiskProfilesConfig,
}

impl RiskSizer {
    pub fn new(profiles: RiskProfilesConfig) -> Self {
        Self { profiles }
    }

    /// Lot size for a trade risking `profile.risk_fraction` of `balance`
    /// with a stop `stop_pips` away.
    ///
    /// Always returns a value in `[MIN_LOT, profile.max_lot]`. A zero,
    /// negative or non-finite stop distance yields `MIN_LOT`.
    pub fn size(&self, balance: f64, profile: RiskProfile, stop_pips: f64) -> f64 {
        let settings = self.profiles.for_profile(profile);
        let max_lot = settings.max_lot.max(MIN_LOT);

        if !stop_pips.is_finite() || stop_pips <= 0.0 || !balance.is_finite() {
            return MIN_LOT;
        }

        let risk_amount = balance * settings.risk_fraction;
        let raw_lot = risk_amount / (stop_pips * PIP_VALUE_PER_LOT);
        let rounded = (raw_lot * 100.0).round() / 100.0;

        if rounded.is_nan() {
            return MIN_LOT;
        }
        rounded.clamp(MIN_LOT, max_lot)
    }

    /// Convert a price distance into pips.
    pub fn price_to_pips(distance: f64, pip_size: f64) -> f64 {
        if pip_size <= 0.0 {
            return 0.0;
        }
        distance.abs() / pip_size
    }
}

impl Default for RiskSizer {
    fn default() -> Self {
        Self::new(RiskProfilesConfig::default())
    }
}
