//! Settlement price resolution.
//!
//! At expiry the canonical settlement price is the last valid print if one
//! landed at or before expiry. Failing that, a time-weighted average over
//! the buffered samples in a fixed window ending at expiry, and as a last
//! resort the current index price. The choice is made exactly once; the
//! engine guards the snapshot with a write-once flag.

use crate::config::SeriesConfig;
use crate::index::IndexState;
use crate::types::{Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Window for the TWAP fallback, seconds.
pub const SETTLEMENT_TWAP_WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SettlementState {
    pub price: Option<Price>,
    pub settled_at: Option<Timestamp>,
}

impl SettlementState {
    pub fn is_settled(&self) -> bool {
        self.price.is_some()
    }
}

/// Which rule produced the settlement price. Reported in the settled event
/// so indexers can audit the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementSource {
    LastValidPrint,
    TrailingTwap,
    IndexPrice,
}

pub fn resolve_settlement_price(
    index: &IndexState,
    series: &SeriesConfig,
) -> (Price, SettlementSource) {
    if let Some(lvp) = index.lvp {
        if lvp.at <= series.expiry {
            return (lvp.price, SettlementSource::LastValidPrint);
        }
    }

    if let Some(twap) = trailing_twap(index, series.expiry, SETTLEMENT_TWAP_WINDOW_SECS) {
        return (twap, SettlementSource::TrailingTwap);
    }

    (
        index.index_price(series.cap_multiple_bps),
        SettlementSource::IndexPrice,
    )
}

/// Time-weighted average over buffered samples in `[expiry - window, expiry]`.
/// Each sample's price is weighted by the elapsed time until the next
/// sample; the last sample is weighted until expiry. None when no sample
/// falls inside the window.
pub fn trailing_twap(index: &IndexState, expiry: Timestamp, window_secs: u64) -> Option<Price> {
    let start = expiry.saturating_sub_secs(window_secs);
    let samples: Vec<(Timestamp, Price)> = index
        .twap_samples()
        .iter()
        .filter(|(ts, _)| *ts >= start && *ts <= expiry)
        .copied()
        .collect();

    let (first_ts, first_price) = *samples.first()?;

    let mut weighted_sum = Decimal::ZERO;
    let mut total_ms = Decimal::ZERO;

    for pair in samples.windows(2) {
        let (ts, price) = pair[0];
        let (next_ts, _) = pair[1];
        let duration = Decimal::from(next_ts.as_millis() - ts.as_millis());
        weighted_sum += price.value() * duration;
        total_ms += duration;
    }

    let (last_ts, last_price) = *samples.last().unwrap_or(&(first_ts, first_price));
    let tail = Decimal::from(expiry.as_millis() - last_ts.as_millis());
    weighted_sum += last_price.value() * tail;
    total_ms += tail;

    if total_ms.is_zero() {
        // single sample exactly at expiry
        return Some(last_price);
    }
    Some(Price::new_unchecked(weighted_sum / total_ms))
}
