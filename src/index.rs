// 13.0: the synthetic index. no oracle: the index is a dual EMA of the
// market's own matched trade prints, with the fast EMA capped relative to
// the slow one so a burst of adverse prints cannot run the index away.
// 13.1 is the sample intake: deviation gate, per-minute dedup, the
// last-valid-print record, and the bounded TWAP buffer settlement reads.

use crate::config::SeriesConfig;
use crate::types::{Bps, Price, Timestamp, BPS_DENOM};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One EMA step with an integer decay fraction: `prev + (sample-prev)*num/den`.
pub fn ema_step(prev: Decimal, sample: Decimal, num: u32, den: u32) -> Decimal {
    prev + (sample - prev) * Decimal::from(num) / Decimal::from(den)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastValidPrint {
    pub price: Price,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    /// Most recent accepted sample; display value and gate reference.
    pub last_mark: Option<Price>,
    /// Minute bucket of the last sample that fed the EMAs.
    last_fed_bucket: Option<i64>,
    pub lvp: Option<LastValidPrint>,
    /// (timestamp, price) samples for the settlement TWAP fallback.
    buffer: VecDeque<(Timestamp, Price)>,
}

impl IndexState {
    pub fn new(initial: Price) -> Self {
        Self {
            ema_fast: initial.value(),
            ema_slow: initial.value(),
            last_mark: None,
            last_fed_bucket: None,
            lvp: None,
            buffer: VecDeque::new(),
        }
    }

    /// Published index: `min(ema_fast, ema_slow * cap_multiple)`.
    pub fn index_price(&self, cap_multiple_bps: Bps) -> Price {
        let cap = self.ema_slow * Decimal::from(cap_multiple_bps.value())
            / Decimal::from(BPS_DENOM);
        Price::new_unchecked(self.ema_fast.min(cap))
    }

    pub fn twap_samples(&self) -> &VecDeque<(Timestamp, Price)> {
        &self.buffer
    }

    // 13.1: one accepted taker-trade VWAP print. the gate compares against
    // the previous accepted sample and rejects hard (the caller aborts the
    // whole trade). repeats within a minute bucket refresh last_mark only;
    // the LVP and the buffer take every accepted pre-expiry sample.
    pub fn record_sample(
        &mut self,
        sample: Price,
        now: Timestamp,
        series: &SeriesConfig,
    ) -> Result<(), IndexError> {
        if let Some(last) = self.last_mark {
            let gate = series.mark_gate_bps;
            if gate.value() > 0 {
                let deviation = (sample.value() - last.value()).abs();
                if deviation > gate.of(last.value()) {
                    return Err(IndexError::GateViolation {
                        sample,
                        last,
                        gate_bps: gate,
                    });
                }
            }
        }

        let bucket = now.minute_bucket();
        if self.last_fed_bucket != Some(bucket) {
            self.ema_fast = ema_step(
                self.ema_fast,
                sample.value(),
                series.ema_fast.num,
                series.ema_fast.den,
            );
            self.ema_slow = ema_step(
                self.ema_slow,
                sample.value(),
                series.ema_slow.num,
                series.ema_slow.den,
            );
            self.last_fed_bucket = Some(bucket);
        }
        self.last_mark = Some(sample);

        if now <= series.expiry {
            self.lvp = Some(LastValidPrint { price: sample, at: now });
            self.buffer.push_back((now, sample));
            self.trim_buffer(now, series);
        }

        Ok(())
    }

    fn trim_buffer(&mut self, now: Timestamp, series: &SeriesConfig) {
        let anchor = if now < series.expiry { now } else { series.expiry };
        let cutoff = anchor.saturating_sub_secs(series.twap_window_secs);
        while let Some((ts, _)) = self.buffer.front() {
            if *ts < cutoff {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
        while self.buffer.len() > series.twap_max_samples {
            self.buffer.pop_front();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("mark sample {sample} deviates from last print {last} beyond {gate_bps}")]
    GateViolation {
        sample: Price,
        last: Price,
        gate_bps: Bps,
    },
}
