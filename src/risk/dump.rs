//! Dump detection
//!
//! Windowed anomaly check over recent intraday candles. A hard price drop
//! flags on its own; a softer drop flags only when the most recent quarter
//! of the window carries a volume spike.

use crate::config::DumpConfig;
use crate::feed::Candle;

#[derive(Debug, Clone)]
pub struct DumpVerdict {
    pub is_dump: bool,
    pub reason: String,
}

impl DumpVerdict {
    fn clear(reason: String) -> Self {
        Self {
            is_dump: false,
            reason,
        }
    }

    fn dump(reason: String) -> Self {
        Self {
            is_dump: true,
            reason,
        }
    }
}

/// Check a candle window (oldest first) for a dump. The window is expected
/// to cover roughly the last hour.
pub fn detect(candles: &[Candle], config: &DumpConfig) -> DumpVerdict {
    if candles.len() < 2 {
        return DumpVerdict::clear("insufficient candles".to_string());
    }

    let start = candles[0].open;
    let latest = candles[candles.len() - 1].close;
    if start <= 0.0 {
        return DumpVerdict::clear("bad window start price".to_string());
    }

    let change_pct = (latest - start) / start * 100.0;

    if change_pct <= config.hard_drop_pct {
        return DumpVerdict::dump(format!("{:.2}% drop over the window", change_pct));
    }

    if change_pct <= config.soft_drop_pct {
        let quarter = (candles.len() / 4).max(1);
        let (earlier, recent) = candles.split_at(candles.len() - quarter);

        let earlier_avg = earlier.iter().map(|c| c.volume).sum::<f64>() / earlier.len() as f64;
        let recent_avg = recent.iter().map(|c| c.volume).sum::<f64>() / recent.len() as f64;

        if earlier_avg > 0.0 && recent_avg >= config.volume_spike_ratio * earlier_avg {
            return DumpVerdict::dump(format!(
                "{:.2}% drop with {:.1}x volume spike",
                change_pct,
                recent_avg / earlier_avg
            ));
        }
    }

    DumpVerdict::clear(format!("{:.2}% change over the window", change_pct))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
            unix_time: 0,
        }
    }

    /// A window sliding linearly from `start` to `end` with flat volume.
    fn series(start: f64, end: f64, n: usize, volume: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let t0 = i as f64 / n as f64;
                let t1 = (i + 1) as f64 / n as f64;
                candle(start + (end - start) * t0, start + (end - start) * t1, volume)
            })
            .collect()
    }

    fn config() -> DumpConfig {
        DumpConfig {
            candle_interval: "5m".to_string(),
            candle_limit: 12,
            hard_drop_pct: -5.0,
            soft_drop_pct: -2.0,
            volume_spike_ratio: 3.0,
        }
    }

    #[test]
    fn test_hard_drop_is_flagged() {
        let candles = series(100.0, 94.0, 12, 10.0);
        let verdict = detect(&candles, &config());
        assert!(verdict.is_dump);
        assert!(verdict.reason.contains("-6.00%"));
    }

    #[test]
    fn test_flat_series_is_clear() {
        let candles = series(100.0, 100.0, 12, 10.0);
        assert!(!detect(&candles, &config()).is_dump);
    }

    #[test]
    fn test_rising_series_is_clear() {
        let candles = series(100.0, 107.0, 12, 10.0);
        assert!(!detect(&candles, &config()).is_dump);
    }

    #[test]
    fn test_soft_drop_needs_volume_confirmation() {
        // -3% with flat volume: not a dump
        let candles = series(100.0, 97.0, 12, 10.0);
        assert!(!detect(&candles, &config()).is_dump);

        // Same drop with the last quarter at 4x volume: flagged
        let mut spiked = series(100.0, 97.0, 12, 10.0);
        for candle in spiked.iter_mut().skip(9) {
            candle.volume = 40.0;
        }
        let verdict = detect(&spiked, &config());
        assert!(verdict.is_dump);
        assert!(verdict.reason.contains("volume"));
    }

    #[test]
    fn test_volume_spike_without_price_drop_is_clear() {
        let mut candles = series(100.0, 100.5, 12, 10.0);
        for candle in candles.iter_mut().skip(9) {
            candle.volume = 50.0;
        }
        assert!(!detect(&candles, &config()).is_dump);
    }

    #[test]
    fn test_single_candle_is_clear() {
        let candles = vec![candle(100.0, 80.0, 10.0)];
        let verdict = detect(&candles, &config());
        assert!(!verdict.is_dump);
        assert!(verdict.reason.contains("insufficient"));
    }
}
