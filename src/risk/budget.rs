//! Daily trading budget
//!
//! Counters reset at local-day rollover; `last_trade_time` survives the
//! rollover so a cooldown started before midnight still applies.

use chrono::{DateTime, Local, NaiveDate};
use tracing::info;

#[derive(Debug, Clone)]
pub struct RiskBudget {
    pub daily_trade_count: u32,
    pub daily_pnl_usd: f64,
    pub last_trade_time: Option<DateTime<Local>>,
    current_day: NaiveDate,
}

impl RiskBudget {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            daily_trade_count: 0,
            daily_pnl_usd: 0.0,
            last_trade_time: None,
            current_day: now.date_naive(),
        }
    }

    /// Reset the daily counters when the local calendar day has changed.
    pub fn roll_over(&mut self, now: DateTime<Local>) {
        if now.date_naive() != self.current_day {
            self.daily_trade_count = 0;
            self.daily_pnl_usd = 0.0;
            self.current_day = now.date_naive();
            info!("Daily counters reset");
        }
    }

    pub fn record_trade(&mut self, now: DateTime<Local>, pnl_usd: f64) {
        self.daily_trade_count += 1;
        self.daily_pnl_usd += pnl_usd;
        self.last_trade_time = Some(now);
    }

    /// Seconds of cooldown left, or None when trading is allowed.
    pub fn cooldown_remaining(&self, now: DateTime<Local>, cooldown_minutes: u32) -> Option<i64> {
        let last = self.last_trade_time?;
        let elapsed = (now - last).num_seconds();
        let cooldown = i64::from(cooldown_minutes) * 60;
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_record_accumulates() {
        let mut budget = RiskBudget::new(at(1, 9));
        budget.record_trade(at(1, 9), -10.0);
        budget.record_trade(at(1, 10), 4.0);

        assert_eq!(budget.daily_trade_count, 2);
        assert!((budget.daily_pnl_usd - (-6.0)).abs() < 1e-9);
        assert_eq!(budget.last_trade_time, Some(at(1, 10)));
    }

    #[test]
    fn test_rollover_resets_counters_but_not_last_trade() {
        let mut budget = RiskBudget::new(at(1, 9));
        budget.record_trade(at(1, 23), -10.0);

        budget.roll_over(at(2, 0));
        assert_eq!(budget.daily_trade_count, 0);
        assert_eq!(budget.daily_pnl_usd, 0.0);
        // Cooldown anchor survives the day boundary.
        assert_eq!(budget.last_trade_time, Some(at(1, 23)));
    }

    #[test]
    fn test_same_day_rollover_is_noop() {
        let mut budget = RiskBudget::new(at(1, 9));
        budget.record_trade(at(1, 9), 5.0);
        budget.roll_over(at(1, 15));
        assert_eq!(budget.daily_trade_count, 1);
    }

    #[test]
    fn test_cooldown_remaining() {
        let mut budget = RiskBudget::new(at(1, 9));
        assert_eq!(budget.cooldown_remaining(at(1, 9), 30), None);

        budget.record_trade(at(1, 9), 0.0);
        let ten_min_later = at(1, 9) + Duration::minutes(10);
        assert_eq!(budget.cooldown_remaining(ten_min_later, 30), Some(20 * 60));

        let later = at(1, 9) + Duration::minutes(30);
        assert_eq!(budget.cooldown_remaining(later, 30), None);
    }
}
