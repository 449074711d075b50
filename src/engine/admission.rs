//! Admission gates for new position opens
//!
//! Every gate failure is a named error; there are no silent no-ops. The
//! gates run in a fixed order so the caller always learns the first binding
//! constraint.

use chrono::{DateTime, Local};

use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::position::PositionLedger;
use crate::risk::RiskBudget;

pub struct AdmissionController {
    limits: LimitsConfig,
}

impl AdmissionController {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Gate a prospective BUY. Read-only: the ledger is untouched whether or
    /// not admission passes.
    #[allow(clippy::too_many_arguments)]
    pub fn check_open(
        &self,
        ledger: &PositionLedger,
        budget: &RiskBudget,
        now: DateTime<Local>,
        token: &str,
        current_price: f64,
        quote_balance: f64,
        required_quote: f64,
    ) -> Result<()> {
        // (i) capacity
        let open = ledger.count();
        if open >= self.limits.max_positions {
            return Err(Error::CapacityExceeded {
                open,
                max: self.limits.max_positions,
            });
        }

        // (ii) re-entry spacing: don't stack entries on a flat price
        if let Some(last_entry) = ledger.last_entry_price(token) {
            let delta_pct = ((current_price - last_entry) / last_entry * 100.0).abs();
            if delta_pct < self.limits.min_price_change_pct {
                return Err(Error::ReentryTooSoon {
                    token: token.to_string(),
                    delta_pct,
                    min_pct: self.limits.min_price_change_pct,
                });
            }
        }

        // (iii) daily trade budget
        if budget.daily_trade_count >= self.limits.max_daily_trades {
            return Err(Error::DailyTradeLimitReached {
                count: budget.daily_trade_count,
                max: self.limits.max_daily_trades,
            });
        }

        // (iv) daily loss budget
        if budget.daily_pnl_usd <= -self.limits.max_daily_loss_usd {
            return Err(Error::DailyLossLimitReached {
                lost: -budget.daily_pnl_usd,
                limit: self.limits.max_daily_loss_usd,
            });
        }

        // (v) cooldown since the last trade
        if let Some(remaining_secs) = budget.cooldown_remaining(now, self.limits.cooldown_minutes)
        {
            return Err(Error::CooldownActive { remaining_secs });
        }

        // (vi) quote-currency balance
        if quote_balance < required_quote {
            return Err(Error::InsufficientBalance {
                available: quote_balance,
                required: required_quote,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_positions: 2,
            min_price_change_pct: 1.0,
            max_daily_trades: 3,
            max_daily_loss_usd: 50.0,
            cooldown_minutes: 30,
        }
    }

    fn controller() -> AdmissionController {
        AdmissionController::new(limits())
    }

    #[test]
    fn test_passes_with_clean_state() {
        let ledger = PositionLedger::new();
        let budget = RiskBudget::new(now());
        assert!(controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.0, 500.0, 25.0)
            .is_ok());
    }

    #[test]
    fn test_capacity_gate() {
        let mut ledger = PositionLedger::new();
        ledger.open("SOL", 1.0, 1, 100.0, 5.0, 10.0, false);
        ledger.open("JUP", 1.0, 1, 2.0, 5.0, 10.0, false);
        let budget = RiskBudget::new(now());

        let err = controller()
            .check_open(&ledger, &budget, now(), "BONK", 0.01, 500.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { open: 2, max: 2 }));
        // Rejection leaves the ledger exactly as it was.
        assert_eq!(ledger.count(), 2);
    }

    #[test]
    fn test_reentry_gate_blocks_flat_price() {
        let mut ledger = PositionLedger::new();
        ledger.open("SOL", 1.0, 1, 100.0, 5.0, 10.0, false);
        let budget = RiskBudget::new(now());

        // 0.5% move: too close to the last entry
        let err = controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.5, 500.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::ReentryTooSoon { .. }));

        // 2% move: allowed
        assert!(controller()
            .check_open(&ledger, &budget, now(), "SOL", 102.0, 500.0, 25.0)
            .is_ok());
    }

    #[test]
    fn test_daily_trade_limit_gate() {
        let ledger = PositionLedger::new();
        let mut budget = RiskBudget::new(now());
        budget.daily_trade_count = 3;
        budget.last_trade_time = None;

        let err = controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.0, 500.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::DailyTradeLimitReached { count: 3, max: 3 }));
    }

    #[test]
    fn test_daily_loss_limit_gate() {
        let ledger = PositionLedger::new();
        let mut budget = RiskBudget::new(now());
        budget.daily_pnl_usd = -50.0;

        let err = controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.0, 500.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::DailyLossLimitReached { .. }));
    }

    #[test]
    fn test_cooldown_gate() {
        let ledger = PositionLedger::new();
        let mut budget = RiskBudget::new(now());
        budget.record_trade(now(), 0.0);

        let five_min_later = now() + chrono::Duration::minutes(5);
        let err = controller()
            .check_open(&ledger, &budget, five_min_later, "SOL", 100.0, 500.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::CooldownActive { .. }));

        let later = now() + chrono::Duration::minutes(31);
        assert!(controller()
            .check_open(&ledger, &budget, later, "SOL", 100.0, 500.0, 25.0)
            .is_ok());
    }

    #[test]
    fn test_balance_gate() {
        let ledger = PositionLedger::new();
        let budget = RiskBudget::new(now());

        let err = controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.0, 10.0, 25.0)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                available,
                required
            } if available == 10.0 && required == 25.0
        ));
    }

    #[test]
    fn test_gate_order_capacity_first() {
        // Everything is wrong at once; capacity must be reported first.
        let mut ledger = PositionLedger::new();
        ledger.open("SOL", 1.0, 1, 100.0, 5.0, 10.0, false);
        ledger.open("JUP", 1.0, 1, 2.0, 5.0, 10.0, false);
        let mut budget = RiskBudget::new(now());
        budget.daily_trade_count = 99;
        budget.daily_pnl_usd = -999.0;
        budget.record_trade(now(), 0.0);
        budget.daily_trade_count = 99;

        let err = controller()
            .check_open(&ledger, &budget, now(), "SOL", 100.0, 0.0, 25.0)
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }
}
