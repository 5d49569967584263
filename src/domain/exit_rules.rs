//! Exit Rules
//!
//! Priority-ordered exit checks for an open position. Rules run top to
//! bottom and the first one that decides (exit or hold) wins, so stop loss
//! always beats profit taking and the profit-only guard only ever shadows
//! the max-hold rule.

use serde::{Deserialize, Serialize};

use super::position::{ExitParams, Position, PriceObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    QuickProfit,
    ProfitTarget,
    TrailingStop,
    MaxHold,
    AbsoluteMaxAge,
    Shutdown,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::QuickProfit => "quick_profit",
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::MaxHold => "max_hold",
            ExitReason::AbsoluteMaxAge => "absolute_max_age",
            ExitReason::Shutdown => "shutdown",
            ExitReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Exit(ExitReason),
    /// Stop evaluating and keep the position open
    Hold,
    /// Rule does not apply, try the next one
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRule {
    StopLoss,
    QuickProfit,
    ProfitTarget,
    TrailingStop,
    AbsoluteMaxAge,
    ProfitOnlyHoldGuard,
    MaxHold,
}

const STANDARD_RULES: &[ExitRule] = &[
    ExitRule::StopLoss,
    ExitRule::QuickProfit,
    ExitRule::ProfitTarget,
    ExitRule::TrailingStop,
    ExitRule::MaxHold,
];

const PROFIT_ONLY_RULES: &[ExitRule] = &[
    ExitRule::StopLoss,
    ExitRule::QuickProfit,
    ExitRule::ProfitTarget,
    ExitRule::TrailingStop,
    ExitRule::AbsoluteMaxAge,
    ExitRule::ProfitOnlyHoldGuard,
    ExitRule::MaxHold,
];

/// Inputs every rule sees for one tick
#[derive(Debug, Clone, Copy)]
pub struct ExitContext<'a> {
    pub params: &'a ExitParams,
    /// P&L at the latest price
    pub pnl_pct: f64,
    /// P&L at the window low
    pub pnl_low_pct: f64,
    pub last_price: f64,
    pub high_water_mark: f64,
    pub age_secs: u64,
}

impl ExitRule {
    pub fn check(&self, ctx: &ExitContext<'_>) -> Verdict {
        let p = ctx.params;
        match self {
            ExitRule::StopLoss => {
                if ctx.pnl_low_pct <= p.stop_loss_pct {
                    return Verdict::Exit(ExitReason::StopLoss);
                }
            }
            ExitRule::QuickProfit => {
                if p.quick_profit_window_secs > 0
                    && ctx.age_secs <= p.quick_profit_window_secs
                    && ctx.pnl_pct >= p.quick_profit_pct
                {
                    return Verdict::Exit(ExitReason::QuickProfit);
                }
            }
            ExitRule::ProfitTarget => {
                if ctx.pnl_pct >= p.profit_target_pct {
                    return Verdict::Exit(ExitReason::ProfitTarget);
                }
            }
            ExitRule::TrailingStop => {
                if p.trailing_stop_pct > 0.0 && ctx.pnl_pct > 0.0 {
                    let trigger = ctx.high_water_mark * (1.0 - p.trailing_stop_pct / 100.0);
                    if ctx.last_price <= trigger {
                        return Verdict::Exit(ExitReason::TrailingStop);
                    }
                }
            }
            ExitRule::AbsoluteMaxAge => {
                if ctx.age_secs >= p.absolute_max_age_secs {
                    return Verdict::Exit(ExitReason::AbsoluteMaxAge);
                }
            }
            ExitRule::ProfitOnlyHoldGuard => {
                if p.profit_only && ctx.pnl_pct < 0.0 && ctx.pnl_pct > p.stop_loss_pct {
                    return Verdict::Hold;
                }
            }
            ExitRule::MaxHold => {
                if ctx.age_secs >= p.max_hold_secs {
                    return Verdict::Exit(ExitReason::MaxHold);
                }
            }
        }
        Verdict::Pass
    }
}

/// Rule list for a parameter set
pub fn rules_for(params: &ExitParams) -> &'static [ExitRule] {
    if params.profit_only {
        PROFIT_ONLY_RULES
    } else {
        STANDARD_RULES
    }
}

/// Run a rule list against a context, first decisive rule wins
pub fn evaluate_rules(rules: &[ExitRule], ctx: &ExitContext<'_>) -> Option<ExitReason> {
    for rule in rules {
        match rule.check(ctx) {
            Verdict::Exit(reason) => return Some(reason),
            Verdict::Hold => return None,
            Verdict::Pass => {}
        }
    }
    None
}

/// Apply one price observation to the position and decide whether to exit.
///
/// The high-water mark is updated first. Positions that are not open are
/// left untouched and never produce an exit.
pub fn observe_and_evaluate(
    position: &mut Position,
    observation: &PriceObservation,
    now: u64,
) -> Option<ExitReason> {
    if !position.is_open() {
        return None;
    }
    position.observe(observation);

    let low = if observation.low.is_finite() && observation.low > 0.0 {
        observation.low.min(position.last_price)
    } else {
        position.last_price
    };

    let ctx = ExitContext {
        params: &position.exit,
        pnl_pct: position.unrealized_pnl_pct,
        pnl_low_pct: position.pnl_pct_at(low),
        last_price: position.last_price,
        high_water_mark: position.high_water_mark,
        age_secs: position.age_secs(now),
    };
    evaluate_rules(rules_for(&position.exit), &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60;

    fn params() -> ExitParams {
        ExitParams {
            stop_loss_pct: -5.0,
            quick_profit_pct: 4.0,
            quick_profit_window_secs: 5 * MIN,
            profit_target_pct: 20.0,
            trailing_stop_pct: 5.0,
            max_hold_secs: 60 * MIN,
            profit_only: false,
            absolute_max_age_secs: 240 * MIN,
        }
    }

    fn position(params: ExitParams) -> Position {
        Position::open("MintA", 100.0, 1.0, 100.0, 0, None, params).unwrap()
    }

    #[test]
    fn test_stop_loss() {
        let mut p = position(params());
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(85.0), MIN);
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_profit_target() {
        let mut p = position(params());
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(121.0), 30 * MIN);
        assert_eq!(reason, Some(ExitReason::ProfitTarget));
    }

    #[test]
    fn test_quick_profit_inside_window() {
        let mut p = position(params());
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(104.0), 3 * MIN);
        assert_eq!(reason, Some(ExitReason::QuickProfit));
    }

    #[test]
    fn test_quick_profit_outside_window_falls_through() {
        let mut p = position(params());
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(104.0), 10 * MIN);
        assert_eq!(reason, None);
    }

    #[test]
    fn test_stop_loss_beats_profit_target_within_window() {
        // Crash 20% then recover above target within one tick window
        let mut p = position(params());
        let obs = PriceObservation::with_low(125.0, 80.0);
        let reason = observe_and_evaluate(&mut p, &obs, 30 * MIN);
        assert_eq!(reason, Some(ExitReason::StopLoss));
        assert_eq!(p.high_water_mark, 125.0);
    }

    #[test]
    fn test_trailing_stop_after_retrace() {
        let mut p = position(params());
        assert_eq!(observe_and_evaluate(&mut p, &PriceObservation::at(118.0), 30 * MIN), None);
        // 118 * 0.95 = 112.1
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(112.0), 31 * MIN);
        assert_eq!(reason, Some(ExitReason::TrailingStop));
    }

    #[test]
    fn test_trailing_stop_ignored_when_losing() {
        let mut p = position(params());
        observe_and_evaluate(&mut p, &PriceObservation::at(103.0), 30 * MIN);
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(97.0), 31 * MIN);
        assert_eq!(reason, None);
    }

    #[test]
    fn test_max_hold() {
        let mut p = position(params());
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(98.0), 60 * MIN);
        assert_eq!(reason, Some(ExitReason::MaxHold));
    }

    #[test]
    fn test_profit_only_holds_small_loss() {
        let mut params = params();
        params.profit_only = true;
        let mut p = position(params);
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(98.0), 90 * MIN);
        assert_eq!(reason, None);
    }

    #[test]
    fn test_profit_only_still_exits_in_profit_after_max_hold() {
        let mut params = params();
        params.profit_only = true;
        let mut p = position(params);
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(101.0), 90 * MIN);
        assert_eq!(reason, Some(ExitReason::MaxHold));
    }

    #[test]
    fn test_profit_only_absolute_ceiling() {
        let mut params = params();
        params.profit_only = true;
        let mut p = position(params);
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(98.0), 240 * MIN);
        assert_eq!(reason, Some(ExitReason::AbsoluteMaxAge));
    }

    #[test]
    fn test_guard_in_isolation() {
        let mut params = params();
        params.profit_only = true;
        let ctx = ExitContext {
            params: &params,
            pnl_pct: -2.0,
            pnl_low_pct: -2.0,
            last_price: 98.0,
            high_water_mark: 100.0,
            age_secs: 0,
        };
        assert_eq!(ExitRule::ProfitOnlyHoldGuard.check(&ctx), Verdict::Hold);

        let ctx = ExitContext { pnl_pct: 1.0, ..ctx };
        assert_eq!(ExitRule::ProfitOnlyHoldGuard.check(&ctx), Verdict::Pass);
    }

    #[test]
    fn test_rule_order() {
        let mut params = params();
        assert_eq!(rules_for(&params).first(), Some(&ExitRule::StopLoss));
        params.profit_only = true;
        let rules = rules_for(&params);
        let pos = |r: ExitRule| rules.iter().position(|x| *x == r).unwrap();
        assert!(pos(ExitRule::AbsoluteMaxAge) < pos(ExitRule::ProfitOnlyHoldGuard));
        assert!(pos(ExitRule::ProfitOnlyHoldGuard) < pos(ExitRule::MaxHold));
    }

    #[test]
    fn test_closed_position_is_noop() {
        let mut p = position(params());
        p.begin_close(ExitReason::StopLoss).unwrap();
        p.mark_closed().unwrap();
        let before = p.clone();
        let reason = observe_and_evaluate(&mut p, &PriceObservation::at(50.0), 10 * MIN);
        assert_eq!(reason, None);
        assert_eq!(p, before);
    }
}
