//! Long straddle — paired long wings sized off the day's implied move.
//!
//! The call sits one scaled implied move above spot, the put the same
//! distance below, both snapped to the strike grid. Each leg scales out
//! once: when spot has crossed the leg's strike and its mark has doubled
//! (configurable), half the leg is sold and the rest rides to the universal
//! exits. A leg that already scaled out is left alone.

use crate::domain::{
    grid_strike, ExitReason, IntentIds, IntentKind, LegSpec, OptionContract, OrderIntent,
    OrderKind, Position, Right,
};
use crate::error::EngineError;

use super::signals::QuietMarketGate;
use super::{close_position_intent, premium_exit, EntryGate, Strategy, StrategyContext};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StraddleParams {
    pub contracts: i64,
    /// Wing distance as a multiple of the chain-implied move.
    pub offset_multiplier: f64,
    pub strike_step: f64,
    /// Scale out when a leg's mark reaches this multiple of entry.
    pub scale_out_mult: f64,
    pub scale_out_fraction: f64,
    pub profit_target_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub gate: EntryGate,
    pub quiet: QuietMarketGate,
}

impl Default for StraddleParams {
    fn default() -> Self {
        Self {
            contracts: 1,
            offset_multiplier: 1.5,
            strike_step: 5.0,
            scale_out_mult: 2.0,
            scale_out_fraction: 0.5,
            profit_target_pct: None,
            stop_loss_pct: None,
            gate: EntryGate::default(),
            quiet: QuietMarketGate::default(),
        }
    }
}

pub struct LongStraddle {
    params: StraddleParams,
}

impl LongStraddle {
    pub fn new(params: StraddleParams) -> Self {
        assert!(params.contracts >= 1, "contracts must be >= 1");
        assert!(params.strike_step > 0.0, "strike_step must be positive");
        assert!(
            params.scale_out_fraction > 0.0 && params.scale_out_fraction < 1.0,
            "scale_out_fraction must be in (0, 1)"
        );
        assert!(params.scale_out_mult > 1.0, "scale_out_mult must exceed 1");
        Self { params }
    }

    pub fn default_params() -> Self {
        Self::new(StraddleParams::default())
    }

    fn entry_intent(
        &self,
        ctx: &StrategyContext<'_>,
        ids: &mut IntentIds,
    ) -> Option<OrderIntent> {
        let spot = ctx.market.underlying()?;
        let expiry = ctx.market.day()?;
        let offset = ctx.tick.implied_move()?.dollars * self.params.offset_multiplier;
        let call = OptionContract::new(
            expiry,
            grid_strike(spot + offset, self.params.strike_step),
            Right::Call,
        );
        let put = OptionContract::new(
            expiry,
            grid_strike(spot - offset, self.params.strike_step),
            Right::Put,
        );
        // both wings must be live to buy
        for c in [&call, &put] {
            if !ctx.market.quote(c).is_some_and(|q| q.is_tradeable()) {
                return None;
            }
        }
        Some(OrderIntent {
            id: ids.next(),
            kind: IntentKind::Open {
                strategy: self.name().to_string(),
            },
            legs: vec![
                LegSpec::buy(call, self.params.contracts),
                LegSpec::buy(put, self.params.contracts),
            ],
            order: OrderKind::Market,
            issued_at: ctx.now,
        })
    }

    /// One-shot partial exits for winning legs: spot through the strike and
    /// the mark at or past the scale-out multiple.
    fn scale_out_intents(
        &self,
        ctx: &StrategyContext<'_>,
        position: &Position,
        ids: &mut IntentIds,
    ) -> Vec<OrderIntent> {
        let spot = match ctx.market.underlying() {
            Some(s) => s,
            None => return Vec::new(),
        };
        let mut intents = Vec::new();
        for leg in position.legs.iter().filter(|l| !l.is_flat() && !l.scaled_out) {
            let crossed = match leg.contract.right {
                Right::Call => spot > leg.contract.strike(),
                Right::Put => spot < leg.contract.strike(),
            };
            if !crossed {
                continue;
            }
            let mark = match ctx.tick.value(&leg.contract) {
                Ok(v) => v.mark,
                Err(_) => continue,
            };
            if mark < leg.entry_price * self.params.scale_out_mult {
                continue;
            }
            let open = leg.open_quantity.abs();
            let close = ((open as f64 * self.params.scale_out_fraction).round() as i64)
                .clamp(1, open);
            intents.push(OrderIntent {
                id: ids.next(),
                kind: IntentKind::Close {
                    position: position.id,
                    reason: ExitReason::StrategyExit,
                },
                legs: vec![LegSpec {
                    contract: leg.contract.clone(),
                    quantity: -leg.open_quantity.signum() * close,
                }],
                order: OrderKind::Market,
                issued_at: ctx.now,
            });
        }
        intents
    }
}

impl Strategy for LongStraddle {
    fn name(&self) -> &str {
        "LONG_STRADDLE"
    }

    fn on_day_start(&mut self, _date: chrono::NaiveDate) {}

    fn evaluate(
        &mut self,
        ctx: &StrategyContext<'_>,
        ids: &mut IntentIds,
    ) -> Result<Vec<OrderIntent>, EngineError> {
        let mut intents = Vec::new();
        for pos in ctx.open {
            // a full-position exit supersedes any scale-out this tick
            if let Some(reason) = premium_exit(
                pos,
                ctx.tick,
                self.params.profit_target_pct,
                self.params.stop_loss_pct,
            ) {
                intents.push(close_position_intent(pos, reason, ids, ctx.now));
                continue;
            }
            intents.extend(self.scale_out_intents(ctx, pos, ids));
        }
        if self.params.gate.admits(ctx) && self.params.quiet.is_quiet(ctx.market.bars_today()) {
            if let Some(intent) = self.entry_intent(ctx, ids) {
                intents.push(intent);
            }
        }
        Ok(intents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MarketEvent;
    use crate::domain::{Bar, ChainSnapshot, Fill, IntentId, OptionQuote, PositionId};
    use crate::market::MarketState;
    use crate::valuation::{PricingModel, Valuator};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn quote(strike: f64, right: Right, bid: f64, ask: f64) -> OptionQuote {
        OptionQuote {
            contract: OptionContract::new(
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                strike,
                right,
            ),
            ts: ts(10, 28),
            bid,
            ask,
            iv: Some(0.25),
        }
    }

    fn quiet_bars(spot: f64) -> Vec<Bar> {
        let mk = |minute: u32, open: f64, close: f64, range: f64, volume: u64| {
            let mid = (open + close) / 2.0;
            Bar {
                ts: ts(9, 30 + minute),
                open,
                high: mid + range / 2.0,
                low: mid - range / 2.0,
                close,
                volume,
            }
        };
        vec![
            mk(0, spot, spot + 2.0, 8.0, 10_000),
            mk(5, spot + 2.0, spot + 0.5, 6.0, 9_000),
            mk(10, spot + 0.5, spot + 1.0, 2.0, 4_000),
            mk(15, spot + 1.0, spot + 0.2, 2.0, 3_500),
            mk(20, spot + 0.2, spot, 1.5, 3_000),
        ]
    }

    /// Chain pricing a 5-point implied move around 5000.
    fn entry_market() -> MarketState {
        let mut m = MarketState::new();
        for b in quiet_bars(5000.0) {
            m.apply(&MarketEvent::Bar(b));
        }
        m.apply(&MarketEvent::Chain(ChainSnapshot {
            ts: ts(10, 28),
            quotes: vec![
                quote(4995.0, Right::Call, 2.9, 3.1),
                quote(4995.0, Right::Put, 1.9, 2.1),
                quote(5005.0, Right::Call, 1.9, 2.1),
                quote(5005.0, Right::Put, 2.9, 3.1),
                quote(5010.0, Right::Call, 1.5, 1.7),
            ],
        }));
        m
    }

    #[test]
    fn wings_sit_one_scaled_move_out() {
        let m = entry_market();
        let valuator = Valuator::new(PricingModel::default(), 300);
        let now = ts(10, 30);
        let tick = valuator.at(&m, now);
        let ctx = StrategyContext {
            market: &m,
            tick: &tick,
            open: &[],
            pending_open: false,
            entries_today: 0,
            now,
        };
        let mut strat = LongStraddle::default_params();
        let mut ids = IntentIds::default();
        let intents = strat.evaluate(&ctx, &mut ids).unwrap();
        assert_eq!(intents.len(), 1);
        // implied move 5.0, multiplier 1.5 -> wings at grid(5007.5)/grid(4992.5)
        let legs = &intents[0].legs;
        assert_eq!(legs[0].contract.strike(), 5010.0);
        assert_eq!(legs[0].quantity, 1);
        assert_eq!(legs[1].contract.strike(), 4995.0);
        assert_eq!(legs[1].quantity, 1);
    }

    fn open_position(strike: f64, right: Right, quantity: i64, entry: f64) -> Position {
        let fill = Fill {
            intent_id: IntentId(0),
            contract: OptionContract::new(
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                strike,
                right,
            ),
            price: entry,
            quantity,
            commission: 0.0,
            slippage: 0.0,
            ts: ts(10, 0),
        };
        Position::open(PositionId(1), "LONG_STRADDLE", &[fill], 100.0, ts(10, 0))
    }

    fn scale_out_market(spot: f64, call_bid: f64) -> MarketState {
        let mut m = MarketState::new();
        m.apply(&MarketEvent::Bar(Bar {
            ts: ts(11, 0),
            open: spot - 1.0,
            high: spot + 1.0,
            low: spot - 2.0,
            close: spot,
            volume: 5_000,
        }));
        m.apply(&MarketEvent::Chain(ChainSnapshot {
            ts: ts(11, 1),
            quotes: vec![quote(5000.0, Right::Call, call_bid, call_bid + 0.2)],
        }));
        m
    }

    #[test]
    fn winning_leg_scales_out_half() {
        // long 4 calls from 2.00; spot through the strike, mark at 2.1x
        let m = scale_out_market(5006.0, 4.1);
        let pos = open_position(5000.0, Right::Call, 4, 2.0);
        let valuator = Valuator::new(PricingModel::default(), 300);
        let now = ts(11, 2);
        let tick = valuator.at(&m, now);
        let open = [&pos];
        let ctx = StrategyContext {
            market: &m,
            tick: &tick,
            open: &open,
            pending_open: false,
            entries_today: 1,
            now,
        };
        let mut strat = LongStraddle::default_params();
        let mut ids = IntentIds::default();
        let intents = strat.evaluate(&ctx, &mut ids).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].legs.len(), 1);
        assert_eq!(intents[0].legs[0].quantity, -2);
        assert!(matches!(
            intents[0].kind,
            IntentKind::Close {
                reason: ExitReason::StrategyExit,
                ..
            }
        ));
    }

    #[test]
    fn scaled_leg_is_not_scaled_again() {
        let m = scale_out_market(5006.0, 4.1);
        let mut pos = open_position(5000.0, Right::Call, 4, 2.0);
        pos.legs[0].scaled_out = true;
        let valuator = Valuator::new(PricingModel::default(), 300);
        let now = ts(11, 2);
        let tick = valuator.at(&m, now);
        let open = [&pos];
        let ctx = StrategyContext {
            market: &m,
            tick: &tick,
            open: &open,
            pending_open: false,
            entries_today: 1,
            now,
        };
        let mut strat = LongStraddle::default_params();
        let mut ids = IntentIds::default();
        assert!(strat.evaluate(&ctx, &mut ids).unwrap().is_empty());
    }

    #[test]
    fn uncrossed_strike_does_not_scale() {
        // mark doubled but spot still below the strike
        let m = scale_out_market(4995.0, 4.1);
        let pos = open_position(5000.0, Right::Call, 4, 2.0);
        let valuator = Valuator::new(PricingModel::default(), 300);
        let now = ts(11, 2);
        let tick = valuator.at(&m, now);
        let open = [&pos];
        let ctx = StrategyContext {
            market: &m,
            tick: &tick,
            open: &open,
            pending_open: false,
            entries_today: 1,
            now,
        };
        let mut strat = LongStraddle::default_params();
        let mut ids = IntentIds::default();
        assert!(strat.evaluate(&ctx, &mut ids).unwrap().is_empty());
    }
}
