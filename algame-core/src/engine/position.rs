//! Per-asset position state machine: `Flat → Open(Long|Short) → Flat`.
//!
//! A `Position` owns its pending orders and its closed trades. All mutation goes
//! through `submit`, `evaluate`, `fill_pending` and `close`, which keep the
//! flat invariant: a flat position has no entry price and no protective levels.
//!
//! Evaluation precedence on every price: stop-loss, then take-profit, then
//! pending orders in submission order.

use chrono::NaiveDateTime;
use tracing::debug;

use super::config::EngineConfig;
use crate::domain::{ExitReason, Fill, Order, OrderError, OrderId, OrderSide, OrderStatus, Trade};

/// Sizes within this tolerance of zero are treated as flat.
pub const SIZE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct Position {
    symbol: String,
    size: f64,
    entry_price: Option<f64>,
    entry_time: Option<NaiveDateTime>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    /// Entry commission not yet allotted to a trade.
    open_fees: f64,
    realized_pnl: f64,
    fees_paid: f64,
    pending: Vec<Order>,
    finished_orders: Vec<Order>,
    trades: Vec<Trade>,
    next_order_id: u64,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            size: 0.0,
            entry_price: None,
            entry_time: None,
            stop_loss: None,
            take_profit: None,
            open_fees: 0.0,
            realized_pnl: 0.0,
            fees_paid: 0.0,
            pending: Vec::new(),
            finished_orders: Vec::new(),
            trades: Vec::new(),
            next_order_id: 0,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Signed size: positive long, negative short.
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.entry_price
    }

    pub fn entry_time(&self) -> Option<NaiveDateTime> {
        self.entry_time
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    pub fn pending_orders(&self) -> &[Order] {
        &self.pending
    }

    /// Orders that reached a terminal status, in the order they got there.
    pub fn finished_orders(&self) -> &[Order] {
        &self.finished_orders
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.entry_price {
            Some(entry) if !self.is_flat() => (price - entry) * self.size,
            _ => 0.0,
        }
    }

    /// Absolute market value of the open exposure.
    pub fn notional(&self, price: f64) -> f64 {
        (self.size * price).abs()
    }

    /// Mark-to-market equity: capital + realized - fees + unrealized.
    pub fn equity(&self, price: f64, initial_capital: f64) -> f64 {
        initial_capital + self.realized_pnl - self.fees_paid + self.unrealized_pnl(price)
    }

    // ─── Orders ─────────────────────────────────────────────────────

    /// Validate and queue an order. Returns the id assigned to it.
    pub fn submit(&mut self, mut order: Order) -> Result<OrderId, OrderError> {
        order.validate()?;
        self.next_order_id += 1;
        order.id = OrderId(self.next_order_id);
        let id = order.id;
        self.pending.push(order);
        Ok(id)
    }

    /// Cancel one pending order.
    pub fn cancel(&mut self, id: OrderId, reason: &str) -> Result<(), OrderError> {
        let index = self
            .pending
            .iter()
            .position(|o| o.id == id)
            .ok_or(OrderError::NotPending(id))?;
        let mut order = self.pending.remove(index);
        order.status = OrderStatus::Cancelled {
            reason: reason.to_string(),
        };
        self.finished_orders.push(order);
        Ok(())
    }

    fn cancel_all(&mut self, reason: &str) {
        for mut order in std::mem::take(&mut self.pending) {
            order.status = OrderStatus::Cancelled {
                reason: reason.to_string(),
            };
            self.finished_orders.push(order);
        }
    }

    // ─── Evaluation ─────────────────────────────────────────────────

    /// Evaluate protective exits, then pending orders, at `price`.
    pub fn evaluate(&mut self, price: f64, time: NaiveDateTime, config: &EngineConfig) -> Vec<Fill> {
        let mut fills = Vec::new();
        if let Some(reason) = self.protective_trigger(price) {
            fills.extend(self.liquidate(price, time, reason, config));
        }
        fills.extend(self.fill_pending(price, time, config));
        fills
    }

    fn protective_trigger(&self, price: f64) -> Option<ExitReason> {
        if self.is_long() {
            if self.stop_loss.is_some_and(|sl| price <= sl) {
                return Some(ExitReason::StopLoss);
            }
            if self.take_profit.is_some_and(|tp| price >= tp) {
                return Some(ExitReason::TakeProfit);
            }
        } else if self.is_short() {
            if self.stop_loss.is_some_and(|sl| price >= sl) {
                return Some(ExitReason::StopLoss);
            }
            if self.take_profit.is_some_and(|tp| price <= tp) {
                return Some(ExitReason::TakeProfit);
            }
        }
        None
    }

    /// Fill every pending order whose conditions hold at `price`, in submission order.
    ///
    /// Orders that do not trigger stay pending with their relative order intact.
    pub fn fill_pending(
        &mut self,
        price: f64,
        time: NaiveDateTime,
        config: &EngineConfig,
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        for mut order in std::mem::take(&mut self.pending) {
            if !order.triggers_at(price) {
                self.pending.push(order);
                continue;
            }

            let fill_price = config.fill_price(order.side, price);
            let allowed = self.allowed_quantity(order.side, order.size, fill_price, price, config);
            if allowed <= SIZE_EPSILON {
                debug!(
                    symbol = %self.symbol,
                    order = %order.id,
                    side = ?order.side,
                    requested = order.size,
                    "order cancelled: exposure limits allow no fill"
                );
                order.status = OrderStatus::Cancelled {
                    reason: "exposure limit".to_string(),
                };
                self.finished_orders.push(order);
                continue;
            }
            if allowed < order.size - SIZE_EPSILON {
                debug!(
                    symbol = %self.symbol,
                    order = %order.id,
                    requested = order.size,
                    allowed,
                    "order size capped by exposure limits"
                );
            }

            let mut fill =
                self.apply_fill(order.side, allowed, fill_price, time, ExitReason::Signal, config);
            fill.order_id = Some(order.id);

            // Protective levels follow the exposure the order opened or extended.
            // An order carrying either level replaces the pair, so the bracket
            // checked by `Order::validate` is the one in force.
            let carries_levels = order.stop_loss.is_some() || order.take_profit.is_some();
            if self.size * order.side.sign() > 0.0 && carries_levels {
                self.stop_loss = order.stop_loss;
                self.take_profit = order.take_profit;
            }

            order.status = OrderStatus::Filled;
            self.finished_orders.push(order);
            fills.push(fill);
        }
        fills
    }

    /// Quantity of a `requested` order that the exposure limits allow.
    ///
    /// The part that reduces existing exposure is always allowed. The part that
    /// opens or grows exposure is capped by `max_notional`, and is zero for
    /// sells when shorting is disabled.
    fn allowed_quantity(
        &self,
        side: OrderSide,
        requested: f64,
        fill_price: f64,
        mark_price: f64,
        config: &EngineConfig,
    ) -> f64 {
        let reducing = if self.size * side.sign() < 0.0 {
            requested.min(self.size.abs())
        } else {
            0.0
        };
        let increasing = requested - reducing;
        if increasing <= SIZE_EPSILON {
            return reducing;
        }
        if side == OrderSide::Sell && !config.allow_short {
            return reducing;
        }

        // A positive remainder after reducing means the old exposure closes fully.
        let held = if reducing > 0.0 { 0.0 } else { self.size.abs() };
        let equity = self.equity(mark_price, config.initial_capital);
        let max_quantity = config.max_notional(equity) / fill_price;
        reducing + increasing.min((max_quantity - held).max(0.0))
    }

    /// Apply one fill. Reducing exposure emits a trade; a sign flip closes the
    /// old exposure and opens the remainder at the same price.
    fn apply_fill(
        &mut self,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time: NaiveDateTime,
        reason: ExitReason,
        config: &EngineConfig,
    ) -> Fill {
        let commission = config.commission_for(price, quantity);
        self.fees_paid += commission;

        let sign = side.sign();
        let mut remaining = quantity;
        if self.size * sign < 0.0 {
            let closing = remaining.min(self.size.abs());
            let exit_fee = commission * closing / quantity;
            self.close_portion(closing, price, time, exit_fee, reason);
            remaining -= closing;
        }

        if remaining > SIZE_EPSILON {
            let held = self.size.abs();
            let entry = self.entry_price.unwrap_or(price);
            self.entry_price = Some((entry * held + price * remaining) / (held + remaining));
            self.entry_time.get_or_insert(time);
            self.size += sign * remaining;
            self.open_fees += commission * remaining / quantity;
        }

        Fill {
            order_id: None,
            timestamp: time,
            side,
            quantity,
            price,
            commission,
        }
    }

    fn close_portion(
        &mut self,
        quantity: f64,
        price: f64,
        time: NaiveDateTime,
        exit_fee: f64,
        reason: ExitReason,
    ) {
        let held = self.size.abs();
        let entry_price = self.entry_price.unwrap_or(price);
        let entry_time = self.entry_time.unwrap_or(time);
        let signed = quantity * self.size.signum();
        let pnl = (price - entry_price) * signed;

        let entry_fee = self.open_fees * quantity / held;
        self.open_fees -= entry_fee;
        self.realized_pnl += pnl;

        self.trades.push(Trade {
            symbol: self.symbol.clone(),
            entry_time,
            exit_time: time,
            entry_price,
            exit_price: price,
            size: signed,
            pnl,
            fees: entry_fee + exit_fee,
            is_long: signed > 0.0,
            exit_reason: reason,
        });

        self.size -= signed;
        if self.size.abs() <= SIZE_EPSILON {
            self.reset_flat();
        }
    }

    fn reset_flat(&mut self) {
        self.size = 0.0;
        self.entry_price = None;
        self.entry_time = None;
        self.stop_loss = None;
        self.take_profit = None;
        self.open_fees = 0.0;
    }

    fn liquidate(
        &mut self,
        price: f64,
        time: NaiveDateTime,
        reason: ExitReason,
        config: &EngineConfig,
    ) -> Option<Fill> {
        if self.is_flat() {
            return None;
        }
        let side = if self.is_long() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let fill_price = config.fill_price(side, price);
        Some(self.apply_fill(side, self.size.abs(), fill_price, time, reason, config))
    }

    /// Force-close everything at `price` and cancel remaining pending orders.
    pub fn close(&mut self, price: f64, time: NaiveDateTime, config: &EngineConfig) -> Option<Fill> {
        self.cancel_all("position closed");
        self.liquidate(price, time, ExitReason::EndOfData, config)
    }
}
