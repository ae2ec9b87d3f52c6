//! Single long position held by the backtest simulator.

/// Cash plus at most one long holding. FLAT when `shares_held == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub cash: f64,
    pub shares_held: u64,
    pub entry_price: f64,
}

/// What a completed buy or sell moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub shares: u64,
    pub value: f64,
    /// Zero for buys.
    pub profit: f64,
}

impl Position {
    pub fn flat(cash: f64) -> Self {
        Position {
            cash,
            shares_held: 0,
            entry_price: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.shares_held > 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares_held as f64 * price
    }

    /// Cash plus holdings marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.market_value(price)
    }

    pub fn take_profit_price(&self, take_profit_pct: f64) -> f64 {
        self.entry_price * (1.0 + take_profit_pct)
    }

    /// Spend as much cash as whole shares allow at `price`. Returns `None`
    /// (and changes nothing) if already long or not even one share fits.
    pub fn buy(&mut self, price: f64) -> Option<Fill> {
        if self.is_long() || !price.is_finite() || price <= 0.0 {
            return None;
        }
        let shares = (self.cash / price).floor();
        if !shares.is_finite() || shares < 1.0 {
            return None;
        }
        let shares = shares as u64;
        let value = shares as f64 * price;
        self.cash -= value;
        self.shares_held = shares;
        self.entry_price = price;
        Some(Fill {
            price,
            shares,
            value,
            profit: 0.0,
        })
    }

    /// Close the whole holding at `price`. Returns `None` when flat.
    pub fn sell(&mut self, price: f64) -> Option<Fill> {
        if !self.is_long() {
            return None;
        }
        let shares = self.shares_held;
        let value = shares as f64 * price;
        let profit = (price - self.entry_price) * shares as f64;
        self.cash += value;
        self.shares_held = 0;
        Some(Fill {
            price,
            shares,
            value,
            profit,
        })
    }
}
