use rust_decimal::Decimal;

pub fn decrease_by_percentage(percentage: Decimal, price: Decimal) -> Decimal {
    price * (Decimal::ONE - percentage)
}

pub fn increase_by_percentage(percentage: Decimal, price: Decimal) -> Decimal {
    price * (Decimal::ONE + percentage)
}

pub fn decrease_by_amount(amount: Decimal, price: Decimal) -> Decimal {
    price - amount
}

pub fn increase_by_amount(amount: Decimal, price: Decimal) -> Decimal {
    price + amount
}

/// A buy the bot can afford and the exchange will accept
#[derive(Debug, Clone, PartialEq)]
pub struct BuyPlan {
    pub price: Decimal,
    pub size: Decimal,
}

impl BuyPlan {
    pub fn cost(&self) -> Decimal {
        self.price * self.size
    }
}

/// Why a buy was not attempted
#[derive(Debug, Clone, PartialEq)]
pub enum BuyRejection {
    NonPositivePrice(Decimal),
    BelowLotSize { size: Decimal, min_lot: Decimal },
    InsufficientBalance { cost: Decimal, balance: Decimal },
}

/// Inputs for sizing a buy
#[derive(Debug, Clone)]
pub struct BuySizing {
    pub trade_amount: Decimal,
    pub min_lot_size: Decimal,
    pub size_decimals: u32,
}

/// Discount the market price by `decrease` and size the order so it spends
/// roughly `trade_amount`.
///
/// Size is rounded here; price is left unrounded until the order is submitted.
pub fn plan_buy(
    balance: Decimal,
    market_price: Decimal,
    decrease: Decimal,
    sizing: &BuySizing,
) -> Result<BuyPlan, BuyRejection> {
    let price = decrease_by_amount(decrease, market_price);
    if price <= Decimal::ZERO {
        return Err(BuyRejection::NonPositivePrice(price));
    }

    let size = (sizing.trade_amount / price).round_dp(sizing.size_decimals);
    if size < sizing.min_lot_size {
        return Err(BuyRejection::BelowLotSize {
            size,
            min_lot: sizing.min_lot_size,
        });
    }

    let plan = BuyPlan { price, size };
    let cost = plan.cost();
    if cost > balance {
        return Err(BuyRejection::InsufficientBalance { cost, balance });
    }

    Ok(plan)
}

/// Sell price for a filled buy
#[derive(Debug, Clone, PartialEq)]
pub struct SellPlan {
    pub price: Decimal,
    /// The market had already reached the target, so the markup was applied
    /// to the market price instead of the fill price.
    pub adjusted: bool,
}

pub fn plan_sell(filled_price: Decimal, market_price: Decimal, markup: Decimal) -> SellPlan {
    let target = increase_by_amount(markup, filled_price);
    if market_price < target {
        SellPlan {
            price: target,
            adjusted: false,
        }
    } else {
        SellPlan {
            price: increase_by_amount(markup, market_price),
            adjusted: true,
        }
    }
}
