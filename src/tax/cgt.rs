use super::money::{Currency, Money, MoneyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Share of the taxable profit owed as tax
pub const TAX_RATE: Decimal = dec!(0.20);

/// Sales whose total value (in BRL) does not exceed this amount are exempt
pub const EXEMPTION_LIMIT: Decimal = dec!(20000.00);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TaxError {
    #[error("unknown operation kind: {0}")]
    UnknownOperationKind(String),
    #[error("quantity overflow: {held} held, {traded} traded")]
    QuantityOverflow { held: i64, traded: i64 },
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Buy,
    Sell,
}

impl OperationKind {
    pub fn display(&self) -> &'static str {
        match self {
            OperationKind::Buy => "buy",
            OperationKind::Sell => "sell",
        }
    }
}

impl FromStr for OperationKind {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(OperationKind::Buy),
            "sell" => Ok(OperationKind::Sell),
            other => Err(TaxError::UnknownOperationKind(other.to_string())),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// A single trade instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub unit_cost: Money,
    pub quantity: i64,
}

impl Operation {
    pub fn buy(unit_cost: Money, quantity: i64) -> Self {
        Operation {
            kind: OperationKind::Buy,
            unit_cost,
            quantity,
        }
    }

    pub fn sell(unit_cost: Money, quantity: i64) -> Self {
        Operation {
            kind: OperationKind::Sell,
            unit_cost,
            quantity,
        }
    }
}

/// Running state of one portfolio.
///
/// Quantity is not clamped: selling more than is held leaves it negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub quantity: i64,
    pub average_cost: Money,
    pub accumulated_loss: Money,
}

impl Position {
    pub fn new(currency: Currency) -> Self {
        Position {
            quantity: 0,
            average_cost: Money::zero(currency),
            accumulated_loss: Money::zero(currency),
        }
    }
}

/// Position after one operation, and the tax that operation owes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub position: Position,
    pub tax: Money,
}

/// Apply a single operation to a position.
pub fn apply_operation(
    position: &Position,
    operation: &Operation,
) -> Result<OperationResult, TaxError> {
    match operation.kind {
        OperationKind::Buy => apply_buy(position, operation),
        OperationKind::Sell => apply_sell(position, operation),
    }
}

/// A buy blends the purchase price into the weighted-average cost and never owes tax.
fn apply_buy(position: &Position, operation: &Operation) -> Result<OperationResult, TaxError> {
    let quantity = position
        .quantity
        .checked_add(operation.quantity)
        .ok_or_else(|| quantity_overflow(position, operation))?;
    let average_cost = if quantity == 0 {
        position.average_cost
    } else {
        let held = position.average_cost.checked_mul(position.quantity)?;
        let bought = operation.unit_cost.checked_mul(operation.quantity)?;
        held.checked_add(bought)?.checked_div(quantity)?
    };

    log::debug!(
        "Position BUY {} @ {}: qty {} -> {}, avg {} -> {}",
        operation.quantity,
        operation.unit_cost,
        position.quantity,
        quantity,
        position.average_cost,
        average_cost
    );

    Ok(OperationResult {
        position: Position {
            quantity,
            average_cost,
            accumulated_loss: position.accumulated_loss,
        },
        tax: Money::zero(operation.unit_cost.currency()),
    })
}

/// A sell realises a gain or loss against the average cost.
///
/// Losses accumulate and are deducted from later gains. Tax is only owed on
/// the remaining profit, and only when the sale value exceeds the exemption limit.
fn apply_sell(position: &Position, operation: &Operation) -> Result<OperationResult, TaxError> {
    let quantity = position
        .quantity
        .checked_sub(operation.quantity)
        .ok_or_else(|| quantity_overflow(position, operation))?;
    let currency = operation.unit_cost.currency();
    let zero = Money::zero(currency);
    let gross_profit = operation
        .unit_cost
        .checked_sub(position.average_cost)?
        .checked_mul(operation.quantity)?;
    let sale_value = operation.unit_cost.checked_mul(operation.quantity)?;

    let (accumulated_loss, tax) = if gross_profit.try_cmp(&zero)?.is_le() {
        (position.accumulated_loss.checked_sub(gross_profit)?, zero)
    } else {
        let taxable_profit = gross_profit
            .checked_sub(position.accumulated_loss)?
            .max(zero)?;
        let remaining_loss = position
            .accumulated_loss
            .checked_sub(gross_profit)?
            .max(zero)?;
        let tax = if taxable_profit.is_positive() && exceeds_exemption_limit(sale_value)? {
            taxable_profit.checked_mul(TAX_RATE)?
        } else {
            zero
        };
        (remaining_loss, tax)
    };

    log::debug!(
        "Position SELL {} @ {}: profit {}, value {}, loss {} -> {}, tax {}",
        operation.quantity,
        operation.unit_cost,
        gross_profit,
        sale_value,
        position.accumulated_loss,
        accumulated_loss,
        tax
    );

    Ok(OperationResult {
        position: Position {
            quantity,
            average_cost: position.average_cost,
            accumulated_loss,
        },
        tax,
    })
}

fn exceeds_exemption_limit(sale_value: Money) -> Result<bool, TaxError> {
    let limit = Money::new(EXEMPTION_LIMIT, Currency::Brl)?;
    Ok(sale_value.try_cmp(&limit)?.is_gt())
}

fn quantity_overflow(position: &Position, operation: &Operation) -> TaxError {
    TaxError::QuantityOverflow {
        held: position.quantity,
        traded: operation.quantity,
    }
}

/// Process one batch of operations starting from an empty position.
pub fn process_batch<'a, I>(operations: I) -> Result<Vec<OperationResult>, TaxError>
where
    I: IntoIterator<Item = &'a Operation>,
{
    process_batch_from(Position::default(), operations)
}

/// Fold operations in order, threading each resulting position into the next step.
/// The first failure aborts the batch.
pub fn process_batch_from<'a, I>(
    initial: Position,
    operations: I,
) -> Result<Vec<OperationResult>, TaxError>
where
    I: IntoIterator<Item = &'a Operation>,
{
    let operations = operations.into_iter();
    let mut results = Vec::with_capacity(operations.size_hint().0);
    let mut position = initial;
    for operation in operations {
        let result = apply_operation(&position, operation)?;
        position = result.position;
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brl(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn buy(price: &str, qty: i64) -> Operation {
        Operation::buy(brl(price), qty)
    }

    fn sell(price: &str, qty: i64) -> Operation {
        Operation::sell(brl(price), qty)
    }

    fn position(qty: i64, avg: &str, loss: &str) -> Position {
        Position {
            quantity: qty,
            average_cost: brl(avg),
            accumulated_loss: brl(loss),
        }
    }

    fn taxes(operations: &[Operation]) -> Vec<Money> {
        process_batch(operations)
            .unwrap()
            .into_iter()
            .map(|r| r.tax)
            .collect()
    }

    fn amounts(values: &[&str]) -> Vec<Money> {
        values.iter().map(|v| brl(v)).collect()
    }

    #[test]
    fn first_buy_sets_average_cost() {
        let result = apply_operation(&Position::default(), &buy("10.00", 100)).unwrap();
        assert_eq!(result.tax, Money::default());
        assert_eq!(result.position, position(100, "10.00", "0"));
    }

    #[test]
    fn buy_blends_weighted_average() {
        let result = apply_operation(&position(10000, "10.00", "0"), &buy("25.00", 5000)).unwrap();
        assert_eq!(result.position.quantity, 15000);
        assert_eq!(result.position.average_cost, brl("15.00"));
        assert!(result.tax.is_zero());
    }

    #[test]
    fn buy_rounds_average_cost_to_cents() {
        let result = apply_operation(&position(2, "10.00", "0"), &buy("20.00", 1)).unwrap();
        assert_eq!(result.position.average_cost, brl("13.33"));
    }

    #[test]
    fn buy_keeps_accumulated_loss() {
        let result = apply_operation(&position(10, "10.00", "750.00"), &buy("5.00", 10)).unwrap();
        assert_eq!(result.position.accumulated_loss, brl("750.00"));
    }

    #[test]
    fn zero_quantity_buy_on_empty_position_is_noop() {
        let start = position(0, "12.34", "100.00");
        let result = apply_operation(&start, &buy("50.00", 0)).unwrap();
        assert_eq!(result.position, start);
        assert!(result.tax.is_zero());
    }

    #[test]
    fn taxed_sell_above_exemption() {
        let result = apply_operation(&position(1000, "30.00", "0"), &sell("35.00", 1000)).unwrap();
        assert_eq!(result.tax, brl("1000.00"));
        assert_eq!(result.position, position(0, "30.00", "0"));
    }

    #[test]
    fn sell_below_exemption_is_tax_free() {
        let result = apply_operation(&position(100, "50.00", "0"), &sell("60.00", 100)).unwrap();
        assert!(result.tax.is_zero());
        assert!(result.position.accumulated_loss.is_zero());
    }

    #[test]
    fn sell_at_exact_exemption_limit_is_tax_free() {
        let result = apply_operation(&position(1000, "10.00", "0"), &sell("20.00", 1000)).unwrap();
        assert!(result.tax.is_zero());
    }

    #[test]
    fn losing_sell_accumulates_loss() {
        let result = apply_operation(&position(100, "50.00", "0"), &sell("45.00", 100)).unwrap();
        assert!(result.tax.is_zero());
        assert_eq!(result.position, position(0, "50.00", "500.00"));
    }

    #[test]
    fn break_even_sell_leaves_loss_unchanged() {
        let result =
            apply_operation(&position(100, "50.00", "10.00"), &sell("50.00", 100)).unwrap();
        assert!(result.tax.is_zero());
        assert_eq!(result.position.accumulated_loss, brl("10.00"));
    }

    #[test]
    fn profit_fully_absorbed_by_loss() {
        let result =
            apply_operation(&position(500, "10.00", "2000.00"), &sell("12.00", 500)).unwrap();
        assert!(result.tax.is_zero());
        assert_eq!(result.position.accumulated_loss, brl("1000.00"));
    }

    #[test]
    fn profit_partially_offset_by_loss() {
        let result =
            apply_operation(&position(2000, "30.00", "500.00"), &sell("32.50", 2000)).unwrap();
        assert_eq!(result.tax, brl("900.00"));
        assert!(result.position.accumulated_loss.is_zero());
        assert_eq!(result.position.quantity, 0);
    }

    #[test]
    fn exempt_sale_still_consumes_loss() {
        let result =
            apply_operation(&position(100, "10.00", "800.00"), &sell("15.00", 100)).unwrap();
        assert!(result.tax.is_zero());
        assert_eq!(result.position.accumulated_loss, brl("300.00"));
    }

    #[test]
    fn over_sell_goes_negative() {
        let result = apply_operation(&position(10, "10.00", "0"), &sell("10.00", 15)).unwrap();
        assert_eq!(result.position.quantity, -5);
    }

    #[test]
    fn sell_never_changes_average_cost() {
        for op in [sell("1.00", 10), sell("99.99", 10), sell("10.00", 10)] {
            let result = apply_operation(&position(100, "10.00", "5.00"), &op).unwrap();
            assert_eq!(result.position.average_cost, brl("10.00"));
        }
    }

    #[test]
    fn taxable_profit_and_loss_growth_are_exclusive() {
        let start = position(5000, "20.00", "1000.00");
        for op in [sell("10.00", 2500), sell("30.00", 2500), sell("20.10", 2500)] {
            let result = apply_operation(&start, &op).unwrap();
            let loss_grew = result.position.accumulated_loss > start.accumulated_loss;
            assert!(!(loss_grew && result.tax.is_positive()));
            assert!(!result.position.accumulated_loss.is_negative());
        }
    }

    #[test]
    fn mismatched_currency_fails() {
        let usd = Operation::buy(Money::new(dec!(10), Currency::Usd).unwrap(), 10);
        let err = apply_operation(&Position::default(), &usd).unwrap_err();
        assert!(matches!(err, TaxError::Money(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn other_currency_batch_needs_matching_start() {
        let usd = |v| Money::new(v, Currency::Usd).unwrap();
        let ops = [
            Operation::buy(usd(dec!(10)), 10),
            Operation::sell(usd(dec!(5)), 10),
        ];
        let results = process_batch_from(Position::new(Currency::Usd), &ops).unwrap();
        assert_eq!(results[1].position.accumulated_loss, usd(dec!(50)));
        assert!(process_batch(&ops).is_err());
    }

    #[test]
    fn exemption_check_against_other_currency_fails() {
        let usd = |v| Money::new(v, Currency::Usd).unwrap();
        let start = Position {
            quantity: 10,
            average_cost: usd(dec!(10)),
            accumulated_loss: usd(dec!(0)),
        };
        let err = apply_operation(&start, &Operation::sell(usd(dec!(20)), 10)).unwrap_err();
        assert!(matches!(err, TaxError::Money(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn buy_quantity_overflow_fails() {
        let start = position(i64::MAX, "1.00", "0");
        let err = apply_operation(&start, &buy("1.00", 1)).unwrap_err();
        assert_eq!(
            err,
            TaxError::QuantityOverflow {
                held: i64::MAX,
                traded: 1
            }
        );
    }

    #[test]
    fn sell_quantity_overflow_fails() {
        let err = apply_operation(&Position::default(), &sell("1.00", i64::MIN)).unwrap_err();
        assert_eq!(
            err,
            TaxError::QuantityOverflow {
                held: 0,
                traded: i64::MIN
            }
        );
    }

    #[test]
    fn huge_quantities_overflow_money() {
        let err = process_batch(&[buy("1.00", i64::MAX), buy("1.00", i64::MAX)]).unwrap_err();
        assert!(matches!(err, TaxError::QuantityOverflow { .. }));

        let err = process_batch(&[buy("10000000000.00", i64::MAX)]).unwrap_err();
        assert_eq!(err, TaxError::Money(MoneyError::Overflow));
    }

    #[test]
    fn unknown_kind_rejected() {
        assert_eq!(
            "hold".parse::<OperationKind>(),
            Err(TaxError::UnknownOperationKind("hold".to_string()))
        );
        assert_eq!("sell".parse::<OperationKind>(), Ok(OperationKind::Sell));
    }

    #[test]
    fn buy_only_batch_owes_nothing() {
        let ops = [buy("10.00", 100), buy("11.00", 100), buy("12.37", 3)];
        assert!(taxes(&ops).iter().all(Money::is_zero));
    }

    #[test]
    fn batch_is_order_dependent() {
        let forward = process_batch(&[buy("10.00", 100), buy("20.00", 100)]).unwrap();
        let forward_avg = forward[1].position.average_cost;
        let a = process_batch(&[buy("10.00", 100), sell("20.00", 50)]).unwrap();
        let b = process_batch(&[sell("20.00", 50), buy("10.00", 100)]).unwrap();
        assert_eq!(forward_avg, brl("15.00"));
        assert_ne!(a.last().unwrap().position, b.last().unwrap().position);
    }

    #[test]
    fn batch_is_repeatable() {
        let ops = [buy("10.00", 10000), sell("20.00", 5000), sell("5.00", 5000)];
        assert_eq!(process_batch(&ops).unwrap(), process_batch(&ops).unwrap());
    }

    #[test]
    fn empty_batch_yields_nothing() {
        assert!(process_batch(&Vec::<Operation>::new()).unwrap().is_empty());
    }

    #[test]
    fn case_1_small_sales_are_exempt() {
        let ops = [buy("10.00", 100), sell("15.00", 50), sell("15.00", 50)];
        assert_eq!(taxes(&ops), amounts(&["0", "0", "0"]));
    }

    #[test]
    fn case_2_profit_then_loss() {
        let ops = [buy("10.00", 10000), sell("20.00", 5000), sell("5.00", 5000)];
        assert_eq!(taxes(&ops), amounts(&["0", "10000.00", "0"]));
    }

    #[test]
    fn case_3_loss_deducted_from_later_profit() {
        let ops = [buy("10.00", 10000), sell("5.00", 5000), sell("20.00", 3000)];
        assert_eq!(taxes(&ops), amounts(&["0", "0", "1000.00"]));
    }

    #[test]
    fn case_4_sell_at_average_cost() {
        let ops = [buy("10.00", 10000), buy("25.00", 5000), sell("15.00", 10000)];
        assert_eq!(taxes(&ops), amounts(&["0", "0", "0"]));
    }

    #[test]
    fn case_5_profit_after_break_even() {
        let ops = [
            buy("10.00", 10000),
            buy("25.00", 5000),
            sell("15.00", 10000),
            sell("25.00", 5000),
        ];
        assert_eq!(taxes(&ops), amounts(&["0", "0", "0", "10000.00"]));
    }

    #[test]
    fn case_6_loss_spread_over_several_sales() {
        let ops = [
            buy("10.00", 10000),
            sell("2.00", 5000),
            sell("20.00", 2000),
            sell("20.00", 2000),
            sell("25.00", 1000),
        ];
        assert_eq!(taxes(&ops), amounts(&["0", "0", "0", "0", "3000.00"]));
    }

    #[test]
    fn case_7_rebuy_after_closing_position() {
        let ops = [
            buy("10.00", 10000),
            sell("2.00", 5000),
            sell("20.00", 2000),
            sell("20.00", 2000),
            sell("25.00", 1000),
            buy("20.00", 10000),
            sell("15.00", 5000),
            sell("30.00", 4350),
            sell("30.00", 650),
        ];
        assert_eq!(
            taxes(&ops),
            amounts(&["0", "0", "0", "0", "3000.00", "0", "0", "3700.00", "0"])
        );
    }

    #[test]
    fn case_8_large_profits() {
        let ops = [
            buy("10.00", 10000),
            sell("50.00", 10000),
            buy("20.00", 10000),
            sell("50.00", 10000),
        ];
        assert_eq!(taxes(&ops), amounts(&["0", "80000.00", "0", "60000.00"]));
    }
}
