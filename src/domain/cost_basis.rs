//! Weighted-average cost basis.
//!
//! Three cases, checked in order:
//! - same-direction add (or opening from flat): volume-weighted average
//! - partial close (opposing order no larger than the position): unchanged
//! - reversal (opposing order larger than the position): the order price

/// New cost basis after a trade of `new_quantity` at `new_price` against a
/// position of `current_quantity` carried at `current_cost_basis`.
///
/// Quantities are signed: positive is long/buy, negative is short/sell.
/// Callers never pass a zero `new_quantity` together with a flat position.
pub fn compute_cost_basis(
    current_cost_basis: f64,
    current_quantity: i64,
    new_quantity: i64,
    new_price: f64,
) -> f64 {
    let is_long = current_quantity > 0;
    let is_short = current_quantity < 0;
    let opposing = (new_quantity > 0 && is_short) || (new_quantity < 0 && is_long);

    if !opposing {
        let current_abs = current_quantity.unsigned_abs() as f64;
        let new_abs = new_quantity.unsigned_abs() as f64;
        let total_quantity = current_abs + new_abs;
        if total_quantity == 0.0 {
            return current_cost_basis;
        }
        let total_value = current_cost_basis * current_abs + new_price * new_abs;
        return total_value / total_quantity;
    }

    if new_quantity.unsigned_abs() <= current_quantity.unsigned_abs() {
        current_cost_basis
    } else {
        new_price
    }
}
