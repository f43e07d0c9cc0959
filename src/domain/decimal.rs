//! Base-unit amounts rendered as asset-unit decimals, backed by rust_decimal.

use rust_decimal::Decimal;

/// Convert signed smallest-unit amount to whole asset units without loss.
///
/// Returns `None` only if the amount exceeds rust_decimal's 96-bit mantissa.
pub fn base_units_to_decimal(units: i128, decimals: u32) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(units, decimals).ok()
}

/// Number of fractional digits to show for a magnitude.
///
/// Precision widens as the amount shrinks so sub-cent accrual stays visible.
pub fn display_precision(value: Decimal, decimals: u32) -> u32 {
    let magnitude = value.abs();
    let places = if magnitude >= Decimal::ONE {
        2
    } else if magnitude >= Decimal::new(1, 2) {
        4
    } else if magnitude >= Decimal::new(1, 4) {
        6
    } else {
        decimals
    };
    places.min(decimals.max(2))
}

/// Render a signed base-unit amount for display.
pub fn format_base_units(units: i128, decimals: u32) -> String {
    match base_units_to_decimal(units, decimals) {
        Some(value) => {
            let places = display_precision(value, decimals);
            let rounded = value.round_dp(places);
            format!("{:.*}", places as usize, rounded)
        }
        None => units.to_string(),
    }
}
