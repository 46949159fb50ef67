//! Units and shared constants

use rust_decimal::Decimal;

/// Currency applied when no consumed lot records one
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Default density for ferrous grades not found in the grade table (kg/m³)
pub const DEFAULT_DENSITY_KG_M3: f64 = 7850.0;

/// Stainless grades priced and weighed at 8000 kg/m³
pub const STAINLESS_DENSITY_KG_M3: f64 = 8000.0;

/// Longest single piece a lot or removal may record (1000 km). Together with
/// a `u32` piece count this keeps every event total and history sum within
/// `Decimal` range.
pub const MAX_LENGTH_PER_PIECE_MM: i64 = 1_000_000_000;

const MM_PER_M: Decimal = Decimal::ONE_THOUSAND;

/// Convert millimeters to meters
pub fn mm_to_m(mm: Decimal) -> Decimal {
    mm / MM_PER_M
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mm_to_m() {
        assert_eq!(mm_to_m(Decimal::from(1500)), Decimal::new(15, 1));
        assert_eq!(mm_to_m(Decimal::ZERO), Decimal::ZERO);
    }
}
