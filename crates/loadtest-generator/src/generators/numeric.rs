//! Numeric value generators.

use rand::Rng;
use rust_decimal::Decimal;

/// Generate a random integer in the given range (inclusive).
pub fn generate_int_range<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    rng.gen_range(min..=max)
}

/// Generate a random decimal in `[min, max]` with 2 decimal places.
///
/// Values are drawn uniformly from the cent grid, which is the same set
/// a float sample rounded to 2 places lands on.
pub fn generate_decimal_range<R: Rng + ?Sized>(rng: &mut R, min: Decimal, max: Decimal) -> Decimal {
    let lo = to_cents(min);
    let hi = to_cents(max);
    let cents = if lo <= hi {
        rng.gen_range(lo..=hi)
    } else {
        rng.gen_range(hi..=lo)
    };
    Decimal::new(cents, 2)
}

fn to_cents(value: Decimal) -> i64 {
    let scaled = (value * Decimal::ONE_HUNDRED).round();
    // Bounds used here are far inside i64.
    scaled.mantissa() as i64 / 10i64.pow(scaled.scale())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_int_range() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let v = generate_int_range(&mut rng, -100, 100);
            assert!((-100..=100).contains(&v));
        }
    }

    #[test]
    fn test_generate_decimal_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let min = Decimal::new(1000, 0);
        let max = Decimal::new(100000, 0);

        for _ in 0..100 {
            let value = generate_decimal_range(&mut rng, min, max);
            assert_eq!(value.scale(), 2);
            assert!(value >= min && value <= max);
        }
    }

    #[test]
    fn test_generate_decimal_range_single_point() {
        let mut rng = StdRng::seed_from_u64(1);
        let point = Decimal::new(1050, 2);

        assert_eq!(generate_decimal_range(&mut rng, point, point), point);
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(to_cents(Decimal::new(10, 0)), 1000);
        assert_eq!(to_cents(Decimal::new(1234, 2)), 1234);
        assert_eq!(to_cents(Decimal::new(-5, 1)), -50);
    }
}
