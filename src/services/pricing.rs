//! Checkout price computation.
//!
//! This is deliberately a pure function rather than a service struct: the
//! same arithmetic backs both the preview endpoint and authoritative
//! transaction creation, and the two must agree exactly.

use crate::entities::plan::BookAddon;
use crate::services::coupons::DiscountDescriptor;
use crate::entities::coupon::CouponType;

/// Computes the final charge in minor currency units.
///
/// The effective base is the plan price plus the book add-on surcharge
/// when the buyer opted into the book and the plan carries one.
/// Percentage discounts floor (`base * (100 - v) / 100` in integer
/// arithmetic); fixed discounts clamp at zero. The result is never
/// negative.
pub fn calculate_price(
    base_price: i64,
    discount: Option<&DiscountDescriptor>,
    book_included: bool,
    book_addon: Option<&BookAddon>,
) -> i64 {
    let base = match (book_included, book_addon) {
        (true, Some(addon)) => base_price + addon.surcharge,
        _ => base_price,
    };

    let charged = match discount {
        None => base,
        Some(descriptor) => match descriptor.coupon_type {
            CouponType::Percentage => {
                let percent = descriptor.value.clamp(0, 100);
                base * (100 - percent) / 100
            }
            CouponType::Fixed => base - descriptor.value.max(0),
        },
    };

    charged.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn percentage(value: i64) -> DiscountDescriptor {
        DiscountDescriptor {
            id: Uuid::new_v4(),
            coupon_type: CouponType::Percentage,
            value,
            plan_id: None,
        }
    }

    fn fixed(value: i64) -> DiscountDescriptor {
        DiscountDescriptor {
            id: Uuid::new_v4(),
            coupon_type: CouponType::Fixed,
            value,
            plan_id: None,
        }
    }

    #[test]
    fn no_discount_returns_base() {
        assert_eq!(calculate_price(24900, None, false, None), 24900);
    }

    #[test]
    fn percentage_discount_floors() {
        // 10% off 999 = 899.1, floored to 899
        assert_eq!(calculate_price(999, Some(&percentage(10)), false, None), 899);
    }

    #[test]
    fn full_percentage_discount_is_free() {
        assert_eq!(calculate_price(100, Some(&percentage(100)), false, None), 0);
        assert_eq!(calculate_price(24900, Some(&percentage(100)), false, None), 0);
    }

    #[test]
    fn fixed_discount_subtracts() {
        assert_eq!(calculate_price(200, Some(&fixed(50)), false, None), 150);
    }

    #[test]
    fn fixed_discount_never_negative() {
        assert_eq!(calculate_price(100, Some(&fixed(250)), false, None), 0);
    }

    #[test]
    fn book_addon_raises_base() {
        let addon = BookAddon {
            product_id: Uuid::new_v4(),
            surcharge: 4900,
        };
        assert_eq!(calculate_price(24900, None, true, Some(&addon)), 29800);
        // Not opted in: surcharge ignored
        assert_eq!(calculate_price(24900, None, false, Some(&addon)), 24900);
        // Opted in but plan has no addon: surcharge cannot apply
        assert_eq!(calculate_price(24900, None, true, None), 24900);
    }

    #[test]
    fn discount_applies_to_addon_inclusive_base() {
        let addon = BookAddon {
            product_id: Uuid::new_v4(),
            surcharge: 100,
        };
        // (200 + 100) * 50% = 150
        assert_eq!(
            calculate_price(200, Some(&percentage(50)), true, Some(&addon)),
            150
        );
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let discount = percentage(33);
        let first = calculate_price(10101, Some(&discount), false, None);
        let second = calculate_price(10101, Some(&discount), false, None);
        assert_eq!(first, second);
    }

    #[test]
    fn out_of_range_percentage_is_clamped() {
        assert_eq!(calculate_price(100, Some(&percentage(150)), false, None), 0);
        assert_eq!(calculate_price(100, Some(&percentage(-10)), false, None), 100);
    }
}
