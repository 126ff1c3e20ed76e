//! Exact splitting of a purchase total into installments.

use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine};

/// Where the cents left over by the integer division end up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// The first installment carries the whole remainder.
    #[default]
    First,
    /// The last installment carries the whole remainder.
    Last,
    /// One extra cent on each of the first `remainder` installments.
    Spread,
}

/// Split `total` into `count` installments that sum exactly to `total`.
///
/// Every installment is `total / count` (floored to the cent); the remainder
/// is placed according to `policy`.
///
/// ```rust
/// use engine::{MoneyCents, RemainderPolicy, split_amount};
///
/// let parts = split_amount(MoneyCents::new(100_00), 3, RemainderPolicy::First).unwrap();
/// assert_eq!(parts, vec![MoneyCents::new(33_34), MoneyCents::new(33_33), MoneyCents::new(33_33)]);
/// ```
pub fn split_amount(
    total: MoneyCents,
    count: u32,
    policy: RemainderPolicy,
) -> ResultEngine<Vec<MoneyCents>> {
    if !total.is_positive() {
        return Err(EngineError::Validation(
            "amount must be > 0".to_string(),
        ));
    }
    if count < 1 {
        return Err(EngineError::Validation(
            "installment count must be >= 1".to_string(),
        ));
    }
    if count == 1 {
        return Ok(vec![total]);
    }

    let divisor = i64::from(count);
    let base = total.cents() / divisor;
    let remainder = total.cents() - base * divisor;

    let mut parts = vec![MoneyCents::new(base); count as usize];
    match policy {
        RemainderPolicy::First => parts[0] += MoneyCents::new(remainder),
        RemainderPolicy::Last => parts[count as usize - 1] += MoneyCents::new(remainder),
        RemainderPolicy::Spread => {
            // remainder < count, so every extra cent lands on a distinct slot.
            for part in parts.iter_mut().take(remainder as usize) {
                *part += MoneyCents::new(1);
            }
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn cents(values: &[i64]) -> Vec<MoneyCents> {
        values.iter().copied().map(MoneyCents::new).collect()
    }

    #[test]
    fn single_installment_is_the_total() {
        let parts = split_amount(MoneyCents::new(12_345), 1, RemainderPolicy::First).unwrap();
        assert_eq!(parts, cents(&[12_345]));
    }

    #[test]
    fn remainder_goes_first_by_default() {
        let parts =
            split_amount(MoneyCents::new(100_00), 3, RemainderPolicy::default()).unwrap();
        assert_eq!(parts, cents(&[33_34, 33_33, 33_33]));
    }

    #[test]
    fn remainder_policies() {
        let last = split_amount(MoneyCents::new(100_00), 3, RemainderPolicy::Last).unwrap();
        assert_eq!(last, cents(&[33_33, 33_33, 33_34]));

        let spread = split_amount(MoneyCents::new(10_02), 4, RemainderPolicy::Spread).unwrap();
        assert_eq!(spread, cents(&[2_51, 2_51, 2_50, 2_50]));
    }

    #[test]
    fn total_smaller_than_count() {
        let parts = split_amount(MoneyCents::new(2), 3, RemainderPolicy::First).unwrap();
        assert_eq!(parts, cents(&[2, 0, 0]));
    }

    #[test]
    fn rejects_non_positive_total_and_zero_count() {
        assert_eq!(
            split_amount(MoneyCents::ZERO, 2, RemainderPolicy::First),
            Err(EngineError::Validation("amount must be > 0".to_string()))
        );
        assert!(split_amount(MoneyCents::new(-5), 2, RemainderPolicy::First).is_err());
        assert_eq!(
            split_amount(MoneyCents::new(100), 0, RemainderPolicy::First),
            Err(EngineError::Validation(
                "installment count must be >= 1".to_string()
            ))
        );
    }

    fn any_policy() -> impl Strategy<Value = RemainderPolicy> {
        prop_oneof![
            Just(RemainderPolicy::First),
            Just(RemainderPolicy::Last),
            Just(RemainderPolicy::Spread),
        ]
    }

    proptest! {
        #[test]
        fn parts_always_sum_to_total(
            total in 1i64..1_000_000_000i64,
            count in 1u32..=48u32,
            policy in any_policy(),
        ) {
            let parts = split_amount(MoneyCents::new(total), count, policy).unwrap();
            prop_assert_eq!(parts.len(), count as usize);
            prop_assert_eq!(parts.iter().copied().sum::<MoneyCents>(), MoneyCents::new(total));
        }

        #[test]
        fn parts_differ_by_at_most_the_remainder(
            total in 1i64..1_000_000i64,
            count in 2u32..=48u32,
        ) {
            let parts = split_amount(MoneyCents::new(total), count, RemainderPolicy::First).unwrap();
            let base = total / i64::from(count);
            prop_assert!(parts[1..].iter().all(|p| p.cents() == base));
            prop_assert!(parts[0].cents() - base < i64::from(count));
        }
    }
}
