//! Merchant settlement calculation
//!
//! Turns a merchant's transactions and discount terms into the amount
//! payable to the merchant.
//!
//! # Algorithm
//!
//! 1. Sum transaction amounts and fees in a single pass
//! 2. Check discount eligibility (`transactions >= minimum_transaction_count`)
//! 3. Discount = total fees * (percent / 100), or zero when ineligible
//! 4. Net = gross - fees + discount
//!
//! # Example
//!
//! ```text
//! Transactions: [1000 / fee 50, 2000 / fee 80]
//! Discount:     10% of fees, minimum 2 transactions
//!
//! Gross:    3000
//! Fees:      130
//! Discount:   13
//! Net:      2883
//! ```

use crate::{types::*, Error, Result};
use rust_decimal::Decimal;

/// Pure settlement calculator
///
/// Holds no state; identical input always yields an identical result.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementCalculator;

impl SettlementCalculator {
    /// Create new calculator
    pub fn new() -> Self {
        Self
    }

    /// Compute settlement for one merchant
    pub fn compute(&self, merchant: &Merchant) -> Result<SettlementResult> {
        let (total_amount_gross, total_fee_gross) = self.aggregate(merchant)?;

        let applied_discount = self.applied_discount(merchant, total_fee_gross)?;

        let total_amount_net =
            Decimal::from(total_amount_gross) - Decimal::from(total_fee_gross) + applied_discount;

        tracing::debug!(
            merchant_id = %merchant.id,
            total_amount_gross,
            total_fee_gross,
            %applied_discount,
            %total_amount_net,
            "Computed settlement"
        );

        Ok(SettlementResult {
            merchant_id: merchant.id.clone(),
            iban: merchant.iban.clone(),
            total_amount_gross,
            total_fee_gross,
            applied_discount,
            total_amount_net,
        })
    }

    /// Sum amounts and fees in one pass
    fn aggregate(&self, merchant: &Merchant) -> Result<(i64, i64)> {
        merchant
            .transactions
            .iter()
            .try_fold((0i64, 0i64), |(amount, fee), tx| {
                let amount = amount.checked_add(tx.amount);
                let fee = fee.checked_add(tx.fee);
                amount.zip(fee)
            })
            .ok_or_else(|| {
                Error::Validation(format!(
                    "transaction totals overflow for merchant {}",
                    merchant.id
                ))
            })
    }

    /// Discount on total fees, zero when the merchant is not eligible
    fn applied_discount(&self, merchant: &Merchant, total_fee_gross: i64) -> Result<Decimal> {
        let policy = &merchant.discount_policy;

        if !policy.is_eligible(merchant.transactions.len()) {
            return Ok(Decimal::ZERO);
        }

        let discount = Decimal::from(total_fee_gross) * policy.proportion();

        if discount < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "negative fee total {} would produce a negative discount for merchant {}",
                total_fee_gross, merchant.id
            )));
        }

        Ok(discount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn merchant(transactions: Vec<Transaction>, percent: Decimal, minimum: u64) -> Merchant {
        Merchant {
            id: MerchantId::new("m-1"),
            iban: "GB00TEST00000000".to_string(),
            discount_policy: DiscountPolicy::new(percent, minimum).unwrap(),
            transactions,
        }
    }

    fn sample_transactions() -> Vec<Transaction> {
        vec![Transaction::new(1000, 50), Transaction::new(2000, 80)]
    }

    #[test]
    fn test_eligible_merchant() {
        let result = SettlementCalculator::new()
            .compute(&merchant(sample_transactions(), dec!(10), 2))
            .unwrap();

        assert_eq!(result.iban, "GB00TEST00000000");
        assert_eq!(result.total_amount_gross, 3000);
        assert_eq!(result.total_fee_gross, 130);
        assert_eq!(result.applied_discount, dec!(13));
        assert_eq!(result.total_amount_net, dec!(2883));
    }

    #[test]
    fn test_below_minimum_gets_no_discount() {
        let result = SettlementCalculator::new()
            .compute(&merchant(sample_transactions(), dec!(10), 3))
            .unwrap();

        assert_eq!(result.applied_discount, Decimal::ZERO);
        assert_eq!(result.total_amount_net, dec!(2870));
    }

    #[test]
    fn test_empty_transactions() {
        let result = SettlementCalculator::new()
            .compute(&merchant(vec![], dec!(50), 0))
            .unwrap();

        assert_eq!(result.total_amount_gross, 0);
        assert_eq!(result.total_fee_gross, 0);
        assert_eq!(result.applied_discount, Decimal::ZERO);
        assert_eq!(result.total_amount_net, Decimal::ZERO);
    }

    #[test]
    fn test_small_percentage_is_not_truncated() {
        // 5% of 30 is 1.5, not 0
        let result = SettlementCalculator::new()
            .compute(&merchant(vec![Transaction::new(500, 30)], dec!(5), 1))
            .unwrap();

        assert_eq!(result.applied_discount, dec!(1.5));
        assert_eq!(result.total_amount_net, dec!(471.5));
    }

    #[test]
    fn test_fractional_percentage() {
        let result = SettlementCalculator::new()
            .compute(&merchant(vec![Transaction::new(10_000, 200)], dec!(12.5), 0))
            .unwrap();

        assert_eq!(result.applied_discount, dec!(25));
        assert_eq!(result.total_amount_net, dec!(9825));
    }

    #[test]
    fn test_idempotent() {
        let calculator = SettlementCalculator::new();
        let m = merchant(sample_transactions(), dec!(7), 1);

        assert_eq!(calculator.compute(&m).unwrap(), calculator.compute(&m).unwrap());
    }

    #[test]
    fn test_overflow_is_validation_error() {
        let m = merchant(
            vec![Transaction::new(i64::MAX, 0), Transaction::new(1, 0)],
            dec!(0),
            0,
        );

        let err = SettlementCalculator::new().compute(&m).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_negative_fee_total_with_discount_rejected() {
        let m = merchant(vec![Transaction::new(100, -20)], dec!(10), 0);

        let err = SettlementCalculator::new().compute(&m).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_refund_transactions_reduce_gross() {
        let m = merchant(
            vec![Transaction::new(1000, 20), Transaction::new(-400, 10)],
            dec!(0),
            0,
        );

        let result = SettlementCalculator::new().compute(&m).unwrap();
        assert_eq!(result.total_amount_gross, 600);
        assert_eq!(result.total_fee_gross, 30);
        assert_eq!(result.total_amount_net, dec!(570));
    }
}
