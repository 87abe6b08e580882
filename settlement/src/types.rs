//! Core types for merchant settlement

use crate::{rounding::RoundingRule, Error, ErrorKind, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Merchant identifier as assigned by the directory service
///
/// The directory may hand out ids as JSON strings or integers; both are
/// normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MerchantId(String);

impl MerchantId {
    /// Create new merchant ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MerchantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for MerchantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => MerchantId(s),
            RawId::Signed(n) => MerchantId(n.to_string()),
            RawId::Unsigned(n) => MerchantId(n.to_string()),
        })
    }
}

/// A single charge taken on behalf of a merchant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Gross amount charged to the payer, in minor units
    pub amount: i64,

    /// Fee charged against this transaction, in minor units
    pub fee: i64,
}

impl Transaction {
    /// Create new transaction
    pub fn new(amount: i64, fee: i64) -> Self {
        Self { amount, fee }
    }
}

/// Per-merchant fee discount terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DiscountTerms")]
pub struct DiscountPolicy {
    /// Percentage of fees refunded when eligible (0 - 100)
    pub fees_discount_percent: Decimal,

    /// Number of transactions required before the discount applies
    pub minimum_transaction_count: u64,
}

impl DiscountPolicy {
    /// Create a policy, rejecting percentages outside 0 - 100
    pub fn new(fees_discount_percent: Decimal, minimum_transaction_count: u64) -> Result<Self> {
        if fees_discount_percent < Decimal::ZERO || fees_discount_percent > Decimal::ONE_HUNDRED {
            return Err(Error::Validation(format!(
                "fees_discount must be between 0 and 100, got {}",
                fees_discount_percent
            )));
        }

        Ok(Self {
            fees_discount_percent,
            minimum_transaction_count,
        })
    }

    /// Whether a merchant with `transaction_count` transactions qualifies
    pub fn is_eligible(&self, transaction_count: usize) -> bool {
        transaction_count as u64 >= self.minimum_transaction_count
    }

    /// Fraction of fees refunded, as a real number
    pub fn proportion(&self) -> Decimal {
        self.fees_discount_percent / Decimal::ONE_HUNDRED
    }
}

/// Unchecked discount terms, validated into a [`DiscountPolicy`]
#[derive(Deserialize)]
struct DiscountTerms {
    fees_discount_percent: Decimal,
    minimum_transaction_count: u64,
}

impl TryFrom<DiscountTerms> for DiscountPolicy {
    type Error = Error;

    fn try_from(terms: DiscountTerms) -> Result<Self> {
        Self::new(terms.fees_discount_percent, terms.minimum_transaction_count)
    }
}

/// Validated merchant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    /// Merchant ID
    pub id: MerchantId,

    /// Payout account, passed through untouched
    pub iban: String,

    /// Discount terms
    pub discount_policy: DiscountPolicy,

    /// Complete transaction history for the period
    pub transactions: Vec<Transaction>,
}

/// Outcome of settling one merchant
///
/// Discount and net amounts are kept unrounded; rounding happens once,
/// when the export row is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    /// Merchant ID
    pub merchant_id: MerchantId,

    /// Payout account
    pub iban: String,

    /// Sum of transaction amounts
    pub total_amount_gross: i64,

    /// Sum of transaction fees
    pub total_fee_gross: i64,

    /// Fee discount granted (zero when ineligible)
    pub applied_discount: Decimal,

    /// Amount payable: gross - fees + discount
    pub total_amount_net: Decimal,
}

impl SettlementResult {
    /// Build the export row, rounding the net amount with `rule`
    pub fn export_row(&self, rule: RoundingRule) -> Result<ExportRow> {
        let rounded = rule.apply(self.total_amount_net);
        let amount_in_pence = rounded.to_i64().ok_or_else(|| {
            Error::Validation(format!(
                "net amount {} for merchant {} does not fit in minor units",
                self.total_amount_net, self.merchant_id
            ))
        })?;

        Ok(ExportRow {
            iban: self.iban.clone(),
            amount_in_pence,
        })
    }
}

/// One line of the debit batch export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Payout account
    pub iban: String,

    /// Rounded net amount in minor units
    pub amount_in_pence: i64,
}

/// Merchant that could not be settled in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerchantFailure {
    /// Merchant ID
    pub merchant_id: MerchantId,

    /// Failure class
    pub kind: ErrorKind,

    /// Human readable cause
    pub message: String,
}

/// Summary of a completed settlement run
#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    /// Settled merchants, in directory order
    pub results: Vec<SettlementResult>,

    /// Merchants skipped because of errors
    pub failures: Vec<MerchantFailure>,

    /// Location of the written export, if any
    pub export_path: Option<PathBuf>,
}

impl SettlementReport {
    /// Whether every merchant was settled
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
