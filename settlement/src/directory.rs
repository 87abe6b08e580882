//! Merchant directory service client
//!
//! The directory exposes two endpoints:
//!
//! ```text
//! GET {base}/merchants       -> ["id-1", "id-2", ...]
//! GET {base}/merchants/{id}  -> {
//!     "id": "id-1",
//!     "iban": "GB00TEST00000000",
//!     "discount": { "fees_discount": 10, "minimum_transaction_count": 2 },
//!     "transactions": [ { "amount": 1000, "fee": 50 }, ... ]
//! }
//! ```
//!
//! Responses are decoded into loosely typed records first and then
//! validated into [`Merchant`], so a missing field is reported by name.

use crate::{types::*, Error, Result};
use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

/// Source of merchant data
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    /// List every merchant to settle, in service order
    async fn fetch_merchant_ids(&self) -> Result<Vec<MerchantId>>;

    /// Fetch one merchant with discount terms and transactions
    async fn fetch_merchant(&self, id: &MerchantId) -> Result<Merchant>;
}

/// Merchant detail as returned by the directory
#[derive(Debug, Clone, Deserialize)]
pub struct MerchantRecord {
    /// Merchant ID
    pub id: Option<MerchantId>,
    /// Payout account
    pub iban: Option<String>,
    /// Discount terms
    pub discount: Option<DiscountRecord>,
    /// Transactions
    pub transactions: Option<Vec<TransactionRecord>>,
}

/// Discount terms as returned by the directory
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountRecord {
    /// Percentage of fees refunded
    pub fees_discount: Option<Decimal>,
    /// Eligibility threshold
    pub minimum_transaction_count: Option<i64>,
}

/// Transaction as returned by the directory
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    /// Gross amount in minor units
    pub amount: Option<i64>,
    /// Fee in minor units
    pub fee: Option<i64>,
}

impl MerchantRecord {
    /// Validate into a [`Merchant`]
    ///
    /// `requested` is the id the record was fetched under; a record that
    /// names a different merchant is rejected.
    pub fn validate(self, requested: &MerchantId) -> Result<Merchant> {
        let id = required(self.id, "id")?;
        if &id != requested {
            return Err(Error::Validation(format!(
                "requested merchant {} but directory returned {}",
                requested, id
            )));
        }

        let iban = required(self.iban, "iban")?;

        let discount = required(self.discount, "discount")?;
        let percent = required(discount.fees_discount, "discount.fees_discount")?;
        let minimum = required(
            discount.minimum_transaction_count,
            "discount.minimum_transaction_count",
        )?;
        let minimum = u64::try_from(minimum).map_err(|_| {
            Error::Validation(format!(
                "discount.minimum_transaction_count must not be negative, got {}",
                minimum
            ))
        })?;
        let discount_policy = DiscountPolicy::new(percent, minimum)?;

        let transactions = required(self.transactions, "transactions")?
            .into_iter()
            .enumerate()
            .map(|(idx, tx)| -> Result<Transaction> {
                Ok(Transaction {
                    amount: required(tx.amount, &format!("transactions[{}].amount", idx))?,
                    fee: required(tx.fee, &format!("transactions[{}].fee", idx))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Merchant {
            id,
            iban,
            discount_policy,
            transactions,
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(format!("missing field `{}`", field)))
}

/// HTTP client for the merchant directory
#[derive(Debug, Clone)]
pub struct HttpMerchantDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpMerchantDirectory {
    /// Create client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(client, base_url)
    }

    /// Create from an existing client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid directory base URL {:?}: {}", raw, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "directory base URL {:?} cannot have a path",
                raw
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn merchants_url(&self) -> Url {
        self.endpoint(&["merchants"])
    }

    fn merchant_url(&self, id: &MerchantId) -> Url {
        self.endpoint(&["merchants", id.as_str()])
    }

    /// Append path segments to the base, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Always Ok: `with_client` rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(url = %url, "GET");

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("malformed response from {}: {}", url, e)))
    }
}

#[async_trait]
impl MerchantDirectory for HttpMerchantDirectory {
    async fn fetch_merchant_ids(&self) -> Result<Vec<MerchantId>> {
        self.get_json(self.merchants_url()).await
    }

    async fn fetch_merchant(&self, id: &MerchantId) -> Result<Merchant> {
        let record: MerchantRecord = self.get_json(self.merchant_url(id)).await?;
        record.validate(id)
    }
}
