//! Merchant Settlement
//!
//! Computes net payouts for merchants from their transaction history and
//! exports them as a bank-debit batch.
//!
//! # Architecture
//!
//! A settlement run is a single sequential pipeline:
//!
//! 1. **Listing**: fetch merchant ids from the directory service
//! 2. **Retrieval**: fetch each merchant's discount terms and transactions
//! 3. **Calculation**: gross, fees, discount and net per merchant
//! 4. **Export**: write `iban,amount_in_pence` rows to a timestamped CSV
//!
//! # Calculation
//!
//! - Gross = sum of transaction amounts, fees = sum of transaction fees
//! - A merchant with at least `minimum_transaction_count` transactions is
//!   refunded `fees_discount` percent of its fees
//! - Net = gross - fees + discount, rounded once on export
//!
//! # Example
//!
//! ```no_run
//! use merchant_settlement::{Config, SettlementPipeline};
//!
//! #[tokio::main]
//! async fn main() -> merchant_settlement::Result<()> {
//!     let config = Config::default();
//!     let pipeline = SettlementPipeline::from_config(&config)?;
//!
//!     let report = pipeline.run().await?;
//!     println!("Settled {} merchants into {:?}",
//!              report.results.len(), report.export_path);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod calculator;
pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod retry;
pub mod rounding;
pub mod types;

// Re-exports
pub use calculator::SettlementCalculator;
pub use config::{Config, ErrorPolicy};
pub use directory::{HttpMerchantDirectory, MerchantDirectory};
pub use error::{Error, ErrorKind, Result};
pub use export::{CsvExporter, ExportSink};
pub use pipeline::{PipelineOptions, SettlementPipeline};
pub use rounding::RoundingRule;
pub use types::*;
