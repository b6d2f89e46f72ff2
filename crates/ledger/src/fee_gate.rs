//! # Fee Threshold Gate
//!
//! Blocks transaction execution while the network's fee estimate sits at
//! or above the operator-configured ceiling. Polls on a fixed interval and
//! returns the first estimate whose derived base fee is strictly below the
//! ceiling; that estimate seeds the next transaction's fee fields.
//!
//! The gate itself never fails; only an unreachable ledger does, and that
//! error propagates from the underlying query instead of being swallowed.

use std::time::Duration;

use tracing::{info, warn};

use crate::client::{FeeEstimate, LedgerClient, LedgerError};

/// Poll cadence while the estimate is above the ceiling.
pub const FEE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Wait until the ledger's fee estimate is acceptable and return it.
///
/// Warns once at the first breach of the ceiling, then logs progress on
/// each later poll that is still above it.
pub async fn await_acceptable_fee(
    client: &dyn LedgerClient,
    base_fee_ceiling: u128,
) -> Result<FeeEstimate, LedgerError> {
    let mut attempt: u32 = 1;
    loop {
        let estimate = client.fee_estimate().await?;
        let base_fee = estimate.base_fee();
        if base_fee < base_fee_ceiling {
            return Ok(estimate);
        }

        if attempt == 1 {
            warn!(
                base_fee_ceiling,
                base_fee,
                estimate = %estimate,
                "max base fee reached, waiting until the estimate falls below to resume transaction execution"
            );
        } else {
            info!(
                base_fee_ceiling,
                base_fee,
                price_estimate_attempt = attempt,
                "fee estimate still above max threshold"
            );
        }

        tokio::time::sleep(FEE_POLL_INTERVAL).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLedgerClient;

    // ── Test 1: first estimate already acceptable ───────────────────────

    #[tokio::test(start_paused = true)]
    async fn accepts_first_estimate_below_ceiling() {
        let mock = MockLedgerClient::new();
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 10 });

        let accepted = await_acceptable_fee(&mock, 100).await.expect("fee");
        assert_eq!(accepted, FeeEstimate::Legacy { gas_price: 10 });
        assert_eq!(mock.fee_estimate_count(), 1);
    }

    // ── Test 2: convergence returns the first acceptable estimate ───────

    #[tokio::test(start_paused = true)]
    async fn waits_until_estimate_drops() {
        let mock = MockLedgerClient::new();
        mock.push_fee_estimate(FeeEstimate::Market {
            max_fee_per_gas: 500,
            max_priority_fee_per_gas: 100,
        }); // base 200, above
        mock.push_fee_estimate(FeeEstimate::Market {
            max_fee_per_gas: 400,
            max_priority_fee_per_gas: 100,
        }); // base 150, above
        mock.push_fee_estimate(FeeEstimate::Market {
            max_fee_per_gas: 180,
            max_priority_fee_per_gas: 20,
        }); // base 80, below

        let accepted = await_acceptable_fee(&mock, 100).await.expect("fee");
        assert_eq!(
            accepted,
            FeeEstimate::Market {
                max_fee_per_gas: 180,
                max_priority_fee_per_gas: 20,
            }
        );
        // The accepted estimate is exactly the third poll; no later
        // estimate is substituted.
        assert_eq!(mock.fee_estimate_count(), 3);
    }

    // ── Test 3: threshold is strict ─────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn estimate_at_ceiling_is_rejected() {
        let mock = MockLedgerClient::new();
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 100 }); // == ceiling, rejected
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 99 });

        let accepted = await_acceptable_fee(&mock, 100).await.expect("fee");
        assert_eq!(accepted, FeeEstimate::Legacy { gas_price: 99 });
        assert_eq!(mock.fee_estimate_count(), 2);
    }

    // ── Test 4: ledger failure propagates ───────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn fee_query_error_propagates() {
        let mock = MockLedgerClient::new();
        mock.push_fee_error(LedgerError::Network("rpc unreachable".to_string()));

        let result = await_acceptable_fee(&mock, 100).await;
        assert!(matches!(result, Err(LedgerError::Network(_))));
        assert_eq!(mock.fee_estimate_count(), 1);
    }

    // ── Test 5: mid-wait failure also propagates, not swallowed ─────────

    #[tokio::test(start_paused = true)]
    async fn mid_wait_error_propagates() {
        let mock = MockLedgerClient::new();
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 500 }); // above
        mock.push_fee_error(LedgerError::Timeout);

        let result = await_acceptable_fee(&mock, 100).await;
        assert_eq!(result, Err(LedgerError::Timeout));
        assert_eq!(mock.fee_estimate_count(), 2);
    }
}
