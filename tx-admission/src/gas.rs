//! Gas metering for the admission pipeline.
//!
//! Each admission run owns exactly one [`GasMeter`], installed by the
//! context setup step and threaded through the rest of the pipeline
//! inside the processing context. Meters are never shared between runs.

use thiserror::Error;

/// An error raised while consuming gas.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GasError {
    /// The meter's limit was exceeded.
    #[error(
        "out of gas while charging for {descriptor}: \
         wanted {wanted} with {consumed} of {limit} already used"
    )]
    OutOfGas {
        /// What the failed charge was paying for.
        descriptor: &'static str,
        /// The amount of the failed charge.
        wanted: u64,
        /// Gas consumed before the failed charge.
        consumed: u64,
        /// The meter's limit.
        limit: u64,
    },

    /// The consumed-gas counter overflowed `u64`.
    #[error("gas overflow while charging for {descriptor}")]
    Overflow {
        /// What the failed charge was paying for.
        descriptor: &'static str,
    },
}

/// A per-run gas meter.
///
/// A meter either has a limit, and rejects charges that would exceed it,
/// or is infinite, and only tracks consumption. Simulation runs start
/// with an infinite meter that the simulation-gas-limiting step may later
/// replace with a capped one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl GasMeter {
    /// Creates a meter that rejects charges beyond `limit`.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: 0,
        }
    }

    /// Creates a meter that tracks consumption without a limit.
    pub fn infinite() -> Self {
        Self {
            limit: None,
            consumed: 0,
        }
    }

    /// Charges `amount` gas for `descriptor`.
    ///
    /// Fails if the charge would exceed the limit or overflow the
    /// consumption counter; the meter is unchanged on failure.
    pub fn consume(&mut self, amount: u64, descriptor: &'static str) -> Result<(), GasError> {
        let consumed = self
            .consumed
            .checked_add(amount)
            .ok_or(GasError::Overflow { descriptor })?;

        if let Some(limit) = self.limit {
            if consumed > limit {
                return Err(GasError::OutOfGas {
                    descriptor,
                    wanted: amount,
                    consumed: self.consumed,
                    limit,
                });
            }
        }

        self.consumed = consumed;
        Ok(())
    }

    /// The gas consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// The meter's limit, or `None` for an infinite meter.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether this meter has no limit.
    pub fn is_infinite(&self) -> bool {
        self.limit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn consume_within_limit_accumulates() {
        let mut meter = GasMeter::with_limit(100);

        meter.consume(40, "first").expect("within limit");
        meter.consume(60, "second").expect("exactly at limit");
        assert_eq!(meter.consumed(), 100);
    }

    #[test]
    fn consume_past_limit_fails_and_leaves_meter_unchanged() {
        let mut meter = GasMeter::with_limit(100);
        meter.consume(90, "setup").expect("within limit");

        let error = meter.consume(11, "overrun").expect_err("past limit");
        assert_eq!(
            error,
            GasError::OutOfGas {
                descriptor: "overrun",
                wanted: 11,
                consumed: 90,
                limit: 100,
            }
        );
        assert_eq!(meter.consumed(), 90);
    }

    #[test]
    fn infinite_meter_never_runs_out() {
        let mut meter = GasMeter::infinite();

        meter.consume(u64::MAX / 2, "big").expect("no limit");
        assert!(meter.is_infinite());
        assert_eq!(meter.consumed(), u64::MAX / 2);
    }

    #[test]
    fn overflow_is_detected() {
        let mut meter = GasMeter::infinite();
        meter.consume(u64::MAX, "max").expect("no limit");

        let error = meter.consume(1, "overflow").expect_err("must overflow");
        assert_eq!(error, GasError::Overflow { descriptor: "overflow" });
    }

    proptest! {
        #[test]
        fn consumption_is_monotonic_and_bounded(
            limit in 0u64..=1_000_000,
            charges in proptest::collection::vec(0u64..=10_000, 0..50),
        ) {
            let mut meter = GasMeter::with_limit(limit);
            let mut previous = 0;

            for charge in charges {
                let before = meter.consumed();
                match meter.consume(charge, "proptest") {
                    Ok(()) => prop_assert_eq!(meter.consumed(), before + charge),
                    Err(_) => prop_assert_eq!(meter.consumed(), before),
                }

                prop_assert!(meter.consumed() >= previous);
                prop_assert!(meter.consumed() <= limit);
                previous = meter.consumed();
            }
        }
    }
}
