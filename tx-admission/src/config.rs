//! Configuration for the admission pipeline's chain parameters.

use serde::{Deserialize, Serialize};

/// Chain parameters read by individual admission steps.
///
/// These values are consensus-relevant: validators must agree on them to
/// reach the same admission outcome for the same transaction. Which
/// keepers are present is configured separately, on
/// [`Options`](crate::pipeline::Options), when the pipeline is built.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The maximum memo length, in characters.
    pub max_memo_characters: usize,

    /// Gas charged per byte of the transaction's serialized size.
    pub tx_size_cost_per_byte: u64,

    /// Gas charged per signature, before the signatures are
    /// cryptographically verified.
    pub sig_verify_cost: u64,

    /// The maximum number of signers per transaction.
    pub tx_sig_limit: usize,

    /// The gas cap installed for simulation runs on the lazy lane.
    ///
    /// `None` leaves simulation unmetered. The full variant takes its
    /// simulation cap from the contract gas policy keeper instead.
    pub simulation_gas_limit: Option<u64>,

    /// Extension option types the node accepts.
    ///
    /// Transactions carrying any other extension option are rejected.
    pub accepted_extensions: Vec<String>,
}

// we like our default configs to be explicit
impl Default for Config {
    fn default() -> Self {
        Self {
            max_memo_characters: 256,
            tx_size_cost_per_byte: 10,
            sig_verify_cost: 1_000,
            tx_sig_limit: 7,
            simulation_gas_limit: None,
            accepted_extensions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serde_round_trip() {
        let config = Config::default();

        let encoded = serde_json::to_string(&config).expect("config serializes");
        let decoded: Config = serde_json::from_str(&encoded).expect("config deserializes");

        assert_eq!(decoded.max_memo_characters, config.max_memo_characters);
        assert_eq!(decoded.tx_size_cost_per_byte, config.tx_size_cost_per_byte);
        assert_eq!(decoded.sig_verify_cost, config.sig_verify_cost);
        assert_eq!(decoded.tx_sig_limit, config.tx_sig_limit);
        assert_eq!(decoded.simulation_gas_limit, config.simulation_gas_limit);
        assert_eq!(decoded.accepted_extensions, config.accepted_extensions);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> =
            serde_json::from_str(r#"{ "max_memo_characters": 64, "not_a_field": true }"#);

        assert!(result.is_err(), "unknown config fields must be rejected");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "max_memo_characters": 64 }"#).expect("partial config");

        assert_eq!(config.max_memo_characters, 64);
        assert_eq!(config.tx_sig_limit, Config::default().tx_sig_limit);
    }
}
