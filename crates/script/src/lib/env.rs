use std::env;
use std::fmt::Debug;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy)]
pub struct EnvVarSpec {
    pub key: &'static str,
    pub sensitive: bool,
}

#[derive(Clone, Copy)]
pub struct EnvVarValue<TVal> {
    pub spec: &'static EnvVarSpec,
    pub value: TVal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("Required env var {key} is not set")]
    Missing { key: &'static str },

    #[error("Failed to parse env var {key}: {value}")]
    Unparseable { key: &'static str, value: String },
}

impl EnvVarSpec {
    fn read(&'static self) -> Option<String> {
        match env::var(self.key) {
            Ok(val) => Some(val),
            Err(e) => {
                tracing::debug!("Failed reading env var {}: {e:?}", self.key);
                None
            }
        }
    }

    fn parse<TVal: FromStr>(&'static self, raw_value: String) -> Result<TVal, EnvError> {
        raw_value.trim().parse().map_err(|_e| EnvError::Unparseable {
            key: self.key,
            // Sensitive values never end up in error messages
            value: if self.sensitive { "***".to_owned() } else { raw_value },
        })
    }

    pub fn default<TVal: FromStr>(&'static self, default: TVal) -> Result<EnvVarValue<TVal>, EnvError> {
        let as_optional = self.optional()?;
        Ok(EnvVarValue {
            spec: as_optional.spec,
            value: as_optional.value.unwrap_or(default),
        })
    }

    pub fn optional<TVal: FromStr>(&'static self) -> Result<EnvVarValue<Option<TVal>>, EnvError> {
        let value = match self.read() {
            Some(raw_value) => Some(self.parse(raw_value)?),
            None => None,
        };
        Ok(EnvVarValue { spec: self, value })
    }

    pub fn required<TVal: FromStr>(&'static self) -> Result<EnvVarValue<TVal>, EnvError> {
        let raw_value = self.read().ok_or(EnvError::Missing { key: self.key })?;
        let value = self.parse(raw_value)?;
        Ok(EnvVarValue { spec: self, value })
    }
}

impl<TVal: Debug> Debug for EnvVarValue<TVal> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.spec.sensitive {
            f.write_str("***")
        } else {
            f.write_fmt(format_args!("{:?}", self.value))
        }
    }
}

pub const LOG_FORMAT: EnvVarSpec = EnvVarSpec {
    key: "LOG_FORMAT",
    sensitive: false,
};
pub const DRY_RUN: EnvVarSpec = EnvVarSpec {
    key: "DRY_RUN",
    sensitive: false,
};

pub const EVM_CHAIN: EnvVarSpec = EnvVarSpec {
    key: "EVM_CHAIN",
    sensitive: false,
};
pub const PRIVATE_KEY: EnvVarSpec = EnvVarSpec {
    key: "PRIVATE_KEY",
    sensitive: true,
};
pub const EXECUTION_LAYER_RPC: EnvVarSpec = EnvVarSpec {
    key: "EXECUTION_LAYER_RPC",
    sensitive: true,
};

pub const LEGACY_REGISTRY_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "LEGACY_REGISTRY_ADDRESS",
    sensitive: false,
};
pub const CURRENT_REGISTRY_ADDRESS: EnvVarSpec = EnvVarSpec {
    key: "CURRENT_REGISTRY_ADDRESS",
    sensitive: false,
};
pub const MASTER_SLOT: EnvVarSpec = EnvVarSpec {
    key: "MASTER_SLOT",
    sensitive: false,
};

pub const CONFIRMATION_TIMEOUT_SECS: EnvVarSpec = EnvVarSpec {
    key: "CONFIRMATION_TIMEOUT_SECS",
    sensitive: false,
};
pub const REQUIRED_CONFIRMATIONS: EnvVarSpec = EnvVarSpec {
    key: "REQUIRED_CONFIRMATIONS",
    sensitive: false,
};
pub const SETTLEMENT_STRATEGY: EnvVarSpec = EnvVarSpec {
    key: "SETTLEMENT_STRATEGY",
    sensitive: false,
};
pub const SETTLEMENT_POLL_INTERVAL_MS: EnvVarSpec = EnvVarSpec {
    key: "SETTLEMENT_POLL_INTERVAL_MS",
    sensitive: false,
};

pub const RECOVERY_DIR: EnvVarSpec = EnvVarSpec {
    key: "RECOVERY_DIR",
    sensitive: false,
};
pub const METRICS_TEXTFILE: EnvVarSpec = EnvVarSpec {
    key: "METRICS_TEXTFILE",
    sensitive: false,
};
pub const PROMETHEUS_NAMESPACE: EnvVarSpec = EnvVarSpec {
    key: "PROMETHEUS_NAMESPACE",
    sensitive: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are unique per test, env is process-wide
    const TEST_SECRET: EnvVarSpec = EnvVarSpec {
        key: "AXO_TEST_ENV_SECRET",
        sensitive: true,
    };
    const TEST_NUMBER: EnvVarSpec = EnvVarSpec {
        key: "AXO_TEST_ENV_NUMBER",
        sensitive: false,
    };
    const TEST_ABSENT: EnvVarSpec = EnvVarSpec {
        key: "AXO_TEST_ENV_ABSENT",
        sensitive: false,
    };

    #[test]
    fn sensitive_values_are_masked() {
        let value = EnvVarValue {
            spec: &TEST_SECRET,
            value: "0xdeadbeef".to_owned(),
        };
        assert_eq!(format!("{value:?}"), "***");

        let plain = EnvVarValue {
            spec: &TEST_NUMBER,
            value: 25u64,
        };
        assert_eq!(format!("{plain:?}"), "25");
    }

    #[test]
    fn parses_and_reports_values() {
        std::env::set_var(TEST_NUMBER.key, " 25 ");
        assert_eq!(TEST_NUMBER.required::<u64>().map(|v| v.value), Ok(25));

        std::env::set_var(TEST_NUMBER.key, "twenty-five");
        assert_eq!(
            TEST_NUMBER.required::<u64>().map(|v| v.value),
            Err(EnvError::Unparseable {
                key: TEST_NUMBER.key,
                value: "twenty-five".to_owned()
            })
        );
        std::env::remove_var(TEST_NUMBER.key);
    }

    #[test]
    fn unparseable_secret_is_not_echoed() {
        std::env::set_var(TEST_SECRET.key, "not-a-number");
        let err = TEST_SECRET.required::<u64>().map(|v| v.value).unwrap_err();
        assert!(!err.to_string().contains("not-a-number"));
        std::env::remove_var(TEST_SECRET.key);
    }

    #[test]
    fn absent_values_fall_back() {
        assert_eq!(TEST_ABSENT.optional::<u64>().map(|v| v.value), Ok(None));
        assert_eq!(TEST_ABSENT.default(7u64).map(|v| v.value), Ok(7));
        assert_eq!(
            TEST_ABSENT.required::<u64>().map(|v| v.value),
            Err(EnvError::Missing { key: TEST_ABSENT.key })
        );
    }
}
