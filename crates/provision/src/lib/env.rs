use std::env;
use std::fmt::Debug;
use std::str::FromStr;

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

impl EnvVarSpec {
    pub fn default<TVal: FromStr>(&'static self, default: TVal) -> EnvVarValue<TVal> {
        let as_optional = self.optional();
        EnvVarValue {
            spec: as_optional.spec,
            value: as_optional.value.unwrap_or(default),
        }
    }

    pub fn optional<TVal: FromStr>(&'static self) -> EnvVarValue<Option<TVal>> {
        let value = match env::var(self.key) {
            Ok(val) => {
                let parsed = val
                    .parse()
                    .unwrap_or_else(|_e| panic!("Failed to parse env var {}", self.key));
                Some(parsed)
            }
            Err(e) => {
                tracing::debug!("Failed reading env var {}: {e:?}", self.key);
                None
            }
        };
        EnvVarValue { spec: self, value }
    }

    pub fn required<TVal: FromStr>(&'static self) -> EnvVarValue<TVal> {
        let raw_value = env::var(self.key).unwrap_or_else(|e| panic!("Failed to read env var {}: {e:?}", self.key));
        match raw_value.parse() {
            Ok(value) => EnvVarValue { spec: self, value },
            Err(_e) => {
                panic!("Failed to parse value {} for env var {}", raw_value, self.key)
            }
        }
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
pub const LOTE_PARALLELISM: EnvVarSpec = EnvVarSpec {
    key: "LOTE_PARALLELISM",
    sensitive: false,
};
pub const LOTE_MAX_DEPTH: EnvVarSpec = EnvVarSpec {
    key: "LOTE_MAX_DEPTH",
    sensitive: false,
};
pub const LOTE_MAX_LISTS: EnvVarSpec = EnvVarSpec {
    key: "LOTE_MAX_LISTS",
    sensitive: false,
};
pub const LOTE_FETCH_TIMEOUT_SECS: EnvVarSpec = EnvVarSpec {
    key: "LOTE_FETCH_TIMEOUT_SECS",
    sensitive: false,
};
pub const LOTE_HTTP_CACHE_DIR: EnvVarSpec = EnvVarSpec {
    key: "LOTE_HTTP_CACHE_DIR",
    sensitive: false,
};
pub const LOTE_HTTP_CACHE_MAX_AGE_SECS: EnvVarSpec = EnvVarSpec {
    key: "LOTE_HTTP_CACHE_MAX_AGE_SECS",
    sensitive: false,
};
