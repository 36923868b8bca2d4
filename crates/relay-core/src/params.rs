//! Structured command parameters
//!
//! Command parameters travel as positional `KEY:VALUE` strings inside a
//! [`CommandMessage`](crate::wire::CommandMessage). This module provides a
//! declarative spec for validating and extracting them: required keys,
//! defaults, empty-value policy and duplicate handling. Keys are matched
//! case-insensitively; only the first colon splits, so values keep any
//! colons of their own.

use std::collections::HashMap;

use crate::errors::ParamError;

// ----------------------------------------------------------------------------
// Key Specification
// ----------------------------------------------------------------------------

/// Declarative description of one parameter key
#[derive(Debug, Clone)]
pub struct KeySpec {
    name: String,
    required: bool,
    allow_empty: bool,
    multi: bool,
}

impl KeySpec {
    /// Start building a spec for `name`
    pub fn builder<N: Into<String>>(name: N) -> KeySpecBuilder {
        KeySpecBuilder {
            spec: KeySpec {
                name: name.into().to_uppercase(),
                required: false,
                allow_empty: false,
                multi: false,
            },
        }
    }
}

/// Builder for [`KeySpec`]
#[derive(Debug, Clone)]
pub struct KeySpecBuilder {
    spec: KeySpec,
}

impl KeySpecBuilder {
    pub fn required(mut self, required: bool) -> Self {
        self.spec.required = required;
        self
    }

    pub fn allow_empty(mut self, allow_empty: bool) -> Self {
        self.spec.allow_empty = allow_empty;
        self
    }

    /// Allow duplicates, collected in arrival order
    pub fn multi(mut self, multi: bool) -> Self {
        self.spec.multi = multi;
        self
    }

    fn build(self) -> KeySpec {
        self.spec
    }
}

// ----------------------------------------------------------------------------
// Parameter Specification
// ----------------------------------------------------------------------------

/// Validating specification for a command's parameter list
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    by_key: HashMap<String, KeySpec>,
    defaults: HashMap<String, String>,
}

impl ParamSpec {
    pub fn builder() -> ParamSpecBuilder {
        ParamSpecBuilder {
            spec: ParamSpec::default(),
        }
    }

    /// Parse positional `KEY:VALUE` parameters against this spec
    pub fn parse(&self, params: &[String]) -> Result<ParsedParams, ParamError> {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();

        for raw in params {
            let Some((key_raw, value)) = raw.split_once(':') else {
                return Err(ParamError::Malformed { raw: raw.clone() });
            };
            let key = key_raw.trim().to_uppercase();
            if key.is_empty() {
                return Err(ParamError::Malformed { raw: raw.clone() });
            }

            let Some(spec) = self.by_key.get(&key) else {
                return Err(ParamError::UnknownKey { key: key_raw.into() });
            };

            if value.is_empty() && !spec.allow_empty {
                return Err(ParamError::EmptyValue {
                    key: spec.name.clone(),
                });
            }

            let entry = values.entry(spec.name.clone()).or_default();
            if !spec.multi && !entry.is_empty() {
                return Err(ParamError::DuplicateKey {
                    key: spec.name.clone(),
                });
            }
            entry.push(value.to_string());
        }

        for spec in self.by_key.values() {
            if values.contains_key(&spec.name) {
                continue;
            }
            if let Some(default) = self.defaults.get(&spec.name) {
                values.insert(spec.name.clone(), vec![default.clone()]);
            } else if spec.required {
                return Err(ParamError::MissingKey {
                    key: spec.name.clone(),
                });
            }
        }

        Ok(ParsedParams { values })
    }
}

/// Builder for [`ParamSpec`]
#[derive(Debug, Clone, Default)]
pub struct ParamSpecBuilder {
    spec: ParamSpec,
}

impl ParamSpecBuilder {
    pub fn key(mut self, builder: KeySpecBuilder) -> Self {
        let spec = builder.build();
        self.spec.by_key.insert(spec.name.clone(), spec);
        self
    }

    pub fn default_value<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.spec
            .defaults
            .insert(key.into().to_uppercase(), value.into());
        self
    }

    pub fn build(self) -> ParamSpec {
        self.spec
    }
}

// ----------------------------------------------------------------------------
// Parsed Parameters
// ----------------------------------------------------------------------------

/// Validated parameter values, keyed by canonical (uppercase) key name
#[derive(Debug, Clone)]
pub struct ParsedParams {
    values: HashMap<String, Vec<String>>,
}

impl ParsedParams {
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_uppercase())
    }

    /// Latest value for the key, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_uppercase())
            .and_then(|vs| vs.last())
            .map(String::as_str)
    }

    /// Every value supplied for a multi key, in arrival order
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values
            .get(&key.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

// ----------------------------------------------------------------------------
// Well-Known Parameter Sets
// ----------------------------------------------------------------------------

/// Positional params for a SEND_MESSAGE request: FROM / TO / MESSAGE
pub fn send_message_params(from: Option<&str>, to: &str, message: &str) -> Vec<String> {
    let mut params = Vec::with_capacity(3);
    if let Some(from) = from {
        params.push(format!("FROM:{from}"));
    }
    params.push(format!("TO:{to}"));
    params.push(format!("MESSAGE:{message}"));
    params
}

/// Spec accepted by the SEND_MESSAGE handler
pub fn send_message_spec() -> ParamSpec {
    ParamSpec::builder()
        .key(KeySpec::builder("FROM"))
        .key(KeySpec::builder("TO").required(true))
        .key(KeySpec::builder("MESSAGE").required(true).allow_empty(true))
        .build()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_known_keys_case_insensitively() {
        let spec = ParamSpec::builder()
            .key(KeySpec::builder("TO").required(true))
            .key(KeySpec::builder("MESSAGE").required(true))
            .build();

        let parsed = spec
            .parse(&params(&["to:u2:d2", "Message:hello"]))
            .unwrap();

        assert_eq!(parsed.get("TO"), Some("u2:d2"));
        assert_eq!(parsed.get("message"), Some("hello"));
    }

    #[test]
    fn value_keeps_its_own_colons() {
        let spec = ParamSpec::builder().key(KeySpec::builder("TO")).build();
        let parsed = spec.parse(&params(&["TO:user:device"])).unwrap();
        assert_eq!(parsed.get("TO"), Some("user:device"));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let spec = send_message_spec();
        let err = spec.parse(&params(&["TO:u2:d2"])).unwrap_err();
        assert!(matches!(err, ParamError::MissingKey { key } if key == "MESSAGE"));
    }

    #[test]
    fn defaults_fill_absent_keys() {
        let spec = ParamSpec::builder()
            .key(KeySpec::builder("CHANNEL").required(true))
            .default_value("CHANNEL", "general")
            .build();

        let parsed = spec.parse(&[]).unwrap();
        assert_eq!(parsed.get("CHANNEL"), Some("general"));
    }

    #[test]
    fn duplicate_single_key_is_rejected() {
        let spec = ParamSpec::builder().key(KeySpec::builder("TO")).build();
        let err = spec.parse(&params(&["TO:a", "TO:b"])).unwrap_err();
        assert!(matches!(err, ParamError::DuplicateKey { .. }));
    }

    #[test]
    fn multi_key_collects_in_order() {
        let spec = ParamSpec::builder()
            .key(KeySpec::builder("TAG").multi(true))
            .build();

        let parsed = spec.parse(&params(&["TAG:a", "TAG:b"])).unwrap();
        assert_eq!(parsed.get_all("TAG"), &["a".to_string(), "b".to_string()]);
        // get() returns the latest value.
        assert_eq!(parsed.get("TAG"), Some("b"));
    }

    #[test]
    fn empty_value_policy() {
        let spec = ParamSpec::builder()
            .key(KeySpec::builder("STRICT"))
            .key(KeySpec::builder("LOOSE").allow_empty(true))
            .build();

        assert!(matches!(
            spec.parse(&params(&["STRICT:"])).unwrap_err(),
            ParamError::EmptyValue { .. }
        ));
        let parsed = spec.parse(&params(&["LOOSE:"])).unwrap();
        assert_eq!(parsed.get("LOOSE"), Some(""));
    }

    #[test]
    fn unknown_key_and_malformed_params_are_rejected() {
        let spec = ParamSpec::builder().key(KeySpec::builder("TO")).build();
        assert!(matches!(
            spec.parse(&params(&["WHO:me"])).unwrap_err(),
            ParamError::UnknownKey { .. }
        ));
        assert!(matches!(
            spec.parse(&params(&["no-separator"])).unwrap_err(),
            ParamError::Malformed { .. }
        ));
    }

    #[test]
    fn send_message_params_shape() {
        assert_eq!(
            send_message_params(Some("u1:d1"), "u2:d2", "hello"),
            params(&["FROM:u1:d1", "TO:u2:d2", "MESSAGE:hello"])
        );
        assert_eq!(
            send_message_params(None, "u2:d2", "hello"),
            params(&["TO:u2:d2", "MESSAGE:hello"])
        );

        let parsed = send_message_spec()
            .parse(&send_message_params(Some("u1:d1"), "u2:d2", "hello"))
            .unwrap();
        assert_eq!(parsed.get("FROM"), Some("u1:d1"));
        assert_eq!(parsed.get("TO"), Some("u2:d2"));
        assert_eq!(parsed.get("MESSAGE"), Some("hello"));
    }
}
