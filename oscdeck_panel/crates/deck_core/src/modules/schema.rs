use crate::modules::error::SchemaError;
use crate::modules::protocol::{ParamValue, Preset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const UNIT_BOUNDS: [f64; 2] = [0.0, 1.0];

fn unit_bounds() -> [f64; 2] {
    UNIT_BOUNDS
}

fn linear() -> f64 {
    1.0
}

/// How a select is drawn. Has no effect on validation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectDisplay {
    #[default]
    Menu,
    Dropdown,
}

/// Descriptor of one controllable parameter, one variant per value kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ParamSpec {
    Slider {
        default: f64,
        #[serde(default = "unit_bounds")]
        bounds: [f64; 2],
        #[serde(default = "linear")]
        exponent: f64,
    },
    Boolean {
        default: bool,
    },
    #[serde(rename = "string")]
    Text {
        #[serde(default)]
        default: String,
    },
    Trigger {
        #[serde(default)]
        default: Option<ParamValue>,
    },
    List {
        #[serde(default)]
        default: Vec<f64>,
    },
    Select {
        default: String,
        options: Vec<String>,
        #[serde(default)]
        display: SelectDisplay,
    },
    Xy {
        default: [f64; 2],
        #[serde(default = "unit_bounds")]
        x: [f64; 2],
        #[serde(default = "unit_bounds")]
        y: [f64; 2],
        #[serde(default = "linear")]
        exponent: f64,
    },
}

pub fn lerp(lo: f64, hi: f64, t: f64) -> f64 {
    lo + (hi - lo) * t
}

fn shaped(n: f64, exponent: f64) -> f64 {
    n.clamp(0.0, 1.0).powf(exponent)
}

fn finite_list(values: &[f64]) -> Result<(), String> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(format!("non-finite number at position {i}")),
        None => Ok(()),
    }
}

fn mismatch(expected: &str, got: &ParamValue) -> String {
    format!("expected {expected}, got {}", got.type_name())
}

impl ParamSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamSpec::Slider { .. } => "slider",
            ParamSpec::Boolean { .. } => "boolean",
            ParamSpec::Text { .. } => "string",
            ParamSpec::Trigger { .. } => "trigger",
            ParamSpec::List { .. } => "list",
            ParamSpec::Select { .. } => "select",
            ParamSpec::Xy { .. } => "xy",
        }
    }

    /// Momentary kinds are broadcast but never retained.
    pub fn is_momentary(&self) -> bool {
        matches!(self, ParamSpec::Trigger { .. })
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            ParamSpec::Slider { default, .. } => ParamValue::Number(*default),
            ParamSpec::Boolean { default } => ParamValue::Bool(*default),
            ParamSpec::Text { default } => ParamValue::Text(default.clone()),
            ParamSpec::Trigger { .. } => ParamValue::Null,
            ParamSpec::List { default } => ParamValue::List(default.clone()),
            ParamSpec::Select { default, .. } => ParamValue::Text(default.clone()),
            ParamSpec::Xy { default, .. } => ParamValue::List(default.to_vec()),
        }
    }

    /// Checks `raw` against this kind and returns the value to retain.
    pub fn validate(&self, raw: &ParamValue) -> Result<ParamValue, String> {
        match (self, raw) {
            (ParamSpec::Slider { bounds, .. }, ParamValue::Number(n)) => {
                if !n.is_finite() {
                    return Err("non-finite number".to_string());
                }
                Ok(ParamValue::Number(n.clamp(bounds[0], bounds[1])))
            }
            (ParamSpec::Slider { .. }, other) => Err(mismatch("number", other)),

            (ParamSpec::Boolean { .. }, ParamValue::Bool(b)) => Ok(ParamValue::Bool(*b)),
            (ParamSpec::Boolean { .. }, other) => Err(mismatch("boolean", other)),

            (ParamSpec::Text { .. }, ParamValue::Text(s)) => Ok(ParamValue::Text(s.clone())),
            (ParamSpec::Text { .. }, other) => Err(mismatch("string", other)),

            // Whatever fired, the retained state is "not fired".
            (ParamSpec::Trigger { .. }, ParamValue::Null | ParamValue::Bool(_)) => {
                Ok(ParamValue::Null)
            }
            (ParamSpec::Trigger { .. }, other) => Err(mismatch("boolean or null", other)),

            (ParamSpec::List { .. }, ParamValue::List(values)) => {
                finite_list(values)?;
                Ok(ParamValue::List(values.clone()))
            }
            (ParamSpec::List { .. }, other) => Err(mismatch("list of numbers", other)),

            (ParamSpec::Select { options, .. }, ParamValue::Text(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(ParamValue::Text(s.clone()))
                } else {
                    Err(format!("'{s}' is not one of {options:?}"))
                }
            }
            (ParamSpec::Select { .. }, other) => Err(mismatch("option string", other)),

            (ParamSpec::Xy { .. }, ParamValue::List(values)) => {
                if values.len() != 2 {
                    return Err(format!("expected 2 coordinates, got {}", values.len()));
                }
                finite_list(values)?;
                Ok(ParamValue::List(values.clone()))
            }
            (ParamSpec::Xy { .. }, other) => Err(mismatch("[x, y] pair", other)),
        }
    }

    /// Maps normalized control input (each axis in 0..1) into the parameter's domain.
    pub fn from_normalized(&self, input: &[f64]) -> Result<ParamValue, String> {
        if let Some(bad) = input.iter().find(|n| !n.is_finite()) {
            return Err(format!("non-finite input {bad}"));
        }
        match (self, input) {
            (ParamSpec::Slider { bounds, exponent, .. }, [n]) => Ok(ParamValue::Number(lerp(
                bounds[0],
                bounds[1],
                shaped(*n, *exponent),
            ))),
            (ParamSpec::Xy { x, y, exponent, .. }, [u, v]) => Ok(ParamValue::List(vec![
                lerp(x[0], x[1], shaped(*u, *exponent)),
                lerp(y[0], y[1], shaped(*v, *exponent)),
            ])),
            (ParamSpec::Slider { .. }, _) => Err("slider takes one normalized input".to_string()),
            (ParamSpec::Xy { .. }, _) => Err("xy takes two normalized inputs".to_string()),
            (other, _) => Err(format!("{} has no normalized input", other.kind_name())),
        }
    }

    /// OSC arguments for a value of this kind. Sequences are spread.
    pub fn encode(&self, value: &ParamValue) -> Vec<ParamValue> {
        match (self, value) {
            (ParamSpec::List { .. } | ParamSpec::Xy { .. }, ParamValue::List(values)) => {
                values.iter().copied().map(ParamValue::Number).collect()
            }
            _ => vec![value.clone()],
        }
    }

    /// Inverse of [`ParamSpec::encode`] for inbound OSC arguments. The result still
    /// has to go through [`ParamSpec::validate`].
    pub fn decode(&self, args: &[ParamValue]) -> ParamValue {
        match self {
            ParamSpec::List { .. } | ParamSpec::Xy { .. } => {
                if let [ParamValue::List(values)] = args {
                    return ParamValue::List(values.clone());
                }
                let numbers: Option<Vec<f64>> = args.iter().map(ParamValue::as_f64).collect();
                match numbers {
                    Some(values) => ParamValue::List(values),
                    // Leave it to validation to reject.
                    None => args.first().cloned().unwrap_or(ParamValue::Null),
                }
            }
            ParamSpec::Boolean { .. } => match args.first() {
                // OSC senders often encode toggles as 0/1.
                Some(ParamValue::Number(n)) => ParamValue::Bool(*n != 0.0),
                Some(v) => v.clone(),
                None => ParamValue::Null,
            },
            _ => args.first().cloned().unwrap_or(ParamValue::Null),
        }
    }

    fn check(&self, name: &str) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::Invalid {
            name: name.to_string(),
            reason,
        };
        let check_bounds = |label: &str, b: &[f64; 2]| {
            if !b[0].is_finite() || !b[1].is_finite() || b[0] > b[1] {
                Err(invalid(format!("{label} bounds {b:?} must be finite and ordered")))
            } else {
                Ok(())
            }
        };
        let check_exponent = |e: f64| {
            if e.is_finite() && e > 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("exponent {e} must be positive")))
            }
        };

        match self {
            ParamSpec::Slider {
                default,
                bounds,
                exponent,
            } => {
                check_bounds("slider", bounds)?;
                check_exponent(*exponent)?;
                if !(bounds[0]..=bounds[1]).contains(default) {
                    return Err(invalid(format!("default {default} outside {bounds:?}")));
                }
            }
            ParamSpec::Xy { x, y, exponent, .. } => {
                check_bounds("x", x)?;
                check_bounds("y", y)?;
                check_exponent(*exponent)?;
            }
            ParamSpec::Trigger { default } => {
                if default.as_ref().is_some_and(|d| *d != ParamValue::Null) {
                    return Err(invalid("trigger default must be null".to_string()));
                }
            }
            ParamSpec::Select { options, .. } if options.is_empty() => {
                return Err(invalid("select needs at least one option".to_string()));
            }
            _ => {}
        }

        self.validate(&self.default_value())
            .map(|_| ())
            .map_err(|reason| invalid(format!("default rejected: {reason}")))
    }
}

/// Every controllable parameter, keyed by name. Loaded once, never mutated.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Schema {
    params: BTreeMap<String, ParamSpec>,
}

impl Schema {
    pub fn new<I, S>(params: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, ParamSpec)>,
        S: Into<String>,
    {
        let params: BTreeMap<String, ParamSpec> =
            params.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (name, spec) in &params {
            if name.trim().is_empty() {
                return Err(SchemaError::Invalid {
                    name: name.clone(),
                    reason: "empty parameter name".to_string(),
                });
            }
            spec.check(name)?;
        }
        Ok(Self { params })
    }

    pub fn from_json_str(s: &str) -> Result<Self, SchemaError> {
        let params: BTreeMap<String, ParamSpec> = serde_json::from_str(s)?;
        Self::new(params)
    }

    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn defaults(&self) -> Preset {
        self.params
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default_value()))
            .collect()
    }
}
