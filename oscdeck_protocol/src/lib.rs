use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A parameter value as it travels over the wire and sits in preset files.
///
/// The shape is deliberately loose; the schema decides which shapes are legal
/// for a given parameter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<f64>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "string",
            ParamValue::List(_) => "list",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::List(v)
    }
}

/// Snapshot of parameter values keyed by parameter name.
///
/// Clones share storage until one side is written to, so saving the live
/// preset into a slot is a pointer copy and later edits never leak into it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Preset(Arc<BTreeMap<String, ParamValue>>);

impl Preset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        Arc::make_mut(&mut self.0).insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both snapshots still point at the same storage.
    pub fn shares_storage_with(&self, other: &Preset) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<(String, ParamValue)> for Preset {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Preset(Arc::new(iter.into_iter().collect()))
    }
}

/// Sparse collection of saved presets. Removing a slot never renumbers the others.
///
/// Serialized as an object keyed by the decimal slot index. Array form (with
/// `null` gaps) is accepted when reading.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PresetBank(BTreeMap<u32, Preset>);

impl PresetBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: u32) -> Option<&Preset> {
        self.0.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.0.contains_key(&index)
    }

    pub fn insert(&mut self, index: u32, preset: Preset) -> Option<Preset> {
        self.0.insert(index, preset)
    }

    pub fn remove(&mut self, index: u32) -> Option<Preset> {
        self.0.remove(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Preset)> {
        self.0.iter().map(|(i, p)| (*i, p))
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PresetBank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Keys come through as strings: integer map keys do not survive
        // untagged buffering.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Keyed(BTreeMap<String, Option<Preset>>),
            Dense(Vec<Option<Preset>>),
        }

        let mut out = BTreeMap::new();
        match Repr::deserialize(deserializer)? {
            Repr::Keyed(map) => {
                for (key, preset) in map {
                    let index: u32 = key.trim().parse().map_err(|_| {
                        serde::de::Error::custom(format!("invalid preset index: {key:?}"))
                    })?;
                    if let Some(preset) = preset {
                        out.insert(index, preset);
                    }
                }
            }
            Repr::Dense(list) => {
                for (i, preset) in list.into_iter().enumerate() {
                    let index = u32::try_from(i)
                        .map_err(|_| serde::de::Error::custom("too many presets"))?;
                    if let Some(preset) = preset {
                        out.insert(index, preset);
                    }
                }
            }
        }
        Ok(PresetBank(out))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OscTarget {
    #[serde(alias = "max")]
    A,
    #[serde(alias = "td")]
    B,
    All,
}

impl OscTarget {
    pub fn includes_a(self) -> bool {
        matches!(self, OscTarget::A | OscTarget::All)
    }

    pub fn includes_b(self) -> bool {
        matches!(self, OscTarget::B | OscTarget::All)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Query {
    Path { relative_path: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Action {
    Encode { timestamp: i64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Busy,
    InvalidCommand,
    NotFound,
    InternalError,
}

/// Messages sent from the panel to the bridge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClientCommand {
    Osc {
        target: OscTarget,
        address: String,
        values: Vec<ParamValue>,
    },
    Save {
        presets: PresetBank,
    },
    Get {
        request_id: u64,
        query: Query,
    },
    Do {
        action: Action,
    },
    Load,
}

impl ClientCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::Osc { .. } => "osc",
            ClientCommand::Save { .. } => "save",
            ClientCommand::Get { .. } => "get",
            ClientCommand::Do { .. } => "do",
            ClientCommand::Load => "load",
        }
    }
}

/// Messages sent from the bridge to the panel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerMessage {
    Loaded {
        presets: PresetBank,
    },
    Resolved {
        request_id: u64,
        path: String,
    },
    Osc {
        address: String,
        values: Vec<ParamValue>,
    },
    Error {
        msg: String,
        code: ErrorCode,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_values_parse_by_shape() {
        let v: Vec<ParamValue> =
            serde_json::from_str(r#"[null, true, 0.5, 3, "a", [1, 2.5]]"#).unwrap();
        assert_eq!(
            v,
            vec![
                ParamValue::Null,
                ParamValue::Bool(true),
                ParamValue::Number(0.5),
                ParamValue::Number(3.0),
                ParamValue::Text("a".into()),
                ParamValue::List(vec![1.0, 2.5]),
            ]
        );
    }

    #[test]
    fn preset_clone_is_independent_after_write() {
        let mut live: Preset = [("volume".to_string(), ParamValue::Number(0.8))]
            .into_iter()
            .collect();
        let saved = live.clone();
        assert!(saved.shares_storage_with(&live));

        live.insert("volume", ParamValue::Number(0.1));
        assert!(!saved.shares_storage_with(&live));
        assert_eq!(saved.get("volume"), Some(&ParamValue::Number(0.8)));
        assert_eq!(live.get("volume"), Some(&ParamValue::Number(0.1)));
    }

    #[test]
    fn preset_bank_keeps_gaps_when_written() {
        let mut bank = PresetBank::new();
        bank.insert(0, Preset::new());
        bank.insert(4, Preset::new());
        let json = serde_json::to_string(&bank).unwrap();
        assert_eq!(json, r#"{"0":{},"4":{}}"#);

        let back: PresetBank = serde_json::from_str(&json).unwrap();
        assert_eq!(back.indices().collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn preset_bank_reads_array_form_with_holes() {
        let bank: PresetBank =
            serde_json::from_str(r#"[{"volume": 0.2}, null, {"volume": 0.9}]"#).unwrap();
        assert_eq!(bank.indices().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(
            bank.get(2).and_then(|p| p.get("volume")),
            Some(&ParamValue::Number(0.9))
        );

        let empty: PresetBank = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
        let empty: PresetBank = serde_json::from_str("[]").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn preset_bank_rejects_non_numeric_keys() {
        let err = serde_json::from_str::<PresetBank>(r#"{"first": {}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn commands_use_tagged_snake_case() {
        let cmd = ClientCommand::Osc {
            target: OscTarget::All,
            address: "volume".into(),
            values: vec![ParamValue::Number(0.8)],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "osc", "target": "all", "address": "volume", "values": [0.8]})
        );

        let get: ClientCommand = serde_json::from_str(
            r#"{"type":"get","request_id":7,"query":{"kind":"path","relative_path":"./exports"}}"#,
        )
        .unwrap();
        assert_eq!(
            get,
            ClientCommand::Get {
                request_id: 7,
                query: Query::Path {
                    relative_path: "./exports".into()
                }
            }
        );
    }

    #[test]
    fn legacy_target_names_are_accepted() {
        let t: OscTarget = serde_json::from_str(r#""max""#).unwrap();
        assert_eq!(t, OscTarget::A);
        let t: OscTarget = serde_json::from_str(r#""td""#).unwrap();
        assert_eq!(t, OscTarget::B);
        assert!(OscTarget::All.includes_a() && OscTarget::All.includes_b());
        assert!(!OscTarget::B.includes_a());
    }
}
