use crate::modules::error::StoreError;
use crate::modules::protocol::{ClientCommand, OscTarget, ParamValue, Preset, PresetBank};
use crate::modules::schema::Schema;
use std::sync::Arc;

/// Receiver of outbound bridge commands produced by store mutations.
pub trait Outbox {
    fn emit(&mut self, cmd: ClientCommand);
}

impl Outbox for Vec<ClientCommand> {
    fn emit(&mut self, cmd: ClientCommand) {
        self.push(cmd);
    }
}

/// Where a mutation comes from, which decides whether it is broadcast and
/// whether it is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A user edit: broadcast, then retained.
    Local,
    /// An echo or update from the bridge: retained, never broadcast.
    Remote,
    /// A one-shot action such as a trigger: broadcast, never retained.
    Momentary,
}

impl Origin {
    pub fn sends(self) -> bool {
        matches!(self, Origin::Local | Origin::Momentary)
    }

    pub fn commits(self) -> bool {
        matches!(self, Origin::Local | Origin::Remote)
    }
}

/// Partial replacement used by hydration. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub presets: Option<PresetBank>,
    pub current_preset: Option<Option<u32>>,
}

/// The authoritative parameter state.
///
/// `current_preset` only records which slot was last loaded or saved. It is
/// not cleared when live values drift away from that slot.
#[derive(Debug, Clone)]
pub struct Store {
    schema: Arc<Schema>,
    preset: Preset,
    presets: PresetBank,
    current_preset: Option<u32>,
    revision: u64,
}

impl Store {
    pub fn new(schema: Arc<Schema>) -> Self {
        let preset = schema.defaults();
        Self {
            schema,
            preset,
            presets: PresetBank::new(),
            current_preset: None,
            revision: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn presets(&self) -> &PresetBank {
        &self.presets
    }

    pub fn current_preset(&self) -> Option<u32> {
        self.current_preset
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.preset.get(name)
    }

    /// Bumped after every operation that changed observable state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_parameter(
        &mut self,
        name: &str,
        value: ParamValue,
        origin: Origin,
        out: &mut dyn Outbox,
    ) -> Result<(), StoreError> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| StoreError::UnknownParameter(name.to_string()))?;
        let validated = spec.validate(&value).map_err(|reason| StoreError::InvalidValue {
            name: name.to_string(),
            reason,
        })?;

        // A trigger edit is always an activation: the reset form goes out
        // and nothing is retained.
        let (origin, value) = match origin {
            Origin::Local | Origin::Momentary if spec.is_momentary() => {
                (Origin::Momentary, ParamValue::Bool(false))
            }
            _ => (origin, value),
        };

        if origin.sends() {
            out.emit(ClientCommand::Osc {
                target: OscTarget::All,
                address: name.to_string(),
                values: spec.encode(&value),
            });
        }
        if origin.commits() {
            self.preset.insert(name, validated);
            self.revision += 1;
        }
        Ok(())
    }

    /// Fires a trigger parameter. The bridge is told, the store keeps nothing.
    pub fn fire_trigger(&mut self, name: &str, out: &mut dyn Outbox) -> Result<(), StoreError> {
        let spec = self
            .schema
            .get(name)
            .ok_or_else(|| StoreError::UnknownParameter(name.to_string()))?;
        if !spec.is_momentary() {
            return Err(StoreError::InvalidValue {
                name: name.to_string(),
                reason: format!("{} cannot be fired", spec.kind_name()),
            });
        }
        self.set_parameter(name, ParamValue::Bool(false), Origin::Momentary, out)
    }

    pub fn save_preset(
        &mut self,
        index: Option<u32>,
        out: &mut dyn Outbox,
    ) -> Result<(), StoreError> {
        let index = index.ok_or(StoreError::NoActivePreset)?;
        self.presets.insert(index, self.preset.clone());
        self.current_preset = Some(index);
        self.revision += 1;
        out.emit(ClientCommand::Save {
            presets: self.presets.clone(),
        });
        Ok(())
    }

    /// Removes a slot if present. Persistence is requested either way.
    pub fn delete_preset(&mut self, index: u32, out: &mut dyn Outbox) {
        if self.presets.remove(index).is_some() {
            self.revision += 1;
        }
        out.emit(ClientCommand::Save {
            presets: self.presets.clone(),
        });
    }

    /// Makes slot `index` live and broadcasts every parameter.
    ///
    /// An empty slot keeps the current values. Keys missing from the slot (saved
    /// under an older schema) or no longer valid keep their current value; keys
    /// the schema does not know are dropped.
    pub fn load_preset(&mut self, index: u32, out: &mut dyn Outbox) {
        let source = match self.presets.get(index) {
            Some(p) => p.clone(),
            None => self.preset.clone(),
        };

        for name in source.names().filter(|n| !self.schema.contains(n)) {
            log::warn!("preset {index}: dropping unknown parameter '{name}'");
        }

        let mut resolved = self.preset.clone();
        for (name, spec) in self.schema.iter() {
            let Some(raw) = source.get(name) else {
                log::debug!("preset {index}: '{name}' missing, keeping live value");
                continue;
            };
            match spec.validate(raw) {
                Ok(validated) => resolved.insert(name, validated),
                Err(reason) => {
                    log::warn!("preset {index}: keeping live '{name}', stored value rejected: {reason}")
                }
            }
        }

        for (name, spec) in self.schema.iter() {
            let value = resolved.get(name).cloned().unwrap_or(ParamValue::Null);
            out.emit(ClientCommand::Osc {
                target: OscTarget::All,
                address: name.to_string(),
                values: spec.encode(&value),
            });
        }

        self.preset = resolved;
        self.current_preset = Some(index);
        self.revision += 1;
    }

    /// Bulk overwrite without broadcasting. Used for hydration from the bridge.
    pub fn set_state(&mut self, patch: StatePatch) {
        if let Some(presets) = patch.presets {
            self.presets = presets;
        }
        if let Some(current) = patch.current_preset {
            self.current_preset = current;
        }
        self.revision += 1;
    }

    /// Raw access to the preset collection and the current slot. Nothing is broadcast.
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut PresetBank, &mut Option<u32>) -> R) -> R {
        let out = f(&mut self.presets, &mut self.current_preset);
        self.revision += 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::schema::{ParamSpec, SelectDisplay};
    use proptest::prelude::*;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new([
                (
                    "volume",
                    ParamSpec::Slider {
                        default: 0.5,
                        bounds: [0.0, 1.0],
                        exponent: 1.0,
                    },
                ),
                (
                    "mode",
                    ParamSpec::Select {
                        default: "a".into(),
                        options: vec!["a".into(), "b".into()],
                        display: SelectDisplay::Menu,
                    },
                ),
            ])
            .unwrap(),
        )
    }

    fn with_trigger() -> Arc<Schema> {
        Arc::new(
            Schema::new([
                ("flash", ParamSpec::Trigger { default: None }),
                ("on", ParamSpec::Boolean { default: false }),
            ])
            .unwrap(),
        )
    }

    fn osc(address: &str, values: Vec<ParamValue>) -> ClientCommand {
        ClientCommand::Osc {
            target: OscTarget::All,
            address: address.to_string(),
            values,
        }
    }

    #[test]
    fn starts_from_schema_defaults() {
        let store = Store::new(schema());
        assert_eq!(store.value("volume"), Some(&ParamValue::Number(0.5)));
        assert_eq!(store.value("mode"), Some(&ParamValue::Text("a".into())));
        assert_eq!(store.current_preset(), None);
        assert!(store.presets().is_empty());
    }

    #[test]
    fn local_edit_sends_once_and_commits() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("volume", ParamValue::Number(0.8), Origin::Local, &mut out)
            .unwrap();
        assert_eq!(out, vec![osc("volume", vec![ParamValue::Number(0.8)])]);
        assert_eq!(store.value("volume"), Some(&ParamValue::Number(0.8)));
    }

    #[test]
    fn remote_edit_commits_without_sending() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("mode", ParamValue::Text("b".into()), Origin::Remote, &mut out)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(store.value("mode"), Some(&ParamValue::Text("b".into())));
    }

    #[test]
    fn raw_value_is_sent_and_clamped_value_is_kept() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("volume", ParamValue::Number(1.5), Origin::Local, &mut out)
            .unwrap();
        assert_eq!(out, vec![osc("volume", vec![ParamValue::Number(1.5)])]);
        assert_eq!(store.value("volume"), Some(&ParamValue::Number(1.0)));
    }

    #[test]
    fn invalid_select_is_rejected_and_nothing_changes() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        let before = store.revision();
        let err = store
            .set_parameter("mode", ParamValue::Text("z".into()), Origin::Local, &mut out)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
        assert_eq!(store.value("mode"), Some(&ParamValue::Text("a".into())));
        assert!(out.is_empty());
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn unknown_parameter_is_surfaced() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        let err = store
            .set_parameter("pan", ParamValue::Number(0.0), Origin::Local, &mut out)
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownParameter("pan".into()));
        assert!(out.is_empty());
    }

    #[test]
    fn trigger_fires_without_retaining() {
        let mut store = Store::new(with_trigger());
        let mut out = Vec::new();
        store.fire_trigger("flash", &mut out).unwrap();
        assert_eq!(out, vec![osc("flash", vec![ParamValue::Bool(false)])]);
        assert_eq!(store.value("flash"), Some(&ParamValue::Null));

        let err = store.fire_trigger("on", &mut out).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[test]
    fn local_trigger_edit_sends_reset_form_and_retains_nothing() {
        let mut store = Store::new(with_trigger());
        let before = store.revision();
        let mut out = Vec::new();
        store
            .set_parameter("flash", ParamValue::Bool(true), Origin::Local, &mut out)
            .unwrap();
        assert_eq!(out, vec![osc("flash", vec![ParamValue::Bool(false)])]);
        assert_eq!(store.value("flash"), Some(&ParamValue::Null));
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn save_without_index_is_rejected_before_the_bridge() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        assert_eq!(store.save_preset(None, &mut out), Err(StoreError::NoActivePreset));
        assert!(out.is_empty());
        assert!(store.presets().is_empty());
    }

    #[test]
    fn save_snapshot_is_independent_of_later_edits() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("volume", ParamValue::Number(0.8), Origin::Local, &mut out)
            .unwrap();
        store.save_preset(Some(0), &mut out).unwrap();
        store
            .set_parameter("volume", ParamValue::Number(0.1), Origin::Local, &mut out)
            .unwrap();

        let saved = store.presets().get(0).unwrap();
        assert_eq!(saved.get("volume"), Some(&ParamValue::Number(0.8)));
        assert_eq!(store.current_preset(), Some(0));
        assert!(matches!(out[1], ClientCommand::Save { .. }));
    }

    #[test]
    fn scenario_save_edit_load() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("volume", ParamValue::Number(0.8), Origin::Local, &mut out)
            .unwrap();
        store.save_preset(Some(0), &mut out).unwrap();

        let expected: Preset = [
            ("mode".to_string(), ParamValue::Text("a".into())),
            ("volume".to_string(), ParamValue::Number(0.8)),
        ]
        .into_iter()
        .collect();
        assert_eq!(store.presets().get(0), Some(&expected));

        store
            .set_parameter("volume", ParamValue::Number(0.1), Origin::Local, &mut out)
            .unwrap();
        out.clear();
        store.load_preset(0, &mut out);

        assert_eq!(store.value("volume"), Some(&ParamValue::Number(0.8)));
        assert_eq!(store.current_preset(), Some(0));
        assert_eq!(
            out,
            vec![
                osc("mode", vec![ParamValue::Text("a".into())]),
                osc("volume", vec![ParamValue::Number(0.8)]),
            ]
        );
    }

    #[test]
    fn loading_an_empty_slot_keeps_values_and_moves_pointer() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store
            .set_parameter("volume", ParamValue::Number(0.3), Origin::Local, &mut out)
            .unwrap();
        let before = store.preset().clone();
        out.clear();

        store.load_preset(7, &mut out);
        assert_eq!(store.preset(), &before);
        assert_eq!(store.current_preset(), Some(7));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn loading_an_old_preset_keeps_live_values_for_missing_keys() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        let old: Preset = [
            ("volume".to_string(), ParamValue::Number(0.9)),
            ("retired".to_string(), ParamValue::Bool(true)),
        ]
        .into_iter()
        .collect();
        store.modify(|presets, _| presets.insert(2, old));
        store
            .set_parameter("mode", ParamValue::Text("b".into()), Origin::Local, &mut out)
            .unwrap();

        store.load_preset(2, &mut out);
        assert_eq!(store.value("volume"), Some(&ParamValue::Number(0.9)));
        assert_eq!(store.value("mode"), Some(&ParamValue::Text("b".into())));
        assert_eq!(store.value("retired"), None);
    }

    #[test]
    fn delete_is_idempotent_and_always_persists() {
        let mut store = Store::new(schema());
        let mut out = Vec::new();
        store.save_preset(Some(3), &mut out).unwrap();
        store.save_preset(Some(4), &mut out).unwrap();
        out.clear();

        store.delete_preset(3, &mut out);
        store.delete_preset(3, &mut out);
        assert_eq!(store.presets().indices().collect::<Vec<_>>(), vec![4]);
        assert_eq!(out.len(), 2);
        for cmd in &out {
            match cmd {
                ClientCommand::Save { presets } => assert_eq!(presets, store.presets()),
                other => panic!("expected save, got {other:?}"),
            }
        }
        // The pointer is a hint and survives deletion.
        assert_eq!(store.current_preset(), Some(4));
    }

    #[test]
    fn hydration_replaces_presets_silently() {
        let mut store = Store::new(schema());
        let mut bank = PresetBank::new();
        bank.insert(5, store.preset().clone());
        let live = store.preset().clone();

        store.set_state(StatePatch {
            presets: Some(bank.clone()),
            current_preset: None,
        });
        assert_eq!(store.presets(), &bank);
        assert_eq!(store.preset(), &live);
    }

    proptest! {
        #[test]
        fn remote_edits_never_emit(v in -10.0f64..10.0, pick in any::<bool>()) {
            let mut store = Store::new(schema());
            let mut out = Vec::new();
            let (name, value) = if pick {
                ("volume", ParamValue::Number(v))
            } else {
                ("mode", ParamValue::Text(format!("{v}")))
            };
            let _ = store.set_parameter(name, value, Origin::Remote, &mut out);
            prop_assert!(out.is_empty());
        }

        #[test]
        fn accepted_local_slider_edits_emit_exactly_once(v in -10.0f64..10.0) {
            let mut store = Store::new(schema());
            let mut out = Vec::new();
            store.set_parameter("volume", ParamValue::Number(v), Origin::Local, &mut out).unwrap();
            prop_assert_eq!(out.len(), 1);
            prop_assert_eq!(store.value("volume"), Some(&ParamValue::Number(v.clamp(0.0, 1.0))));
        }

        #[test]
        fn save_then_load_round_trips(v in 0.0f64..=1.0, later in 0.0f64..=1.0, slot in 0u32..16) {
            let mut store = Store::new(schema());
            let mut out = Vec::new();
            store.set_parameter("volume", ParamValue::Number(v), Origin::Local, &mut out).unwrap();
            store.save_preset(Some(slot), &mut out).unwrap();
            let at_save = store.preset().clone();
            store.set_parameter("volume", ParamValue::Number(later), Origin::Local, &mut out).unwrap();
            store.load_preset(slot, &mut out);
            prop_assert_eq!(store.preset(), &at_save);
        }
    }
}
