//! Access-restriction projection: maps a restriction definition plus a
//! record's selector/annotation state into a display value.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Externally configured access restriction. `key` names both the seed
/// selector label to test and the resulting restriction entry; each option
/// reads one annotation off the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRestrictionDef {
    pub key: String,
    pub input: InputConfig,
    #[serde(default)]
    pub options: Vec<OptionDef>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDef {
    pub key: String,
    pub input: InputConfig,
}

/// Projected restriction state. Recomputed on every call, carries no
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionValue {
    pub value: bool,
    pub options: FxHashMap<String, OptionValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub value: bool,
}

/// Project one restriction definition against a raw record.
///
/// The primary value tests `spec.seedSelector.matchLabels[key] == "true"`,
/// negated when the definition's input is inverted. Options read
/// `metadata.annotations[key]` as boolean text; an absent annotation is
/// "not applicable" and always yields false, skipping inversion.
pub fn map_access_restriction_for_input(
    def: &AccessRestrictionDef,
    resource: &Value,
) -> (String, RestrictionValue) {
    let selected = resource
        .pointer("/spec/seedSelector/matchLabels")
        .and_then(|labels| labels.get(&def.key))
        .and_then(Value::as_str)
        == Some("true");
    let value = selected != def.input.inverted;

    let annotations = resource.pointer("/metadata/annotations");
    let mut options = FxHashMap::default();
    for opt in &def.options {
        let value = match annotations.and_then(|a| a.get(&opt.key)).and_then(Value::as_str) {
            None => false,
            Some(text) => (text == "true") != opt.input.inverted,
        };
        options.insert(opt.key.clone(), OptionValue { value });
    }

    (def.key.clone(), RestrictionValue { value, options })
}
