//! Edit mode resolution

use serde::{Deserialize, Serialize};

/// Whether the portal may edit the app's functions, and why not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionAppEditMode {
    ReadWrite,
    ReadOnly,
    ReadWriteSourceControlled,
    ReadOnlySourceControlled,
    ReadOnlySlots,
    ReadOnlyVSGenerated,
}

impl FunctionAppEditMode {
    pub fn is_read_only(self) -> bool {
        !matches!(
            self,
            FunctionAppEditMode::ReadWrite | FunctionAppEditMode::ReadWriteSourceControlled
        )
    }
}

/// Parsed `FUNCTION_APP_EDIT_MODE` value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditModeSetting {
    #[default]
    Unset,
    ReadWrite,
    ReadOnly,
    /// Present but neither `readwrite` nor `readonly`
    Unrecognized,
}

impl EditModeSetting {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            None => EditModeSetting::Unset,
            Some(v) if v.is_empty() => EditModeSetting::Unset,
            Some(v) if v == "readwrite" => EditModeSetting::ReadWrite,
            Some(v) if v == "readonly" => EditModeSetting::ReadOnly,
            Some(_) => EditModeSetting::Unrecognized,
        }
    }
}

/// Inputs of the edit-mode decision
///
/// `Default` is the all-unknown state used when an input could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditModeFacts {
    pub source_controlled: bool,
    pub setting: EditModeSetting,
    pub has_slots: bool,
    /// Some function was generated by tooling (`generatedBy` is set)
    pub vs_generated: bool,
}

pub fn resolve_edit_mode(facts: &EditModeFacts) -> FunctionAppEditMode {
    use EditModeSetting as Setting;
    use FunctionAppEditMode as Mode;

    match facts.setting {
        Setting::ReadOnly | Setting::Unset if facts.vs_generated => Mode::ReadOnlyVSGenerated,
        Setting::ReadWrite if facts.source_controlled => Mode::ReadWriteSourceControlled,
        Setting::ReadWrite => Mode::ReadWrite,
        Setting::ReadOnly if facts.source_controlled => Mode::ReadOnlySourceControlled,
        Setting::ReadOnly => Mode::ReadOnly,
        Setting::Unset | Setting::Unrecognized if facts.source_controlled => {
            Mode::ReadOnlySourceControlled
        }
        Setting::Unset | Setting::Unrecognized if facts.has_slots => Mode::ReadOnlySlots,
        Setting::Unset | Setting::Unrecognized => Mode::ReadWrite,
    }
}
