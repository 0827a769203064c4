//! Dosage form metadata.
//!
//! The registry is immutable and built once on first use; callers read it
//! through [`dosage_form_info`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Physical form a medication is administered in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DosageForm {
    #[default]
    Tablet,
    Capsule,
    Injection,
    Inhaler,
    Drops,
    Liquid,
    Cream,
    Patch,
    NasalSpray,
    Suppository,
    Powder,
    Other,
}

impl DosageForm {
    pub const ALL: [DosageForm; 12] = [
        DosageForm::Tablet,
        DosageForm::Capsule,
        DosageForm::Injection,
        DosageForm::Inhaler,
        DosageForm::Drops,
        DosageForm::Liquid,
        DosageForm::Cream,
        DosageForm::Patch,
        DosageForm::NasalSpray,
        DosageForm::Suppository,
        DosageForm::Powder,
        DosageForm::Other,
    ];

    /// Parse the snake_case wire name, e.g. `"nasal_spray"`
    pub fn from_name(name: &str) -> Option<DosageForm> {
        Self::ALL
            .iter()
            .copied()
            .find(|form| dosage_form_info(*form).id == name)
    }
}

/// Static description of a dosage form
#[derive(Clone, Debug)]
pub struct DosageFormInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub icon: &'static str,
    pub default_unit: &'static str,
    pub compatible_units: &'static [&'static str],
    pub supports_site_tracking: bool,
    pub supports_puff_counter: bool,
}

static REGISTRY: Lazy<HashMap<DosageForm, DosageFormInfo>> = Lazy::new(build_registry);

/// Metadata for a dosage form
pub fn dosage_form_info(form: DosageForm) -> &'static DosageFormInfo {
    // every variant is inserted by build_registry
    &REGISTRY[&form]
}

fn info(
    id: &'static str,
    display_name: &'static str,
    icon: &'static str,
    compatible_units: &'static [&'static str],
) -> DosageFormInfo {
    DosageFormInfo {
        id,
        display_name,
        icon,
        default_unit: compatible_units[0],
        compatible_units,
        supports_site_tracking: false,
        supports_puff_counter: false,
    }
}

fn build_registry() -> HashMap<DosageForm, DosageFormInfo> {
    let mut forms = HashMap::new();

    forms.insert(
        DosageForm::Tablet,
        info("tablet", "Tablet", "mdi:pill", &["tablet", "mg"]),
    );
    forms.insert(
        DosageForm::Capsule,
        info("capsule", "Capsule", "mdi:capsule", &["capsule", "mg"]),
    );
    forms.insert(
        DosageForm::Injection,
        DosageFormInfo {
            supports_site_tracking: true,
            ..info("injection", "Injection", "mdi:needle", &["ml", "units", "mg"])
        },
    );
    forms.insert(
        DosageForm::Inhaler,
        DosageFormInfo {
            supports_puff_counter: true,
            ..info("inhaler", "Inhaler", "mdi:lungs", &["puff"])
        },
    );
    forms.insert(
        DosageForm::Drops,
        info("drops", "Drops", "mdi:eyedropper", &["drop", "ml"]),
    );
    forms.insert(
        DosageForm::Liquid,
        info("liquid", "Liquid", "mdi:cup-water", &["ml"]),
    );
    forms.insert(
        DosageForm::Cream,
        info("cream", "Cream", "mdi:lotion", &["application", "g"]),
    );
    forms.insert(
        DosageForm::Patch,
        info("patch", "Patch", "mdi:bandage", &["patch"]),
    );
    forms.insert(
        DosageForm::NasalSpray,
        info("nasal_spray", "Nasal Spray", "mdi:spray", &["spray"]),
    );
    forms.insert(
        DosageForm::Suppository,
        info("suppository", "Suppository", "mdi:medication", &["suppository"]),
    );
    forms.insert(
        DosageForm::Powder,
        info("powder", "Powder", "mdi:grain", &["sachet", "g"]),
    );
    forms.insert(
        DosageForm::Other,
        info("other", "Other", "mdi:medication", &["dose"]),
    );

    forms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_form_has_info() {
        for form in DosageForm::ALL {
            let info = dosage_form_info(form);
            assert!(!info.display_name.is_empty());
            assert!(info.icon.starts_with("mdi:"));
            assert!(info.compatible_units.contains(&info.default_unit));
        }
    }

    #[test]
    fn test_ids_match_wire_names() {
        for form in DosageForm::ALL {
            let wire = serde_json::to_value(form).unwrap();
            assert_eq!(wire, serde_json::json!(dosage_form_info(form).id));
            assert_eq!(DosageForm::from_name(dosage_form_info(form).id), Some(form));
        }
        assert_eq!(DosageForm::from_name("lozenge"), None);
    }

    #[test]
    fn test_tracking_flags() {
        assert!(dosage_form_info(DosageForm::Injection).supports_site_tracking);
        assert!(dosage_form_info(DosageForm::Inhaler).supports_puff_counter);
        assert!(!dosage_form_info(DosageForm::Tablet).supports_site_tracking);
    }
}
