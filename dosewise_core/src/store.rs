//! Profile persistence with file locking and schema migration.
//!
//! All profiles live in one JSON document. Reads take a shared lock, writes
//! go through a locked temp file that is renamed over the original.

use crate::{DoseQuantity, Error, Profile, Result};
use fs2::FileExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Unit assumed for legacy numeric doses
const LEGACY_DOSE_UNIT: &str = "tablet";

/// Everything persisted by the store
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreDocument {
    pub schema_version: u32,
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

impl StoreDocument {
    /// Decode a stored document, migrating older schemas first.
    ///
    /// Profiles that fail to decode are logged and skipped.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut root = migrate(value)?;

        let mut document = StoreDocument::default();
        let profiles = match root.get_mut("profiles").map(Value::take) {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(Error::Store("\"profiles\" must be an object".into())),
        };

        for (id, raw) in profiles {
            match serde_json::from_value::<Profile>(raw) {
                Ok(profile) => {
                    document.profiles.insert(id, profile);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable profile {}: {}", id, e);
                }
            }
        }
        Ok(document)
    }

    pub fn add_profile(&mut self, profile: Profile) {
        self.profiles.insert(profile.profile_id.clone(), profile);
    }

    /// Find a profile by id, or by case-insensitive name
    pub fn profile(&self, id_or_name: &str) -> Option<&Profile> {
        let id = self.resolve_id(id_or_name)?;
        self.profiles.get(&id)
    }

    pub fn profile_mut(&mut self, id_or_name: &str) -> Option<&mut Profile> {
        let id = self.resolve_id(id_or_name)?;
        self.profiles.get_mut(&id)
    }

    fn resolve_id(&self, id_or_name: &str) -> Option<String> {
        if self.profiles.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        self.profiles
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(id_or_name))
            .map(|p| p.profile_id.clone())
    }
}

/// File-backed profile store
#[derive(Clone, Debug)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document with shared locking
    ///
    /// Returns an empty document if the file doesn't exist. A file that is
    /// not valid JSON is an error so that it is never silently overwritten.
    pub fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            tracing::info!("No store file at {:?}, starting empty", self.path);
            return Ok(StoreDocument::default());
        }

        let file = File::open(&self.path)?;

        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read = reader.read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let value: Value = serde_json::from_str(&contents).map_err(|e| {
            Error::Store(format!("Failed to parse store file {:?}: {}", self.path, e))
        })?;
        let document = StoreDocument::from_value(value)?;
        tracing::debug!(
            "Loaded {} profile(s) from {:?}",
            document.profiles.len(),
            self.path
        );
        Ok(document)
    }

    /// Save the document with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, document: &StoreDocument) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Store(format!("store path {:?} has no parent", self.path)))?;
        std::fs::create_dir_all(parent)?;

        // Create unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(parent)?;

        // Acquire exclusive lock on the temp file to serialize concurrent writers
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        // Atomically replace old store file
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved store to {:?}", self.path);
        Ok(())
    }

    /// Load the document, modify it, and save it back
    pub fn update<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreDocument) -> Result<T>,
    {
        let mut document = self.load()?;
        let output = f(&mut document)?;
        self.save(&document)?;
        Ok(output)
    }
}

// ============================================================================
// Migration
// ============================================================================

fn migrate(mut root: Value) -> Result<Value> {
    let Some(object) = root.as_object_mut() else {
        return Err(Error::Store("store document must be a JSON object".into()));
    };

    let version = object
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version > SCHEMA_VERSION as u64 {
        return Err(Error::Store(format!(
            "store schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    if version < 1 {
        tracing::info!("Migrating store from schema v{} to v1", version);
        if let Some(Value::Object(profiles)) = object.get_mut("profiles") {
            for profile in profiles.values_mut() {
                if let Some(profile) = profile.as_object_mut() {
                    migrate_profile_v1(profile)?;
                }
            }
        }
    }

    object.insert("schema_version".into(), Value::from(SCHEMA_VERSION));
    Ok(root)
}

/// Move medication-level doses into the schedule and backfill log doses
fn migrate_profile_v1(profile: &mut Map<String, Value>) -> Result<()> {
    let mut first_default: Option<Value> = None;

    if let Some(Value::Object(medications)) = profile.get_mut("medications") {
        for medication in medications.values_mut() {
            let Some(medication) = medication.as_object_mut() else {
                continue;
            };
            let legacy_dose = medication.remove("dose");

            let Some(Value::Object(schedule)) = medication.get_mut("schedule") else {
                continue;
            };

            if let Some(dose) = legacy_dose.filter(|d| !d.is_null()) {
                if !schedule.contains_key("default_dose") {
                    schedule.insert("default_dose".into(), legacy_dose_value(&dose)?);
                }
            }

            if let Some(Value::Object(slot_doses)) = schedule.get_mut("slot_doses") {
                for dose in slot_doses.values_mut() {
                    *dose = legacy_dose_value(dose)?;
                }
            }

            if first_default.is_none() {
                first_default = schedule.get("default_dose").cloned();
            }
        }
    }

    let fallback = match first_default {
        Some(dose) => dose,
        None => serde_json::to_value(DoseQuantity::whole(1, LEGACY_DOSE_UNIT))?,
    };

    if let Some(Value::Array(logs)) = profile.get_mut("logs") {
        for log in logs.iter_mut() {
            if let Some(log) = log.as_object_mut() {
                let missing = log.get("dose").map_or(true, Value::is_null);
                if missing {
                    log.insert("dose".into(), fallback.clone());
                }
            }
        }
    }

    Ok(())
}

/// Convert a legacy numeric dose into a dose record.
///
/// Integers become whole tablets, other numbers are rounded to quarters.
/// Values that are already records pass through unchanged.
fn legacy_dose_value(value: &Value) -> Result<Value> {
    let dose = match value {
        Value::Number(n) => {
            if let Some(whole) = n.as_u64() {
                DoseQuantity::whole(whole, LEGACY_DOSE_UNIT)
            } else {
                let amount = n.as_f64().unwrap_or(0.0);
                let quarters = (amount * 4.0).round() as i64;
                DoseQuantity::normalize(quarters, 4, LEGACY_DOSE_UNIT)
                    .map_err(|e| Error::Store(format!("legacy dose {}: {}", n, e)))?
            }
        }
        Value::String(s) => DoseQuantity::parse(s, LEGACY_DOSE_UNIT)
            .map_err(|e| Error::Store(format!("legacy dose {:?}: {}", s, e)))?,
        other => return Ok(other.clone()),
    };
    Ok(serde_json::to_value(dose)?)
}
