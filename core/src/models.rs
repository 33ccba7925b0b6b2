use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityCategory {
    Feeding,
    Diaper,
    Sleep,
    Growth,
    Other,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 5] = [
        ActivityCategory::Feeding,
        ActivityCategory::Diaper,
        ActivityCategory::Sleep,
        ActivityCategory::Growth,
        ActivityCategory::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feeding => "FEEDING",
            Self::Diaper => "DIAPER",
            Self::Sleep => "SLEEP",
            Self::Growth => "GROWTH",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
                anyhow::anyhow!(
                    "Invalid category '{s}'. Must be one of: {}",
                    names.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityType {
    pub id: String,
    pub name: String,
    pub category: ActivityCategory,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub type_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Volume in ml, duration in minutes, weight in kg, etc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Full-state snapshot exchanged with the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
    pub entries: Vec<ActivityEntry>,
    pub types: Vec<ActivityType>,
    #[serde(default)]
    pub baby_name: String,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    pub summary: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewActivityType {
    pub name: String,
    pub category: ActivityCategory,
    pub icon: String,
    pub color: String,
    pub unit: Option<String>,
}

/// One selected type within a batch log; all items share the batch timestamp.
#[derive(Debug, Clone, Default)]
pub struct BatchItem {
    pub type_id: String,
    pub value: Option<f64>,
    pub note: Option<String>,
}

pub const ICON_CHOICES: &[&str] = &[
    "fa-baby",
    "fa-bottle-water",
    "fa-cookie",
    "fa-shower",
    "fa-stethoscope",
    "fa-syringe",
    "fa-hand-holding-heart",
    "fa-scale-balanced",
    "fa-play",
    "fa-walkie-talkie",
];

pub const COLOR_CHOICES: &[&str] = &[
    "bg-emerald-100 text-emerald-600",
    "bg-cyan-100 text-cyan-600",
    "bg-violet-100 text-violet-600",
    "bg-orange-100 text-orange-600",
    "bg-teal-100 text-teal-600",
];

pub const DEFAULT_TYPE_IDS: &[&str] = &["pee", "poop", "breast_feed", "cup_feed", "sleep", "weight"];

fn default_type(
    id: &str,
    name: &str,
    category: ActivityCategory,
    icon: &str,
    unit: Option<&str>,
    color: &str,
) -> ActivityType {
    ActivityType {
        id: id.to_string(),
        name: name.to_string(),
        category,
        icon: icon.to_string(),
        unit: unit.map(str::to_string),
        color: color.to_string(),
    }
}

#[must_use]
pub fn default_activity_types() -> Vec<ActivityType> {
    use ActivityCategory::{Diaper, Feeding, Growth, Sleep};
    vec![
        default_type("pee", "Pee", Diaper, "fa-droplet", None, "bg-yellow-100 text-yellow-600"),
        default_type("poop", "Poop", Diaper, "fa-poop", None, "bg-amber-100 text-amber-700"),
        default_type(
            "breast_feed",
            "Breast Feed",
            Feeding,
            "fa-person-breastfeeding",
            Some("min"),
            "bg-rose-100 text-rose-600",
        ),
        default_type(
            "cup_feed",
            "Cup Feed",
            Feeding,
            "fa-glass-water",
            Some("ml"),
            "bg-blue-100 text-blue-600",
        ),
        default_type("sleep", "Sleep", Sleep, "fa-moon", Some("min"), "bg-indigo-100 text-indigo-600"),
        default_type(
            "weight",
            "Weight",
            Growth,
            "fa-weight-scale",
            Some("kg"),
            "bg-emerald-100 text-emerald-600",
        ),
    ]
}

#[must_use]
pub fn is_default_type(id: &str) -> bool {
    DEFAULT_TYPE_IDS.contains(&id)
}

/// Type id derived from the display name: lowercase, whitespace runs
/// collapsed to `_`, suffixed with the creation time in millis.
#[must_use]
pub fn type_id_for(name: &str, created_ms: i64) -> String {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{slug}_{created_ms}")
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Nine random base-36 characters. Collisions are possible and not handled.
#[must_use]
pub fn generate_entry_id() -> String {
    let mut rng = rand::rng();
    (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

pub fn validate_icon(icon: &str) -> Result<String> {
    if ICON_CHOICES.contains(&icon) {
        Ok(icon.to_string())
    } else {
        bail!("Invalid icon '{icon}'. Must be one of: {}", ICON_CHOICES.join(", "))
    }
}

pub fn validate_color(color: &str) -> Result<String> {
    if COLOR_CHOICES.contains(&color) {
        Ok(color.to_string())
    } else {
        bail!(
            "Invalid color '{color}'. Must be one of: {}",
            COLOR_CHOICES.join(", ")
        )
    }
}

pub fn validate_new_type(new_type: &NewActivityType) -> Result<()> {
    if new_type.name.trim().is_empty() {
        bail!("Activity name must not be empty");
    }
    if new_type.name.chars().any(char::is_control) {
        bail!("Activity name must not contain control characters");
    }
    if new_type
        .unit
        .as_deref()
        .is_some_and(|u| u.chars().any(char::is_control))
    {
        bail!("Unit must not contain control characters");
    }
    validate_icon(&new_type.icon)?;
    validate_color(&new_type.color)?;
    Ok(())
}

/// Values are stored as JSON numbers, so NaN and infinities are rejected.
pub fn validate_entry_value(value: Option<f64>) -> Result<()> {
    if value.is_some_and(|v| !v.is_finite()) {
        bail!("Value must be a finite number");
    }
    Ok(())
}

#[must_use]
pub fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[must_use]
pub fn normalize_unit(unit: Option<&str>) -> Option<String> {
    unit.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}
