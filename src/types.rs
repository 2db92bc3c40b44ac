//! Core types for mocap-dl

use serde::{Deserialize, Serialize};

/// A rigged character that motion clips are retargeted onto before export.
///
/// Immutable once fetched; identity is the `id` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Remote catalog identifier
    pub id: String,
    /// Display name (used in the per-character output directory name)
    pub name: String,
    /// Remote classification (e.g. "Character"); the API has served this as
    /// both `type` and `character_type`
    #[serde(rename = "type", alias = "character_type", default)]
    pub character_type: String,
}

/// Kind of catalog entry in the animation listing.
///
/// `MotionPack` entries are container records, not downloadable clips, and
/// are excluded from processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// A single downloadable motion clip
    Motion,
    /// A container of motions; skipped by the pipeline
    MotionPack,
}

/// One catalog entry from the paginated animation listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationListing {
    /// Remote catalog identifier
    pub id: String,
    /// Display name of the clip (also the export's product name)
    pub name: String,
    /// Stable motion identifier used in the output filename
    pub motion_id: String,
    /// Motion vs. motion-pack classification (the API's `type` field)
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

/// The remote API's opaque retargeting parameter bag, returned by a detail
/// fetch as `details.gms_hash`.
///
/// `params` arrives as an ordered sequence of `(name, value)` pairs; the
/// export endpoint instead expects a single comma-joined string of the
/// values. [`GmsHash::into_export_form`] performs that flattening. All other
/// fields are carried opaquely and echoed back unchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmsHash {
    /// Ordered retargeting parameters as fetched
    pub params: Vec<(String, serde_json::Value)>,
    /// Remaining opaque fields (model id, trim, mirror, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A [`GmsHash`] with `params` flattened into the comma-joined string form
/// the export endpoint requires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportGmsHash {
    /// Comma-joined parameter values, in their original order
    pub params: String,
    /// Opaque fields echoed back unchanged
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GmsHash {
    /// Flatten `params` into the comma-joined value string the export API
    /// expects. Parameter names are dropped; order is preserved.
    pub fn into_export_form(self) -> ExportGmsHash {
        let params = self
            .params
            .iter()
            .map(|(_, value)| param_value_string(value))
            .collect::<Vec<_>>()
            .join(",");
        ExportGmsHash {
            params,
            extra: self.extra,
        }
    }
}

/// Render a parameter value the way the export endpoint expects: strings
/// unquoted, booleans capitalized (`True`/`False`, the form the endpoint has
/// always received), everything else in its JSON form.
fn param_value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(true) => "True".to_string(),
        serde_json::Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Fixed rendering preferences submitted with every export.
///
/// Binary FBX, no embedded skin, fixed frame rate, no keyframe reduction.
/// The remote API expects these as strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportPreferences {
    /// Artifact format (default: "fbx7")
    pub format: String,
    /// Whether to embed the character skin (default: "false")
    pub skin: String,
    /// Frames per second (default: "60")
    pub fps: String,
    /// Keyframe reduction level (default: "0" = none)
    pub reducekf: String,
}

impl Default for ExportPreferences {
    fn default() -> Self {
        Self {
            format: "fbx7".to_string(),
            skin: "false".to_string(),
            fps: "60".to_string(),
            reducekf: "0".to_string(),
        }
    }
}

/// Why an item was skipped without touching the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Listing is a motion-pack container, not a downloadable clip
    MotionPack,
    /// Destination file already exists on disk
    FileExists,
    /// Filename already recorded in the harvest state for this character
    AlreadyRecorded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MotionPack => write!(f, "motion pack"),
            SkipReason::FileExists => write!(f, "file exists"),
            SkipReason::AlreadyRecorded => write!(f, "already recorded"),
        }
    }
}

/// Terminal result of processing one animation for one character.
///
/// The item processor never lets an error escape to the dispatcher; every
/// item settles into exactly one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Artifact downloaded and recorded in the harvest state
    Completed(String),
    /// No-op short-circuit; no remote calls were made
    Skipped(SkipReason),
    /// Terminal failure; a failure record was written for triage
    Failed(String),
}

/// Progress events broadcast by the [`Harvester`](crate::Harvester).
///
/// Subscribe via [`Harvester::subscribe`](crate::Harvester::subscribe);
/// consumers that fall behind lose oldest events (broadcast semantics).
#[derive(Clone, Debug)]
pub enum Event {
    /// Started processing a character's animation catalog
    CharacterStarted {
        /// Character id
        character_id: String,
        /// Character display name
        name: String,
    },
    /// Fetched one page of the animation catalog
    PageFetched {
        /// 1-based page number
        page: usize,
        /// Listings on this page
        count: usize,
    },
    /// One animation finished with an outcome
    ItemSettled {
        /// Character id the item was processed for
        character_id: String,
        /// Animation display name
        animation: String,
        /// Terminal outcome
        outcome: ItemOutcome,
    },
    /// All submitted items for a character have settled
    CharacterCompleted {
        /// Character id
        character_id: String,
        /// Number of items submitted for this character
        submitted: usize,
    },
}

/// Characters the filesystem cannot (or should not) take in a filename.
const INVALID_FILENAME_CHARS: [char; 10] = ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Replace filesystem-hostile characters with `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Deterministic output filename for one `(animation, character)` pair:
/// `sanitize(name)_motion_id_character_id.fbx`.
///
/// The state store and the on-disk tree agree on identity through this
/// function alone; it must stay pure.
pub fn output_filename(name: &str, motion_id: &str, character_id: &str) -> String {
    format!("{}_{motion_id}_{character_id}.fbx", sanitize_name(name))
}

/// Per-character output directory name: `sanitize(name)_id`.
pub fn character_dir_name(character: &Character) -> String {
    format!("{}_{}", sanitize_name(&character.name), character.id)
}
