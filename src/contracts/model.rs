use serde_json::{Map, Value, json};
use thiserror::Error;

use super::SCHEMA_VERSION;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("{record} is not a JSON object")]
    NotAnObject { record: &'static str },
    #[error("{record} is not a JSON list")]
    NotAList { record: &'static str },
    #[error("{record} missing required field {field}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },
    #[error("{record} field {field} must be {expected}")]
    WrongType {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
    },
    #[error("{record}: {detail}")]
    Invariant {
        record: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, ContractError>;

/// One high-intensity stretch inside an analyzed clip.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySegment {
    pub start: f64,
    pub end: f64,
    pub intensity_score: f64,
    pub spike_count: usize,
    pub cluster_density: f64,
    pub ding_hit_count: usize,
    pub max_ding_confidence: f64,
}

impl IntensitySegment {
    const RECORD: &'static str = "intensity segment";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let start = number_field(map, Self::RECORD, "start")?;
        let end = number_field(map, Self::RECORD, "end")?;
        if end < start {
            return Err(ContractError::Invariant {
                record: Self::RECORD,
                detail: format!("end {} precedes start {}", end, start),
            });
        }
        Ok(Self {
            start,
            end,
            intensity_score: number_field(map, Self::RECORD, "intensity_score")?,
            spike_count: count_field_or(map, Self::RECORD, "spike_count", 0)?,
            cluster_density: number_field_or(map, Self::RECORD, "cluster_density", 0.0)?,
            ding_hit_count: count_field_or(map, Self::RECORD, "ding_hit_count", 0)?,
            max_ding_confidence: number_field_or(map, Self::RECORD, "max_ding_confidence", 0.0)?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "start": self.start,
            "end": self.end,
            "intensity_score": self.intensity_score,
            "spike_count": self.spike_count,
            "cluster_density": self.cluster_density,
            "ding_hit_count": self.ding_hit_count,
            "max_ding_confidence": self.max_ding_confidence,
        })
    }

    /// Segment duration in seconds, clamped at zero.
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Per-clip intensity analysis produced by the clip analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipAnalysis {
    pub schema_version: String,
    pub clip_id: String,
    pub duration: f64,
    pub intensity_segments: Vec<IntensitySegment>,
}

impl ClipAnalysis {
    const RECORD: &'static str = "clip analysis";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let intensity_segments = match list_field(map, Self::RECORD, "intensity_segments")? {
            Some(items) => items
                .iter()
                .map(IntensitySegment::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            schema_version: version_field(map, Self::RECORD)?,
            clip_id: string_field(map, Self::RECORD, "clip_id")?,
            duration: number_field(map, Self::RECORD, "duration")?,
            intensity_segments,
        })
    }

    /// Decode the clip-analysis artifact, a JSON list of per-clip records.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>> {
        let items = value.as_array().ok_or(ContractError::NotAList {
            record: "clip analysis artifact",
        })?;
        items.iter().map(Self::from_value).collect()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": self.schema_version,
            "clip_id": self.clip_id,
            "duration": self.duration,
            "intensity_segments": self.intensity_segments
                .iter()
                .map(IntensitySegment::to_value)
                .collect::<Vec<_>>(),
        })
    }
}

/// Beat salience at one instant of the song.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatStrengthPoint {
    pub time: f64,
    pub strength: f64,
}

impl BeatStrengthPoint {
    const RECORD: &'static str = "beat strength point";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        Ok(Self {
            time: number_field(map, Self::RECORD, "time")?,
            strength: number_field(map, Self::RECORD, "strength")?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({ "time": self.time, "strength": self.strength })
    }
}

/// A high-energy stretch of the song (a drop).
#[derive(Debug, Clone, PartialEq)]
pub struct DropSection {
    pub start: f64,
    pub end: f64,
    pub energy_score: f64,
}

impl DropSection {
    const RECORD: &'static str = "drop section";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let start = number_field(map, Self::RECORD, "start")?;
        let end = number_field(map, Self::RECORD, "end")?;
        if end < start {
            return Err(ContractError::Invariant {
                record: Self::RECORD,
                detail: format!("end {} precedes start {}", end, start),
            });
        }
        Ok(Self {
            start,
            end,
            energy_score: number_field_or(map, Self::RECORD, "energy_score", 0.0)?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "start": self.start,
            "end": self.end,
            "energy_score": self.energy_score,
        })
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Whole-song beat and energy analysis produced by the music analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicAnalysis {
    pub schema_version: String,
    pub song: String,
    pub song_duration: f64,
    pub tempo: f64,
    pub beat_count: usize,
    pub beats: Vec<f64>,
    pub beat_strength: Vec<BeatStrengthPoint>,
    pub drop_sections: Vec<DropSection>,
}

impl MusicAnalysis {
    const RECORD: &'static str = "music analysis";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let beats = match list_field(map, Self::RECORD, "beats")? {
            Some(items) => items
                .iter()
                .map(|item| coerce_number(item, Self::RECORD, "beats"))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let beat_strength = match list_field(map, Self::RECORD, "beat_strength")? {
            Some(items) => items
                .iter()
                .map(BeatStrengthPoint::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let drop_sections = match list_field(map, Self::RECORD, "drop_sections")? {
            Some(items) => items
                .iter()
                .map(DropSection::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        // beat_count defaults to the decoded beat list length; an explicit
        // value is kept even when it disagrees.
        let beat_count = count_field_or(map, Self::RECORD, "beat_count", beats.len())?;
        Ok(Self {
            schema_version: version_field(map, Self::RECORD)?,
            song: string_field(map, Self::RECORD, "song")?,
            song_duration: number_field(map, Self::RECORD, "song_duration")?,
            tempo: number_field(map, Self::RECORD, "tempo")?,
            beat_count,
            beats,
            beat_strength,
            drop_sections,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": self.schema_version,
            "song": self.song,
            "song_duration": self.song_duration,
            "tempo": self.tempo,
            "beat_count": self.beat_count,
            "beats": self.beats,
            "beat_strength": self.beat_strength
                .iter()
                .map(BeatStrengthPoint::to_value)
                .collect::<Vec<_>>(),
            "drop_sections": self.drop_sections
                .iter()
                .map(DropSection::to_value)
                .collect::<Vec<_>>(),
        })
    }
}

/// One slot of the planned montage: a clip window laid onto a song window.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub clip_id: String,
    pub clip_start: f64,
    pub clip_end: f64,
    pub song_start: f64,
    pub song_end: f64,
}

impl TimelineEntry {
    const RECORD: &'static str = "timeline entry";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let clip_start = number_field(map, Self::RECORD, "clip_start")?;
        let clip_end = number_field(map, Self::RECORD, "clip_end")?;
        let song_start = number_field(map, Self::RECORD, "song_start")?;
        let song_end = number_field(map, Self::RECORD, "song_end")?;
        if clip_end < clip_start {
            return Err(ContractError::Invariant {
                record: Self::RECORD,
                detail: format!("clip_end {} precedes clip_start {}", clip_end, clip_start),
            });
        }
        if song_end < song_start {
            return Err(ContractError::Invariant {
                record: Self::RECORD,
                detail: format!("song_end {} precedes song_start {}", song_end, song_start),
            });
        }
        Ok(Self {
            clip_id: string_field(map, Self::RECORD, "clip_id")?,
            clip_start,
            clip_end,
            song_start,
            song_end,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "clip_id": self.clip_id,
            "clip_start": self.clip_start,
            "clip_end": self.clip_end,
            "song_start": self.song_start,
            "song_end": self.song_end,
        })
    }
}

/// The full planned montage.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    pub schema_version: String,
    pub timeline: Vec<TimelineEntry>,
    pub total_duration: f64,
}

impl TimelinePlan {
    const RECORD: &'static str = "timeline plan";

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_object(value, Self::RECORD)?;
        let timeline = match list_field(map, Self::RECORD, "timeline")? {
            Some(items) => items
                .iter()
                .map(TimelineEntry::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            schema_version: version_field(map, Self::RECORD)?,
            timeline,
            total_duration: number_field(map, Self::RECORD, "total_duration")?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": self.schema_version,
            "timeline": self.timeline
                .iter()
                .map(TimelineEntry::to_value)
                .collect::<Vec<_>>(),
            "total_duration": self.total_duration,
        })
    }
}

// === Decode helpers ===
//
// Incoming payloads are loosely typed: producers have historically emitted
// numbers as strings and counts as floats. Coercion is explicit and bounded:
// numbers accept numeric strings (finite only), counts accept whole values
// that fit an unsigned integer, strings accept rendered numbers. Anything
// else is a wrong-type error naming the field.

fn as_object<'a>(value: &'a Value, record: &'static str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or(ContractError::NotAnObject { record })
}

fn coerce_number(value: &Value, record: &'static str, field: &'static str) -> Result<f64> {
    let wrong = ContractError::WrongType {
        record,
        field,
        expected: "a number",
    };
    match value {
        Value::Number(n) => n.as_f64().ok_or(wrong),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or(wrong),
        _ => Err(wrong),
    }
}

fn coerce_count(value: &Value, record: &'static str, field: &'static str) -> Result<usize> {
    let wrong = ContractError::WrongType {
        record,
        field,
        expected: "a non-negative integer",
    };
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                usize::try_from(u).map_err(|_| wrong)
            } else if let Some(f) = n.as_f64() {
                // Whole-valued floats are truncated like the producers expect.
                if f.is_finite() && f >= 0.0 {
                    Ok(f as usize)
                } else {
                    Err(wrong)
                }
            } else {
                Err(wrong)
            }
        }
        Value::String(s) => s.trim().parse::<usize>().map_err(|_| wrong),
        _ => Err(wrong),
    }
}

fn coerce_string(value: &Value, record: &'static str, field: &'static str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ContractError::WrongType {
            record,
            field,
            expected: "a string",
        }),
    }
}

fn number_field(map: &Map<String, Value>, record: &'static str, field: &'static str) -> Result<f64> {
    let value = map
        .get(field)
        .ok_or(ContractError::MissingField { record, field })?;
    coerce_number(value, record, field)
}

fn number_field_or(
    map: &Map<String, Value>,
    record: &'static str,
    field: &'static str,
    default: f64,
) -> Result<f64> {
    match map.get(field) {
        Some(value) => coerce_number(value, record, field),
        None => Ok(default),
    }
}

fn count_field_or(
    map: &Map<String, Value>,
    record: &'static str,
    field: &'static str,
    default: usize,
) -> Result<usize> {
    match map.get(field) {
        Some(value) => coerce_count(value, record, field),
        None => Ok(default),
    }
}

fn string_field(
    map: &Map<String, Value>,
    record: &'static str,
    field: &'static str,
) -> Result<String> {
    let value = map
        .get(field)
        .ok_or(ContractError::MissingField { record, field })?;
    coerce_string(value, record, field)
}

fn version_field(map: &Map<String, Value>, record: &'static str) -> Result<String> {
    match map.get("schema_version") {
        Some(value) => coerce_string(value, record, "schema_version"),
        None => Ok(SCHEMA_VERSION.to_string()),
    }
}

fn list_field<'a>(
    map: &'a Map<String, Value>,
    record: &'static str,
    field: &'static str,
) -> Result<Option<&'a Vec<Value>>> {
    match map.get(field) {
        Some(value) => value
            .as_array()
            .map(Some)
            .ok_or(ContractError::WrongType {
                record,
                field,
                expected: "a list",
            }),
        None => Ok(None),
    }
}
