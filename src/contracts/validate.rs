use std::fmt;

use serde_json::{Map, Value, json};
use thiserror::Error;

use super::SCHEMA_VERSION;

/// The three JSON artifacts exchanged across stage boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ClipAnalysis,
    MusicAnalysis,
    Timeline,
}

impl ArtifactKind {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::ClipAnalysis => "clip-analysis",
            Self::MusicAnalysis => "music-analysis",
            Self::Timeline => "timeline",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ClipAnalysis => "clip analysis",
            Self::MusicAnalysis => "music analysis",
            Self::Timeline => "timeline",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{kind} payload must be {expected}")]
    WrongShape {
        kind: ArtifactKind,
        expected: &'static str,
    },
    #[error("{kind}{} is not a JSON object", item(.index))]
    ItemNotObject {
        kind: ArtifactKind,
        index: Option<usize>,
    },
    #[error("{kind}{} schema_version must be {expected}, found {}", item(.index), self::found(.found))]
    SchemaVersionMismatch {
        kind: ArtifactKind,
        index: Option<usize>,
        expected: &'static str,
        found: Option<String>,
    },
    #[error("{kind}{} missing required field {field}", item(.index))]
    MissingField {
        kind: ArtifactKind,
        index: Option<usize>,
        field: &'static str,
    },
    #[error("{kind}{} missing required field {field} (or legacy {alias})", item(.index))]
    MissingAliased {
        kind: ArtifactKind,
        index: Option<usize>,
        field: &'static str,
        alias: &'static str,
    },
    #[error("{kind}{} field {field} must be a list", item(.index))]
    FieldNotAList {
        kind: ArtifactKind,
        index: Option<usize>,
        field: &'static str,
    },
    #[error("{kind}{} segment {segment} is not a JSON object", item(.index))]
    SegmentNotObject {
        kind: ArtifactKind,
        index: Option<usize>,
        segment: usize,
    },
    #[error("{kind}{} segment {segment} missing {field}", item(.index))]
    SegmentMissingField {
        kind: ArtifactKind,
        index: Option<usize>,
        segment: usize,
        field: &'static str,
    },
}

fn item(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" item {}", i),
        None => String::new(),
    }
}

fn found(found: &Option<String>) -> String {
    match found {
        Some(v) => format!("{:?}", v),
        None => "none".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Validate a payload against its artifact kind.
///
/// Strict mode pins the schema version and the full required shape; lenient
/// mode ignores the version and accepts legacy alias field names, for
/// artifacts produced by older engine checkouts. Validation never repairs a
/// payload.
pub fn validate(kind: ArtifactKind, payload: &Value, strict: bool) -> Result<()> {
    match kind {
        ArtifactKind::ClipAnalysis => validate_clip_analysis(payload, strict),
        ArtifactKind::MusicAnalysis => validate_music_analysis(payload, strict),
        ArtifactKind::Timeline => validate_timeline(payload, strict),
    }
}

pub fn validate_clip_analysis(payload: &Value, strict: bool) -> Result<()> {
    let kind = ArtifactKind::ClipAnalysis;
    let items = payload.as_array().ok_or(ValidationError::WrongShape {
        kind,
        expected: "a JSON list",
    })?;

    for (index, item) in items.iter().enumerate() {
        let index = Some(index);
        let map = item.as_object().ok_or(ValidationError::ItemNotObject { kind, index })?;

        if !strict {
            require_aliased(map, kind, index, "clip_id", "clip")?;
            continue;
        }

        check_version(map, kind, index)?;
        require(map, kind, index, "clip_id")?;
        require(map, kind, index, "duration")?;
        let segments = require_list(map, kind, index, "intensity_segments")?;
        for (seg_index, segment) in segments.iter().enumerate() {
            let seg_map = segment.as_object().ok_or(ValidationError::SegmentNotObject {
                kind,
                index,
                segment: seg_index,
            })?;
            if !seg_map.contains_key("intensity_score") {
                return Err(ValidationError::SegmentMissingField {
                    kind,
                    index,
                    segment: seg_index,
                    field: "intensity_score",
                });
            }
        }
    }
    Ok(())
}

pub fn validate_music_analysis(payload: &Value, strict: bool) -> Result<()> {
    let kind = ArtifactKind::MusicAnalysis;
    let map = payload.as_object().ok_or(ValidationError::WrongShape {
        kind,
        expected: "a JSON object",
    })?;

    if !strict {
        require(map, kind, None, "song")?;
        require_aliased(map, kind, None, "song_duration", "duration")?;
        return Ok(());
    }

    check_version(map, kind, None)?;
    for field in ["song", "song_duration", "tempo", "beats", "beat_strength", "drop_sections"] {
        require(map, kind, None, field)?;
    }
    Ok(())
}

/// Timeline structure is checked in both modes; only the schema version
/// check is strict-gated. The orchestrator finalizes this artifact itself,
/// so a structural failure here means an internal bug, not a legacy
/// producer.
pub fn validate_timeline(payload: &Value, strict: bool) -> Result<()> {
    let kind = ArtifactKind::Timeline;
    let map = payload.as_object().ok_or(ValidationError::WrongShape {
        kind,
        expected: "a JSON object",
    })?;

    if strict {
        check_version(map, kind, None)?;
    }

    let entries = require_list(map, kind, None, "timeline")?;
    require(map, kind, None, "total_duration")?;

    for (index, entry) in entries.iter().enumerate() {
        let index = Some(index);
        let entry_map = entry.as_object().ok_or(ValidationError::ItemNotObject { kind, index })?;
        for field in ["clip_id", "clip_start", "clip_end", "song_start", "song_end"] {
            require(entry_map, kind, index, field)?;
        }
    }
    Ok(())
}

/// Machine-readable structural descriptor for an artifact kind, for
/// downstream tooling and producer authors.
pub fn descriptor(kind: ArtifactKind) -> Value {
    match kind {
        ArtifactKind::ClipAnalysis => json!({
            "artifact": kind.slug(),
            "schema_version": SCHEMA_VERSION,
            "payload": "list of clip analysis objects",
            "required": ["schema_version", "clip_id", "duration", "intensity_segments"],
            "segment_required": ["start", "end", "intensity_score"],
            "segment_defaults": {
                "spike_count": 0,
                "cluster_density": 0.0,
                "ding_hit_count": 0,
                "max_ding_confidence": 0.0,
            },
            "lenient_aliases": { "clip_id": "clip" },
        }),
        ArtifactKind::MusicAnalysis => json!({
            "artifact": kind.slug(),
            "schema_version": SCHEMA_VERSION,
            "payload": "single music analysis object",
            "required": [
                "schema_version", "song", "song_duration", "tempo",
                "beats", "beat_strength", "drop_sections",
            ],
            "defaults": {
                "beat_count": "length of beats",
                "energy_score": 0.0,
            },
            "lenient_aliases": { "song_duration": "duration" },
        }),
        ArtifactKind::Timeline => json!({
            "artifact": kind.slug(),
            "schema_version": SCHEMA_VERSION,
            "payload": "single timeline object",
            "required": ["schema_version", "timeline", "total_duration"],
            "entry_required": [
                "clip_id", "clip_start", "clip_end", "song_start", "song_end",
            ],
            "lenient_aliases": {},
        }),
    }
}

fn check_version(map: &Map<String, Value>, kind: ArtifactKind, index: Option<usize>) -> Result<()> {
    let found = map.get("schema_version").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    if found.as_deref() == Some(SCHEMA_VERSION) {
        Ok(())
    } else {
        Err(ValidationError::SchemaVersionMismatch {
            kind,
            index,
            expected: SCHEMA_VERSION,
            found,
        })
    }
}

fn require(
    map: &Map<String, Value>,
    kind: ArtifactKind,
    index: Option<usize>,
    field: &'static str,
) -> Result<()> {
    if map.contains_key(field) {
        Ok(())
    } else {
        Err(ValidationError::MissingField { kind, index, field })
    }
}

fn require_aliased(
    map: &Map<String, Value>,
    kind: ArtifactKind,
    index: Option<usize>,
    field: &'static str,
    alias: &'static str,
) -> Result<()> {
    if map.contains_key(field) || map.contains_key(alias) {
        Ok(())
    } else {
        Err(ValidationError::MissingAliased { kind, index, field, alias })
    }
}

fn require_list<'a>(
    map: &'a Map<String, Value>,
    kind: ArtifactKind,
    index: Option<usize>,
    field: &'static str,
) -> Result<&'a Vec<Value>> {
    let value = map
        .get(field)
        .ok_or(ValidationError::MissingField { kind, index, field })?;
    value
        .as_array()
        .ok_or(ValidationError::FieldNotAList { kind, index, field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_clip_item() -> Value {
        json!({
            "schema_version": "2.0.0",
            "clip_id": "a.mp4",
            "duration": 12.0,
            "intensity_segments": [
                { "start": 1.0, "end": 4.0, "intensity_score": 0.8 },
            ],
        })
    }

    fn canonical_music() -> Value {
        json!({
            "schema_version": "2.0.0",
            "song": "track.mp3",
            "song_duration": 180.0,
            "tempo": 128.0,
            "beats": [0.5, 1.0],
            "beat_strength": [],
            "drop_sections": [],
        })
    }

    fn canonical_timeline() -> Value {
        json!({
            "schema_version": "2.0.0",
            "timeline": [{
                "clip_id": "clips/a.mp4",
                "clip_start": 1.0,
                "clip_end": 4.0,
                "song_start": 0.0,
                "song_end": 3.0,
            }],
            "total_duration": 3.0,
        })
    }

    #[test]
    fn test_schema_version_pinned() {
        assert_eq!(SCHEMA_VERSION, "2.0.0");
    }

    // === Clip analysis ===

    #[test]
    fn test_strict_clip_accepts_canonical() {
        let payload = json!([canonical_clip_item()]);
        assert!(validate_clip_analysis(&payload, true).is_ok());
    }

    #[test]
    fn test_strict_clip_rejects_stale_version() {
        let mut item = canonical_clip_item();
        item["schema_version"] = json!("1.0.0");
        let err = validate_clip_analysis(&json!([item]), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SchemaVersionMismatch {
                kind: ArtifactKind::ClipAnalysis,
                index: Some(0),
                expected: "2.0.0",
                found: Some("1.0.0".to_string()),
            }
        );
    }

    #[test]
    fn test_strict_clip_rejects_missing_duration() {
        let mut item = canonical_clip_item();
        item.as_object_mut().unwrap().remove("duration");
        let err = validate_clip_analysis(&json!([item]), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: ArtifactKind::ClipAnalysis,
                index: Some(0),
                field: "duration",
            }
        );
    }

    #[test]
    fn test_strict_clip_rejects_segment_without_score() {
        let mut item = canonical_clip_item();
        item["intensity_segments"] = json!([{ "start": 0.0, "end": 1.0 }]);
        let err = validate_clip_analysis(&json!([item]), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SegmentMissingField {
                kind: ArtifactKind::ClipAnalysis,
                index: Some(0),
                segment: 0,
                field: "intensity_score",
            }
        );
    }

    #[test]
    fn test_strict_clip_rejects_non_list_segments() {
        let mut item = canonical_clip_item();
        item["intensity_segments"] = json!("none");
        let err = validate_clip_analysis(&json!([item]), true).unwrap_err();
        assert!(matches!(err, ValidationError::FieldNotAList { field: "intensity_segments", .. }));
    }

    #[test]
    fn test_lenient_clip_accepts_legacy_alias() {
        let payload = json!([{ "clip": "old.mp4", "score": 0.4 }]);
        assert!(validate_clip_analysis(&payload, false).is_ok());
        assert!(validate_clip_analysis(&payload, true).is_err());
    }

    #[test]
    fn test_lenient_clip_requires_some_identity() {
        let payload = json!([{ "duration": 5.0 }]);
        let err = validate_clip_analysis(&payload, false).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingAliased {
                kind: ArtifactKind::ClipAnalysis,
                index: Some(0),
                field: "clip_id",
                alias: "clip",
            }
        );
    }

    #[test]
    fn test_clip_payload_must_be_a_list() {
        let err = validate_clip_analysis(&canonical_clip_item(), true).unwrap_err();
        assert!(matches!(err, ValidationError::WrongShape { .. }));
    }

    #[test]
    fn test_clip_item_must_be_an_object() {
        let err = validate_clip_analysis(&json!(["a.mp4"]), false).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ItemNotObject {
                kind: ArtifactKind::ClipAnalysis,
                index: Some(0),
            }
        );
    }

    // === Music analysis ===

    #[test]
    fn test_strict_music_accepts_canonical() {
        assert!(validate_music_analysis(&canonical_music(), true).is_ok());
    }

    #[test]
    fn test_strict_music_rejects_missing_tempo_lenient_accepts() {
        let mut payload = canonical_music();
        payload.as_object_mut().unwrap().remove("tempo");
        let err = validate_music_analysis(&payload, true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: ArtifactKind::MusicAnalysis,
                index: None,
                field: "tempo",
            }
        );
        assert!(validate_music_analysis(&payload, false).is_ok());
    }

    #[test]
    fn test_strict_music_rejects_version_mismatch_even_when_complete() {
        let mut payload = canonical_music();
        payload["schema_version"] = json!("3.1.0");
        assert!(validate_music_analysis(&payload, true).is_err());
        assert!(validate_music_analysis(&payload, false).is_ok());
    }

    #[test]
    fn test_lenient_music_accepts_duration_alias() {
        let payload = json!({ "song": "old.mp3", "duration": 95.0, "bpm": 120 });
        assert!(validate_music_analysis(&payload, false).is_ok());
    }

    #[test]
    fn test_lenient_music_requires_some_duration() {
        let payload = json!({ "song": "old.mp3" });
        let err = validate_music_analysis(&payload, false).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingAliased {
                kind: ArtifactKind::MusicAnalysis,
                index: None,
                field: "song_duration",
                alias: "duration",
            }
        );
    }

    #[test]
    fn test_music_payload_must_be_an_object() {
        let err = validate_music_analysis(&json!([]), false).unwrap_err();
        assert!(matches!(err, ValidationError::WrongShape { .. }));
    }

    // === Timeline ===

    #[test]
    fn test_strict_timeline_accepts_canonical() {
        assert!(validate_timeline(&canonical_timeline(), true).is_ok());
    }

    #[test]
    fn test_lenient_timeline_ignores_version_but_keeps_structure() {
        let mut payload = canonical_timeline();
        payload.as_object_mut().unwrap().remove("schema_version");
        assert!(validate_timeline(&payload, false).is_ok());

        payload["timeline"][0].as_object_mut().unwrap().remove("song_end");
        let err = validate_timeline(&payload, false).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: ArtifactKind::Timeline,
                index: Some(0),
                field: "song_end",
            }
        );
    }

    #[test]
    fn test_timeline_list_checked_before_total_duration() {
        let err = validate_timeline(&json!({ "schema_version": "2.0.0" }), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: ArtifactKind::Timeline,
                index: None,
                field: "timeline",
            }
        );
    }

    #[test]
    fn test_timeline_requires_total_duration() {
        let mut payload = canonical_timeline();
        payload.as_object_mut().unwrap().remove("total_duration");
        let err = validate_timeline(&payload, true).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { field: "total_duration", .. }));
    }

    #[test]
    fn test_timeline_entry_must_be_an_object() {
        let mut payload = canonical_timeline();
        payload["timeline"] = json!([42]);
        let err = validate_timeline(&payload, true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ItemNotObject {
                kind: ArtifactKind::Timeline,
                index: Some(0),
            }
        );
    }

    #[test]
    fn test_missing_version_reported_as_none() {
        let mut payload = canonical_music();
        payload.as_object_mut().unwrap().remove("schema_version");
        let err = validate_music_analysis(&payload, true).unwrap_err();
        assert!(err.to_string().contains("found none"));
    }

    // === Dispatch and descriptors ===

    #[test]
    fn test_validate_dispatches_by_kind() {
        assert!(validate(ArtifactKind::Timeline, &canonical_timeline(), true).is_ok());
        assert!(validate(ArtifactKind::Timeline, &canonical_music(), true).is_err());
    }

    #[test]
    fn test_descriptors_name_required_fields() {
        let desc = descriptor(ArtifactKind::Timeline);
        assert_eq!(desc["artifact"], "timeline");
        assert_eq!(desc["entry_required"].as_array().unwrap().len(), 5);

        let desc = descriptor(ArtifactKind::MusicAnalysis);
        assert_eq!(desc["lenient_aliases"]["song_duration"], "duration");
    }
}
