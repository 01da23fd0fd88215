use serde_json::{Map, Value};
use thiserror::Error;

use crate::contracts::SCHEMA_VERSION;
use crate::contracts::model::{
    ClipAnalysis, ContractError, IntensitySegment, MusicAnalysis, TimelineEntry, TimelinePlan,
};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("unusable planner input: {0}")]
    Unsupported(String),
}

/// The in-process planning seam between analysis and rendering.
///
/// Planners take the raw clip-analysis and music-analysis payloads (already
/// lenient-validated by the orchestrator) and return a draft timeline. With
/// `compat_mode` set, legacy field names (`clip`, `score`, `duration`,
/// `bpm`, `high_energy_sections`) are accepted in place of their canonical
/// renames.
pub trait TimelinePlanner {
    fn build_timeline(
        &self,
        clips: &Value,
        music: &Value,
        compat_mode: bool,
    ) -> Result<TimelinePlan, PlannerError>;
}

/// Default planner: lays one slot per clip onto the song, each clip
/// contributing its most intense segment, with slot ends snapped down to
/// the beat grid. Inside a drop section the most intense remaining clip is
/// spent first instead of the next in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BeatGridPlanner;

impl TimelinePlanner for BeatGridPlanner {
    fn build_timeline(
        &self,
        clips: &Value,
        music: &Value,
        compat_mode: bool,
    ) -> Result<TimelinePlan, PlannerError> {
        let (clips, music) = if compat_mode {
            (normalize_clips(clips), normalize_music(music))
        } else {
            (clips.clone(), music.clone())
        };
        let clips = ClipAnalysis::list_from_value(&clips)?;
        let music = MusicAnalysis::from_value(&music)?;
        Ok(plan(&clips, &music))
    }
}

fn plan(clips: &[ClipAnalysis], music: &MusicAnalysis) -> TimelinePlan {
    let mut remaining: Vec<&ClipAnalysis> = clips.iter().collect();
    let mut timeline = Vec::new();
    let mut cursor = 0.0_f64;

    while !remaining.is_empty() && cursor < music.song_duration {
        let pick = if inside_drop(music, cursor) {
            index_of_peak(&remaining)
        } else {
            0
        };
        let clip = remaining.remove(pick);

        let (clip_start, clip_end) = best_window(clip);
        let span = (clip_end - clip_start).min(music.song_duration - cursor);
        let song_end = snap_to_beat(&music.beats, cursor, cursor + span);

        // A degenerate slot adds nothing; the clip is spent either way.
        if song_end > cursor {
            timeline.push(TimelineEntry {
                clip_id: clip.clip_id.clone(),
                clip_start,
                clip_end: clip_start + (song_end - cursor),
                song_start: cursor,
                song_end,
            });
            cursor = song_end;
        }
    }

    TimelinePlan {
        schema_version: SCHEMA_VERSION.to_string(),
        timeline,
        total_duration: cursor,
    }
}

fn inside_drop(music: &MusicAnalysis, time: f64) -> bool {
    music.drop_sections.iter().any(|drop| drop.contains(time))
}

/// The clip's most intense segment, earliest on ties. A clip with no
/// segments contributes its whole length.
fn best_window(clip: &ClipAnalysis) -> (f64, f64) {
    let mut best: Option<&IntensitySegment> = None;
    for segment in &clip.intensity_segments {
        match best {
            Some(current) if current.intensity_score >= segment.intensity_score => {}
            _ => best = Some(segment),
        }
    }
    match best {
        Some(segment) => (segment.start, segment.end),
        None => (0.0, clip.duration.max(0.0)),
    }
}

fn peak_intensity(clip: &ClipAnalysis) -> f64 {
    clip.intensity_segments
        .iter()
        .map(|segment| segment.intensity_score)
        .fold(0.0, f64::max)
}

fn index_of_peak(remaining: &[&ClipAnalysis]) -> usize {
    let mut best = 0;
    for (idx, clip) in remaining.iter().enumerate().skip(1) {
        if peak_intensity(clip) > peak_intensity(remaining[best]) {
            best = idx;
        }
    }
    best
}

/// Snap a slot end down to the last beat strictly inside the slot. A slot
/// containing no beat keeps its raw end.
fn snap_to_beat(beats: &[f64], start: f64, raw_end: f64) -> f64 {
    beats
        .iter()
        .copied()
        .filter(|beat| *beat > start && *beat <= raw_end)
        .fold(None, |best: Option<f64>, beat| {
            Some(match best {
                Some(b) if b >= beat => b,
                _ => beat,
            })
        })
        .unwrap_or(raw_end)
}

/// Rename a legacy key to its canonical name. A payload carrying both keeps
/// the canonical value untouched.
fn promote_alias(map: &mut Map<String, Value>, canonical: &str, alias: &str) {
    if !map.contains_key(canonical) {
        if let Some(value) = map.remove(alias) {
            map.insert(canonical.to_string(), value);
        }
    }
}

fn normalize_clips(payload: &Value) -> Value {
    let mut payload = payload.clone();
    if let Some(items) = payload.as_array_mut() {
        for item in items {
            if let Some(map) = item.as_object_mut() {
                promote_alias(map, "clip_id", "clip");
                if let Some(Value::Array(segments)) = map.get_mut("intensity_segments") {
                    for segment in segments {
                        if let Some(seg_map) = segment.as_object_mut() {
                            promote_alias(seg_map, "intensity_score", "score");
                        }
                    }
                }
            }
        }
    }
    payload
}

fn normalize_music(payload: &Value) -> Value {
    let mut payload = payload.clone();
    if let Some(map) = payload.as_object_mut() {
        promote_alias(map, "song_duration", "duration");
        promote_alias(map, "tempo", "bpm");
        promote_alias(map, "drop_sections", "high_energy_sections");
    }
    payload
}
