use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::contracts::model::{TimelineEntry, TimelinePlan};

use super::{PipelineError, Result};

pub const CLIPS_DIR: &str = "clips";

/// How a clip landed in the run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedType {
    Symlink,
    Copy,
}

/// Staging provenance for one clip, recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedClip {
    pub source: String,
    pub staged: String,
    pub staged_type: StagedType,
}

/// Stage every input clip into `<run-dir>/clips/` under its original
/// filename, preferring a symlink and falling back to a full copy.
///
/// Returns the clip-id remap (original filename to staged relative path)
/// and the staging provenance for the manifest. Two inputs sharing a
/// filename abort before anything is written.
pub fn stage_clips(
    clip_paths: &[PathBuf],
    run_dir: &Path,
) -> Result<(HashMap<String, String>, Vec<StagedClip>)> {
    let names = clip_paths
        .iter()
        .map(|path| clip_name(path))
        .collect::<Result<Vec<_>>>()?;

    let mut duplicates: Vec<&str> = names
        .iter()
        .filter(|name| names.iter().filter(|other| other == name).count() > 1)
        .map(String::as_str)
        .collect();
    duplicates.sort_unstable();
    duplicates.dedup();
    if !duplicates.is_empty() {
        return Err(PipelineError::DuplicateClipNames {
            names: duplicates.join(", "),
        });
    }

    let clips_dir = run_dir.join(CLIPS_DIR);
    fs::create_dir_all(&clips_dir)?;

    let mut remap = HashMap::new();
    let mut staged_clips = Vec::new();

    for (clip_path, name) in clip_paths.iter().zip(&names) {
        let staged_path = clips_dir.join(name);
        // symlink_metadata also catches a stale dangling link.
        if fs::symlink_metadata(&staged_path).is_ok() {
            fs::remove_file(&staged_path)?;
        }

        let staged_type = match symlink_clip(clip_path, &staged_path) {
            Ok(()) => StagedType::Symlink,
            Err(e) => {
                log::debug!(
                    "Symlink failed for {} ({}), copying instead",
                    clip_path.display(),
                    e
                );
                fs::copy(clip_path, &staged_path)?;
                StagedType::Copy
            }
        };

        remap.insert(name.clone(), format!("{}/{}", CLIPS_DIR, name));
        staged_clips.push(StagedClip {
            source: clip_path.to_string_lossy().into_owned(),
            staged: staged_path.to_string_lossy().into_owned(),
            staged_type,
        });
    }

    Ok((remap, staged_clips))
}

/// Rewrite timeline clip ids through the staging remap. Ids with no staged
/// counterpart pass through unchanged.
pub fn remap_clip_ids(plan: &TimelinePlan, remap: &HashMap<String, String>) -> TimelinePlan {
    let timeline = plan
        .timeline
        .iter()
        .map(|entry| TimelineEntry {
            clip_id: remap
                .get(&entry.clip_id)
                .cloned()
                .unwrap_or_else(|| entry.clip_id.clone()),
            ..entry.clone()
        })
        .collect();
    TimelinePlan {
        schema_version: plan.schema_version.clone(),
        timeline,
        total_duration: plan.total_duration,
    }
}

fn clip_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::InvalidClipPath {
            path: path.to_path_buf(),
        })
}

#[cfg(unix)]
fn symlink_clip(source: &Path, staged: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, staged)
}

#[cfg(windows)]
fn symlink_clip(source: &Path, staged: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, staged)
}

#[cfg(not(any(unix, windows)))]
fn symlink_clip(_source: &Path, _staged: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks unavailable on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, bytes: &[u8]) {
        fs::write(path, bytes).unwrap();
    }

    fn entry(clip_id: &str) -> TimelineEntry {
        TimelineEntry {
            clip_id: clip_id.to_string(),
            clip_start: 0.0,
            clip_end: 2.0,
            song_start: 0.0,
            song_end: 2.0,
        }
    }

    #[test]
    fn test_stages_unique_clips_under_original_names() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let run = tmp.path().join("run");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&run).unwrap();
        let a = src.join("a.mp4");
        let b = src.join("b.mp4");
        touch(&a, b"aa");
        touch(&b, b"bb");

        let (remap, staged) = stage_clips(&[a.clone(), b.clone()], &run).unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(remap.get("a.mp4").unwrap(), "clips/a.mp4");
        assert_eq!(remap.get("b.mp4").unwrap(), "clips/b.mp4");
        assert_eq!(fs::read(run.join("clips/a.mp4")).unwrap(), b"aa");
        assert_eq!(fs::read(run.join("clips/b.mp4")).unwrap(), b"bb");
        assert_eq!(staged[0].source, a.to_string_lossy());
        #[cfg(unix)]
        assert_eq!(staged[0].staged_type, StagedType::Symlink);
    }

    #[test]
    fn test_duplicate_filenames_abort_before_anything_is_written() {
        let tmp = tempdir().unwrap();
        let one = tmp.path().join("one");
        let two = tmp.path().join("two");
        let run = tmp.path().join("run");
        fs::create_dir_all(&one).unwrap();
        fs::create_dir_all(&two).unwrap();
        fs::create_dir_all(&run).unwrap();
        touch(&one.join("a.mp4"), b"1");
        touch(&two.join("a.mp4"), b"2");

        let err = stage_clips(&[one.join("a.mp4"), two.join("a.mp4")], &run).unwrap_err();
        match err {
            PipelineError::DuplicateClipNames { names } => assert_eq!(names, "a.mp4"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!run.join(CLIPS_DIR).exists());
    }

    #[test]
    fn test_duplicate_listing_is_sorted() {
        let tmp = tempdir().unwrap();
        let one = tmp.path().join("one");
        let two = tmp.path().join("two");
        fs::create_dir_all(&one).unwrap();
        fs::create_dir_all(&two).unwrap();
        for dir in [&one, &two] {
            touch(&dir.join("b.mp4"), b"b");
            touch(&dir.join("a.mp4"), b"a");
        }

        let err = stage_clips(
            &[
                one.join("b.mp4"),
                two.join("b.mp4"),
                one.join("a.mp4"),
                two.join("a.mp4"),
            ],
            tmp.path(),
        )
        .unwrap_err();
        match err {
            PipelineError::DuplicateClipNames { names } => assert_eq!(names, "a.mp4, b.mp4"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stale_staged_file_is_replaced() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let run = tmp.path().join("run");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(run.join(CLIPS_DIR)).unwrap();
        let a = src.join("a.mp4");
        touch(&a, b"fresh");
        touch(&run.join("clips/a.mp4"), b"stale");

        stage_clips(&[a], &run).unwrap();
        assert_eq!(fs::read(run.join("clips/a.mp4")).unwrap(), b"fresh");
    }

    #[test]
    fn test_remap_leaves_unknown_ids_untouched() {
        let plan = TimelinePlan {
            schema_version: "2.0.0".to_string(),
            timeline: vec![entry("a.mp4"), entry("elsewhere.mp4")],
            total_duration: 4.0,
        };
        let mut remap = HashMap::new();
        remap.insert("a.mp4".to_string(), "clips/a.mp4".to_string());

        let out = remap_clip_ids(&plan, &remap);
        assert_eq!(out.timeline[0].clip_id, "clips/a.mp4");
        assert_eq!(out.timeline[1].clip_id, "elsewhere.mp4");
        assert!((out.total_duration - plan.total_duration).abs() < 0.01);
        assert_eq!(out.schema_version, plan.schema_version);
    }

    #[test]
    fn test_staged_type_serializes_snake_case() {
        let staged = StagedClip {
            source: "/in/a.mp4".to_string(),
            staged: "/run/clips/a.mp4".to_string(),
            staged_type: StagedType::Symlink,
        };
        let value = serde_json::to_value(&staged).unwrap();
        assert_eq!(value["staged_type"], "symlink");
    }
}
