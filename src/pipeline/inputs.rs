use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::SUPPORTED_CLIP_EXTENSIONS;

/// Expand clip arguments: a directory contributes every supported clip file
/// under it (sorted), a plain path passes through untouched. Nonexistent
/// paths also pass through; resolution rejects them with context later.
pub fn collect_clips(args: &[PathBuf]) -> Vec<PathBuf> {
    let mut clips = Vec::new();
    for arg in args {
        if arg.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(arg)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| is_clip_file(path))
                .collect();
            found.sort();
            log::info!("Expanded {} to {} clip files", arg.display(), found.len());
            clips.extend(found);
        } else {
            clips.push(arg.clone());
        }
    }
    clips
}

fn is_clip_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_CLIP_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
