pub mod exec;
pub mod inputs;
pub mod staging;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{StageCommand, StagesConfig};
use crate::contracts::model::TimelinePlan;
use crate::contracts::validate::{self, ValidationError};
use crate::planner::{PlannerError, TimelinePlanner};
use staging::StagedClip;

pub const CLIP_ANALYSIS_FILE: &str = "clip-analysis.json";
pub const MUSIC_ANALYSIS_FILE: &str = "music-analysis.json";
pub const TIMELINE_FILE: &str = "timeline.json";
pub const MANIFEST_FILE: &str = "run-manifest.json";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Command failed in {}: {command}\n{details}", .cwd.display())]
    CommandFailed {
        command: String,
        cwd: PathBuf,
        details: String,
    },
    #[error("Stage {stage} has an empty command")]
    EmptyCommand { stage: &'static str },
    #[error("Duplicate clip filenames are not supported by the clip identity scheme: {names}")]
    DuplicateClipNames { names: String },
    #[error("Clip path has no filename: {}", .path.display())]
    InvalidClipPath { path: PathBuf },
    #[error("Cannot resolve {}: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Stage {stage} produced invalid JSON on stdout: {source}")]
    StdoutJson {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[error("Search path for {var} cannot be encoded: {source}")]
    SearchPath {
        var: String,
        source: std::env::JoinPathsError,
    },
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pipeline state error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Caller-facing inputs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub clips: Vec<PathBuf>,
    pub music: PathBuf,
    pub run_dir: PathBuf,
    /// Resolved inside the run directory unless absolute.
    pub output: PathBuf,
    pub compat_mode: bool,
}

/// Auditable record of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_started_at: DateTime<Utc>,
    pub artifacts: ManifestArtifacts,
    pub planner_compat_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestArtifacts {
    pub clip_analysis: String,
    pub music_analysis: String,
    pub timeline: String,
    pub final_output: String,
    pub staged_clips: Vec<StagedClip>,
}

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AnalyzeClips,
    AnalyzeMusic,
    Plan,
    StageClips,
    Render,
    EmitManifest,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalyzeClips => "analyze-clips",
            Self::AnalyzeMusic => "analyze-music",
            Self::Plan => "plan",
            Self::StageClips => "stage-clips",
            Self::Render => "render",
            Self::EmitManifest => "emit-manifest",
        }
    }
}

/// Outcome of one stage transition.
pub enum Transition {
    Next(Stage),
    Done(Manifest),
}

/// Run the full pipeline: analyze clips and music, plan the timeline,
/// stage the clips, render, and emit the manifest.
pub fn run_pipeline(
    opts: RunOptions,
    stages: &StagesConfig,
    planner: &dyn TimelinePlanner,
) -> Result<Manifest> {
    PipelineRun::new(opts, stages, planner)?.execute()
}

/// One in-flight run. Owns the run directory and carries each stage's
/// output forward until the manifest is emitted. Execution is strictly
/// sequential; any stage failure aborts the whole run.
pub struct PipelineRun<'a> {
    clips: Vec<PathBuf>,
    music: PathBuf,
    run_dir: PathBuf,
    compat_mode: bool,
    stages: &'a StagesConfig,
    planner: &'a dyn TimelinePlanner,
    started_at: DateTime<Utc>,
    paths: ArtifactPaths,
    clip_payload: Option<Value>,
    music_payload: Option<Value>,
    draft: Option<TimelinePlan>,
    staged: Option<Vec<StagedClip>>,
}

struct ArtifactPaths {
    clip_analysis: PathBuf,
    music_analysis: PathBuf,
    timeline: PathBuf,
    final_output: PathBuf,
}

impl<'a> PipelineRun<'a> {
    /// Resolve all inputs to canonical absolute paths and create the run
    /// directory. The run start timestamp is captured here.
    pub fn new(
        opts: RunOptions,
        stages: &'a StagesConfig,
        planner: &'a dyn TimelinePlanner,
    ) -> Result<Self> {
        let clips = opts
            .clips
            .iter()
            .map(|path| resolve_path(path))
            .collect::<Result<Vec<_>>>()?;
        let music = resolve_path(&opts.music)?;
        fs::create_dir_all(&opts.run_dir)?;
        let run_dir = resolve_path(&opts.run_dir)?;

        let final_output = if opts.output.is_absolute() {
            opts.output.clone()
        } else {
            run_dir.join(&opts.output)
        };
        let paths = ArtifactPaths {
            clip_analysis: run_dir.join(CLIP_ANALYSIS_FILE),
            music_analysis: run_dir.join(MUSIC_ANALYSIS_FILE),
            timeline: run_dir.join(TIMELINE_FILE),
            final_output,
        };
        log::info!("Run directory: {}", run_dir.display());

        Ok(Self {
            clips,
            music,
            run_dir,
            compat_mode: opts.compat_mode,
            stages,
            planner,
            started_at: Utc::now(),
            paths,
            clip_payload: None,
            music_payload: None,
            draft: None,
            staged: None,
        })
    }

    /// Drive the state machine from the first stage to the manifest.
    pub fn execute(mut self) -> Result<Manifest> {
        let mut stage = Stage::AnalyzeClips;
        loop {
            match self.step(stage)? {
                Transition::Next(next) => stage = next,
                Transition::Done(manifest) => return Ok(manifest),
            }
        }
    }

    /// Execute one stage and report the transition out of it.
    pub fn step(&mut self, stage: Stage) -> Result<Transition> {
        log::info!("Stage {}", stage.name());
        match stage {
            Stage::AnalyzeClips => {
                self.analyze_clips()?;
                Ok(Transition::Next(Stage::AnalyzeMusic))
            }
            Stage::AnalyzeMusic => {
                self.analyze_music()?;
                Ok(Transition::Next(Stage::Plan))
            }
            Stage::Plan => {
                self.plan()?;
                Ok(Transition::Next(Stage::StageClips))
            }
            Stage::StageClips => {
                self.stage_clips()?;
                Ok(Transition::Next(Stage::Render))
            }
            Stage::Render => {
                self.render()?;
                Ok(Transition::Next(Stage::EmitManifest))
            }
            Stage::EmitManifest => Ok(Transition::Done(self.emit_manifest()?)),
        }
    }

    /// Run the clip analyzer over every input clip, then read back and
    /// lenient-validate the artifact it wrote.
    fn analyze_clips(&mut self) -> Result<()> {
        let mut args: Vec<String> = self
            .clips
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        args.push("--output".to_string());
        args.push(self.paths.clip_analysis.to_string_lossy().into_owned());

        self.run_external("analyze-clips", &self.stages.clip_analyzer, &args)?;

        let payload = read_json(&self.paths.clip_analysis)?;
        validate::validate_clip_analysis(&payload, false)?;
        self.clip_payload = Some(payload);
        Ok(())
    }

    /// Run the music analyzer, persist the JSON object it emits on stdout,
    /// then lenient-validate it.
    fn analyze_music(&mut self) -> Result<()> {
        let args = vec![
            "--song".to_string(),
            self.music.to_string_lossy().into_owned(),
        ];
        let output = self.run_external("analyze-music", &self.stages.music_analyzer, &args)?;

        let payload: Value = serde_json::from_slice(&output.stdout).map_err(|source| {
            PipelineError::StdoutJson {
                stage: "analyze-music",
                source,
            }
        })?;
        write_json(&self.paths.music_analysis, &payload)?;
        validate::validate_music_analysis(&payload, false)?;
        self.music_payload = Some(payload);
        Ok(())
    }

    fn plan(&mut self) -> Result<()> {
        let clips = required(&self.clip_payload, "clip payload missing before plan")?;
        let music = required(&self.music_payload, "music payload missing before plan")?;
        let draft = self.planner.build_timeline(clips, music, self.compat_mode)?;
        log::info!(
            "Planned {} timeline slots covering {:.1}s",
            draft.timeline.len(),
            draft.total_duration
        );
        self.draft = Some(draft);
        Ok(())
    }

    /// Stage the clips, remap timeline identities to their staged paths,
    /// persist the timeline, and strict-validate it.
    fn stage_clips(&mut self) -> Result<()> {
        let draft = required(&self.draft, "draft timeline missing before staging")?;
        let (remap, staged) = staging::stage_clips(&self.clips, &self.run_dir)?;
        let timeline = staging::remap_clip_ids(draft, &remap);
        log::info!("Staged {} clips", staged.len());

        let payload = timeline.to_value();
        write_json(&self.paths.timeline, &payload)?;
        validate::validate_timeline(&payload, true)?;
        self.staged = Some(staged);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let args = vec![
            "--timeline".to_string(),
            self.paths.timeline.to_string_lossy().into_owned(),
            "--music".to_string(),
            self.music.to_string_lossy().into_owned(),
            "--output".to_string(),
            self.paths.final_output.to_string_lossy().into_owned(),
        ];
        self.run_external("render", &self.stages.renderer, &args)?;
        Ok(())
    }

    fn emit_manifest(&mut self) -> Result<Manifest> {
        let staged = self
            .staged
            .take()
            .ok_or(PipelineError::Internal("staged clips missing before manifest"))?;

        let manifest = Manifest {
            run_started_at: self.started_at,
            artifacts: ManifestArtifacts {
                clip_analysis: self.paths.clip_analysis.to_string_lossy().into_owned(),
                music_analysis: self.paths.music_analysis.to_string_lossy().into_owned(),
                timeline: self.paths.timeline.to_string_lossy().into_owned(),
                final_output: self.paths.final_output.to_string_lossy().into_owned(),
                staged_clips: staged,
            },
            planner_compat_mode: self.compat_mode,
        };
        write_json(&self.run_dir.join(MANIFEST_FILE), &manifest)?;
        Ok(manifest)
    }

    fn run_external(
        &self,
        stage: &'static str,
        cmd: &StageCommand,
        args: &[String],
    ) -> Result<Output> {
        let spinner = stage_spinner(stage);
        let result = exec::run_stage(stage, cmd, args);
        spinner.finish_and_clear();
        result
    }
}

fn stage_spinner(stage: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());
    spinner.set_message(format!("Running {}", stage));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn required<'v, T>(slot: &'v Option<T>, what: &'static str) -> Result<&'v T> {
    slot.as_ref().ok_or(PipelineError::Internal(what))
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| PipelineError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, payload: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(payload).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text)?;
    Ok(())
}
