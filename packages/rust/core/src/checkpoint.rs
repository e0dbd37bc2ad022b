//! JSON snapshots of the headline list after each pipeline stage.
//!
//! Layout of one run directory:
//!
//! ```text
//! {output_dir}/runs/{run_id}/
//! ├── candidate_headlines.json
//! ├── relevant_headlines.json
//! ├── relevant_headlines_with_article.json
//! ├── relevant_headlines_with_article_and_summary.json
//! ├── briefing.md
//! └── briefing.json
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use debrief_shared::{Briefing, DebriefError, Headline, Result, RunId};

/// A snapshot point in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStage {
    Candidates,
    Relevant,
    WithArticle,
    WithSummary,
}

impl CheckpointStage {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Candidates => "candidate_headlines.json",
            Self::Relevant => "relevant_headlines.json",
            Self::WithArticle => "relevant_headlines_with_article.json",
            Self::WithSummary => "relevant_headlines_with_article_and_summary.json",
        }
    }
}

/// Directory holding the files of one run.
pub fn run_dir(output_dir: &Path, run_id: &RunId) -> PathBuf {
    output_dir.join("runs").join(run_id.to_string())
}

/// Writes stage snapshots into a run directory. A disabled writer does nothing.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    enabled: bool,
}

impl CheckpointWriter {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Snapshot the headline list for `stage`.
    pub fn write(&self, stage: CheckpointStage, headlines: &[Headline]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.ensure_dir()?;
        write_json(&self.dir.join(stage.file_name()), headlines)
    }

    /// Write the final briefing as Markdown and JSON.
    pub fn write_briefing(&self, briefing: &Briefing) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.ensure_dir()?;

        let md_path = self.dir.join("briefing.md");
        std::fs::write(&md_path, render_markdown(briefing))
            .map_err(|e| DebriefError::io(&md_path, e))?;

        write_json(&self.dir.join("briefing.json"), briefing)
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DebriefError::io(&self.dir, e))
    }
}

/// Render a briefing as a small Markdown document.
fn render_markdown(briefing: &Briefing) -> String {
    format!(
        "# Briefing\n\n\
         > {persona}\n\n\
         {text}\n\n\
         ---\n\n\
         - Run: `{run_id}`\n\
         - Model: `{model}`\n\
         - Created: {created}\n\
         - Headlines: {candidates} sampled, {relevant} relevant, {summarized} summarized\n",
        persona = briefing.persona.trim(),
        text = briefing.text.trim(),
        run_id = briefing.run_id,
        model = briefing.model,
        created = briefing.created_at.to_rfc3339(),
        candidates = briefing.candidate_count,
        relevant = briefing.relevant_count,
        summarized = briefing.summarized_count,
    )
}

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DebriefError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| DebriefError::io(path, e))?;
    debug!(path = %path.display(), "wrote checkpoint");
    Ok(())
}
