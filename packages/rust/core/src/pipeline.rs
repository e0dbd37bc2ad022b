//! End-to-end briefing pipeline: map → relevance → scrape → summarize → combine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use debrief_llm::{
    LlmClient, PromptTemplate, briefing_prompt, is_relevant, relevance_prompt, summary_prompt,
};
use debrief_scrape::{ArticleFetcher, truncate_chars};
use debrief_shared::{
    AppConfig, Briefing, DebriefError, Headline, Result, RunId, RunStatus, ScrapeConfig,
};
use debrief_storage::{RunCounts, Storage};

use crate::cache::{CachedLlm, Stage};
use crate::checkpoint::{CheckpointStage, CheckpointWriter, run_dir};
use crate::fanout::fan_out;
use crate::source::HeadlineSource;

/// Configuration for one briefing run.
#[derive(Debug, Clone)]
pub struct BriefingConfig {
    /// Free-text description of the reader's interests.
    pub persona: String,
    /// Root for run directories.
    pub output_dir: PathBuf,
    /// Write JSON snapshots after every stage.
    pub checkpoints: bool,
    /// Answer repeated prompts from the completion cache.
    pub use_cache: bool,
    /// Maximum in-flight calls per stage (0 = unbounded).
    pub concurrency: usize,
    /// Scrape limits and social feed names.
    pub scrape: ScrapeConfig,
}

impl BriefingConfig {
    /// Build a run configuration from the loaded app config.
    pub fn from_app(config: &AppConfig, persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            output_dir: PathBuf::from(&config.defaults.output_dir),
            checkpoints: config.defaults.checkpoints,
            use_cache: config.cache.enabled,
            concurrency: config.defaults.concurrency,
            scrape: config.scrape.clone(),
        }
    }
}

/// External services the pipeline talks to.
pub struct PipelineDeps {
    pub source: Arc<dyn HeadlineSource>,
    pub llm: Arc<dyn LlmClient>,
    pub fetcher: Arc<ArticleFetcher>,
    /// Run history and completion cache. Runs are not recorded without it.
    pub storage: Option<Arc<Storage>>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as items of a fan-out stage finish.
    fn item_done(&self, stage: &str, current: usize, total: usize);
    /// Called when the briefing is ready.
    fn done(&self, briefing: &Briefing);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _stage: &str, _current: usize, _total: usize) {}
    fn done(&self, _briefing: &Briefing) {}
}

/// Run the full briefing pipeline and record it in storage.
///
/// 1. Sample candidate headlines from the map
/// 2. Keep the ones the model judges relevant to the persona
/// 3. Scrape linked articles
/// 4. Summarize each article
/// 5. Combine the summaries into one briefing
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_briefing(
    config: &BriefingConfig,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
) -> Result<Briefing> {
    let run_id = RunId::new();
    tracing::Span::current().record("run_id", tracing::field::display(&run_id));

    if config.persona.trim().is_empty() {
        return Err(DebriefError::validation("persona must not be empty"));
    }

    if let Some(storage) = &deps.storage {
        storage
            .insert_run(&run_id.to_string(), &config.persona)
            .await?;
    }

    let mut counts = RunCounts::default();
    let outcome = execute(config, deps, &run_id, &mut counts, progress).await;

    if let Some(storage) = &deps.storage {
        let (status, text) = match &outcome {
            Ok(briefing) => (RunStatus::Completed, Some(briefing.text.as_str())),
            Err(_) => (RunStatus::Failed, None),
        };
        if let Err(e) = storage
            .finish_run(&run_id.to_string(), status, counts, text)
            .await
        {
            warn!(error = %e, "failed to record run outcome");
        }
    }

    let briefing = outcome?;
    progress.done(&briefing);
    Ok(briefing)
}

async fn execute(
    config: &BriefingConfig,
    deps: &PipelineDeps,
    run_id: &RunId,
    counts: &mut RunCounts,
    progress: &dyn ProgressReporter,
) -> Result<Briefing> {
    let start = Instant::now();
    let checkpoints = CheckpointWriter::new(run_dir(&config.output_dir, run_id), config.checkpoints);
    let cache = config.use_cache.then(|| deps.storage.clone()).flatten();
    let llm = Arc::new(CachedLlm::new(Arc::clone(&deps.llm), cache));

    info!(%run_id, model = llm.model(), "starting briefing pipeline");

    // --- Phase 1: Sample the map ---
    progress.phase("Sampling headlines");
    let candidates = deps.source.sample().await?;
    counts.candidates = candidates.len();
    checkpoints.write(CheckpointStage::Candidates, &candidates)?;
    info!(count = candidates.len(), "sampled candidate headlines");

    // --- Phase 2: Relevance filter ---
    progress.phase("Filtering by relevance");
    let relevant = filter_relevant(config, &llm, candidates, progress).await;
    counts.relevant = relevant.len();
    checkpoints.write(CheckpointStage::Relevant, &relevant)?;
    info!(count = relevant.len(), "relevant headlines");

    if relevant.is_empty() {
        return Err(DebriefError::validation("no relevant headlines"));
    }

    // --- Phase 3: Scrape articles ---
    progress.phase("Scraping articles");
    let with_articles = scrape_articles(config, &deps.fetcher, relevant, progress).await;
    checkpoints.write(CheckpointStage::WithArticle, &with_articles)?;

    // --- Phase 4: Summarize ---
    progress.phase("Summarizing articles");
    let summarized = summarize_articles(config, &llm, with_articles, progress).await;
    counts.summarized = summarized.iter().filter(|h| h.summary.is_some()).count();
    checkpoints.write(CheckpointStage::WithSummary, &summarized)?;

    // --- Phase 5: Combine ---
    progress.phase("Writing briefing");
    let text = combine_summaries(config, &llm, &summarized).await?;

    let briefing = Briefing {
        run_id: run_id.clone(),
        persona: config.persona.clone(),
        text,
        candidate_count: counts.candidates,
        relevant_count: counts.relevant,
        summarized_count: counts.summarized,
        model: llm.model().to_string(),
        created_at: chrono::Utc::now(),
    };
    checkpoints.write_briefing(&briefing)?;

    info!(
        %run_id,
        candidates = counts.candidates,
        relevant = counts.relevant,
        summarized = counts.summarized,
        cache_hits = llm.hits(),
        cache_misses = llm.misses(),
        elapsed_ms = start.elapsed().as_millis(),
        "briefing pipeline complete"
    );

    Ok(briefing)
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Ask the model about every candidate; keep the relevant ones in input order.
#[instrument(skip_all, fields(count = candidates.len()))]
async fn filter_relevant(
    config: &BriefingConfig,
    llm: &Arc<CachedLlm>,
    candidates: Vec<Headline>,
    progress: &dyn ProgressReporter,
) -> Vec<Headline> {
    let template = Arc::new(relevance_prompt());
    let persona: Arc<str> = Arc::from(config.persona.as_str());
    let max_chars = config.scrape.max_headline_chars;

    let results = fan_out(
        candidates,
        config.concurrency,
        |headline| {
            let llm = Arc::clone(llm);
            let template = Arc::clone(&template);
            let persona = Arc::clone(&persona);
            async move {
                let snippet = truncate_chars(&headline.embed_text, max_chars);
                let vars = [("headline", snippet), ("preference_string", &*persona)];
                match ask(&llm, &template, &vars, Stage::Relevance).await {
                    Ok(answer) => is_relevant(&answer).then_some(headline),
                    Err(e) => {
                        warn!(headline = %snippet, error = %e, "relevance check failed, dropping headline");
                        None
                    }
                }
            }
        },
        |current, total| progress.item_done("relevance", current, total),
    )
    .await;

    results.into_iter().flatten().collect()
}

/// Fetch the linked article of every non-social headline.
#[instrument(skip_all, fields(count = headlines.len()))]
async fn scrape_articles(
    config: &BriefingConfig,
    fetcher: &Arc<ArticleFetcher>,
    headlines: Vec<Headline>,
    progress: &dyn ProgressReporter,
) -> Vec<Headline> {
    let skip_feeds = Arc::new(config.scrape.skip_feeds.clone());

    fan_out(
        headlines,
        config.concurrency,
        |mut headline| {
            let fetcher = Arc::clone(fetcher);
            let skip_feeds = Arc::clone(&skip_feeds);
            async move {
                if headline.is_social(&skip_feeds) {
                    return headline;
                }
                let Some(link) = headline.link.clone() else {
                    return headline;
                };
                match fetcher.fetch(&link).await {
                    Ok(article) => headline.article = Some(article.text),
                    Err(e) => warn!(url = %link, error = %e, "article scrape failed"),
                }
                headline
            }
        },
        |current, total| progress.item_done("scrape", current, total),
    )
    .await
}

/// Summarize every scraped article.
#[instrument(skip_all, fields(count = headlines.len()))]
async fn summarize_articles(
    config: &BriefingConfig,
    llm: &Arc<CachedLlm>,
    headlines: Vec<Headline>,
    progress: &dyn ProgressReporter,
) -> Vec<Headline> {
    let template = Arc::new(summary_prompt());
    let max_chars = config.scrape.max_article_chars;

    fan_out(
        headlines,
        config.concurrency,
        |mut headline| {
            let llm = Arc::clone(llm);
            let template = Arc::clone(&template);
            async move {
                let Some(article) = headline.article.as_deref() else {
                    return headline;
                };
                let vars = [("article", truncate_chars(article, max_chars))];
                match ask(&llm, &template, &vars, Stage::Summary).await {
                    Ok(summary) => headline.summary = Some(summary),
                    Err(e) => {
                        warn!(headline = %headline.embed_text, error = %e, "summary failed")
                    }
                }
                headline
            }
        },
        |current, total| progress.item_done("summarize", current, total),
    )
    .await
}

/// Combine per-article summaries into the final briefing text.
#[instrument(skip_all, fields(count = headlines.len()))]
async fn combine_summaries(
    config: &BriefingConfig,
    llm: &CachedLlm,
    headlines: &[Headline],
) -> Result<String> {
    let sources = source_string(headlines);
    let sources = truncate_chars(&sources, config.scrape.max_briefing_input_chars);
    ask(llm, &briefing_prompt(), &[("summaries", sources)], Stage::Briefing).await
}

/// `Source ({feed}):\n{summary}` blocks joined by blank lines, in headline order.
fn source_string(headlines: &[Headline]) -> String {
    headlines
        .iter()
        .map(|h| {
            format!(
                "Source ({}):\n{}",
                h.feed_title,
                h.summary.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn ask(
    llm: &CachedLlm,
    template: &PromptTemplate,
    vars: &[(&str, &str)],
    stage: Stage,
) -> Result<String> {
    let messages = template.render(vars)?;
    llm.complete(stage, &messages).await
}
