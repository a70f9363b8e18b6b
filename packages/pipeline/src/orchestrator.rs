//! Run orchestration.
//!
//! Each stage deduplicates its work items up front, then feeds them to a
//! fixed number of workers pulling from a shared queue. Workers pause
//! between consecutive items and send their outcomes over a channel; the
//! calling task is the only consumer and therefore the only owner of the
//! audit log and the counters.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use litscout_harvester::audit::{
    successful_links, AuditLog, DISCOVERY_HEADER, RETRIEVAL_HEADER, SCREENING_HEADER,
};
use litscout_harvester::{CandidateArticle, QueryEngine, Retriever, SourceRepository};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::screening::decision::OUT_OF_RANGE_VERDICT;
use crate::screening::{pdf_files, ScreeningOutcome, Screener};

/// Worker pool shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub concurrency: usize,
    /// Pause between consecutive items handled by the same worker.
    pub delay: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Per-stage outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub stage: &'static str,
    pub counts: BTreeMap<&'static str, usize>,
    /// The run was interrupted before the queue drained.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    pub fn add(&mut self, category: &'static str, n: usize) {
        *self.counts.entry(category).or_default() += n;
    }

    pub fn bump(&mut self, category: &'static str) {
        self.add(category, 1);
    }

    pub fn get(&self, category: &str) -> usize {
        self.counts.get(category).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.stage)?;
        for (category, n) in &self.counts {
            write!(f, " {category}={n}")?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Keep the first item per key; returns the kept items and the number dropped.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> (Vec<T>, usize)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let total = items.len();
    let mut seen = HashSet::new();
    let kept: Vec<T> = items.into_iter().filter(|i| seen.insert(key(i))).collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Pair each candidate with its destination filename.
///
/// The first candidate to claim a name keeps it; later candidates whose
/// name is taken get the link-digest variant. Returns the number renamed.
pub fn assign_filenames(
    candidates: Vec<CandidateArticle>,
) -> (Vec<(CandidateArticle, String)>, usize) {
    let mut taken = HashSet::new();
    let mut renamed = 0;
    let assigned = candidates
        .into_iter()
        .map(|candidate| {
            let mut filename = candidate.filename();
            if !taken.insert(filename.clone()) {
                filename = candidate.filename_with_digest();
                tracing::info!(link = %candidate.link, file = %filename, "filename taken by another item");
                taken.insert(filename.clone());
                renamed += 1;
            }
            (candidate, filename)
        })
        .collect();
    (assigned, renamed)
}

/// Run `work` over `items` on a bounded pool.
///
/// Outcomes reach `aggregate` in completion order on the calling task. When
/// `cancel` fires, workers stop taking new items and finish the one in hand.
/// An aggregation error stops the pool and is returned after the workers exit.
pub async fn run_pool<I, O, W, Fut, A>(
    items: Vec<I>,
    settings: PoolSettings,
    cancel: &CancellationToken,
    work: W,
    mut aggregate: A,
) -> Result<()>
where
    I: Send + 'static,
    O: Send + 'static,
    W: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    A: FnMut(O) -> Result<()>,
{
    let workers = settings.concurrency.max(1).min(items.len().max(1));
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let work = Arc::new(work);
    let stop = cancel.child_token();
    let (tx, mut rx) = mpsc::channel::<O>(workers * 2);

    let mut handles = JoinSet::new();
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let stop = stop.clone();
        let delay = settings.delay;

        handles.spawn(async move {
            let mut handled = 0usize;
            loop {
                if stop.is_cancelled() {
                    break;
                }
                let next = queue.lock().await.pop_front();
                let Some(item) = next else { break };

                // An item taken but not yet started is dropped on cancellation.
                if handled > 0 && !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                let outcome = (*work)(item).await;
                handled += 1;
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
            tracing::debug!(worker, handled, "worker finished");
        });
    }
    drop(tx);

    let mut result = Ok(());
    while let Some(outcome) = rx.recv().await {
        if let Err(e) = aggregate(outcome) {
            stop.cancel();
            result = Err(e);
            break;
        }
    }
    drop(rx);

    while let Some(joined) = handles.join_next().await {
        joined?;
    }
    result
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, finishing in-flight work");
            token.cancel();
        }
    });
}

/// Search results of one repository across all terms.
#[derive(Debug)]
struct RepositorySearch {
    repo_id: String,
    queries: Vec<TermSearch>,
}

#[derive(Debug)]
struct TermSearch {
    term: String,
    result: std::result::Result<Vec<CandidateArticle>, String>,
}

/// Drives the three pipeline stages.
pub struct Orchestrator {
    pool: PoolSettings,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl Orchestrator {
    pub fn new(pool: PoolSettings) -> Self {
        Self {
            pool,
            cancel: CancellationToken::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Progress bar advanced once per aggregated work item.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    fn start(&self, stage: &'static str, items: usize) -> RunSummary {
        self.progress.set_length(items as u64);
        self.progress.set_position(0);
        tracing::info!(stage, items, workers = self.pool.concurrency, "starting stage");
        RunSummary::new(stage)
    }

    fn finish(&self, mut summary: RunSummary) -> RunSummary {
        summary.cancelled = self.cancel.is_cancelled();
        tracing::info!(stage = summary.stage, summary = %summary, "stage complete");
        summary
    }

    /// Search every repository for every term and log new candidates.
    ///
    /// Work item = one repository; its terms run sequentially on one worker
    /// with the polite delay between them. Candidates are deduplicated by
    /// link across the whole run.
    pub async fn discover(
        &self,
        engine: Arc<QueryEngine>,
        repositories: Vec<SourceRepository>,
        terms: &[String],
        log_path: &Path,
    ) -> Result<RunSummary> {
        let (repositories, duplicate_repos) = dedup_by_key(repositories, |r| r.id.clone());
        let mut summary = self.start("discover", repositories.len());
        summary.add("duplicate_repositories", duplicate_repos);

        let mut log = AuditLog::open(log_path, DISCOVERY_HEADER)?;
        let mut seen_links = HashSet::new();
        let terms: Arc<[String]> = terms.into();
        let delay = self.pool.delay;
        let cancel = self.cancel.clone();

        let work = move |repo: SourceRepository| {
            let engine = Arc::clone(&engine);
            let terms = Arc::clone(&terms);
            let cancel = cancel.clone();
            async move {
                let mut queries = Vec::with_capacity(terms.len());
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    let result = engine.query(&repo, term).await.map_err(|e| e.to_string());
                    queries.push(TermSearch {
                        term: term.clone(),
                        result,
                    });
                }
                RepositorySearch {
                    repo_id: repo.id,
                    queries,
                }
            }
        };

        let progress = self.progress.clone();
        run_pool(repositories, self.pool, &self.cancel, work, |search| {
            summary.bump("repositories");
            for query in search.queries {
                match query.result {
                    Ok(hits) => {
                        summary.bump("queries_ok");
                        for hit in hits {
                            if seen_links.insert(hit.link.clone()) {
                                log.append(&hit)?;
                                summary.bump("candidates");
                            } else {
                                summary.bump("duplicate_links");
                            }
                        }
                    }
                    Err(error) => {
                        tracing::warn!(repo = %search.repo_id, term = %query.term, %error, "query failed");
                        summary.bump("queries_failed");
                    }
                }
            }
            progress.set_message(search.repo_id);
            progress.inc(1);
            Ok(())
        })
        .await?;

        Ok(self.finish(summary))
    }

    /// Resolve and download every candidate, one retrieval-log row each.
    ///
    /// With `resume`, links already recorded as `success` in the log are
    /// skipped without any network call.
    pub async fn retrieve(
        &self,
        retriever: Arc<Retriever>,
        candidates: Vec<CandidateArticle>,
        log_path: &Path,
        resume: bool,
    ) -> Result<RunSummary> {
        let done = if resume {
            successful_links(log_path)?
        } else {
            HashSet::new()
        };

        let (candidates, duplicates) = dedup_by_key(candidates, |c| c.link.clone());
        // Names are assigned before resume filtering so a re-run maps every
        // link to the same file as the first run.
        let (targets, renamed) = assign_filenames(candidates);
        let before = targets.len();
        let targets: Vec<(CandidateArticle, String)> = targets
            .into_iter()
            .filter(|(c, _)| !done.contains(&c.link))
            .collect();
        let resumed = before - targets.len();

        let mut summary = self.start("download", targets.len());
        summary.add("duplicates", duplicates);
        summary.add("resumed", resumed);
        summary.add("renamed", renamed);

        let mut log = AuditLog::open(log_path, RETRIEVAL_HEADER)?;
        let work = move |(candidate, filename): (CandidateArticle, String)| {
            let retriever = Arc::clone(&retriever);
            async move { retriever.retrieve_as(&candidate, &filename).await }
        };

        let progress = self.progress.clone();
        run_pool(targets, self.pool, &self.cancel, work, |outcome| {
            log.append(&outcome)?;
            summary.bump(outcome.status.as_str());
            progress.set_message(outcome.title.clone());
            progress.inc(1);
            Ok(())
        })
        .await?;

        Ok(self.finish(summary))
    }

    /// Screen every PDF at the top level of `dir`.
    pub async fn screen(
        &self,
        screener: Arc<Screener>,
        dir: &Path,
        log_path: &Path,
    ) -> Result<RunSummary> {
        let files = pdf_files(dir).await?;
        let (files, _) = dedup_by_key(files, |p| p.file_name().map(|n| n.to_os_string()));
        let mut summary = self.start("screen", files.len());

        let match_dir = screener.settings().match_dir.clone();
        let mut log = AuditLog::open(log_path, SCREENING_HEADER)?;
        let work = move |path: std::path::PathBuf| {
            let screener = Arc::clone(&screener);
            async move { screener.screen(&path).await }
        };

        let progress = self.progress.clone();
        run_pool(files, self.pool, &self.cancel, work, |outcome| {
            progress.set_message(outcome.filename().to_string());
            log.append(&outcome.record())?;
            match &outcome {
                ScreeningOutcome::Filed(decision) => {
                    if decision.verdict == OUT_OF_RANGE_VERDICT {
                        summary.bump("out_of_range");
                    } else if decision.moved_to == match_dir {
                        summary.bump("matched");
                    } else {
                        summary.bump("not_matched");
                    }
                }
                ScreeningOutcome::Skipped { .. } => summary.bump("skipped"),
                ScreeningOutcome::Failed { .. } => summary.bump("failed"),
            }
            progress.inc(1);
            Ok(())
        })
        .await?;

        Ok(self.finish(summary))
    }
}
