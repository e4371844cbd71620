//! One frequency's acquisition session.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    Acquisition, BouquetCollector, DiagnosticCollector, GroupCollector, GroupOutcome,
    SectionContext, SectionQueue, SummaryCollector, TitleCollector,
};
use crate::channel::{ChannelRegistry, ChannelReport};
use crate::config::EpgConfig;
use crate::error::{EpgError, Result};
use crate::reference::ReferenceTables;
use crate::stats::SessionStats;
use crate::store::{FragmentStore, SummaryStore, TitleStore};
use crate::synthesis::{ChannelSchedule, Synthesizer};
use crate::text::Dictionary;

/// Section queues of one frequency, one per table group.
#[derive(Clone)]
pub struct SectionSources {
    pub bouquet: Arc<dyn SectionQueue>,
    pub titles: Arc<dyn SectionQueue>,
    pub summaries: Arc<dyn SectionQueue>,
    pub diagnostic: Option<Arc<dyn SectionQueue>>,
}

/// Everything a frequency produced.
#[derive(Debug)]
pub struct FrequencyOutcome {
    pub schedules: Vec<ChannelSchedule>,
    /// Channel map, sorted by key.
    pub channels: Vec<ChannelReport>,
    pub stats: SessionStats,
}

/// Runs bouquet acquisition, then titles, summaries and the optional
/// diagnostic group side by side, then synthesis.
pub struct FrequencySession {
    name: String,
    config: Arc<EpgConfig>,
    dictionary: Arc<Dictionary>,
    reference: Arc<dyn ReferenceTables>,
    cancel: CancellationToken,
}

fn spawn_group<C>(
    acquisition: Acquisition<C>,
    cancel: CancellationToken,
) -> JoinHandle<Result<GroupOutcome<C>>>
where
    C: GroupCollector + 'static,
{
    tokio::spawn(async move {
        let result = acquisition.run(cancel.clone()).await;
        if result.is_err() {
            // Stop the sibling groups of this frequency
            cancel.cancel();
        }
        result
    })
}

async fn join_group<C>(handle: JoinHandle<Result<GroupOutcome<C>>>) -> Result<GroupOutcome<C>> {
    handle.await.map_err(|e| EpgError::Task(e.to_string()))?
}

impl FrequencySession {
    pub fn new(
        name: impl Into<String>,
        config: Arc<EpgConfig>,
        dictionary: Arc<Dictionary>,
        reference: Arc<dyn ReferenceTables>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            dictionary,
            reference,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self, sources: SectionSources) -> Result<FrequencyOutcome> {
        let started_at = Utc::now();
        let window = self.config.epg.window(started_at);
        let mut stats = SessionStats::new(&self.name, started_at);
        info!(
            "[Session] {}: collecting guide from {} to {}",
            self.name, window.start, window.end
        );

        let context = SectionContext {
            dictionary: self.dictionary.clone(),
            diagnostics: self.config.diagnostics,
            verify_crc: self.config.acquisition.verify_crc,
        };
        let acquisition_config = &self.config.acquisition;

        // Channel line-up first; title and summary sections key against it
        let bouquet = Acquisition::new(
            sources.bouquet.clone(),
            BouquetCollector::new(ChannelRegistry::new(self.config.channels.filter()), context.clone()),
            acquisition_config,
        );
        let outcome = bouquet.run(self.cancel.clone()).await?;
        stats.groups.push(outcome.report);
        let registry = Arc::new(outcome.collector.into_registry());
        stats.channels = registry.counters();
        if registry.is_empty() {
            warn!("[Session] {}: no channels registered", self.name);
        } else {
            info!(
                "[Session] {}: {} channel(s) in {} bouquet(s)",
                self.name,
                registry.len(),
                registry.bouquets().len()
            );
        }

        let groups = self.cancel.child_token();
        let titles = spawn_group(
            Acquisition::new(
                sources.titles.clone(),
                TitleCollector::new(
                    registry.clone(),
                    TitleStore::new(self.config.epg.route_suspect_start_times),
                    context.clone(),
                ),
                acquisition_config,
            ),
            groups.clone(),
        );
        let summaries = spawn_group(
            Acquisition::new(
                sources.summaries.clone(),
                SummaryCollector::new(registry.clone(), SummaryStore::new(), context.clone()),
                acquisition_config,
            ),
            groups.clone(),
        );
        let diagnostic = match (&sources.diagnostic, acquisition_config.enable_diagnostic_group) {
            (Some(queue), true) => Some(spawn_group(
                Acquisition::new(queue.clone(), DiagnosticCollector::new(), acquisition_config),
                groups.clone(),
            )),
            _ => None,
        };

        let titles = join_group(titles).await;
        let summaries = join_group(summaries).await;
        let diagnostic = match diagnostic {
            Some(handle) => Some(join_group(handle).await),
            None => None,
        };

        let titles = titles?;
        let summaries = summaries?;
        if let Some(diagnostic) = diagnostic {
            let diagnostic = diagnostic?;
            stats.diagnostic_tables = diagnostic.collector.tables();
            stats.groups.push(diagnostic.report);
        }
        stats.groups.push(titles.report);
        stats.groups.push(summaries.report);

        let store = FragmentStore::from_parts(
            titles.collector.into_store(),
            summaries.collector.into_store(),
        );

        if self.config.diagnostics.log_titles {
            for (channel, fragment) in store.titles.iter_suspect() {
                if let Some(channel) = registry.get(channel) {
                    debug!(
                        "[Session] Suspect start time {} on {} event {}",
                        fragment.start_time, channel.key, fragment.event_id
                    );
                }
            }
        }

        let synthesizer = Synthesizer::new(
            &self.config.epg,
            &self.dictionary,
            self.reference.as_ref(),
            window,
        );
        let schedules = synthesizer.run(&registry, &store, &mut stats.synthesis);
        let channels = registry.report(&store);

        stats.finished_at = Some(Utc::now());
        stats.log_summary();

        Ok(FrequencyOutcome {
            schedules,
            channels,
            stats,
        })
    }
}
