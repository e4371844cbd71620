//! The per-group acquisition loop.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{AcquisitionState, GroupCollector, GroupReport, SectionQueue, TableGroup};
use crate::config::AcquisitionConfig;
use crate::error::EpgError;

/// A finished loop: its report and the collector holding the fragments.
pub struct GroupOutcome<C> {
    pub report: GroupReport,
    pub collector: C,
}

/// Acquisition loop for one table group.
pub struct Acquisition<C> {
    group: TableGroup,
    queue: Arc<dyn SectionQueue>,
    collector: C,
    wake_interval: Duration,
    repeat_threshold: u32,
    state: AcquisitionState,
    /// Consecutive wakes without growth.
    repeat_count: u32,
    last_count: usize,
    /// Fragments present before the loop started.
    baseline: usize,
    wake_cycles: u64,
}

impl<C: GroupCollector> Acquisition<C> {
    pub fn new(queue: Arc<dyn SectionQueue>, collector: C, config: &AcquisitionConfig) -> Self {
        Self {
            group: collector.group(),
            queue,
            collector,
            wake_interval: config.wake_interval(),
            repeat_threshold: config.repeat_threshold.max(1),
            state: AcquisitionState::Idle,
            repeat_count: 0,
            last_count: 0,
            baseline: 0,
            wake_cycles: 0,
        }
    }

    pub fn group(&self) -> TableGroup {
        self.group
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn wake_cycles(&self) -> u64 {
        self.wake_cycles
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    fn start(&mut self) {
        self.baseline = self.collector.fragment_count();
        self.last_count = self.baseline;
        self.queue.run();
        self.state = AcquisitionState::Running;
        debug!(
            "[Acquisition] {} group running, {} fragment(s) already present",
            self.group, self.baseline
        );
    }

    /// One wake: drain the queue, decode the batch, update the convergence
    /// counter.
    ///
    /// A delivery failure is returned as [`EpgError::AcquisitionFailed`].
    pub fn step(&mut self) -> Result<AcquisitionState, EpgError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.state == AcquisitionState::Idle {
            self.start();
        }

        // The queue lock is held only inside drain()
        let sections = self.queue.drain().map_err(|source| {
            warn!("[Acquisition] {} group delivery failed: {}", self.group, source);
            EpgError::AcquisitionFailed {
                group: self.group,
                source,
            }
        })?;

        self.state = AcquisitionState::Draining;
        for section in &sections {
            self.collector.process(section);
        }
        self.wake_cycles += 1;

        let count = self.collector.fragment_count();
        if count == self.last_count {
            self.repeat_count += 1;
        } else {
            self.repeat_count = 0;
            self.last_count = count;
        }

        if self.repeat_count >= self.repeat_threshold {
            self.state = AcquisitionState::Converged;
            self.queue.stop();
            info!(
                "[Acquisition] {} group converged after {} wake(s): {} fragment(s), {} new",
                self.group,
                self.wake_cycles,
                count,
                count.saturating_sub(self.baseline)
            );
        } else {
            self.state = AcquisitionState::Running;
            debug!(
                "[Acquisition] {} group wake {}: {} section(s), {} fragment(s), repeat {}/{}",
                self.group,
                self.wake_cycles,
                sections.len(),
                count,
                self.repeat_count,
                self.repeat_threshold
            );
        }

        Ok(self.state)
    }

    /// Stop without waiting for convergence. Merged fragments are kept.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = AcquisitionState::Cancelled;
        self.queue.stop();
        info!(
            "[Acquisition] {} group cancelled after {} wake(s)",
            self.group, self.wake_cycles
        );
    }

    /// Run on the fixed wake interval until convergence, cancellation or a
    /// delivery failure.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<GroupOutcome<C>, EpgError> {
        let mut ticker = interval(self.wake_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if cancel.is_cancelled() {
                self.cancel();
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel();
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.step() {
                Ok(AcquisitionState::Converged) => break,
                Ok(_) => {}
                Err(e) => {
                    self.queue.stop();
                    return Err(e);
                }
            }
        }

        Ok(self.finish())
    }

    /// Final report. Valid in any state.
    pub fn finish(self) -> GroupOutcome<C> {
        let fragments = self.collector.fragment_count();
        let report = GroupReport {
            group: self.group,
            state: self.state,
            wake_cycles: self.wake_cycles,
            fragments,
            usage_count: fragments.saturating_sub(self.baseline),
            counters: self.collector.counters().clone(),
        };
        GroupOutcome {
            report,
            collector: self.collector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::collector::testutil::*;
    use crate::acquisition::{MemorySectionQueue, TitleCollector};
    use crate::error::DeliveryError;
    use crate::store::TitleStore;

    fn config(repeat_threshold: u32) -> AcquisitionConfig {
        AcquisitionConfig {
            wake_interval_ms: 5,
            repeat_threshold,
            ..Default::default()
        }
    }

    fn titles(queue: &Arc<MemorySectionQueue>, threshold: u32) -> Acquisition<TitleCollector> {
        let collector = TitleCollector::new(registry(), TitleStore::new(false), context());
        Acquisition::new(queue.clone(), collector, &config(threshold))
    }

    #[test]
    fn test_converges_exactly_at_n_plus_threshold() {
        const N: u16 = 4;
        const THRESHOLD: u32 = 3;

        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, THRESHOLD);
        let carousel: Vec<_> = (0..N)
            .map(|i| title_section(1001, &[title_record(i, 60 * i, 60, "Show")]))
            .collect();

        // New fragments on each of the first N wakes, then the carousel repeats
        let mut cycle = 0u64;
        loop {
            let i = (cycle % N as u64) as usize;
            queue.push(carousel[i].clone());
            let state = acquisition.step().unwrap();
            cycle += 1;

            if cycle < N as u64 + THRESHOLD as u64 {
                assert_eq!(state, AcquisitionState::Running, "cycle {}", cycle);
            } else {
                assert_eq!(state, AcquisitionState::Converged);
                break;
            }
        }

        assert_eq!(acquisition.wake_cycles(), N as u64 + THRESHOLD as u64);
        assert!(queue.is_stopped());

        let outcome = acquisition.finish();
        assert_eq!(outcome.report.fragments, N as usize);
        assert_eq!(outcome.report.usage_count, N as usize);
        assert_eq!(outcome.report.counters.duplicates, THRESHOLD as u64);
    }

    #[test]
    fn test_empty_source_converges_at_threshold() {
        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, 2);
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Running);
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Converged);
        // Terminal states stick
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Converged);
        assert_eq!(acquisition.wake_cycles(), 2);
    }

    #[test]
    fn test_growth_resets_repeat_counter() {
        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, 2);

        acquisition.step().unwrap(); // repeat 1
        queue.push(title_section(1001, &[title_record(1, 60, 30, "a")]));
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Running); // grew
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Running); // repeat 1
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Converged);
    }

    #[test]
    fn test_malformed_section_does_not_stop_loop() {
        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, 5);

        queue.push(raw_section(0x30, 0xA0, 1001, &[0xEB]));
        queue.push(title_section(1001, &[title_record(1, 60, 30, "a")]));
        assert_eq!(acquisition.step().unwrap(), AcquisitionState::Running);
        assert_eq!(acquisition.collector().fragment_count(), 1);
        assert_eq!(acquisition.collector().counters().ignored_sections, 1);
    }

    #[test]
    fn test_delivery_failure_is_fatal() {
        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, 5);
        queue.fail(DeliveryError::SourceFailed("frontend gone".to_string()));

        match acquisition.step() {
            Err(EpgError::AcquisitionFailed { group, source }) => {
                assert_eq!(group, TableGroup::Titles);
                assert_eq!(source, DeliveryError::SourceFailed("frontend gone".to_string()));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_run_until_converged() {
        let queue = Arc::new(MemorySectionQueue::new());
        queue.push(title_section(1001, &[title_record(1, 60, 30, "a"), title_record(2, 90, 30, "b")]));

        let outcome = titles(&queue, 3).run(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.report.state, AcquisitionState::Converged);
        assert_eq!(outcome.report.wake_cycles, 4);
        assert_eq!(outcome.collector.fragment_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_keeps_merged_fragments() {
        let queue = Arc::new(MemorySectionQueue::new());
        let mut acquisition = titles(&queue, 100);

        queue.push(title_section(1001, &[title_record(1, 60, 30, "a")]));
        acquisition.step().unwrap();
        let merged = acquisition.collector().fragment_count();

        let cancel = CancellationToken::new();
        cancel.cancel();
        queue.push(title_section(1001, &[title_record(2, 90, 30, "b")]));

        let outcome = acquisition.run(cancel).await.unwrap();
        assert_eq!(outcome.report.state, AcquisitionState::Cancelled);
        assert_eq!(outcome.report.wake_cycles, 1);
        assert!(outcome.collector.fragment_count() >= merged);
        assert!(queue.is_stopped());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let queue = Arc::new(MemorySectionQueue::new());
        queue.push(title_section(1001, &[title_record(1, 60, 30, "a")]));

        let mut config = config(1000);
        config.wake_interval_ms = 3_600_000;
        let collector = TitleCollector::new(registry(), TitleStore::new(false), context());
        let acquisition = Acquisition::new(queue.clone(), collector, &config);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(acquisition.run(cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.report.state, AcquisitionState::Cancelled);
        // The immediate first tick merged the queued section
        assert_eq!(outcome.collector.fragment_count(), 1);
    }
}
