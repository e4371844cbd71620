//! Section delivery from a captured transport stream.
//!
//! The file is split into PSI sections per PID and pushed into the group
//! queues a chunk at a time, so the acquisition loops see the carousel
//! arrive over several wakes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use opentv_epg::config::AcquisitionConfig;
use opentv_epg::section::{Section, SectionAssembler, TsPacketIterator};
use opentv_epg::{DeliveryError, MemorySectionQueue, SectionQueue, SectionSources};

/// One queue per table group.
#[derive(Clone, Default)]
pub struct ReplayQueues {
    pub bouquet: Arc<MemorySectionQueue>,
    pub titles: Arc<MemorySectionQueue>,
    pub summaries: Arc<MemorySectionQueue>,
    pub diagnostic: Arc<MemorySectionQueue>,
}

impl ReplayQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sources(&self, with_diagnostic: bool) -> SectionSources {
        SectionSources {
            bouquet: self.bouquet.clone(),
            titles: self.titles.clone(),
            summaries: self.summaries.clone(),
            diagnostic: with_diagnostic.then(|| self.diagnostic.clone() as Arc<dyn SectionQueue>),
        }
    }

    fn all(&self) -> [&Arc<MemorySectionQueue>; 4] {
        [&self.bouquet, &self.titles, &self.summaries, &self.diagnostic]
    }

    fn fail(&self, error: DeliveryError) {
        for queue in self.all() {
            queue.fail(error.clone());
        }
    }
}

/// Which queue a PID feeds.
#[derive(Debug, Clone)]
pub struct Routes {
    bouquet_pid: u16,
    title_pids: Vec<u16>,
    summary_pids: Vec<u16>,
    diagnostic_pids: Vec<u16>,
}

impl Routes {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            bouquet_pid: config.bouquet_pid,
            title_pids: config.title_pids.clone(),
            summary_pids: config.summary_pids.clone(),
            diagnostic_pids: config.diagnostic_pids.clone(),
        }
    }

    fn is_wanted(&self, pid: u16) -> bool {
        pid == self.bouquet_pid
            || self.title_pids.contains(&pid)
            || self.summary_pids.contains(&pid)
            || self.diagnostic_pids.contains(&pid)
    }

    fn queue<'a>(&self, queues: &'a ReplayQueues, pid: u16) -> Option<&'a Arc<MemorySectionQueue>> {
        if pid == self.bouquet_pid {
            Some(&queues.bouquet)
        } else if self.title_pids.contains(&pid) {
            Some(&queues.titles)
        } else if self.summary_pids.contains(&pid) {
            Some(&queues.summaries)
        } else if self.diagnostic_pids.contains(&pid) {
            Some(&queues.diagnostic)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub packets: u64,
    pub sections: u64,
    /// Sections refused by a queue that was already stopped.
    pub refused: u64,
}

/// Split a transport stream into sections on the routed PIDs, in stream
/// order.
pub fn extract_sections(data: &[u8], routes: &Routes, stats: &mut ReplayStats) -> Vec<Section> {
    let mut assemblers: HashMap<u16, SectionAssembler> = HashMap::new();
    let mut sections = Vec::new();

    for packet in TsPacketIterator::new(data) {
        stats.packets += 1;
        if !packet.carries_sections() || !routes.is_wanted(packet.pid) {
            continue;
        }

        let completed = assemblers.entry(packet.pid).or_default().push(
            packet.payload,
            packet.continuity_counter,
            packet.payload_unit_start,
        );
        let received_at = Utc::now();
        sections.extend(
            completed
                .into_iter()
                .filter_map(|raw| Section::new(packet.pid, Bytes::from(raw), received_at)),
        );
    }

    stats.sections = sections.len() as u64;
    sections
}

pub struct Replay {
    path: PathBuf,
    routes: Routes,
    chunk_size: usize,
    delay: Duration,
}

impl Replay {
    pub fn new(path: PathBuf, routes: Routes, chunk_size: usize, delay: Duration) -> Self {
        Self {
            path,
            routes,
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    /// Feed the queues until the file is exhausted or `cancel` fires. A read
    /// failure is reported through every queue.
    pub async fn run(self, queues: ReplayQueues, cancel: CancellationToken) -> ReplayStats {
        let mut stats = ReplayStats::default();

        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("[Replay] Cannot read {:?}: {}", self.path, e);
                queues.fail(DeliveryError::SourceFailed(format!("{}: {}", self.path.display(), e)));
                return stats;
            }
        };

        let sections = extract_sections(&data, &self.routes, &mut stats);
        info!(
            "[Replay] {:?}: {} packet(s), {} section(s) on routed PIDs",
            self.path, stats.packets, stats.sections
        );

        for chunk in sections.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                debug!("[Replay] Cancelled");
                break;
            }
            for section in chunk {
                if let Some(queue) = self.routes.queue(&queues, section.pid) {
                    if !queue.push(section.clone()) {
                        stats.refused += 1;
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentv_epg::section::crc32_mpeg2;

    fn long_section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
        let length = 5 + body.len() + 4;
        let mut out = vec![
            table_id,
            0xB0 | (length >> 8) as u8,
            length as u8,
            (extension >> 8) as u8,
            extension as u8,
            0xC1,
            0x00,
            0x00,
        ];
        out.extend_from_slice(body);
        let crc = crc32_mpeg2(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    fn packet(pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
        let mut p = vec![0x47, 0x40 | (pid >> 8) as u8, pid as u8, 0x10 | cc, 0x00];
        p.extend_from_slice(section);
        p.resize(188, 0xFF);
        p
    }

    fn routes() -> Routes {
        Routes::from_config(&AcquisitionConfig::default())
    }

    #[test]
    fn test_extract_sections() {
        let title = long_section(0xA0, 1001, &[0xD0, 0x00]);
        let summary = long_section(0xA8, 1001, &[0xD0, 0x00]);
        let mut ts = packet(0x30, 0, &title);
        ts.extend(packet(0x40, 0, &summary));
        // Unrouted PID
        ts.extend(packet(0x1FF, 0, &title));

        let mut stats = ReplayStats::default();
        let sections = extract_sections(&ts, &routes(), &mut stats);

        assert_eq!(stats.packets, 3);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].pid, 0x30);
        assert_eq!(sections[0].table_id, 0xA0);
        assert_eq!(&sections[0].data[..], &title[..]);
        assert_eq!(sections[1].table_id, 0xA8);
    }

    #[test]
    fn test_routes() {
        let queues = ReplayQueues::new();
        let routes = routes();
        assert!(Arc::ptr_eq(routes.queue(&queues, 0x11).unwrap(), &queues.bouquet));
        assert!(Arc::ptr_eq(routes.queue(&queues, 0x37).unwrap(), &queues.titles));
        assert!(Arc::ptr_eq(routes.queue(&queues, 0x40).unwrap(), &queues.summaries));
        assert!(routes.queue(&queues, 0x50).is_none());
        assert!(queues.sources(false).diagnostic.is_none());
    }

    #[tokio::test]
    async fn test_replay_feeds_queues() {
        let dir = std::env::temp_dir().join(format!("opentv-replay-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.ts");
        let mut ts = Vec::new();
        for cc in 0..3u8 {
            ts.extend(packet(0x30, cc, &long_section(0xA0, 1001 + cc as u16, &[0xD0, 0x00])));
        }
        std::fs::write(&path, &ts).unwrap();

        let queues = ReplayQueues::new();
        let replay = Replay::new(path, routes(), 2, Duration::from_millis(1));
        let stats = replay.run(queues.clone(), CancellationToken::new()).await;

        assert_eq!(stats.sections, 3);
        assert_eq!(stats.refused, 0);
        assert_eq!(queues.titles.len(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_file_fails_queues() {
        let queues = ReplayQueues::new();
        let replay = Replay::new(
            PathBuf::from("/nonexistent/capture.ts"),
            routes(),
            16,
            Duration::from_millis(1),
        );
        replay.run(queues.clone(), CancellationToken::new()).await;

        assert!(matches!(
            queues.titles.drain(),
            Err(DeliveryError::SourceFailed(_))
        ));
    }
}
