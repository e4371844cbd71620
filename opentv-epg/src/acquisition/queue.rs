//! Inbound section queues.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::DeliveryError;
use crate::section::Section;

/// Section delivery for one table group.
///
/// Implementations buffer sections as they arrive; the acquisition loop
/// takes everything buffered on each wake.
pub trait SectionQueue: Send + Sync {
    /// Take every queued section, in arrival order.
    fn drain(&self) -> Result<Vec<Section>, DeliveryError>;

    /// Start (or resume) delivery.
    fn run(&self);

    /// Stop delivery. Sections arriving afterwards are discarded.
    fn stop(&self);
}

#[derive(Debug, Default)]
struct QueueState {
    sections: VecDeque<Section>,
    stopped: bool,
    failure: Option<DeliveryError>,
    dropped: u64,
}

/// In-memory [`SectionQueue`] fed by an input adapter.
///
/// Sections pushed before [`SectionQueue::run`] are buffered; only
/// [`SectionQueue::stop`] makes the queue discard input.
#[derive(Debug, Default)]
pub struct MemorySectionQueue {
    state: Mutex<QueueState>,
}

impl MemorySectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a section. Returns `false` if delivery is stopped.
    pub fn push(&self, section: Section) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            state.dropped += 1;
            return false;
        }
        state.sections.push_back(section);
        true
    }

    /// Queue several sections under one lock.
    pub fn extend(&self, sections: impl IntoIterator<Item = Section>) -> usize {
        let mut state = self.state.lock();
        if state.stopped {
            let dropped = sections.into_iter().count() as u64;
            state.dropped += dropped;
            return 0;
        }
        let before = state.sections.len();
        state.sections.extend(sections);
        state.sections.len() - before
    }

    /// Report a delivery failure; the next drain returns it.
    pub fn fail(&self, error: DeliveryError) {
        self.state.lock().failure = Some(error);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.state.lock().sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sections discarded while stopped.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

impl SectionQueue for MemorySectionQueue {
    fn drain(&self) -> Result<Vec<Section>, DeliveryError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        Ok(state.sections.drain(..).collect())
    }

    fn run(&self) {
        self.state.lock().stopped = false;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.sections.clear();
    }
}
