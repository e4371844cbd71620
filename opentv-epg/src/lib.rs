//! OpenTV electronic programme guide acquisition.
//!
//! OpenTV carries its guide in private MPEG-2 sections that repeat on a
//! carousel: bouquet sections describe the channel line-up, title sections
//! carry event names and times, summary sections carry descriptions. Text is
//! compressed with a per-country prefix code.
//!
//! The crate is laid out along the data flow:
//!
//! - [`section`]: transport stream packets, PSI sections and OpenTV
//!   record decoding
//! - [`text`]: the prefix-code text decompressor
//! - [`channel`]: the channel registry built from bouquet sections
//! - [`store`]: ordered, de-duplicated title and summary fragments
//! - [`acquisition`]: per-group acquisition loops and the frequency session
//! - [`synthesis`]: joins fragments into finished [`synthesis::EpgEntry`]
//!   records
//!
//! ```text
//!  section queue -> Acquisition (bouquet) -> ChannelRegistry
//!  section queue -> Acquisition (titles)  -> TitleStore   \
//!  section queue -> Acquisition (summary) -> SummaryStore -> Synthesizer -> ChannelSchedule
//! ```

pub mod acquisition;
pub mod channel;
pub mod config;
pub mod error;
pub mod reference;
pub mod section;
pub mod stats;
pub mod store;
pub mod synthesis;
pub mod text;

pub use acquisition::{
    AcquisitionState, FrequencyOutcome, FrequencySession, MemorySectionQueue, SectionQueue,
    SectionSources, TableGroup,
};
pub use channel::{Channel, ChannelKey, ChannelRegistry};
pub use config::EpgConfig;
pub use error::{DecodeError, DeliveryError, EpgError, RecordError, Result};
pub use reference::{ReferenceTables, StaticReferenceTables};
pub use stats::SessionStats;
pub use synthesis::{ChannelSchedule, EpgEntry};
pub use text::Dictionary;
