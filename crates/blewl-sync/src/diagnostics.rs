//! Human-readable state dump for operators.
//!
//! The output is meant to be read, not parsed.

use std::fmt;
use std::sync::Arc;

use blewl_core::{LegacySlots, Whitelist};

use crate::config::SyncMode;
use crate::stats::StatisticsSnapshot;
use crate::synchronizer::SyncState;

/// Point-in-time view of a synchronizer.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub component_name: String,
    pub topic: String,
    pub mode: SyncMode,
    pub state: SyncState,
    pub durable: bool,
    pub statistics: StatisticsSnapshot,
    pub whitelist: Arc<Whitelist>,
    pub slots: LegacySlots,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topic = if self.topic.is_empty() {
            "(none)"
        } else {
            &self.topic
        };
        let mode = match self.mode {
            SyncMode::Full => "full",
            SyncMode::Slots => "slots",
        };

        writeln!(f, "Whitelist component: {}", self.component_name)?;
        writeln!(f, "  topic:    {topic}")?;
        writeln!(f, "  mode:     {mode}")?;
        writeln!(f, "  state:    {}", self.state)?;
        writeln!(
            f,
            "  durable:  {}",
            if self.durable { "yes" } else { "no (persist pending)" }
        )?;

        let stats = &self.statistics;
        writeln!(
            f,
            "  updates:  {} applied, {} rejected, {} ignored, {} persist failures",
            stats.updates_applied, stats.updates_rejected, stats.messages_ignored, stats.persist_failures
        )?;
        match stats.last_update {
            Some(ts) => writeln!(f, "  last update: {}", ts.to_rfc3339())?,
            None => writeln!(f, "  last update: never")?,
        }

        writeln!(f, "  entries ({}):", self.whitelist.len())?;
        for entry in self.whitelist.iter() {
            writeln!(f, "    - {entry}")?;
        }

        writeln!(f, "  slots:")?;
        for (slot, mac) in self.slots.iter() {
            if mac.is_unset() {
                writeln!(f, "    {slot}: {mac} (unset)")?;
            } else {
                writeln!(f, "    {slot}: {mac}")?;
            }
        }
        Ok(())
    }
}
