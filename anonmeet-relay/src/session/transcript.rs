//! Relay transcript log
//!
//! Every relayed message is recorded against the session's base channel
//! name so the administrator can pull a conversation by name over DM.
//! Only the most recent `retention` sessions are kept; recording a new
//! session past that drops the oldest transcript.

use anonmeet_common::config::CompiledDefaults;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::types::ParticipantId;

pub struct TranscriptLog {
    entries: DashMap<String, Vec<String>>,
    /// Session names, oldest first
    order: Mutex<VecDeque<String>>,
    retention: usize,
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::with_retention(CompiledDefaults::TRANSCRIPT_RETENTION)
    }
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    pub fn record(&self, session_name: &str, sender: &ParticipantId, text: &str) {
        let line = format!("{}: {}", sender, text);
        if let Some(mut lines) = self.entries.get_mut(session_name) {
            lines.push(line);
            return;
        }

        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        match self.entries.entry(session_name.to_string()) {
            Entry::Occupied(mut existing) => existing.get_mut().push(line),
            Entry::Vacant(slot) => {
                slot.insert(vec![line]);
                order.push_back(session_name.to_string());
            }
        }
        while order.len() > self.retention {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Transcripts of every session whose name contains `query`, sorted by name
    pub fn find(&self, query: &str) -> Vec<(String, Vec<String>)> {
        let mut found: Vec<(String, Vec<String>)> = self
            .entries
            .iter()
            .filter(|e| e.key().contains(query))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
