//! Channel name generation
//!
//! Names use lowercase letters, digits and hyphens only: `prefix-xxxxxxxx`
//! for the session, with `-a` / `-b` appended per side. Every issued base
//! name is remembered so a name is never handed out twice. Archived channels
//! keep their names on the platform, so the registry is never pruned; it
//! grows by one short string per session for the life of the process.

use anonmeet_common::config::CHANNEL_TOKEN_LEN;
use dashmap::DashSet;
use rand::Rng;

use super::routing::Side;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub struct ChannelNamer {
    prefix: String,
    issued: DashSet<String>,
}

impl ChannelNamer {
    /// `prefix` is expected to be validated by the settings layer
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: DashSet::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fresh base name, unique for this process
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let token: String = (0..CHANNEL_TOKEN_LEN)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect();
            let name = format!("{}-{}", self.prefix, token);
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn side_name(base: &str, side: Side) -> String {
        format!("{}-{}", base, side.suffix())
    }
}
