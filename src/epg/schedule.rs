//! Resolves which programme is on air now, and which comes next, per channel

use super::parser::Programme;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the "up next" programme is chosen when a channel has several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextPolicy {
    /// First future programme in document order. Matches the earliest one
    /// only when the feed lists each channel chronologically.
    #[default]
    FirstSeen,
    /// Future programme with the smallest start time; ties keep the first seen
    Earliest,
}

/// Current and next programme per channel id, borrowed from the parsed feed
#[derive(Debug)]
pub struct Schedule<'a> {
    pub now: NaiveDateTime,
    pub current: HashMap<&'a str, &'a Programme>,
    pub next: HashMap<&'a str, &'a Programme>,
}

impl<'a> Schedule<'a> {
    /// Single pass over `programmes` against one reference instant.
    ///
    /// Overlapping current programmes on one channel resolve last-wins.
    pub fn resolve(programmes: &'a [Programme], now: NaiveDateTime, policy: NextPolicy) -> Self {
        let mut current: HashMap<&str, &Programme> = HashMap::new();
        let mut next: HashMap<&str, &Programme> = HashMap::new();

        for prog in programmes {
            let channel = prog.channel_id.as_str();
            if prog.is_airing(now) {
                current.insert(channel, prog);
            } else if prog.start > now {
                match policy {
                    NextPolicy::FirstSeen => {
                        next.entry(channel).or_insert(prog);
                    }
                    NextPolicy::Earliest => {
                        let slot = next.entry(channel).or_insert(prog);
                        if prog.start < slot.start {
                            *slot = prog;
                        }
                    }
                }
            }
        }

        Self { now, current, next }
    }

    pub fn current_for(&self, channel_id: &str) -> Option<&'a Programme> {
        self.current.get(channel_id).copied()
    }

    pub fn next_for(&self, channel_id: &str) -> Option<&'a Programme> {
        self.next.get(channel_id).copied()
    }
}
