//! Builds the media-center listing document from the resolved schedule

use crate::classify::{Category, ChannelClassifier, SportMatcher};
use crate::config::AppConfig;
use crate::epg::{format_datetime, format_time, Channel, Programme, Schedule};
use crate::lookup::{StreamLookup, StreamRef};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Link of items that only show text
pub const PLACEHOLDER_LINK: &str = "ignoreme";

const CURRENT_FALLBACK_TITLE: &str = "In onda";
const NEXT_FALLBACK_TITLE: &str = "Prossimo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingMode {
    /// Flat alphabetical list, no stream lookup
    EpgOnly,
    /// Category groups, stream lookup for sport events, stats footer
    #[default]
    Complete,
}

/// Where selecting an item leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemTarget {
    Link(String),
    Myresolve(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingItem {
    pub title: String,
    #[serde(flatten)]
    pub target: ItemTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fanart: Option<String>,
    pub info: String,
}

impl ListingItem {
    fn text(title: String, info: String) -> Self {
        Self {
            title,
            target: ItemTarget::Link(PLACEHOLDER_LINK.to_string()),
            thumbnail: None,
            fanart: None,
            info,
        }
    }

    pub fn myresolve(&self) -> Option<&str> {
        match &self.target {
            ItemTarget::Myresolve(reference) => Some(reference),
            ItemTarget::Link(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDocument {
    #[serde(rename = "SetViewMode")]
    pub set_view_mode: String,
    #[serde(rename = "RefreshList", skip_serializing_if = "Option::is_none")]
    pub refresh_list: Option<String>,
    pub items: Vec<ListingItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingStats {
    /// Per-channel items emitted
    pub total: usize,
    pub with_stream: usize,
    pub epg_only: usize,
    pub lookup_failures: usize,
    /// Non-empty groups in output order
    pub categories: Vec<(Category, usize)>,
}

#[derive(Debug)]
pub struct Listing {
    pub document: ListingDocument,
    pub stats: ListingStats,
}

#[derive(Debug, Clone)]
pub struct ListingOptions {
    pub mode: ListingMode,
    pub view_mode: String,
    pub refresh_list: Option<String>,
    pub description_limit: usize,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ListingOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.mode,
            view_mode: config.view_mode.clone(),
            refresh_list: config.refresh_list.clone(),
            description_limit: config.description_limit,
        }
    }
}

/// Cut `text` to `limit` characters, marking the cut with "..."
pub fn truncate_description(text: &str, limit: usize) -> Cow<'_, str> {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

fn channel_count(n: usize) -> String {
    if n == 1 {
        "1 canale".to_string()
    } else {
        format!("{} canali", n)
    }
}

/// Stream state of one channel item
#[derive(Debug, Clone, PartialEq)]
enum Playback {
    /// EPG-only mode, no lookup and no stream line
    Unchecked,
    NoStream,
    Stream(StreamRef),
}

pub struct ListingBuilder<'a> {
    options: ListingOptions,
    classifier: &'a ChannelClassifier,
    sport: &'a SportMatcher,
    lookup: &'a dyn StreamLookup,
}

impl<'a> ListingBuilder<'a> {
    pub fn new(
        options: ListingOptions,
        classifier: &'a ChannelClassifier,
        sport: &'a SportMatcher,
        lookup: &'a dyn StreamLookup,
    ) -> Self {
        Self {
            options,
            classifier,
            sport,
            lookup,
        }
    }

    /// Only channels with a current programme appear in the output
    pub fn build(
        &self,
        channels: &HashMap<String, Channel>,
        schedule: &Schedule<'_>,
        generated_at: NaiveDateTime,
    ) -> Listing {
        let mut airing: Vec<(&Channel, &Programme)> = channels
            .values()
            .filter_map(|ch| schedule.current_for(&ch.id).map(|prog| (ch, prog)))
            .collect();
        airing.sort_by_cached_key(|(ch, _)| (ch.name.to_lowercase(), ch.name.clone(), ch.id.clone()));

        let mut stats = ListingStats::default();
        let mut items = Vec::with_capacity(airing.len() + Category::ORDER.len() + 2);

        match self.options.mode {
            ListingMode::EpgOnly => {
                items.push(ListingItem::text(
                    "Last Minute - EPG".to_string(),
                    format!("Aggiornato: {}", format_datetime(generated_at)),
                ));
                for (channel, current) in airing {
                    let next = schedule.next_for(&channel.id);
                    items.push(self.channel_item(channel, current, next, Playback::Unchecked));
                    stats.total += 1;
                    stats.epg_only += 1;
                }
            }
            ListingMode::Complete => {
                items.push(ListingItem::text(
                    "Last Minute - Live".to_string(),
                    format!(
                        "Aggiornato: {}\nCanali in onda: {}",
                        format_datetime(generated_at),
                        airing.len()
                    ),
                ));

                let mut groups: BTreeMap<Category, Vec<(&Channel, &Programme)>> = BTreeMap::new();
                for (channel, current) in airing {
                    let category = self.classifier.classify(&channel.id, &channel.name);
                    groups.entry(category).or_default().push((channel, current));
                }

                for (category, members) in groups {
                    stats.categories.push((category, members.len()));
                    items.push(ListingItem::text(
                        format!("== {} ({}) ==", category.label(), members.len()),
                        format!("{} in onda", channel_count(members.len())),
                    ));

                    for (channel, current) in members {
                        let playback = match self.find_stream(channel, current, &mut stats) {
                            Some(stream) => {
                                stats.with_stream += 1;
                                Playback::Stream(stream)
                            }
                            None => {
                                stats.epg_only += 1;
                                Playback::NoStream
                            }
                        };
                        stats.total += 1;
                        let next = schedule.next_for(&channel.id);
                        items.push(self.channel_item(channel, current, next, playback));
                    }
                }

                items.push(ListingItem::text(
                    "Statistiche".to_string(),
                    format!(
                        "Totale: {}\nCon stream: {}\nSolo EPG: {}",
                        stats.total, stats.with_stream, stats.epg_only
                    ),
                ));
            }
        }

        debug!(items = items.len(), channels = stats.total, "listing built");

        Listing {
            document: ListingDocument {
                set_view_mode: self.options.view_mode.clone(),
                refresh_list: self.options.refresh_list.clone(),
                items,
            },
            stats,
        }
    }

    /// Lookup only runs for sport events; failures count as "no stream"
    fn find_stream(
        &self,
        channel: &Channel,
        current: &Programme,
        stats: &mut ListingStats,
    ) -> Option<StreamRef> {
        if !self.sport.is_sport_event(&current.title) {
            return None;
        }
        match self.lookup.lookup(&current.title, &channel.name) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(event = %current.title, channel = %channel.name, error = %e, "stream lookup failed");
                stats.lookup_failures += 1;
                None
            }
        }
    }

    fn channel_item(
        &self,
        channel: &Channel,
        current: &Programme,
        next: Option<&Programme>,
        playback: Playback,
    ) -> ListingItem {
        let start = format_time(current.start);
        let title = format!(
            "{} - {} {}",
            channel.name,
            start,
            current.title_or(CURRENT_FALLBACK_TITLE)
        );

        let mut info = vec![format!("In onda: {} - {}", start, format_time(current.stop))];
        if let Some(genre) = &current.category {
            info.push(format!("Genere: {}", genre));
        }
        if let Some(desc) = current.description.as_deref().filter(|d| !d.is_empty()) {
            info.push(truncate_description(desc, self.options.description_limit).into_owned());
        }
        if let Some(next) = next {
            info.push(format!(
                "A seguire ({}): {}",
                format_time(next.start),
                next.title_or(NEXT_FALLBACK_TITLE)
            ));
        }

        let target = match playback {
            Playback::Stream(found) => {
                info.push("LIVE - stream disponibile".to_string());
                ItemTarget::Myresolve(found.myresolve())
            }
            Playback::NoStream => {
                info.push("Nessuno stream disponibile".to_string());
                ItemTarget::Link(PLACEHOLDER_LINK.to_string())
            }
            Playback::Unchecked => ItemTarget::Link(PLACEHOLDER_LINK.to_string()),
        };

        let fanart = match self.options.mode {
            ListingMode::Complete => channel.icon.clone(),
            ListingMode::EpgOnly => None,
        };

        ListingItem {
            title,
            target,
            thumbnail: channel.icon.clone(),
            fanart,
            info: info.join("\n"),
        }
    }
}
