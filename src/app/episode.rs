use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageToken {
    pub(crate) url: String,
    pub(crate) token: String,
}

/// One chapter of a comic in reading order.
///
/// `index` never changes after construction and `available` only ever moves
/// from false to true. The image token list is replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EpisodeRecord {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) comic_id: String,
    index: u32,
    available: bool,
    image_tokens: Vec<ImageToken>,
}

impl EpisodeRecord {
    pub(crate) fn new(
        id: impl Into<String>,
        index: u32,
        available: bool,
        title: impl Into<String>,
        comic_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            comic_id: comic_id.into(),
            index,
            available,
            image_tokens: Vec::new(),
        }
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn is_available(&self) -> bool {
        self.available
    }

    /// Returns true when the record was not available before.
    pub(crate) fn mark_available(&mut self) -> bool {
        let unlocked = !self.available;
        self.available = true;
        unlocked
    }

    pub(crate) fn image_tokens(&self) -> &[ImageToken] {
        &self.image_tokens
    }

    pub(crate) fn replace_image_tokens(&mut self, tokens: Vec<ImageToken>) {
        self.image_tokens = tokens;
    }
}

/// A raw chapter entry as delivered by the comic-info source, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteEpisodeMeta {
    pub(crate) id: String,
    pub(crate) short_title: String,
    pub(crate) title: String,
    pub(crate) is_locked: bool,
}

impl RemoteEpisodeMeta {
    pub(crate) fn display_title(&self) -> String {
        match (self.short_title.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} {}", self.short_title, self.title),
            (false, true) => self.short_title.clone(),
            (true, false) => self.title.clone(),
            (true, true) => self.id.clone(),
        }
    }
}

pub(crate) fn parse_remote_episode_list(raw: &str) -> Result<Vec<RemoteEpisodeMeta>> {
    let parsed: Value = serde_json::from_str(raw).context("comic info is not valid JSON")?;
    let items = parsed
        .get("ep_list")
        .or_else(|| parsed.pointer("/data/ep_list"))
        .and_then(Value::as_array)
        .context("comic info has no ep_list array")?;

    Ok(items.iter().filter_map(parse_remote_episode).collect())
}

fn parse_remote_episode(item: &Value) -> Option<RemoteEpisodeMeta> {
    let id = match item.get("id")? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }

    let text_field = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    };

    Some(RemoteEpisodeMeta {
        id,
        short_title: text_field("short_title"),
        title: text_field("title"),
        is_locked: item.get("is_locked").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Turns newest-first remote metadata into reading order with indices `1..=N`.
pub(crate) fn build_episode_list(comic_id: &str, raw: &[RemoteEpisodeMeta]) -> Vec<EpisodeRecord> {
    raw.iter()
        .rev()
        .enumerate()
        .map(|(pos, meta)| {
            EpisodeRecord::new(
                meta.id.clone(),
                pos as u32 + 1,
                !meta.is_locked,
                meta.display_title(),
                comic_id,
            )
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EpisodeCollection {
    comic_id: String,
    episodes: Vec<EpisodeRecord>,
}

impl EpisodeCollection {
    pub(crate) fn new(comic_id: impl Into<String>) -> Self {
        Self {
            comic_id: comic_id.into(),
            episodes: Vec::new(),
        }
    }

    pub(crate) fn from_records(comic_id: impl Into<String>, episodes: Vec<EpisodeRecord>) -> Self {
        Self {
            comic_id: comic_id.into(),
            episodes,
        }
    }

    /// Builds the list once; a collection that already holds episodes is left as is.
    pub(crate) fn get_or_build(&mut self, raw: &[RemoteEpisodeMeta]) -> &mut [EpisodeRecord] {
        if self.episodes.is_empty() {
            self.episodes = build_episode_list(&self.comic_id, raw);
        }
        &mut self.episodes
    }

    /// Carries availability known from an earlier session over to this one.
    pub(crate) fn merge_known_available<'a>(
        &mut self,
        known_ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let mut merged = 0;
        for id in known_ids {
            if let Some(episode) = self.find_mut(id)
                && episode.mark_available()
            {
                merged += 1;
            }
        }
        merged
    }

    pub(crate) fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    pub(crate) fn episodes_mut(&mut self) -> &mut [EpisodeRecord] {
        &mut self.episodes
    }

    pub(crate) fn find_mut(&mut self, episode_id: &str) -> Option<&mut EpisodeRecord> {
        self.episodes.iter_mut().find(|episode| episode.id == episode_id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_synced_at_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}
