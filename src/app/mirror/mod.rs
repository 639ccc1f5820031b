mod availability;
mod fetch;
mod images;

use thiserror::Error;

use crate::http::{HttpTransport, RetryExhausted};

#[cfg(test)]
pub(crate) use availability::*;
pub(crate) use fetch::*;
#[cfg(test)]
pub(crate) use images::*;

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error(transparent)]
    Transport(#[from] RetryExhausted),
    #[error("the mirror rejected the session cookie")]
    AuthInvalid,
    #[error("the mirror returned no data")]
    EmptyResponse,
    #[error("unexpected markup: {0}")]
    Parse(String),
    #[error("the chapter sharer's session on the mirror has expired")]
    SessionExpired,
    #[error("the reader page carried no usable image tokens")]
    NoTokensExtracted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MirrorSettings {
    pub(crate) base_url: String,
    /// `src` of the thumbnail the listing shows for chapters nobody has cached.
    pub(crate) placeholder_src: String,
    pub(crate) page_size: u32,
}

/// Requests against the mirror on behalf of one comic.
pub(crate) struct MirrorSession<T> {
    comic_id: String,
    settings: MirrorSettings,
    fetcher: RetryingFetcher<T>,
}

impl<T: HttpTransport> MirrorSession<T> {
    pub(crate) fn new(
        comic_id: impl Into<String>,
        settings: MirrorSettings,
        fetcher: RetryingFetcher<T>,
    ) -> Self {
        Self {
            comic_id: comic_id.into(),
            settings,
            fetcher,
        }
    }

    pub(crate) fn comic_id(&self) -> &str {
        &self.comic_id
    }

    pub(crate) fn detail_url(&self, page: Option<u32>) -> String {
        let mut url = format!(
            "{}/manga/?act=detail_preview&mangaid={}",
            self.base(),
            self.comic_id
        );
        if let Some(page) = page {
            url.push_str(&format!("&page={page}"));
        }
        url
    }

    pub(crate) fn reader_url(&self, episode_id: &str, timestamp: i64) -> String {
        format!(
            "{}/manga/?act=read&mangaid={}&epid={episode_id}&t={timestamp}",
            self.base(),
            self.comic_id
        )
    }

    fn base(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }
}
