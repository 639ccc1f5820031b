use chrono::Utc;
use scraper::{Html, Selector};

use super::{BodyCheck, FetchOutcome, MirrorSession, ResolveError, is_sharer_session_expired};
use crate::app::episode::{EpisodeRecord, ImageToken};
use crate::app::notify::Notifier;
use crate::http::HttpTransport;

const TOKEN_SEPARATOR: &str = "?token=";

/// Extracts `(url, token)` pairs in document order, which is page order.
pub(crate) fn parse_reader_page(html: &str) -> Result<Vec<ImageToken>, ResolveError> {
    if is_sharer_session_expired(html) {
        return Err(ResolveError::SessionExpired);
    }

    let document = Html::parse_document(html);
    let image_selector = Selector::parse("img.comic-single")
        .map_err(|err| ResolveError::Parse(format!("image selector: {err:?}")))?;

    let mut tokens = Vec::new();
    for (position, image) in document.select(&image_selector).enumerate() {
        let source = image.value().attr("_src").ok_or_else(|| {
            ResolveError::Parse(format!("page image {} has no _src attribute", position + 1))
        })?;
        let (url, token) = source.split_once(TOKEN_SEPARATOR).ok_or_else(|| {
            ResolveError::Parse(format!("page image {} has no token: {source}", position + 1))
        })?;
        tokens.push(ImageToken {
            url: url.to_string(),
            token: token.to_string(),
        });
    }

    if tokens.is_empty() {
        return Err(ResolveError::NoTokensExtracted);
    }
    Ok(tokens)
}

impl<T: HttpTransport> MirrorSession<T> {
    pub(crate) fn resolve_image_tokens(
        &self,
        episode: &EpisodeRecord,
    ) -> Result<Vec<ImageToken>, ResolveError> {
        let url = self.reader_url(&episode.id, Utc::now().timestamp());
        let label = format!("comic {} chapter {}", self.comic_id(), episode.title);
        match self.fetcher.fetch(&url, BodyCheck::Reader, &label)? {
            FetchOutcome::Success(body) => parse_reader_page(&body),
            FetchOutcome::AuthInvalid => Err(ResolveError::AuthInvalid),
            FetchOutcome::Empty => Err(ResolveError::EmptyResponse),
            FetchOutcome::PermanentError(reason) => Err(ResolveError::Parse(reason)),
        }
    }

    /// Fills the episode's image token list from its reader page.
    ///
    /// On any failure the previous token list is kept, the user is notified
    /// and false is returned so the caller can move on to other chapters.
    pub(crate) fn init_image_tokens(
        &self,
        episode: &mut EpisodeRecord,
        notifier: &dyn Notifier,
    ) -> bool {
        let chapter = format!("comic {} chapter {}", self.comic_id(), episode.title);
        let tokens = match self.resolve_image_tokens(episode) {
            Ok(tokens) => tokens,
            Err(ResolveError::Transport(err)) => {
                let msg = format!("{chapter}: fetching the image list from the mirror failed!");
                log::error!("{msg} {err}");
                notifier.show_error(&format!(
                    "{msg}\nThis chapter was skipped for now.\n\
                     Check your network connection and try again.\n\nSee the log for details."
                ));
                return false;
            }
            Err(ResolveError::SessionExpired) => {
                let msg = format!(
                    "{chapter}: the user sharing this chapter on the mirror has logged out, download failed!"
                );
                log::error!("{msg}");
                notifier.show_error(&msg);
                return false;
            }
            Err(ResolveError::NoTokensExtracted) => {
                let msg = format!("{chapter}: the mirror returned no valid image tokens!");
                log::error!("{msg}");
                notifier.show_error(&format!("{msg}\nThis is a problem on the mirror's side."));
                return false;
            }
            Err(err) => {
                let msg = format!("{chapter}: processing the mirror image list failed unexpectedly!");
                log::error!("{msg} {err}");
                notifier.show_error(&format!("{msg}\n\nSee the log for details."));
                return false;
            }
        };

        log::info!("{chapter}: resolved {} image token(s)", tokens.len());
        episode.replace_image_tokens(tokens);
        true
    }
}
