use std::collections::HashSet;

use scraper::{Html, Selector};

use super::{BodyCheck, FetchOutcome, MirrorSession, ResolveError};
use crate::app::episode::EpisodeRecord;
use crate::app::notify::Notifier;
use crate::http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ListingPage {
    pub(crate) unlocked_ids: Vec<String>,
    pub(crate) total_items: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ListingScan {
    pub(crate) unlocked_ids: HashSet<String>,
    pub(crate) total_items: Option<u32>,
    pub(crate) pages_fetched: u32,
}

/// Positions of the records that become available, in collection order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct UnlockPlan {
    pub(crate) positions: Vec<usize>,
}

fn selector(css: &str) -> Result<Selector, ResolveError> {
    Selector::parse(css).map_err(|err| ResolveError::Parse(format!("selector {css}: {err:?}")))
}

pub(crate) fn parse_listing_page(
    html: &str,
    placeholder_src: &str,
) -> Result<ListingPage, ResolveError> {
    let document = Html::parse_document(html);
    let item_selector = selector("div.episode-item")?;
    let img_selector = selector("img")?;
    let link_selector = selector("a")?;
    let total_selector = selector("center p")?;

    let mut page = ListingPage::default();
    for item in document.select(&item_selector) {
        let Some(src) = item
            .select(&img_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
        else {
            log::debug!("listing item without a thumbnail skipped");
            continue;
        };
        if src == placeholder_src {
            continue;
        }
        let Some(id) = item
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
            .and_then(chapter_id_from_link)
        else {
            log::debug!("listing item without a chapter link skipped");
            continue;
        };
        page.unlocked_ids.push(id);
    }

    if let Some(indicator) = document.select(&total_selector).next() {
        let text = indicator.text().next().unwrap_or_default();
        page.total_items = Some(parse_total_indicator(text)?);
    }

    Ok(page)
}

pub(crate) fn chapter_id_from_link(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("epid=")?;
    let id = rest.split('&').next().unwrap_or_default().trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Reads the `<count>/<total>` indicator shown once per listing.
pub(crate) fn parse_total_indicator(text: &str) -> Result<u32, ResolveError> {
    let total = text
        .split('/')
        .nth(1)
        .ok_or_else(|| ResolveError::Parse(format!("no total in indicator {text:?}")))?;
    total
        .trim()
        .parse::<u32>()
        .map_err(|err| ResolveError::Parse(format!("total in indicator {text:?}: {err}")))
}

pub(crate) fn page_count(total_items: Option<u32>, page_size: u32) -> u32 {
    match total_items {
        Some(total) => (total / page_size.max(1)).saturating_add(1),
        None => 1,
    }
}

pub(crate) fn plan_unlocks(episodes: &[EpisodeRecord], unlocked_ids: &HashSet<String>) -> UnlockPlan {
    let positions = episodes
        .iter()
        .enumerate()
        .filter(|(_, episode)| !episode.is_available() && unlocked_ids.contains(&episode.id))
        .map(|(pos, _)| pos)
        .collect();
    UnlockPlan { positions }
}

/// Returns how many records moved from unavailable to available.
pub(crate) fn apply_unlocks(episodes: &mut [EpisodeRecord], plan: &UnlockPlan) -> usize {
    let mut unlocked = 0;
    for &pos in &plan.positions {
        if let Some(episode) = episodes.get_mut(pos)
            && episode.mark_available()
        {
            unlocked += 1;
        }
    }
    unlocked
}

impl<T: HttpTransport> MirrorSession<T> {
    /// Walks every listing page and collects the ids of unlocked chapters.
    pub(crate) fn scan_listing(&self, notifier: &dyn Notifier) -> Result<ListingScan, ResolveError> {
        let label = format!("comic {} listing", self.comic_id());
        let first = match self
            .fetcher
            .fetch(&self.detail_url(None), BodyCheck::Listing, &label)?
        {
            FetchOutcome::Success(body) => body,
            FetchOutcome::AuthInvalid => return Err(ResolveError::AuthInvalid),
            FetchOutcome::Empty => return Err(ResolveError::EmptyResponse),
            FetchOutcome::PermanentError(reason) => return Err(ResolveError::Parse(reason)),
        };

        let page = parse_listing_page(&first, &self.settings.placeholder_src)?;
        let mut scan = ListingScan {
            unlocked_ids: page.unlocked_ids.into_iter().collect(),
            total_items: page.total_items,
            pages_fetched: 1,
        };

        let total_pages = page_count(scan.total_items, self.settings.page_size);
        for page_no in 2..=total_pages {
            notifier.show_progress(&format!("Resolving chapter listing ({page_no}/{total_pages})..."));
            log::info!("comic {}: fetching listing page {page_no}/{total_pages}", self.comic_id());

            let outcome = self
                .fetcher
                .fetch(&self.detail_url(Some(page_no)), BodyCheck::Listing, &label)?;
            scan.pages_fetched += 1;
            match outcome {
                FetchOutcome::Success(body) => {
                    let page = parse_listing_page(&body, &self.settings.placeholder_src)?;
                    scan.unlocked_ids.extend(page.unlocked_ids);
                }
                FetchOutcome::AuthInvalid | FetchOutcome::Empty => {
                    log::warn!(
                        "comic {}: listing page {page_no} had nothing to parse",
                        self.comic_id()
                    );
                }
                FetchOutcome::PermanentError(reason) => return Err(ResolveError::Parse(reason)),
            }
        }

        Ok(scan)
    }

    /// Upgrades `available` on every record the mirror has unlocked.
    ///
    /// Never fails: problems are logged and reported through `notifier`.
    /// Returns the unlock delta when the listing was reconciled.
    pub(crate) fn retrieve_available_episodes(
        &self,
        episodes: &mut [EpisodeRecord],
        notifier: &dyn Notifier,
    ) -> Option<usize> {
        let comic_id = self.comic_id();
        let scan = match self.scan_listing(notifier) {
            Ok(scan) => scan,
            Err(ResolveError::AuthInvalid) => {
                log::error!("comic {comic_id}: mirror reports the cookie as logged out");
                notifier.show_error("Your mirror cookie is invalid, please update it in the config!");
                return None;
            }
            Err(ResolveError::EmptyResponse) => {
                log::info!("comic {comic_id}: mirror listing is empty");
                return None;
            }
            Err(ResolveError::Transport(err)) => {
                let msg =
                    format!("comic {comic_id}: fetching unlocked chapters from the mirror failed!");
                log::error!("{msg} {err}");
                notifier.show_error(&format!(
                    "{msg}\nCheck your network connection and try again.\n\nSee the log for details."
                ));
                return None;
            }
            Err(err) => {
                let msg = format!(
                    "comic {comic_id}: processing unlocked chapter data failed unexpectedly!"
                );
                log::error!("{msg} {err}");
                notifier.show_error(&format!("{msg}\n\nSee the log for details."));
                return None;
            }
        };

        let plan = plan_unlocks(episodes, &scan.unlocked_ids);
        let unlocked = apply_unlocks(episodes, &plan);
        log::info!(
            "comic {comic_id}: {} unlocked id(s) over {} page(s), {unlocked} newly available",
            scan.unlocked_ids.len(),
            scan.pages_fetched
        );

        if scan.unlocked_ids.is_empty() {
            notifier.show_info(
                "The mirror holds no cached record of this comic.\n\
                 Use \"fetch uncached index\" on the comic's mirror page and try again.",
            );
        } else {
            notifier.show_info(&format!(
                "The mirror unlocked {unlocked} additional chapter(s) for this comic."
            ));
        }
        Some(unlocked)
    }
}
