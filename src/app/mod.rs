mod episode;
mod mirror;
mod notify;


use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::{Database, StoredEpisode, StoredImage};
use crate::http::UreqTransport;
use crate::paths::database_file_path;

use self::episode::{
    EpisodeCollection, EpisodeRecord, ImageToken, format_synced_at_display,
    parse_remote_episode_list, truncate,
};
use self::mirror::{MirrorSession, MirrorSettings, RetryingFetcher};
use self::notify::{ConsoleNotifier, Notifier};

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let db = open_db()?;
    let notifier = ConsoleNotifier;

    match cli.command {
        Command::Episodes { comic_id, info } => {
            run_episodes(&db, &config, &notifier, &comic_id, info.as_deref())?
        }
        Command::Images {
            comic_id,
            episode_id,
        } => run_images(&db, &config, &notifier, &comic_id, &episode_id)?,
        Command::List { comic_id } => run_list(&db, &comic_id)?,
    }

    Ok(())
}

fn run_episodes(
    db: &Database,
    config: &Config,
    notifier: &dyn Notifier,
    comic_id: &str,
    info: Option<&Path>,
) -> Result<()> {
    let stored = db.load_episodes(comic_id)?;
    let mut collection = match info {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read comic info {}", path.display()))?;
            let remote = parse_remote_episode_list(&raw)
                .with_context(|| format!("failed to parse comic info {}", path.display()))?;
            let mut collection = EpisodeCollection::new(comic_id);
            collection.get_or_build(&remote);
            let merged = collection.merge_known_available(
                stored
                    .iter()
                    .filter(|episode| episode.available)
                    .map(|episode| episode.ep_id.as_str()),
            );
            log::debug!("comic {comic_id}: {merged} chapter(s) known available from earlier runs");
            collection
        }
        None => {
            if stored.is_empty() {
                bail!("no stored episodes for comic {comic_id}; run with --info <comic.json> first");
            }
            EpisodeCollection::from_records(
                comic_id,
                stored
                    .iter()
                    .map(|episode| episode_from_stored(comic_id, episode))
                    .collect(),
            )
        }
    };

    if collection.is_empty() {
        println!("Comic {comic_id} has no chapters.");
        return Ok(());
    }

    warn_if_cookie_missing(config);
    let session = mirror_session(config, comic_id);
    if session
        .retrieve_available_episodes(collection.episodes_mut(), notifier)
        .is_none()
    {
        println!("Availability not updated from the mirror.");
    }

    let rows = collection
        .episodes()
        .iter()
        .map(stored_from_episode)
        .collect::<Vec<_>>();
    db.save_episodes(comic_id, &rows)?;
    print_episode_table(collection.episodes());
    Ok(())
}

fn run_images(
    db: &Database,
    config: &Config,
    notifier: &dyn Notifier,
    comic_id: &str,
    episode_id: &str,
) -> Result<()> {
    let stored = db.load_episodes(comic_id)?;
    let Some(row) = stored.iter().find(|episode| episode.ep_id == episode_id) else {
        bail!("episode {episode_id} of comic {comic_id} is not stored; run `mirrorsync episodes` first");
    };
    let mut episode = episode_from_stored(comic_id, row);
    let previous = db
        .image_tokens(comic_id, episode_id)?
        .into_iter()
        .map(|image| ImageToken {
            url: image.url,
            token: image.token,
        })
        .collect();
    episode.replace_image_tokens(previous);

    if !episode.is_available() {
        log::warn!("comic {comic_id}: episode {episode_id} is not known to be unlocked");
    }

    warn_if_cookie_missing(config);
    let session = mirror_session(config, comic_id);
    if !session.init_image_tokens(&mut episode, notifier) {
        println!(
            "Image tokens not updated ({} previously stored).",
            episode.image_tokens().len()
        );
        return Ok(());
    }

    let images = episode
        .image_tokens()
        .iter()
        .map(|image| StoredImage {
            url: image.url.clone(),
            token: image.token.clone(),
        })
        .collect::<Vec<_>>();
    db.replace_image_tokens(&episode.comic_id, &episode.id, &images)?;

    println!("#{} {}", episode.index(), episode.title);
    for image in episode.image_tokens() {
        println!("{}\t{}", image.url, image.token);
    }
    Ok(())
}

fn run_list(db: &Database, comic_id: &str) -> Result<()> {
    let stored = db.load_episodes(comic_id)?;
    if stored.is_empty() {
        println!("No stored episodes for comic {comic_id}. Run `mirrorsync episodes` first.");
        return Ok(());
    }

    let episodes = stored
        .iter()
        .map(|episode| episode_from_stored(comic_id, episode))
        .collect::<Vec<_>>();
    print_episode_table(&episodes);

    if let Some(latest) = stored.iter().map(|episode| episode.updated_at.as_str()).max() {
        println!("\nLast synced: {}", format_synced_at_display(latest));
    }
    Ok(())
}

fn print_episode_table(episodes: &[EpisodeRecord]) {
    println!("{:<6} {:<12} {:<10} {:<40}", "INDEX", "EPISODE ID", "UNLOCKED", "TITLE");
    for episode in episodes {
        println!(
            "{:<6} {:<12} {:<10} {:<40}",
            episode.index(),
            truncate(&episode.id, 12),
            if episode.is_available() { "yes" } else { "no" },
            truncate(&episode.title, 40)
        );
    }
    let unlocked = episodes
        .iter()
        .filter(|episode| episode.is_available())
        .count();
    println!("\n{unlocked}/{} chapter(s) unlocked", episodes.len());
}

fn mirror_session(config: &Config, comic_id: &str) -> MirrorSession<UreqTransport> {
    let transport = UreqTransport::new(config.timeout(), config.request_headers());
    let fetcher = RetryingFetcher::new(transport, config.retry_policy());
    let settings = MirrorSettings {
        base_url: config.base_url.clone(),
        placeholder_src: config.placeholder_src.clone(),
        page_size: config.listing_page_size,
    };
    MirrorSession::new(comic_id, settings, fetcher)
}

fn warn_if_cookie_missing(config: &Config) {
    if config.cookie.trim().is_empty() {
        log::warn!("no mirror cookie configured; the mirror will treat requests as logged out");
    }
}

fn episode_from_stored(comic_id: &str, stored: &StoredEpisode) -> EpisodeRecord {
    EpisodeRecord::new(
        stored.ep_id.clone(),
        stored.index,
        stored.available,
        stored.title.clone(),
        comic_id,
    )
}

fn stored_from_episode(episode: &EpisodeRecord) -> StoredEpisode {
    StoredEpisode {
        ep_id: episode.id.clone(),
        index: episode.index(),
        title: episode.title.clone(),
        available: episode.is_available(),
        updated_at: String::new(),
    }
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
