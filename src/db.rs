use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEpisode {
    pub ep_id: String,
    pub index: u32,
    pub title: String,
    pub available: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub token: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                comic_id TEXT NOT NULL,
                ep_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                title TEXT NOT NULL,
                available INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (comic_id, ep_id)
            );
            CREATE INDEX IF NOT EXISTS idx_episodes_order ON episodes(comic_id, idx);
            CREATE TABLE IF NOT EXISTS image_tokens (
                comic_id TEXT NOT NULL,
                ep_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                url TEXT NOT NULL,
                token TEXT NOT NULL,
                PRIMARY KEY (comic_id, ep_id, position)
            );
            "#,
        )?;
        Ok(())
    }

    /// Replaces the episode rows of a comic with `episodes`. Rows missing
    /// from `episodes` are dropped; a stored `available` flag on a kept row is
    /// never cleared by a later save.
    pub fn save_episodes(&self, comic_id: &str, episodes: &[StoredEpisode]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        {
            let kept = episodes
                .iter()
                .map(|episode| episode.ep_id.as_str())
                .collect::<HashSet<_>>();
            let mut stored = tx.prepare("SELECT ep_id FROM episodes WHERE comic_id = ?1")?;
            let stale = stored
                .query_map(params![comic_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .filter(|ep_id| !kept.contains(ep_id.as_str()))
                .collect::<Vec<_>>();
            let mut delete = tx.prepare("DELETE FROM episodes WHERE comic_id = ?1 AND ep_id = ?2")?;
            let mut delete_images =
                tx.prepare("DELETE FROM image_tokens WHERE comic_id = ?1 AND ep_id = ?2")?;
            for ep_id in &stale {
                delete.execute(params![comic_id, ep_id])?;
                delete_images.execute(params![comic_id, ep_id])?;
            }
            if !stale.is_empty() {
                log::info!("comic {comic_id}: dropped {} chapter(s) no longer listed", stale.len());
            }

            let mut stmt = tx.prepare(
                r#"
                INSERT INTO episodes (comic_id, ep_id, idx, title, available, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(comic_id, ep_id) DO UPDATE SET
                    idx = excluded.idx,
                    title = excluded.title,
                    available = MAX(episodes.available, excluded.available),
                    updated_at = excluded.updated_at
                "#,
            )?;
            for episode in episodes {
                stmt.execute(params![
                    comic_id,
                    episode.ep_id,
                    episode.index,
                    episode.title,
                    episode.available,
                    now
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("failed to save episodes of comic {comic_id}"))?;
        Ok(())
    }

    pub fn load_episodes(&self, comic_id: &str) -> Result<Vec<StoredEpisode>> {
        let mut stmt = self.conn.prepare(
            "SELECT ep_id, idx, title, available, updated_at FROM episodes WHERE comic_id = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![comic_id], |row| {
            Ok(StoredEpisode {
                ep_id: row.get(0)?,
                index: row.get(1)?,
                title: row.get(2)?,
                available: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Swaps the whole token list of one episode.
    pub fn replace_image_tokens(
        &self,
        comic_id: &str,
        ep_id: &str,
        images: &[StoredImage],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM image_tokens WHERE comic_id = ?1 AND ep_id = ?2",
            params![comic_id, ep_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO image_tokens (comic_id, ep_id, position, url, token) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, image) in images.iter().enumerate() {
                stmt.execute(params![comic_id, ep_id, position as i64, image.url, image.token])?;
            }
        }
        tx.commit()
            .with_context(|| format!("failed to save image tokens of episode {ep_id}"))?;
        Ok(())
    }

    pub fn image_tokens(&self, comic_id: &str, ep_id: &str) -> Result<Vec<StoredImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, token FROM image_tokens WHERE comic_id = ?1 AND ep_id = ?2 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![comic_id, ep_id], |row| {
            Ok(StoredImage {
                url: row.get(0)?,
                token: row.get(1)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(ep_id: &str, index: u32, available: bool) -> StoredEpisode {
        StoredEpisode {
            ep_id: ep_id.to_string(),
            index,
            title: format!("Chapter {index}"),
            available,
            updated_at: String::new(),
        }
    }

    fn open() -> Database {
        let db = Database::open_in_memory().expect("open in-memory db");
        db.migrate().expect("migrate");
        db
    }

    #[test]
    fn episodes_come_back_in_reading_order() {
        let db = open();
        db.save_episodes("7", &[stored("b", 2, false), stored("a", 1, true)])
            .expect("save");

        let loaded = db.load_episodes("7").expect("load");
        let ids = loaded.iter().map(|ep| ep.ep_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(loaded[0].available);
        assert!(!loaded[1].available);
        assert!(db.load_episodes("8").expect("load other").is_empty());
    }

    #[test]
    fn saving_never_clears_available() {
        let db = open();
        db.save_episodes("7", &[stored("a", 1, true)]).expect("first save");
        db.save_episodes("7", &[stored("a", 1, false)]).expect("second save");

        let loaded = db.load_episodes("7").expect("load");
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].available);
    }

    #[test]
    fn saving_drops_chapters_missing_from_the_new_list() {
        let db = open();
        db.save_episodes("7", &[stored("a", 1, true), stored("b", 2, false), stored("c", 3, false)])
            .expect("first save");
        db.replace_image_tokens(
            "7",
            "b",
            &[StoredImage {
                url: "https://img.test/b.jpg".to_string(),
                token: "t".to_string(),
            }],
        )
        .expect("save tokens");
        db.save_episodes("8", &[stored("b", 1, false)]).expect("other comic");

        db.save_episodes("7", &[stored("a", 1, false), stored("c", 2, false)])
            .expect("second save");

        let loaded = db.load_episodes("7").expect("load");
        let rows = loaded
            .iter()
            .map(|ep| (ep.ep_id.as_str(), ep.index, ep.available))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![("a", 1, true), ("c", 2, false)]);
        assert!(db.image_tokens("7", "b").expect("load tokens").is_empty());
        assert_eq!(db.load_episodes("8").expect("load other").len(), 1);
    }

    #[test]
    fn image_tokens_are_replaced_wholesale() {
        let db = open();
        let first = vec![
            StoredImage {
                url: "https://img.test/1.jpg".to_string(),
                token: "t1".to_string(),
            },
            StoredImage {
                url: "https://img.test/2.jpg".to_string(),
                token: "t2".to_string(),
            },
        ];
        db.replace_image_tokens("7", "a", &first).expect("save first");
        let second = vec![StoredImage {
            url: "https://img.test/1.jpg".to_string(),
            token: "fresh".to_string(),
        }];
        db.replace_image_tokens("7", "a", &second).expect("save second");

        assert_eq!(db.image_tokens("7", "a").expect("load"), second);
        assert!(db.image_tokens("7", "b").expect("load other").is_empty());
    }
}
