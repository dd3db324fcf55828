use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Every collection is one table of JSON documents keyed by id. Unique
/// JSON1 expression indexes are the storage-level backstop for the
/// invariants the application relies on: globally unique username/email,
/// and at most one Like/Subscription per (actor, target) pair - the
/// toggle engine's check-then-act race loser is rejected here.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username
            ON users (json_extract(doc, '$.username'));
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email
            ON users (json_extract(doc, '$.email'));

        CREATE TABLE IF NOT EXISTS videos (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_videos_owner
            ON videos (json_extract(doc, '$.owner'));

        CREATE TABLE IF NOT EXISTS comments (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_video
            ON comments (json_extract(doc, '$.video'));

        CREATE TABLE IF NOT EXISTS tweets (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tweets_owner
            ON tweets (json_extract(doc, '$.owner'));

        CREATE TABLE IF NOT EXISTS likes (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_video
            ON likes (json_extract(doc, '$.liked_by'), json_extract(doc, '$.video'))
            WHERE json_extract(doc, '$.video') IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_comment
            ON likes (json_extract(doc, '$.liked_by'), json_extract(doc, '$.comment'))
            WHERE json_extract(doc, '$.comment') IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_tweet
            ON likes (json_extract(doc, '$.liked_by'), json_extract(doc, '$.tweet'))
            WHERE json_extract(doc, '$.tweet') IS NOT NULL;

        CREATE TABLE IF NOT EXISTS subscriptions (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_pair
            ON subscriptions (json_extract(doc, '$.subscriber'), json_extract(doc, '$.channel'));

        CREATE TABLE IF NOT EXISTS playlists (
            id   TEXT PRIMARY KEY,
            doc  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_playlists_owner
            ON playlists (json_extract(doc, '$.owner'));
        ",
    )?;

    info!("Store migrations complete");
    Ok(())
}
