//! Rank progression and XP accounting. Every XP award also upserts the
//! leaderboard entry, and implicitly creates the profile so anonymous users
//! show up with a readable name instead of a null row.

use shipstore::{Store, StoreError};
use tracing::info;

use crate::tables;

/// Model/cache path bonus for a command that changed ship state.
pub const XP_COMMAND: i64 = 10;
/// Turbo-mode commands are cheaper to serve and pay out less.
pub const XP_TURBO: i64 = 5;
/// Both parties of a completed session authorization.
pub const XP_AUTH: i64 = 50;
pub const XP_PROMOTION: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    Promoted { title: String },
    AtCeiling { title: String },
}

/// Add XP, creating the profile on first contact, and mirror the new total
/// into the leaderboard sorted set. An existing profile is never reseeded,
/// so rank and mission stage stay monotonic.
pub async fn award_xp(store: &Store, user_id: &str, amount: i64) -> Result<i64, StoreError> {
    let key = format!("user:{user_id}");
    if !store.exists(&key).await? {
        let short = user_id.chars().take(5).collect::<String>();
        store
            .hset(
                &key,
                &[
                    ("name", format!("Cadet {short}")),
                    ("rank", "Cadet".to_string()),
                    ("rank_level", "0".to_string()),
                    ("mission_stage", "1".to_string()),
                    ("current_location", "Bridge".to_string()),
                ],
            )
            .await?;
    }
    let xp = store.hincrby(&key, "xp", amount).await?;
    store.zadd("leaderboard", user_id, xp).await?;
    Ok(xp)
}

/// Advance rank and mission stage after a mission success. At the rank
/// ceiling this is a no-op: no title change, no promotion XP.
pub async fn promote(store: &Store, user_id: &str) -> Result<Promotion, StoreError> {
    let max_level = store
        .get(tables::MAX_RANK_KEY)
        .await?
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(tables::MAX_RANK_LEVEL);

    let key = format!("user:{user_id}");
    let level = store
        .hget(&key, "rank_level")
        .await?
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);

    if level >= max_level {
        let title = store
            .hget(&format!("rank:{max_level}"), "title")
            .await?
            .unwrap_or_else(|| "Admiral".to_string());
        return Ok(Promotion::AtCeiling { title });
    }

    let next = level + 1;
    let title = store
        .hget(&format!("rank:{next}"), "title")
        .await?
        .unwrap_or_else(|| "Unknown Rank".to_string());
    store
        .hset(
            &key,
            &[("rank_level", next.to_string()), ("rank", title.clone())],
        )
        .await?;
    store.hincrby(&key, "mission_stage", 1).await?;
    award_xp(store, user_id, XP_PROMOTION).await?;
    info!(user = %user_id, rank = %title, "user promoted");
    Ok(Promotion::Promoted { title })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn award_creates_profile_and_leaderboard_entry() {
        let store = Store::memory();
        let xp = award_xp(&store, "abcdef-123", 10).await.unwrap();
        assert_eq!(xp, 10);
        assert_eq!(
            store.hget("user:abcdef-123", "name").await.unwrap().as_deref(),
            Some("Cadet abcde")
        );
        assert_eq!(
            store.ztop("leaderboard", 1).await.unwrap(),
            vec![("abcdef-123".to_string(), 10)]
        );

        // Second award accumulates instead of reseeding.
        let xp = award_xp(&store, "abcdef-123", 5).await.unwrap();
        assert_eq!(xp, 15);
    }

    #[tokio::test]
    async fn promote_advances_rank_stage_and_xp() {
        let store = Store::memory();
        tables::bootstrap(&store).await.unwrap();
        award_xp(&store, "u1", 10).await.unwrap();

        let p = promote(&store, "u1").await.unwrap();
        assert_eq!(
            p,
            Promotion::Promoted {
                title: "Ensign".to_string()
            }
        );
        assert_eq!(
            store.hget("user:u1", "rank_level").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(
            store.hget("user:u1", "mission_stage").await.unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(
            store.hget("user:u1", "xp").await.unwrap().as_deref(),
            Some("1010")
        );
    }

    #[tokio::test]
    async fn promote_is_a_noop_at_the_ceiling() {
        let store = Store::memory();
        tables::bootstrap(&store).await.unwrap();
        store
            .hset(
                "user:u1",
                &[
                    ("name", "Admiral T".to_string()),
                    ("rank_level", "5".to_string()),
                ],
            )
            .await
            .unwrap();

        let p = promote(&store, "u1").await.unwrap();
        assert_eq!(
            p,
            Promotion::AtCeiling {
                title: "Admiral".to_string()
            }
        );
        assert_eq!(
            store.hget("user:u1", "rank_level").await.unwrap().as_deref(),
            Some("5")
        );
        // No promotion XP at the ceiling.
        assert_eq!(store.hget("user:u1", "xp").await.unwrap(), None);
    }
}
