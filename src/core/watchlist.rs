/// Watchlist Filter (C6, spec.md §4.6). Shared read-mostly set of watched
/// addresses, modeled on the teacher's `global.rs` shared-state pattern
/// (many hot-path readers, an infrequent external writer).
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct Watchlist {
    watched: RwLock<HashSet<Pubkey>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self { watched: RwLock::new(HashSet::new()) }
    }

    pub async fn add(&self, key: Pubkey) {
        self.watched.write().await.insert(key);
    }

    pub async fn remove(&self, key: &Pubkey) {
        self.watched.write().await.remove(key);
    }

    /// Returns the first watched key present among `keys`, else `None`.
    /// O(#keys) per call, not O(#watched).
    pub async fn first_match(&self, keys: &[Pubkey]) -> Option<Pubkey> {
        let watched = self.watched.read().await;
        keys.iter().find(|k| watched.contains(*k)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_a_watched_key_present_in_account_keys() {
        let list = Watchlist::new();
        let watched = Pubkey::new_unique();
        list.add(watched).await;
        let other = Pubkey::new_unique();
        let found = list.first_match(&[other, watched]).await;
        assert_eq!(found, Some(watched));
    }

    #[tokio::test]
    async fn no_match_when_nothing_watched_present() {
        let list = Watchlist::new();
        list.add(Pubkey::new_unique()).await;
        let found = list.first_match(&[Pubkey::new_unique()]).await;
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn removed_keys_stop_matching() {
        let list = Watchlist::new();
        let watched = Pubkey::new_unique();
        list.add(watched).await;
        list.remove(&watched).await;
        assert_eq!(list.first_match(&[watched]).await, None);
    }
}
