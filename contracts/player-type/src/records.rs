//! Ciphertext handle pairs per (batch, player). Last write wins.

use soroban_sdk::{Address, BytesN, Env};

use crate::{DataKey, EncryptedRecord, TTL_LEDGERS};

pub(crate) fn put(
    env: &Env,
    batch_id: u32,
    player: &Address,
    skill_score: &BytesN<32>,
    play_count: &BytesN<32>,
    now: u64,
) {
    let key = DataKey::Record(batch_id, player.clone());
    let record = EncryptedRecord {
        skill_score: skill_score.clone(),
        play_count: play_count.clone(),
        submitted_at: now,
    };
    env.storage().persistent().set(&key, &record);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
}

/// `None` when the player never submitted into `batch_id`; callers decide
/// the neutral default.
pub(crate) fn get(env: &Env, batch_id: u32, player: &Address) -> Option<EncryptedRecord> {
    env.storage()
        .persistent()
        .get(&DataKey::Record(batch_id, player.clone()))
}
