//! Per-(address, action kind) minimum interval.
//!
//! The check and the timestamp write happen in one step, before the guarded
//! work. A failure later in the same invocation reverts the write.

use soroban_sdk::{Address, Env};

use crate::{ActionKind, DataKey, RegistryError, TTL_LEDGERS};

pub(crate) fn check_and_update(
    env: &Env,
    who: &Address,
    kind: ActionKind,
    now: u64,
    cooldown_seconds: u64,
) -> Result<(), RegistryError> {
    let key = DataKey::LastAction(who.clone(), kind);
    // First action of a kind is never throttled
    if let Some(last) = env.storage().persistent().get::<DataKey, u64>(&key) {
        if now < last.saturating_add(cooldown_seconds) {
            return Err(RegistryError::CooldownActive);
        }
    }
    env.storage().persistent().set(&key, &now);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
    Ok(())
}

pub(crate) fn last_action(env: &Env, who: &Address, kind: ActionKind) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::LastAction(who.clone(), kind))
}
