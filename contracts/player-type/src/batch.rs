//! Batch lifecycle: `Open` → `Closed`, ids sequential from 1.
//!
//! Exactly one batch is current. Opening a new batch closes the previous one
//! if it is still active, so at most one batch is ever active.

use soroban_sdk::Env;

use crate::events::{EvBatchClosed, EvBatchOpened};
use crate::{extend_instance_ttl, Batch, DataKey, RegistryError, TTL_LEDGERS};

pub(crate) fn current_id(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::CurrentBatch)
        .unwrap_or(0)
}

pub(crate) fn load(env: &Env, batch_id: u32) -> Option<Batch> {
    env.storage().persistent().get(&DataKey::BatchInfo(batch_id))
}

pub(crate) fn is_active(env: &Env, batch_id: u32) -> bool {
    load(env, batch_id).map_or(false, |b| b.active)
}

pub(crate) fn require_active(env: &Env, batch_id: u32) -> Result<(), RegistryError> {
    let batch = load(env, batch_id).ok_or(RegistryError::InvalidBatch)?;
    if !batch.active {
        return Err(RegistryError::BatchNotActive);
    }
    Ok(())
}

/// Allocate the next id and make it current. Returns the new id.
pub(crate) fn open(env: &Env) -> u32 {
    let now = env.ledger().timestamp();
    let previous = current_id(env);
    if let Some(mut batch) = load(env, previous) {
        if batch.active {
            finish(env, &mut batch, now);
        }
    }

    let batch_id = previous.saturating_add(1);
    let batch = Batch {
        id: batch_id,
        active: true,
        start_time: now,
        end_time: 0,
    };
    write(env, &batch);
    env.storage().instance().set(&DataKey::CurrentBatch, &batch_id);
    extend_instance_ttl(env);

    EvBatchOpened {
        batch_id,
        start_time: now,
    }.publish(env);
    batch_id
}

pub(crate) fn close_current(env: &Env) -> Result<(), RegistryError> {
    let mut batch = load(env, current_id(env)).ok_or(RegistryError::BatchNotActive)?;
    if !batch.active {
        return Err(RegistryError::BatchNotActive);
    }
    finish(env, &mut batch, env.ledger().timestamp());
    Ok(())
}

fn finish(env: &Env, batch: &mut Batch, now: u64) {
    batch.active = false;
    batch.end_time = now;
    write(env, batch);
    EvBatchClosed {
        batch_id: batch.id,
        end_time: now,
    }.publish(env);
}

fn write(env: &Env, batch: &Batch) {
    let key = DataKey::BatchInfo(batch.id);
    env.storage().persistent().set(&key, batch);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
}
