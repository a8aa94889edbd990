//! Owner, provider allow-list and pause flag.

use soroban_sdk::{Address, Env};

use crate::events::{EvProviderAdded, EvProviderRemoved};
use crate::{Config, DataKey, RegistryError, TTL_LEDGERS};

pub(crate) fn load_owner(env: &Env) -> Result<Address, RegistryError> {
    env.storage()
        .instance()
        .get(&DataKey::Owner)
        .ok_or(RegistryError::NotInitialized)
}

pub(crate) fn load_config(env: &Env) -> Result<Config, RegistryError> {
    env.storage()
        .instance()
        .get(&DataKey::Settings)
        .ok_or(RegistryError::NotInitialized)
}

/// Caller must already have been `require_auth`'d by the entry point.
pub(crate) fn require_owner(env: &Env, caller: &Address) -> Result<(), RegistryError> {
    if *caller != load_owner(env)? {
        return Err(RegistryError::NotOwner);
    }
    Ok(())
}

pub(crate) fn require_provider(env: &Env, caller: &Address) -> Result<(), RegistryError> {
    if !is_provider(env, caller) {
        return Err(RegistryError::NotProvider);
    }
    Ok(())
}

pub(crate) fn require_not_paused(env: &Env) -> Result<(), RegistryError> {
    if is_paused(env) {
        return Err(RegistryError::Paused);
    }
    Ok(())
}

pub(crate) fn is_provider(env: &Env, addr: &Address) -> bool {
    env.storage()
        .persistent()
        .get(&DataKey::Provider(addr.clone()))
        .unwrap_or(false)
}

pub(crate) fn is_paused(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::Paused)
        .unwrap_or(false)
}

pub(crate) fn grant_provider(env: &Env, provider: &Address) {
    let key = DataKey::Provider(provider.clone());
    env.storage().persistent().set(&key, &true);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
    EvProviderAdded {
        provider: provider.clone(),
    }.publish(env);
}

pub(crate) fn revoke_provider(env: &Env, provider: &Address) {
    env.storage()
        .persistent()
        .remove(&DataKey::Provider(provider.clone()));
    EvProviderRemoved {
        provider: provider.clone(),
    }.publish(env);
}
