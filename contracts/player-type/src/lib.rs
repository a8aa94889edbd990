#![no_std]

//! # Player-Type Registry
//!
//! Authorized data providers submit per-player encrypted skill metrics into
//! sequential batches. A provider can then ask the FHE gateway to derive the
//! player type over the still-encrypted values and decrypt it off-chain. The
//! cleartext comes back later, in an unrelated invocation, through
//! `handle_callback`.
//!
//! ## Flow
//! 1. Owner deploys with an explicit provider list and a `Config`; batch #1 opens.
//! 2. Providers call `submit_encrypted_skill_data(player, skill, plays)`.
//!    The handles land in the current batch (last write wins).
//! 3. A provider calls `request_decryption(batch_id, player)`:
//!    a. missing inputs are materialized as trivial encryptions of zero,
//!    b. the gateway derives the result handle,
//!    c. `state_hash = keccak256("PTSH" || result_handle || self_address)`,
//!    d. the gateway hands back a correlation id and a pending context is stored.
//! 4. The relay calls `handle_callback(request_id, cleartext, proof)`. The
//!    context is checked for replay and its state hash recomputed. The proof is
//!    verified by the gateway that served the request, and only then is the
//!    context marked processed and the result recorded.
//!
//! ## Gates
//! | Entry point                   | owner | provider | not paused | batch active | cooldown |
//! |-------------------------------|:-----:|:--------:|:----------:|:------------:|:--------:|
//! | admin ops / batch transitions |   x   |          |            |              |          |
//! | `submit_encrypted_skill_data` |       |    x     |     x      |      x       |    x     |
//! | `request_decryption`          |       |    x     |     x      |      x       |    x     |
//! | `handle_callback`             |       |          |            |              |          |

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, Address, Bytes, BytesN, Env, Vec,
};

mod access;
mod batch;
mod bridge;
mod cooldown;
pub mod events;
mod records;

pub use bridge::{DecryptionGateway, GatewayClient, STATE_HASH_TAG};

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum RegistryError {
    NotOwner = 1,
    NotProvider = 2,
    Paused = 3,
    CooldownActive = 4,
    BatchNotActive = 5,
    InvalidBatch = 6,
    ReplayAttempt = 7,
    StateMismatch = 8,
    InvalidProof = 9,
    InvalidPayload = 10,
    DuplicateRequest = 11,
    NotInitialized = 12,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Minimum gap between two actions of the same kind by one address
    pub cooldown_seconds: u64,
    /// Coprocessor + decryption oracle used for new requests
    pub gateway: Address,
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionKind {
    Submission = 0,
    DecryptionRequest = 1,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    pub id: u32,
    pub active: bool,
    pub start_time: u64,
    /// 0 while the batch is open
    pub end_time: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedRecord {
    pub skill_score: BytesN<32>,
    pub play_count: BytesN<32>,
    pub submitted_at: u64,
}

/// Pending (`processed == false`) or completed decryption request.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptionContext {
    pub request_id: u64,
    pub batch_id: u32,
    pub player: Address,
    pub result_handle: BytesN<32>,
    pub state_hash: BytesN<32>,
    /// Gateway that issued `request_id`; it alone can verify the callback.
    pub gateway: Address,
    pub processed: bool,
    pub requested_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptionResult {
    pub request_id: u64,
    pub batch_id: u32,
    pub player: Address,
    pub player_type: u32,
    pub completed_at: u64,
}

#[contracttype]
#[derive(Clone)]
pub(crate) enum DataKey {
    // instance
    Owner,
    Settings,
    Paused,
    CurrentBatch,
    // persistent
    Provider(Address),
    BatchInfo(u32),
    Record(u32, Address),
    Context(u64),
    Outcome(u64),
    LastAction(Address, ActionKind),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Historical batches, records and contexts are never collected; every write
// pushes the entry 120 days out.
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
pub(crate) const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

/// Bumped on every state-changing call, like the persistent entries it writes.
pub(crate) fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(TTL_LEDGERS, TTL_LEDGERS);
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct PlayerTypeRegistry;

#[contractimpl]
impl PlayerTypeRegistry {
    // ───────────────────────────────────────────────────────────────────────────
    //  Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, owner: Address, providers: Vec<Address>, config: Config) {
        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Settings, &config);
        env.storage().instance().set(&DataKey::Paused, &false);
        for provider in providers.iter() {
            access::grant_provider(&env, &provider);
        }
        batch::open(&env);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Submissions & decryption
    // ───────────────────────────────────────────────────────────────────────────

    /// Store `(skill, plays)` for `player` in the current batch.
    pub fn submit_encrypted_skill_data(
        env: Env,
        caller: Address,
        player: Address,
        skill_score: BytesN<32>,
        play_count: BytesN<32>,
    ) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_provider(&env, &caller)?;
        access::require_not_paused(&env)?;

        let batch_id = batch::current_id(&env);
        batch::require_active(&env, batch_id)?;

        let now = env.ledger().timestamp();
        let config = access::load_config(&env)?;
        cooldown::check_and_update(&env, &caller, ActionKind::Submission, now, config.cooldown_seconds)?;

        records::put(&env, batch_id, &player, &skill_score, &play_count, now);
        extend_instance_ttl(&env);

        events::EvSkillDataSubmitted {
            batch_id,
            provider: caller,
            player,
            skill_score,
            play_count,
        }.publish(&env);
        Ok(())
    }

    /// Open an asynchronous decryption of `player`'s derived type in `batch_id`.
    /// Returns the correlation id the callback will carry.
    pub fn request_decryption(
        env: Env,
        caller: Address,
        batch_id: u32,
        player: Address,
    ) -> Result<u64, RegistryError> {
        caller.require_auth();
        bridge::request(&env, &caller, batch_id, &player)
    }

    /// Oracle relay entry point. Returns the decoded player type.
    pub fn handle_callback(
        env: Env,
        request_id: u64,
        cleartext: Bytes,
        proof: Bytes,
    ) -> Result<u32, RegistryError> {
        bridge::callback(&env, request_id, &cleartext, &proof)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Batch lifecycle (owner)
    // ───────────────────────────────────────────────────────────────────────────

    /// Open the next batch; a still-active current batch is closed first.
    pub fn open_batch(env: Env, caller: Address) -> Result<u32, RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        Ok(batch::open(&env))
    }

    pub fn close_batch(env: Env, caller: Address) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        batch::close_current(&env)?;
        extend_instance_ttl(&env);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Administration (owner)
    // ───────────────────────────────────────────────────────────────────────────

    pub fn transfer_ownership(
        env: Env,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Owner, &new_owner);
        extend_instance_ttl(&env);
        events::EvOwnershipTransferred {
            previous_owner: caller,
            new_owner,
        }.publish(&env);
        Ok(())
    }

    pub fn add_provider(env: Env, caller: Address, provider: Address) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        access::grant_provider(&env, &provider);
        extend_instance_ttl(&env);
        Ok(())
    }

    pub fn remove_provider(
        env: Env,
        caller: Address,
        provider: Address,
    ) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        access::revoke_provider(&env, &provider);
        extend_instance_ttl(&env);
        Ok(())
    }

    pub fn pause(env: Env, caller: Address) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Paused, &true);
        extend_instance_ttl(&env);
        events::EvPaused { by: caller }.publish(&env);
        Ok(())
    }

    pub fn unpause(env: Env, caller: Address) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Paused, &false);
        extend_instance_ttl(&env);
        events::EvUnpaused { by: caller }.publish(&env);
        Ok(())
    }

    pub fn set_cooldown(env: Env, caller: Address, seconds: u64) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        let mut config = access::load_config(&env)?;
        config.cooldown_seconds = seconds;
        env.storage().instance().set(&DataKey::Settings, &config);
        extend_instance_ttl(&env);
        events::EvCooldownUpdated {
            cooldown_seconds: seconds,
        }.publish(&env);
        Ok(())
    }

    /// Swap the gateway for future requests. Pending contexts keep the
    /// gateway that issued them.
    pub fn set_gateway(env: Env, caller: Address, gateway: Address) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        let mut config = access::load_config(&env)?;
        config.gateway = gateway.clone();
        env.storage().instance().set(&DataKey::Settings, &config);
        extend_instance_ttl(&env);
        events::EvGatewayUpdated { gateway }.publish(&env);
        Ok(())
    }

    pub fn upgrade(env: Env, caller: Address, new_wasm_hash: BytesN<32>) -> Result<(), RegistryError> {
        caller.require_auth();
        access::require_owner(&env, &caller)?;
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Reads
    // ───────────────────────────────────────────────────────────────────────────

    pub fn owner(env: Env) -> Result<Address, RegistryError> {
        access::load_owner(&env)
    }

    pub fn is_provider(env: Env, addr: Address) -> bool {
        access::is_provider(&env, &addr)
    }

    pub fn is_paused(env: Env) -> bool {
        access::is_paused(&env)
    }

    pub fn get_config(env: Env) -> Result<Config, RegistryError> {
        access::load_config(&env)
    }

    pub fn current_batch_id(env: Env) -> u32 {
        batch::current_id(&env)
    }

    pub fn is_batch_active(env: Env, batch_id: u32) -> bool {
        batch::is_active(&env, batch_id)
    }

    pub fn get_batch(env: Env, batch_id: u32) -> Result<Batch, RegistryError> {
        batch::load(&env, batch_id).ok_or(RegistryError::InvalidBatch)
    }

    pub fn get_record(env: Env, batch_id: u32, player: Address) -> Option<EncryptedRecord> {
        records::get(&env, batch_id, &player)
    }

    pub fn get_context(env: Env, request_id: u64) -> Option<DecryptionContext> {
        bridge::load_context(&env, request_id)
    }

    pub fn get_result(env: Env, request_id: u64) -> Option<DecryptionResult> {
        env.storage().persistent().get(&DataKey::Outcome(request_id))
    }

    pub fn last_action(env: Env, addr: Address, kind: ActionKind) -> Option<u64> {
        cooldown::last_action(&env, &addr, kind)
    }
}
