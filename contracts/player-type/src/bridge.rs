//! Decryption bridge: correlated requests to the gateway and exactly-once
//! application of the oracle's callbacks.
//!
//! The request returns as soon as the gateway issues a correlation id. The
//! cleartext arrives in a separate, later invocation, possibly from a
//! different caller. The context table keyed by that id is the only link
//! between the two.
//!
//! ## State hash
//! ```text
//! state_hash = keccak256("PTSH" || result_handle || self_address_strkey)
//! ```
//! The context keeps `result_handle`, so the hash is recomputed at callback
//! time rather than trusted from storage. The same handle set is what the
//! gateway checks the proof against.

use soroban_sdk::{contractclient, vec, Address, Bytes, BytesN, Env, Vec};

use crate::events::{EvDecryptionCompleted, EvDecryptionRequested};
use crate::{
    access, batch, cooldown, extend_instance_ttl, records, ActionKind, DataKey, DecryptionContext,
    DecryptionResult, RegistryError, TTL_LEDGERS,
};

/// Domain separator for the state hash: ASCII "PTSH"
pub const STATE_HASH_TAG: [u8; 4] = [0x50, 0x54, 0x53, 0x48];

/// Cleartext payload: player type as u32 big-endian
const PAYLOAD_LEN: u32 = 4;

/// Capability surface of the FHE coprocessor + decryption oracle.
#[contractclient(name = "GatewayClient")]
pub trait DecryptionGateway {
    fn trivial_encrypt(env: Env, value: u32) -> BytesN<32>;

    fn derive(env: Env, skill: BytesN<32>, plays: BytesN<32>) -> BytesN<32>;

    fn request_decryption(env: Env, requester: Address, handles: Vec<BytesN<32>>) -> u64;

    fn verify_decryption(
        env: Env,
        requester: Address,
        request_id: u64,
        handles: Vec<BytesN<32>>,
        cleartext: Bytes,
        proof: Bytes,
    ) -> bool;
}

pub(crate) fn request(
    env: &Env,
    caller: &Address,
    batch_id: u32,
    player: &Address,
) -> Result<u64, RegistryError> {
    access::require_provider(env, caller)?;
    access::require_not_paused(env)?;

    if batch_id == 0 || batch_id > batch::current_id(env) {
        return Err(RegistryError::InvalidBatch);
    }
    batch::require_active(env, batch_id)?;

    let now = env.ledger().timestamp();
    let config = access::load_config(env)?;
    cooldown::check_and_update(env, caller, ActionKind::DecryptionRequest, now, config.cooldown_seconds)?;

    let gateway = GatewayClient::new(env, &config.gateway);

    // Initialize-if-absent: a player with no submission derives from zeros
    let (skill, plays) = match records::get(env, batch_id, player) {
        Some(record) => (record.skill_score, record.play_count),
        None => {
            let zero = gateway.trivial_encrypt(&0);
            (zero.clone(), zero)
        }
    };
    let result_handle = gateway.derive(&skill, &plays);
    let state_hash = state_hash(env, &result_handle);

    let handles = vec![env, result_handle.clone()];
    let request_id = gateway.request_decryption(&env.current_contract_address(), &handles);

    let key = DataKey::Context(request_id);
    if env.storage().persistent().has(&key) {
        return Err(RegistryError::DuplicateRequest);
    }
    let context = DecryptionContext {
        request_id,
        batch_id,
        player: player.clone(),
        result_handle,
        state_hash: state_hash.clone(),
        gateway: config.gateway,
        processed: false,
        requested_at: now,
    };
    write_context(env, &context);

    EvDecryptionRequested {
        request_id,
        batch_id,
        state_hash,
    }.publish(env);

    Ok(request_id)
}

/// Not batch-lifecycle or pause gated: a request that was valid when made
/// is always completable.
pub(crate) fn callback(
    env: &Env,
    request_id: u64,
    cleartext: &Bytes,
    proof: &Bytes,
) -> Result<u32, RegistryError> {
    // Unknown ids are treated like consumed ones
    let mut context = load_context(env, request_id).ok_or(RegistryError::ReplayAttempt)?;
    if context.processed {
        return Err(RegistryError::ReplayAttempt);
    }
    if state_hash(env, &context.result_handle) != context.state_hash {
        return Err(RegistryError::StateMismatch);
    }

    let gateway = GatewayClient::new(env, &context.gateway);
    let handles = vec![env, context.result_handle.clone()];
    let verified = gateway.try_verify_decryption(
        &env.current_contract_address(),
        &request_id,
        &handles,
        cleartext,
        proof,
    );
    if !matches!(verified, Ok(Ok(true))) {
        return Err(RegistryError::InvalidProof);
    }

    let player_type = decode_payload(cleartext)?;
    let now = env.ledger().timestamp();

    context.processed = true;
    write_context(env, &context);

    let result = DecryptionResult {
        request_id,
        batch_id: context.batch_id,
        player: context.player,
        player_type,
        completed_at: now,
    };
    let key = DataKey::Outcome(request_id);
    env.storage().persistent().set(&key, &result);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);

    EvDecryptionCompleted {
        request_id,
        batch_id: context.batch_id,
        player_type,
    }.publish(env);

    Ok(player_type)
}

pub(crate) fn load_context(env: &Env, request_id: u64) -> Option<DecryptionContext> {
    env.storage().persistent().get(&DataKey::Context(request_id))
}

fn write_context(env: &Env, context: &DecryptionContext) {
    let key = DataKey::Context(context.request_id);
    env.storage().persistent().set(&key, context);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
    extend_instance_ttl(env);
}

fn state_hash(env: &Env, result_handle: &BytesN<32>) -> BytesN<32> {
    let mut preimage = Bytes::from_array(env, &STATE_HASH_TAG);
    preimage.append(&Bytes::from_array(env, &result_handle.to_array()));
    preimage.append(&env.current_contract_address().to_string().to_bytes());
    env.crypto().keccak256(&preimage).into()
}

fn decode_payload(cleartext: &Bytes) -> Result<u32, RegistryError> {
    if cleartext.len() != PAYLOAD_LEN {
        return Err(RegistryError::InvalidPayload);
    }
    let mut raw = [0u8; 4];
    cleartext.copy_into_slice(&mut raw);
    Ok(u32::from_be_bytes(raw))
}
