#![no_std]

//! # FHE Gateway (development coprocessor + decryption oracle endpoint)
//!
//! Reference implementation of the capability surface the player-type
//! registry consumes. It plays two roles:
//!
//! | Role                 | Entry points                                         |
//! |----------------------|------------------------------------------------------|
//! | Coprocessor          | `encrypt`, `trivial_encrypt`, `derive`               |
//! | Decryption oracle    | `request_decryption`, `verify_decryption`            |
//!
//! ## Ciphertext handles
//!
//! A handle is an opaque 32-byte reference:
//! ```text
//! handle = keccak256("FHEH" || nonce_be8)
//! ```
//! This development backend keeps the cleartext behind each handle in
//! contract storage. Only the relay (admin) may read it back through
//! `relay_cleartext`. The all-zero handle is the uninitialized handle and
//! always reads as cleartext `0`.
//!
//! ## Player-type derivation
//!
//! ```text
//! avg  = plays == 0 ? 0 : skill / plays
//! type = 0 Novice      (avg <  10)
//!        1 Casual      (avg <  50)
//!        2 Competitive (avg < 100)
//!        3 Elite       (otherwise)
//! ```
//!
//! ## Decryption proofs
//!
//! A request stores `handles_digest = keccak256(h_0 || h_1 || ...)`. The
//! off-chain KMS signer answers with `r(32) || s(32) || recovery_id(1)`, a
//! secp256k1 signature over
//! ```text
//! keccak256("FHED" || request_id_be8 || handles_digest || cleartext)
//! ```
//! Only the recovery ids 0 and 1 and canonical low-s signatures are accepted.
//! `verify_decryption` recovers the public key and accepts iff it equals the
//! configured 65-byte SEC1 signer key.
//!
//! Only handles produced by `derive` can be queued for decryption, so the raw
//! skill and play-count inputs are never revealed by the relay.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Bytes, BytesN,
    Env, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Error codes
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum GatewayError {
    AdminNotSet = 1,
    UnknownHandle = 2,
    UnknownRequest = 3,
    SignerNotSet = 4,
    NotRequester = 5,
    EmptyRequest = 6,
    /// Only `derive` outputs may be decrypted, never raw inputs
    NotDecryptable = 7,
    // Verification failure reasons (reported via EvVerifyFailed)
    ProofWrongLength = 8,
    BadRecoveryId = 9,
    BadSignature = 10,
    HandlesMismatch = 11,
    SignerMismatch = 12,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvHandleCreated {
    pub handle: BytesN<32>,
}

/// Picked up by the off-chain relay, which decrypts and signs the response.
#[contractevent]
pub struct EvDecryptionRequested {
    pub request_id: u64,
    pub requester: Address,
    pub handles: Vec<BytesN<32>>,
}

#[contractevent]
pub struct EvSignerUpdated {
    pub signer: BytesN<65>,
}

#[contractevent]
pub struct EvVerifyFailed {
    pub request_id: u64,
    pub reason: u32,
}

#[contractevent]
pub struct EvVerifySuccess {
    pub request_id: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Storage
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingRequest {
    pub requester: Address,
    pub handles_digest: BytesN<32>,
    pub requested_at: u64,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Admin,
    /// SEC1 uncompressed secp256k1 key of the KMS signer
    Signer,
    HandleNonce,
    RequestNonce,
    Cleartext(BytesN<32>),
    /// Set for handles produced by `derive`
    Derived(BytesN<32>),
    Request(u64),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain separator for handle derivation: ASCII "FHEH"
const HANDLE_TAG: [u8; 4] = [0x46, 0x48, 0x45, 0x48];

/// Domain separator for decryption digests: ASCII "FHED"
pub const DECRYPTION_TAG: [u8; 4] = [0x46, 0x48, 0x45, 0x44];

pub const PROOF_LEN: u32 = 65;

/// secp256k1 group order n, big-endian
const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// floor(n / 2), the largest low-s value
const HALF_CURVE_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

pub const TYPE_NOVICE: u32 = 0;
pub const TYPE_CASUAL: u32 = 1;
pub const TYPE_COMPETITIVE: u32 = 2;
pub const TYPE_ELITE: u32 = 3;

const CASUAL_MIN_AVG: u32 = 10;
const COMPETITIVE_MIN_AVG: u32 = 50;
const ELITE_MIN_AVG: u32 = 100;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Ciphertexts and requests live for 120 days and are bumped on every write
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60;
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct FheGateway;

#[contractimpl]
impl FheGateway {
    pub fn __constructor(env: Env, admin: Address, signer: BytesN<65>) {
        env.storage().instance().set(&StorageKey::Admin, &admin);
        env.storage().instance().set(&StorageKey::Signer, &signer);
        env.storage().instance().set(&StorageKey::HandleNonce, &0u64);
        env.storage().instance().set(&StorageKey::RequestNonce, &0u64);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Coprocessor
    // ───────────────────────────────────────────────────────────────────────────

    /// Register an input ciphertext on behalf of `owner`.
    pub fn encrypt(env: Env, owner: Address, value: u32) -> BytesN<32> {
        owner.require_auth();
        Self::new_handle(&env, value)
    }

    /// Encrypt a public constant. Used to materialize uninitialized inputs.
    pub fn trivial_encrypt(env: Env, value: u32) -> BytesN<32> {
        Self::new_handle(&env, value)
    }

    /// Derive the player-type ciphertext from a (skill, plays) pair.
    pub fn derive(
        env: Env,
        skill: BytesN<32>,
        plays: BytesN<32>,
    ) -> Result<BytesN<32>, GatewayError> {
        let skill = Self::read_cleartext(&env, &skill)?;
        let plays = Self::read_cleartext(&env, &plays)?;
        let handle = Self::new_handle(&env, player_type(skill, plays));

        let key = StorageKey::Derived(handle.clone());
        env.storage().persistent().set(&key, &true);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
        Ok(handle)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Decryption oracle
    // ───────────────────────────────────────────────────────────────────────────

    /// Queue `handles` for off-chain decryption and return the correlation id.
    /// Every handle must be a `derive` output; inputs stay sealed.
    pub fn request_decryption(
        env: Env,
        requester: Address,
        handles: Vec<BytesN<32>>,
    ) -> Result<u64, GatewayError> {
        requester.require_auth();
        if handles.is_empty() {
            return Err(GatewayError::EmptyRequest);
        }
        for handle in handles.iter() {
            Self::read_cleartext(&env, &handle)?;
            if !env.storage().persistent().has(&StorageKey::Derived(handle.clone())) {
                return Err(GatewayError::NotDecryptable);
            }
        }

        let request_id: u64 = env
            .storage()
            .instance()
            .get::<StorageKey, u64>(&StorageKey::RequestNonce)
            .unwrap_or(0)
            .saturating_add(1);
        env.storage().instance().set(&StorageKey::RequestNonce, &request_id);
        env.storage()
            .instance()
            .extend_ttl(TTL_LEDGERS, TTL_LEDGERS);

        let pending = PendingRequest {
            requester: requester.clone(),
            handles_digest: handles_digest(&env, &handles),
            requested_at: env.ledger().timestamp(),
        };
        let key = StorageKey::Request(request_id);
        env.storage().persistent().set(&key, &pending);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);

        EvDecryptionRequested {
            request_id,
            requester,
            handles,
        }.publish(&env);

        Ok(request_id)
    }

    /// Check the KMS signer's attestation that `cleartext` decrypts `handles`
    /// for `request_id`. Read-only: exactly-once semantics belong to the caller.
    pub fn verify_decryption(
        env: Env,
        requester: Address,
        request_id: u64,
        handles: Vec<BytesN<32>>,
        cleartext: Bytes,
        proof: Bytes,
    ) -> bool {
        match Self::check_decryption(&env, &requester, request_id, &handles, &cleartext, &proof) {
            Ok(()) => {
                EvVerifySuccess { request_id }.publish(&env);
                true
            }
            Err(reason) => {
                EvVerifyFailed {
                    request_id,
                    reason: reason as u32,
                }.publish(&env);
                false
            }
        }
    }

    pub fn get_request(env: Env, request_id: u64) -> Result<PendingRequest, GatewayError> {
        env.storage()
            .persistent()
            .get(&StorageKey::Request(request_id))
            .ok_or(GatewayError::UnknownRequest)
    }

    /// Cleartext lookup for the relay that produces signed responses.
    pub fn relay_cleartext(env: Env, handle: BytesN<32>) -> Result<u32, GatewayError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        Self::read_cleartext(&env, &handle)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_signer(env: Env) -> Result<BytesN<65>, GatewayError> {
        Self::load_signer(&env)
    }

    pub fn set_signer(env: Env, signer: BytesN<65>) -> Result<(), GatewayError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Signer, &signer);
        env.storage()
            .instance()
            .extend_ttl(TTL_LEDGERS, TTL_LEDGERS);
        EvSignerUpdated { signer }.publish(&env);
        Ok(())
    }

    pub fn get_admin(env: Env) -> Result<Address, GatewayError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), GatewayError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Admin, &new_admin);
        env.storage()
            .instance()
            .extend_ttl(TTL_LEDGERS, TTL_LEDGERS);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal
    // ═══════════════════════════════════════════════════════════════════════════

    fn check_decryption(
        env: &Env,
        requester: &Address,
        request_id: u64,
        handles: &Vec<BytesN<32>>,
        cleartext: &Bytes,
        proof: &Bytes,
    ) -> Result<(), GatewayError> {
        let pending: PendingRequest = env
            .storage()
            .persistent()
            .get(&StorageKey::Request(request_id))
            .ok_or(GatewayError::UnknownRequest)?;
        if pending.requester != *requester {
            return Err(GatewayError::NotRequester);
        }
        let digest = handles_digest(env, handles);
        if digest != pending.handles_digest {
            return Err(GatewayError::HandlesMismatch);
        }

        if proof.len() != PROOF_LEN {
            return Err(GatewayError::ProofWrongLength);
        }
        // The KMS signer never emits 2 or 3 (x = r + n)
        let recovery_id = proof.get(64).unwrap_or(u8::MAX) as u32;
        if recovery_id > 1 {
            return Err(GatewayError::BadRecoveryId);
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        proof.slice(0..32).copy_into_slice(&mut r);
        proof.slice(32..64).copy_into_slice(&mut s);
        if !is_canonical_signature(&r, &s) {
            return Err(GatewayError::BadSignature);
        }
        let signature: BytesN<64> = proof
            .slice(0..64)
            .try_into()
            .map_err(|_| GatewayError::ProofWrongLength)?;

        let expected = Self::load_signer(env)?;
        let message = decryption_message(env, request_id, &digest, cleartext);
        let message_digest = env.crypto().keccak256(&message);
        let recovered = env
            .crypto()
            .secp256k1_recover(&message_digest, &signature, recovery_id);
        if recovered != expected {
            return Err(GatewayError::SignerMismatch);
        }
        Ok(())
    }

    fn new_handle(env: &Env, value: u32) -> BytesN<32> {
        let nonce: u64 = env
            .storage()
            .instance()
            .get::<StorageKey, u64>(&StorageKey::HandleNonce)
            .unwrap_or(0)
            .saturating_add(1);
        env.storage().instance().set(&StorageKey::HandleNonce, &nonce);

        let mut preimage = Bytes::from_array(env, &HANDLE_TAG);
        preimage.append(&Bytes::from_array(env, &nonce.to_be_bytes()));
        let handle: BytesN<32> = env.crypto().keccak256(&preimage).into();

        let key = StorageKey::Cleartext(handle.clone());
        env.storage().persistent().set(&key, &value);
        env.storage()
            .persistent()
            .extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
        env.storage()
            .instance()
            .extend_ttl(TTL_LEDGERS, TTL_LEDGERS);

        EvHandleCreated {
            handle: handle.clone(),
        }.publish(env);
        handle
    }

    fn read_cleartext(env: &Env, handle: &BytesN<32>) -> Result<u32, GatewayError> {
        if handle.to_array() == [0u8; 32] {
            return Ok(0);
        }
        env.storage()
            .persistent()
            .get(&StorageKey::Cleartext(handle.clone()))
            .ok_or(GatewayError::UnknownHandle)
    }

    fn load_admin(env: &Env) -> Result<Address, GatewayError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(GatewayError::AdminNotSet)
    }

    fn load_signer(env: &Env) -> Result<BytesN<65>, GatewayError> {
        env.storage()
            .instance()
            .get(&StorageKey::Signer)
            .ok_or(GatewayError::SignerNotSet)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Shared encodings (also used by relays and tests)
// ═══════════════════════════════════════════════════════════════════════════════

/// Guarded-ratio player classification over cleartext inputs.
pub fn player_type(skill: u32, plays: u32) -> u32 {
    let avg = if plays == 0 { 0 } else { skill / plays };
    match avg {
        a if a < CASUAL_MIN_AVG => TYPE_NOVICE,
        a if a < COMPETITIVE_MIN_AVG => TYPE_CASUAL,
        a if a < ELITE_MIN_AVG => TYPE_COMPETITIVE,
        _ => TYPE_ELITE,
    }
}

/// `0 < r < n` and `0 < s <= n/2`. Host recovery traps on anything else.
/// An in-range `r` that is not the x-coordinate of a curve point still traps;
/// callers that must not abort use the `try_` client.
fn is_canonical_signature(r: &[u8; 32], s: &[u8; 32]) -> bool {
    let zero = [0u8; 32];
    *r != zero && *r < CURVE_ORDER && *s != zero && *s <= HALF_CURVE_ORDER
}

/// `keccak256(h_0 || h_1 || ...)`
pub fn handles_digest(env: &Env, handles: &Vec<BytesN<32>>) -> BytesN<32> {
    let mut preimage = Bytes::new(env);
    for handle in handles.iter() {
        preimage.append(&Bytes::from_array(env, &handle.to_array()));
    }
    env.crypto().keccak256(&preimage).into()
}

/// `"FHED" || request_id_be8 || handles_digest || cleartext`, the message the
/// KMS signer hashes and signs.
pub fn decryption_message(
    env: &Env,
    request_id: u64,
    handles_digest: &BytesN<32>,
    cleartext: &Bytes,
) -> Bytes {
    let mut message = Bytes::from_array(env, &DECRYPTION_TAG);
    message.append(&Bytes::from_array(env, &request_id.to_be_bytes()));
    message.append(&Bytes::from_array(env, &handles_digest.to_array()));
    message.append(cleartext);
    message
}
