//! Every state transition publishes one of these; together with the
//! constructor arguments they are enough to rebuild the registry off-chain.

use soroban_sdk::{contractevent, Address, BytesN};

#[contractevent]
pub struct EvOwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

#[contractevent]
pub struct EvProviderAdded {
    pub provider: Address,
}

#[contractevent]
pub struct EvProviderRemoved {
    pub provider: Address,
}

#[contractevent]
pub struct EvCooldownUpdated {
    pub cooldown_seconds: u64,
}

#[contractevent]
pub struct EvGatewayUpdated {
    pub gateway: Address,
}

#[contractevent]
pub struct EvPaused {
    pub by: Address,
}

#[contractevent]
pub struct EvUnpaused {
    pub by: Address,
}

#[contractevent]
pub struct EvBatchOpened {
    pub batch_id: u32,
    pub start_time: u64,
}

#[contractevent]
pub struct EvBatchClosed {
    pub batch_id: u32,
    pub end_time: u64,
}

#[contractevent]
pub struct EvSkillDataSubmitted {
    pub batch_id: u32,
    pub provider: Address,
    pub player: Address,
    pub skill_score: BytesN<32>,
    pub play_count: BytesN<32>,
}

#[contractevent]
pub struct EvDecryptionRequested {
    pub request_id: u64,
    pub batch_id: u32,
    pub state_hash: BytesN<32>,
}

#[contractevent]
pub struct EvDecryptionCompleted {
    pub request_id: u64,
    pub batch_id: u32,
    pub player_type: u32,
}
