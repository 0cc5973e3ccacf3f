//! Shared data model for the ingestion pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ─── Amount ───────────────────────────────────────────────────────────────────

/// A token amount in the ledger's smallest unit.
///
/// Serialized as a decimal string so values above 2^53 survive JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Amount(v)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) => Ok(Amount(n as u128)),
        }
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// Transaction type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Send,
    Stake,
    Unstake,
    Restake,
    ClaimRewards,
    SubmitProposal,
    Vote,
    Deposit,
    Unknown,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Send => "SEND",
            Self::Stake => "STAKE",
            Self::Unstake => "UNSTAKE",
            Self::Restake => "RESTAKE",
            Self::ClaimRewards => "CLAIM_REWARDS",
            Self::SubmitProposal => "SUBMIT_PROPOSAL",
            Self::Vote => "VOTE",
            Self::Deposit => "DEPOSIT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Transaction-specific payload. The variant determines the [`TxKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxDetails {
    Send {
        from: String,
        to: String,
        amount: Amount,
    },
    Stake {
        staker: String,
        #[serde(default)]
        validators: Vec<String>,
        amount: Amount,
    },
    Unstake {
        staker: String,
        amount: Amount,
    },
    Restake {
        staker: String,
        amount: Amount,
    },
    ClaimRewards {
        claimer: String,
        validator: String,
        #[serde(default)]
        era: Option<u32>,
    },
    SubmitProposal {
        proposer: String,
        deposit: Amount,
    },
    Vote {
        voter: String,
        proposal_id: u64,
        #[serde(default)]
        option: Option<String>,
    },
    Deposit {
        depositor: String,
        proposal_id: u64,
    },
    Unknown {
        #[serde(default)]
        signer: Option<String>,
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl TxDetails {
    pub fn kind(&self) -> TxKind {
        match self {
            Self::Send { .. } => TxKind::Send,
            Self::Stake { .. } => TxKind::Stake,
            Self::Unstake { .. } => TxKind::Unstake,
            Self::Restake { .. } => TxKind::Restake,
            Self::ClaimRewards { .. } => TxKind::ClaimRewards,
            Self::SubmitProposal { .. } => TxKind::SubmitProposal,
            Self::Vote { .. } => TxKind::Vote,
            Self::Deposit { .. } => TxKind::Deposit,
            Self::Unknown { .. } => TxKind::Unknown,
        }
    }

    /// The address that originated the transaction, if known.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Send { from, .. } => Some(from),
            Self::Stake { staker, .. } | Self::Unstake { staker, .. } | Self::Restake { staker, .. } => {
                Some(staker)
            }
            Self::ClaimRewards { claimer, .. } => Some(claimer),
            Self::SubmitProposal { proposer, .. } => Some(proposer),
            Self::Vote { voter, .. } => Some(voter),
            Self::Deposit { depositor, .. } => Some(depositor),
            Self::Unknown { signer, .. } => signer.as_deref(),
        }
    }
}

/// A transaction included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (`0x…`).
    pub hash: String,
    /// Block height the transaction was included at.
    pub height: u64,
    /// Whether the ledger reports successful execution.
    pub success: bool,
    /// Every address this transaction touches (deduplicated, sender first).
    pub involved_addresses: Vec<String>,
    pub details: TxDetails,
}

impl Transaction {
    pub fn kind(&self) -> TxKind {
        self.details.kind()
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A fully fetched block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Ordering key.
    pub height: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Session (epoch) index the block was produced in.
    pub session_index: u64,
    /// Era index, when the adapter can attach it to the block.
    #[serde(default)]
    pub era: Option<u32>,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
}

// ─── Validators ───────────────────────────────────────────────────────────────

/// Metadata for a single validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub commission: Option<String>,
    #[serde(default)]
    pub total_stake: Option<Amount>,
}

impl Validator {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            commission: None,
            total_stake: None,
        }
    }
}

/// The active validator set for one session. Replaced wholesale on refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub session_index: u64,
    pub validators: BTreeMap<String, Validator>,
}

impl ValidatorSet {
    pub fn new(session_index: u64, validators: impl IntoIterator<Item = Validator>) -> Self {
        Self {
            session_index,
            validators: validators
                .into_iter()
                .map(|v| (v.address.clone(), v))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.validators.contains_key(address)
    }
}

// ─── Rewards ──────────────────────────────────────────────────────────────────

/// A reward entry as returned by the chain client, before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReward {
    pub amount: Amount,
    pub height: u64,
    pub validator_address: String,
    #[serde(default)]
    pub denom: Option<String>,
    /// Delegator (nominator) receiving the reward.
    pub address: String,
    pub era: u32,
}

/// An immutable reward row produced by backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRewardRecord {
    pub amount: Amount,
    pub height: u64,
    pub validator: String,
    pub denom: String,
    pub address: String,
    pub era: u32,
}

impl EraRewardRecord {
    /// Build a row from a raw entry, falling back to `default_denom`.
    pub fn from_raw(raw: RawReward, default_denom: &str) -> Self {
        Self {
            amount: raw.amount,
            height: raw.height,
            validator: raw.validator_address,
            denom: raw.denom.unwrap_or_else(|| default_denom.to_string()),
            address: raw.address,
            era: raw.era,
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// The single current-state record persisted per network. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub height: u64,
    pub block: Block,
    pub validator_set: Option<ValidatorSet>,
    pub era: Option<u32>,
    /// Unix timestamp (seconds) of the write.
    pub updated_at: i64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
