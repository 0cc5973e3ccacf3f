//! Sidecar JSON → ChainFeed data model.
//!
//! Sidecar encodes integers as decimal strings; node RPC encodes them as
//! `0x`-prefixed hex. Every numeric field accepts either, or a plain JSON
//! number.

use serde_json::{json, Value};

use chainfeed_core::error::FeedError;
use chainfeed_core::types::{Amount, Block, RawReward, Transaction, TxDetails, Validator, ValidatorSet};

// ─── Scalars ──────────────────────────────────────────────────────────────────

fn decode_err(msg: impl Into<String>) -> FeedError {
    FeedError::Decode(msg.into())
}

/// Parse a height, index or era from a number, decimal or hex string.
pub fn parse_number(v: &Value) -> Result<u64, FeedError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| decode_err(format!("not an unsigned integer: {n}"))),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|e| decode_err(format!("bad integer {s:?}: {e}")))
        }
        other => Err(decode_err(format!("expected integer, got {other}"))),
    }
}

/// Parse a token amount from a number or decimal string.
pub fn parse_amount(v: &Value) -> Result<Amount, FeedError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(|n| Amount(n as u128))
            .ok_or_else(|| decode_err(format!("bad amount: {n}"))),
        Value::String(s) => s
            .parse::<Amount>()
            .map_err(|e| decode_err(format!("bad amount {s:?}: {e}"))),
        other => Err(decode_err(format!("expected amount, got {other}"))),
    }
}

/// An account is either a plain string or a `MultiAddress` object
/// (`{"id": "..."}`).
pub fn parse_account(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn field<'a>(v: &'a Value, name: &str) -> Result<&'a Value, FeedError> {
    v.get(name)
        .filter(|f| !f.is_null())
        .ok_or_else(|| decode_err(format!("missing field `{name}`")))
}

/// The `value` of a sidecar pallet-storage response.
fn storage_value(v: &Value) -> Result<&Value, FeedError> {
    field(v, "value")
}

// ─── Chain state ──────────────────────────────────────────────────────────────

/// `/blocks/head/header` → head height.
pub fn decode_header_number(v: &Value) -> Result<u64, FeedError> {
    parse_number(field(v, "number")?)
}

/// `/pallets/session/storage/currentIndex` → session index.
pub fn decode_session_index(v: &Value) -> Result<u64, FeedError> {
    parse_number(storage_value(v)?)
}

/// `/pallets/session/storage/validators` → validator set for `session_index`.
pub fn decode_validators(v: &Value, session_index: u64) -> Result<ValidatorSet, FeedError> {
    let list = storage_value(v)?
        .as_array()
        .ok_or_else(|| decode_err("validators value is not an array"))?;

    let validators = list
        .iter()
        .map(|entry| {
            parse_account(entry)
                .map(Validator::new)
                .ok_or_else(|| decode_err(format!("bad validator entry {entry}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatorSet::new(session_index, validators))
}

/// `/pallets/staking/storage/activeEra` → era index.
pub fn decode_active_era(v: &Value) -> Result<u32, FeedError> {
    let index = parse_number(field(storage_value(v)?, "index")?)?;
    u32::try_from(index).map_err(|_| decode_err(format!("era {index} out of range")))
}

/// `/accounts/{address}/staking-payouts` → one raw reward per payout.
pub fn decode_payouts(v: &Value, address: &str) -> Result<Vec<RawReward>, FeedError> {
    let height = parse_number(field(field(v, "at")?, "height")?)?;
    let eras = field(v, "erasPayouts")?
        .as_array()
        .ok_or_else(|| decode_err("erasPayouts is not an array"))?;

    let mut rewards = Vec::new();
    for era_payout in eras {
        // Eras whose payout data has been pruned are reported as a message.
        let Some(era) = era_payout.get("era") else {
            continue;
        };
        let era = u32::try_from(parse_number(era)?)
            .map_err(|_| decode_err("era out of range"))?;
        let payouts = era_payout
            .get("payouts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for payout in payouts {
            let validator_address = parse_account(field(payout, "validatorId")?)
                .ok_or_else(|| decode_err("bad validatorId"))?;
            rewards.push(RawReward {
                amount: parse_amount(field(payout, "nominatorStakingPayout")?)?,
                height,
                validator_address,
                denom: None,
                address: address.to_string(),
                era,
            });
        }
    }
    Ok(rewards)
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// `/blocks/{n}` → block, tagged with the session it belongs to.
pub fn decode_block(v: &Value, session_index: u64) -> Result<Block, FeedError> {
    let height = parse_number(field(v, "number")?)?;
    let hash = field(v, "hash")?
        .as_str()
        .ok_or_else(|| decode_err("block hash is not a string"))?
        .to_string();

    let mut timestamp = 0;
    let mut transactions = Vec::new();

    let extrinsics = v
        .get("extrinsics")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for (index, ext) in extrinsics.iter().enumerate() {
        let (pallet, method) = call_name(ext)?;
        let args = ext.get("args").unwrap_or(&Value::Null);

        let signer = ext
            .get("signature")
            .filter(|s| !s.is_null())
            .and_then(|s| s.get("signer"))
            .and_then(parse_account);

        let Some(signer) = signer else {
            if pallet == "timestamp" && method == "set" {
                timestamp = parse_number(field(args, "now")?)? as i64;
            }
            continue;
        };

        let tx_hash = ext
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{height}-{index}"));
        let success = ext.get("success").and_then(Value::as_bool).unwrap_or(true);

        let details = decode_call(pallet, method, args, &signer)?;
        transactions.push(Transaction {
            hash: tx_hash,
            height,
            success,
            involved_addresses: involved_addresses(&details, &signer),
            details,
        });
    }

    Ok(Block {
        height,
        hash,
        session_index,
        era: None,
        timestamp,
        transactions,
    })
}

fn call_name(ext: &Value) -> Result<(&str, &str), FeedError> {
    let method = field(ext, "method")?;
    let pallet = method.get("pallet").and_then(Value::as_str);
    let name = method.get("method").and_then(Value::as_str);
    match (pallet, name) {
        (Some(p), Some(m)) => Ok((p, m)),
        _ => Err(decode_err(format!("bad extrinsic method {method}"))),
    }
}

fn decode_call(pallet: &str, method: &str, args: &Value, signer: &str) -> Result<TxDetails, FeedError> {
    let signer = signer.to_string();
    let details = match (pallet, method) {
        ("balances", m) if m.starts_with("transfer") => TxDetails::Send {
            from: signer,
            to: parse_account(field(args, "dest")?).ok_or_else(|| decode_err("bad dest"))?,
            amount: parse_amount(field(args, "value")?)?,
        },
        ("staking", "bond") => TxDetails::Stake {
            staker: signer,
            validators: Vec::new(),
            amount: parse_amount(field(args, "value")?)?,
        },
        ("staking", "bondExtra") => TxDetails::Stake {
            staker: signer,
            validators: Vec::new(),
            amount: parse_amount(field(args, "max_additional")?)?,
        },
        ("staking", "unbond") => TxDetails::Unstake {
            staker: signer,
            amount: parse_amount(field(args, "value")?)?,
        },
        ("staking", "rebond") => TxDetails::Restake {
            staker: signer,
            amount: parse_amount(field(args, "value")?)?,
        },
        ("staking", "payoutStakers") => TxDetails::ClaimRewards {
            claimer: signer,
            validator: parse_account(field(args, "validator_stash")?)
                .ok_or_else(|| decode_err("bad validator_stash"))?,
            era: args
                .get("era")
                .map(parse_number)
                .transpose()?
                .and_then(|e| u32::try_from(e).ok()),
        },
        ("democracy", "propose") => TxDetails::SubmitProposal {
            proposer: signer,
            deposit: parse_amount(field(args, "value")?)?,
        },
        ("democracy", "vote") => TxDetails::Vote {
            voter: signer,
            proposal_id: parse_number(field(args, "ref_index")?)?,
            option: vote_option(args.get("vote")),
        },
        ("democracy", "second") => TxDetails::Deposit {
            depositor: signer,
            proposal_id: parse_number(field(args, "proposal")?)?,
        },
        _ => TxDetails::Unknown {
            signer: Some(signer),
            raw: json!({ "pallet": pallet, "method": method, "args": args }),
        },
    };
    Ok(details)
}

/// `aye`/`nay` of a standard vote; split votes carry no single option.
fn vote_option(vote: Option<&Value>) -> Option<String> {
    let aye = vote?
        .get("standard")?
        .get("vote")?
        .get("aye")?
        .as_bool()?;
    let option = if aye { "aye" } else { "nay" };
    Some(option.to_string())
}

fn involved_addresses(details: &TxDetails, signer: &str) -> Vec<String> {
    let mut addresses = vec![signer.to_string()];
    let counterparty = match details {
        TxDetails::Send { to, .. } => Some(to),
        TxDetails::ClaimRewards { validator, .. } => Some(validator),
        _ => None,
    };
    if let Some(other) = counterparty {
        if other != signer {
            addresses.push(other.clone());
        }
    }
    addresses
}

// ─── Tests ────────────────────────────────────────────────────────────────────
