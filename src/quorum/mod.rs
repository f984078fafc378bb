//! Quorum sealing
//!
//! Seals a serializable value under a fresh symmetric key, splits the key
//! into Shamir shares over a field sized to the member count, and ECIES
//! encrypts one share per member. Any `shares_required` of the members can
//! jointly unseal; fewer cannot.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::ecies;
use crate::crypto::shamir::{field_bits_for, GfField, SecretShare};
use crate::crypto::symmetric::{symmetric_decrypt_json, symmetric_encrypt_json};
use crate::error::SealingError;
use crate::member::{Member, MemberId};

pub const MINIMUM_SHARES: usize = 2;
/// 2^20 - 1: the largest share count a 20-bit field can address.
pub const MAXIMUM_SHARES: usize = 1_048_575;

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_share_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::member::MemberId;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<MemberId, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&MemberId, String> = map
            .iter()
            .map(|(member, share)| (member, hex::encode(share)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<MemberId, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<MemberId, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(member, share)| {
                hex::decode(&share)
                    .map(|bytes| (member, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

/// A sealed value plus the per-member encrypted key shares that open it.
///
/// The share map is ordered by member id so serialization is canonical.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuorumDataRecord {
    pub agent_id: MemberId,
    pub member_ids: Vec<MemberId>,
    pub shares_required: u32,
    #[serde(with = "hex_bytes")]
    pub encrypted_data: Vec<u8>,
    #[serde(with = "hex_share_map")]
    pub encrypted_shares_by_member_id: BTreeMap<MemberId, Vec<u8>>,
}

/// Seal a value so that any `shares_required` of `members` can unseal it.
///
/// The i-th share is encrypted for `members[i]`; combination later is
/// order-insensitive above the threshold.
pub fn quorum_seal<T: Serialize>(
    agent: &Member,
    value: &T,
    members: &[Member],
    shares_required: Option<u32>,
) -> Result<QuorumDataRecord, SealingError> {
    if members.len() < MINIMUM_SHARES {
        return Err(SealingError::InvalidMemberArray {
            minimum: MINIMUM_SHARES,
            actual: members.len(),
        });
    }
    if members.len() > MAXIMUM_SHARES {
        return Err(SealingError::TooManyMembersToUnlock(members.len()));
    }
    let shares_required = shares_required.unwrap_or(members.len() as u32);
    if (shares_required as usize) < MINIMUM_SHARES || shares_required as usize > members.len() {
        return Err(SealingError::InvalidSharesRequired {
            minimum: MINIMUM_SHARES as u32,
            maximum: members.len() as u32,
            actual: shares_required,
        });
    }

    let mut sealed = symmetric_encrypt_json(value)?;
    let field = GfField::new(field_bits_for(members.len()))?;
    let shares = field.split(
        &sealed.key,
        members.len(),
        shares_required as usize,
        &mut OsRng,
    )?;

    let mut encrypted_shares_by_member_id = BTreeMap::new();
    for (member, share) in members.iter().zip(&shares) {
        let encrypted = ecies::encrypt(member.public_key(), &share.to_bytes())?;
        encrypted_shares_by_member_id.insert(member.id(), encrypted);
    }

    Ok(QuorumDataRecord {
        agent_id: agent.id(),
        member_ids: members.iter().map(Member::id).collect(),
        shares_required,
        encrypted_data: sealed.take_data(),
        encrypted_shares_by_member_id,
    })
}

/// Unseal a record with at least `shares_required` members, each holding a
/// loaded private key.
pub fn quorum_unseal<T: DeserializeOwned>(
    record: &QuorumDataRecord,
    members: &[Member],
) -> Result<T, SealingError> {
    if members.len() < record.shares_required as usize {
        return Err(SealingError::NotEnoughMembersToUnlock {
            required: record.shares_required,
            provided: members.len(),
        });
    }
    for member in members {
        if !member.private_key_loaded() {
            return Err(SealingError::MissingPrivateKeys(member.id()));
        }
    }

    let mut shares = Vec::with_capacity(members.len());
    for member in members {
        if !record.member_ids.contains(&member.id()) {
            return Err(SealingError::MemberNotFound(member.id()));
        }
        let encrypted = record
            .encrypted_shares_by_member_id
            .get(&member.id())
            .ok_or_else(|| SealingError::EncryptedShareNotFound(member.id()))?;
        let private_key = member
            .private_key()
            .ok_or_else(|| SealingError::MissingPrivateKeys(member.id()))?;
        let share_bytes = ecies::decrypt_with_header(private_key, encrypted)?;
        shares.push(SecretShare::from_bytes(&share_bytes)?);
    }

    // The field width depends on the original member count, not on how many
    // members are unsealing now
    let field = GfField::new(field_bits_for(record.encrypted_shares_by_member_id.len()))?;
    let mut key = field.combine(&shares)?;
    let value = symmetric_decrypt_json(&record.encrypted_data, &key);
    key.zeroize();
    Ok(value?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_members(count: usize) -> Vec<Member> {
        (0..count).map(|_| Member::generate()).collect()
    }

    #[test]
    fn test_seal_unseal_all_members() {
        let agent = Member::generate();
        let members = make_members(3);
        let value = "hello".to_string();

        let record = quorum_seal(&agent, &value, &members, None).unwrap();
        assert_eq!(record.shares_required, 3);
        assert_eq!(record.member_ids.len(), 3);
        assert_eq!(record.encrypted_shares_by_member_id.len(), 3);

        let opened: String = quorum_unseal(&record, &members).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn test_two_of_three_threshold() {
        let agent = Member::generate();
        let members = make_members(3);

        let record = quorum_seal(&agent, &"hello", &members, Some(2)).unwrap();

        // Any two members suffice
        let opened: String = quorum_unseal(&record, &members[..2]).unwrap();
        assert_eq!(opened, "hello");
        let opened: String = quorum_unseal(&record, &members[1..]).unwrap();
        assert_eq!(opened, "hello");

        // One member alone cannot unseal
        assert!(matches!(
            quorum_unseal::<String>(&record, &members[..1]),
            Err(SealingError::NotEnoughMembersToUnlock {
                required: 2,
                provided: 1
            })
        ));
    }

    #[test]
    fn test_unseal_requires_private_keys() {
        let agent = Member::generate();
        let members = make_members(3);
        let record = quorum_seal(&agent, &"locked", &members, Some(2)).unwrap();

        let without_keys: Vec<Member> = members[..2].iter().map(Member::public_only).collect();
        assert!(matches!(
            quorum_unseal::<String>(&record, &without_keys),
            Err(SealingError::MissingPrivateKeys(_))
        ));
    }

    #[test]
    fn test_outside_member_is_rejected() {
        let agent = Member::generate();
        let members = make_members(3);
        let record = quorum_seal(&agent, &"insiders only", &members, Some(2)).unwrap();

        let outsider = Member::generate();
        let group = vec![members[0].clone(), outsider];
        assert!(matches!(
            quorum_unseal::<String>(&record, &group),
            Err(SealingError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_member_count_bounds() {
        let agent = Member::generate();
        let one = make_members(1);
        assert!(matches!(
            quorum_seal(&agent, &"x", &one, None),
            Err(SealingError::InvalidMemberArray {
                minimum: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        let agent = Member::generate();
        let members = make_members(3);

        assert!(matches!(
            quorum_seal(&agent, &"x", &members, Some(1)),
            Err(SealingError::InvalidSharesRequired { actual: 1, .. })
        ));
        assert!(matches!(
            quorum_seal(&agent, &"x", &members, Some(4)),
            Err(SealingError::InvalidSharesRequired { actual: 4, .. })
        ));
    }

    #[test]
    fn test_structured_value_round_trip() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Manifest {
            name: String,
            blocks: Vec<String>,
        }

        let agent = Member::generate();
        let members = make_members(5);
        let value = Manifest {
            name: "backup".to_string(),
            blocks: vec!["aa".to_string(), "bb".to_string()],
        };

        let record = quorum_seal(&agent, &value, &members, Some(3)).unwrap();
        let opened: Manifest = quorum_unseal(&record, &members[1..4]).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn test_power_of_two_member_count() {
        // 8 members force the field up to 4 bits (2^3 - 1 = 7 points is too few)
        let agent = Member::generate();
        let members = make_members(8);

        let record = quorum_seal(&agent, &"wide field", &members, Some(3)).unwrap();
        let opened: String = quorum_unseal(&record, &members[2..5]).unwrap();
        assert_eq!(opened, "wide field");
    }

    #[test]
    fn test_record_serde_round_trip() {
        let agent = Member::generate();
        let members = make_members(3);
        let record = quorum_seal(&agent, &"canonical", &members, Some(2)).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: QuorumDataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        // Unsealing still works after the wire round trip
        let opened: String = quorum_unseal(&back, &members[..2]).unwrap();
        assert_eq!(opened, "canonical");
    }

    #[test]
    fn test_tampered_record_fails_to_unseal() {
        let agent = Member::generate();
        let members = make_members(3);
        let mut record = quorum_seal(&agent, &"sealed", &members, Some(2)).unwrap();

        let last = record.encrypted_data.len() - 1;
        record.encrypted_data[last] ^= 1;
        assert!(matches!(
            quorum_unseal::<String>(&record, &members[..2]),
            Err(SealingError::FailedToSeal(_))
        ));
    }
}
