//! ABI encoding for the crowdfunding contract.
//!
//! Only the handful of types the contract uses are supported: `uint256`
//! (held as `u128`), `address`, `bool` and `string`.

use crate::address::Address;
use crate::campaign::{CampaignId, CampaignRecord};
use crate::gateway::{ContractCall, ContractEvent, GatewayError};

const WORD: usize = 32;

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => panic!("invalid hex digit"),
    }
}

const fn hex_bytes<const N: usize>(s: &str) -> [u8; N] {
    let b = s.as_bytes();
    assert!(b.len() == N * 2);
    let mut out = [0u8; N];
    let mut i = 0;
    while i < N {
        out[i] = (nibble(b[2 * i]) << 4) | nibble(b[2 * i + 1]);
        i += 1;
    }
    out
}

/// First four bytes of keccak256 over each function signature.
pub(crate) mod selector {
    use super::hex_bytes;

    pub const OWNER: [u8; 4] = hex_bytes("8da5cb5b");
    pub const CAMPAIGN_FEE: [u8; 4] = hex_bytes("8a5be9b7");
    pub const TOTAL_FEES_ACCUMULATED: [u8; 4] = hex_bytes("4952ce76");
    pub const NEXT_CAMPAIGN_ID: [u8; 4] = hex_bytes("7903a756");
    pub const CAMPAIGNS: [u8; 4] = hex_bytes("141961bc");
    pub const GET_BACKER_SHARES: [u8; 4] = hex_bytes("6461b6da");
    pub const BANNED: [u8; 4] = hex_bytes("9c8d83bb");
    pub const IS_ACTIVE: [u8; 4] = hex_bytes("22f3e2d4");

    pub const CREATE_CAMPAIGN: [u8; 4] = hex_bytes("3020580b");
    pub const PLEDGE: [u8; 4] = hex_bytes("fde327be");
    pub const CANCEL_CAMPAIGN: [u8; 4] = hex_bytes("45598b4a");
    pub const COMPLETE_CAMPAIGN: [u8; 4] = hex_bytes("9553f180");
    pub const REFUND_INVESTOR: [u8; 4] = hex_bytes("8df10469");
    pub const WITHDRAW_FEES: [u8; 4] = hex_bytes("476343ee");
    pub const CHANGE_OWNER: [u8; 4] = hex_bytes("a6f9dae1");
    pub const BAN_USER: [u8; 4] = hex_bytes("10d86b1f");
    pub const DEACTIVATE_CONTRACT: [u8; 4] = hex_bytes("bca353be");
}

/// keccak256 of each event signature (log topic 0).
mod topic {
    use super::hex_bytes;

    pub const CAMPAIGN_CREATED: [u8; 32] =
        hex_bytes("c04c663886cae794dc52158f70fe6c8ee3b0140d4f48647282f9b693ff688a65");
    pub const CAMPAIGN_CANCELLED: [u8; 32] =
        hex_bytes("403b6718db13878ac16c27decb08f09d3a10f116c7c25af575ff5bfbc11ae9e6");
    pub const CAMPAIGN_COMPLETED: [u8; 32] =
        hex_bytes("bdef6a2e3aa892961a2dab48272f72f2bc1c7121eb1c0ed7e4a58e081c1e4be0");
    pub const PLEDGE_MADE: [u8; 32] =
        hex_bytes("32ce8e6b57cb1303806eaf9b3bf3609699c7a1a3231079bd7ece621d13c6c4bf");
    pub const INVESTOR_REFUNDED: [u8; 32] =
        hex_bytes("e0b04603c538941926ab03129fa1e59dce862f23663e9479c7338f8fc606f7d9");
    pub const FUNDS_WITHDRAWN: [u8; 32] =
        hex_bytes("eaff4b37086828766ad3268786972c0cd24259d4c87a80f9d3963a3c3d999b0d");
    pub const USER_BANNED: [u8; 32] =
        hex_bytes("8f411ad66fd8225d9c3c7c72fd2429139958913fa5c5114dce1c984e069a4f69");
    pub const OWNERSHIP_TRANSFERRED: [u8; 32] =
        hex_bytes("8be0079c531659141344cd1fd0a4f28419497f9722a3daafe3b4186f6b6457e0");
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    Uint(u128),
    Address(Address),
    /// Only needed to build tuple fixtures; no contract call takes a bool.
    #[cfg(test)]
    Bool(bool),
    Str(String),
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Selector followed by the head/tail encoding of `tokens`.
pub(crate) fn encode(selector: [u8; 4], tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            #[cfg(test)]
            Token::Bool(flag) => head.extend_from_slice(&uint_word(u128::from(*flag))),
            Token::Str(text) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend_from_slice(&uint_word(text.len() as u128));
                tail.extend_from_slice(text.as_bytes());
                let padding = (WORD - text.len() % WORD) % WORD;
                tail.resize(tail.len() + padding, 0);
            }
        }
    }
    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector);
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

pub(crate) fn encode_call(call: &ContractCall) -> Vec<u8> {
    match call {
        ContractCall::CreateCampaign {
            title,
            pledge_cost,
            pledges_needed,
        } => encode(
            selector::CREATE_CAMPAIGN,
            &[
                Token::Str(title.clone()),
                Token::Uint(*pledge_cost),
                Token::Uint(u128::from(*pledges_needed)),
            ],
        ),
        ContractCall::Pledge { campaign_id, count } => encode(
            selector::PLEDGE,
            &[
                Token::Uint(u128::from(*campaign_id)),
                Token::Uint(u128::from(*count)),
            ],
        ),
        ContractCall::CancelCampaign { campaign_id } => encode(
            selector::CANCEL_CAMPAIGN,
            &[Token::Uint(u128::from(*campaign_id))],
        ),
        ContractCall::CompleteCampaign { campaign_id } => encode(
            selector::COMPLETE_CAMPAIGN,
            &[Token::Uint(u128::from(*campaign_id))],
        ),
        ContractCall::RefundInvestor { campaign_id } => encode(
            selector::REFUND_INVESTOR,
            &[Token::Uint(u128::from(*campaign_id))],
        ),
        ContractCall::WithdrawFees => encode(selector::WITHDRAW_FEES, &[]),
        ContractCall::ChangeOwner { new_owner } => {
            encode(selector::CHANGE_OWNER, &[Token::Address(*new_owner)])
        }
        ContractCall::BanUser { user } => encode(selector::BAN_USER, &[Token::Address(*user)]),
        ContractCall::DeactivateContract => encode(selector::DEACTIVATE_CONTRACT, &[]),
    }
}

/// Reader over ABI-encoded return data (no selector).
pub(crate) struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8], GatewayError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                GatewayError::Decode(format!(
                    "need {len} bytes at offset {offset}, response has {}",
                    self.data.len()
                ))
            })
    }

    fn uint_at(&self, offset: usize) -> Result<u128, GatewayError> {
        let word = self.slice_at(offset, WORD)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(GatewayError::Decode(
                "integer does not fit in 128 bits".into(),
            ));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    pub(crate) fn uint(&self, index: usize) -> Result<u128, GatewayError> {
        self.uint_at(index * WORD)
    }

    pub(crate) fn uint_u64(&self, index: usize) -> Result<u64, GatewayError> {
        u64::try_from(self.uint(index)?)
            .map_err(|_| GatewayError::Decode("integer does not fit in 64 bits".into()))
    }

    pub(crate) fn address(&self, index: usize) -> Result<Address, GatewayError> {
        let word = self.slice_at(index * WORD, WORD)?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address::new(bytes))
    }

    pub(crate) fn boolean(&self, index: usize) -> Result<bool, GatewayError> {
        match self.uint(index)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GatewayError::Decode(format!("invalid bool word {other}"))),
        }
    }

    /// Dynamic string whose offset is stored in head word `index`.
    pub(crate) fn string(&self, index: usize) -> Result<String, GatewayError> {
        let offset = usize::try_from(self.uint(index)?)
            .map_err(|_| GatewayError::Decode("string offset out of range".into()))?;
        let len = usize::try_from(self.uint_at(offset)?)
            .map_err(|_| GatewayError::Decode("string length out of range".into()))?;
        let bytes = self.slice_at(offset + WORD, len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| GatewayError::Decode("string is not valid UTF-8".into()))
    }
}

/// Decode the tuple returned by `campaigns(uint256)`.
pub(crate) fn decode_campaign(data: &[u8]) -> Result<CampaignRecord, GatewayError> {
    let d = Decoder::new(data);
    // word 0 echoes the campaign id
    Ok(CampaignRecord {
        entrepreneur: d.address(1)?,
        title: d.string(2)?,
        pledge_cost: d.uint(3)?,
        pledges_needed: d.uint_u64(4)?,
        pledges_count: d.uint_u64(5)?,
        fulfilled: d.boolean(6)?,
        cancelled: d.boolean(7)?,
    })
}

fn topic_address(topics: &[[u8; 32]], index: usize) -> Result<Address, GatewayError> {
    let word = topics
        .get(index)
        .ok_or_else(|| GatewayError::Decode(format!("log is missing topic {index}")))?;
    Decoder::new(word).address(0)
}

/// Decode a contract log; `Ok(None)` for logs this client does not know.
pub(crate) fn decode_event(
    topics: &[[u8; 32]],
    data: &[u8],
) -> Result<Option<ContractEvent>, GatewayError> {
    let Some(signature) = topics.first() else {
        return Ok(None);
    };
    let d = Decoder::new(data);
    let campaign_id = |index| -> Result<CampaignId, GatewayError> { d.uint_u64(index) };
    let event = match *signature {
        topic::CAMPAIGN_CREATED => ContractEvent::CampaignCreated {
            campaign_id: campaign_id(0)?,
            entrepreneur: d.address(1)?,
            title: d.string(2)?,
        },
        topic::CAMPAIGN_CANCELLED => ContractEvent::CampaignCancelled {
            campaign_id: campaign_id(0)?,
        },
        topic::CAMPAIGN_COMPLETED => ContractEvent::CampaignCompleted {
            campaign_id: campaign_id(0)?,
        },
        topic::PLEDGE_MADE => ContractEvent::PledgeMade {
            campaign_id: campaign_id(0)?,
            backer: d.address(1)?,
            amount: d.uint(2)?,
        },
        topic::INVESTOR_REFUNDED => ContractEvent::InvestorRefunded {
            campaign_id: campaign_id(0)?,
            investor: d.address(1)?,
            amount: d.uint(2)?,
        },
        topic::FUNDS_WITHDRAWN => ContractEvent::FundsWithdrawn {
            owner: d.address(0)?,
            amount: d.uint(1)?,
        },
        topic::USER_BANNED => ContractEvent::UserBanned {
            user: d.address(0)?,
        },
        topic::OWNERSHIP_TRANSFERRED => ContractEvent::OwnershipTransferred {
            previous_owner: topic_address(topics, 1)?,
            new_owner: topic_address(topics, 2)?,
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex(value: u128) -> String {
        hex::encode(uint_word(value))
    }

    #[test]
    fn encodes_static_arguments() {
        let data = encode_call(&ContractCall::Pledge {
            campaign_id: 3,
            count: 1,
        });
        assert_eq!(
            hex::encode(data),
            format!("fde327be{}{}", word_hex(3), word_hex(1))
        );
    }

    #[test]
    fn encodes_dynamic_string_after_head() {
        let data = encode_call(&ContractCall::CreateCampaign {
            title: "Solar".into(),
            pledge_cost: 1_000_000_000_000_000_000,
            pledges_needed: 5,
        });
        let mut title_word = hex::encode("Solar");
        title_word.push_str(&"00".repeat(32 - 5));
        let expected = format!(
            "3020580b{}{}{}{}{}",
            word_hex(0x60),
            word_hex(1_000_000_000_000_000_000),
            word_hex(5),
            word_hex(5),
            title_word
        );
        assert_eq!(hex::encode(data), expected);
    }

    #[test]
    fn encodes_address_argument() {
        let owner = Address::new([0x11; 20]);
        let data = encode_call(&ContractCall::ChangeOwner { new_owner: owner });
        assert_eq!(
            hex::encode(data),
            format!("a6f9dae1{}{}", "00".repeat(12), "11".repeat(20))
        );
    }

    #[test]
    fn decodes_campaign_tuple() {
        let entrepreneur = Address::new([0x42; 20]);
        let encoded = encode(
            [0; 4],
            &[
                Token::Uint(7),
                Token::Address(entrepreneur),
                Token::Str("Community garden with a long enough title to span words".into()),
                Token::Uint(250),
                Token::Uint(10),
                Token::Uint(4),
                Token::Bool(false),
                Token::Bool(true),
            ],
        );
        let record = decode_campaign(&encoded[4..]).unwrap();
        assert_eq!(record.entrepreneur, entrepreneur);
        assert_eq!(
            record.title,
            "Community garden with a long enough title to span words"
        );
        assert_eq!(record.pledge_cost, 250);
        assert_eq!(record.pledges_needed, 10);
        assert_eq!(record.pledges_count, 4);
        assert!(!record.fulfilled);
        assert!(record.cancelled);
    }

    #[test]
    fn rejects_truncated_and_oversized_words() {
        let short = vec![0u8; 40];
        assert!(matches!(
            decode_campaign(&short),
            Err(GatewayError::Decode(_))
        ));

        let mut wide = [0u8; 32];
        wide[0] = 1;
        assert!(Decoder::new(&wide).uint(0).is_err());
    }

    #[test]
    fn decodes_known_events_and_skips_unknown() {
        let backer = Address::new([0x05; 20]);
        let data = encode([0; 4], &[Token::Uint(2), Token::Address(backer), Token::Uint(99)]);
        let event = decode_event(&[topic::PLEDGE_MADE], &data[4..]).unwrap();
        assert_eq!(
            event,
            Some(ContractEvent::PledgeMade {
                campaign_id: 2,
                backer,
                amount: 99
            })
        );

        let previous = Address::new([0x01; 20]);
        let next = Address::new([0x02; 20]);
        let event = decode_event(
            &[
                topic::OWNERSHIP_TRANSFERRED,
                address_word(&previous),
                address_word(&next),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(
            event,
            Some(ContractEvent::OwnershipTransferred {
                previous_owner: previous,
                new_owner: next
            })
        );

        assert_eq!(decode_event(&[[0xee; 32]], &[]).unwrap(), None);
        assert_eq!(decode_event(&[], &[]).unwrap(), None);
    }
}
