//! `EventDecoder` — turns raw contract logs into typed [`DomainEvent`]s.
//!
//! Dispatch is on `topics[0]`, the keccak256 of the event's canonical
//! signature. Indexed fields come from `topics[1..]`; the rest are packed as
//! consecutive 32-byte big-endian words in `data`.
//!
//! | event            | topics[1..]                  | data words                          |
//! |------------------|------------------------------|-------------------------------------|
//! | MarketCreated    | contentHash, creator, owner  | deadline                            |
//! | BetPlaced        | contentHash, user            | betType, amount, totalYes, totalNo  |
//! | MarketClosed     | contentHash                  |                                     |
//! | MarketResolved   | contentHash                  | result, totalYes, totalNo           |
//! | BetClaimed       | contentHash, user            | amount                              |
//! | MarketCancelled  | contentHash                  |                                     |
//! | BetRefunded      | contentHash, user            | amount                              |
//! | DepositClaimed   | contentHash, creator         | amount                              |

use alloy_primitives::{keccak256, Address, B256};

use marketindex_core::event::{DomainEvent, EventKind};
use marketindex_core::model::{MarketResult, Outcome};
use marketindex_core::types::LogRecord;

/// Result of classifying one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A recognised, well-formed event.
    Event(DomainEvent),
    /// `topics[0]` matches none of the known signatures.
    Unrecognized,
    /// The signature matched but the payload did not fit the event's layout.
    Malformed { kind: EventKind, reason: String },
}

/// Signature-hash dispatch table for the prediction-market contract.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    table: [(B256, EventKind); 8],
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            table: EventKind::ALL.map(|kind| (signature_hash(kind), kind)),
        }
    }

    /// The kind whose signature hash equals `topic0`, if any.
    pub fn kind_of(&self, topic0: &B256) -> Option<EventKind> {
        self.table
            .iter()
            .find(|(hash, _)| hash == topic0)
            .map(|(_, kind)| *kind)
    }

    /// Classify a log and, when recognised, decode it.
    pub fn classify(&self, log: &LogRecord) -> Classified {
        let Some(kind) = log.topic0().and_then(|t| self.kind_of(t)) else {
            return Classified::Unrecognized;
        };
        match decode(kind, log) {
            Ok(event) => Classified::Event(event),
            Err(reason) => Classified::Malformed { kind, reason },
        }
    }
}

/// keccak256 of the event's canonical signature.
pub fn signature_hash(kind: EventKind) -> B256 {
    keccak256(kind.signature().as_bytes())
}

fn decode(kind: EventKind, log: &LogRecord) -> Result<DomainEvent, String> {
    if log.topics.len() < kind.required_topics() {
        return Err(format!(
            "expected {} topics, got {}",
            kind.required_topics(),
            log.topics.len()
        ));
    }
    if log.word_count() < kind.required_words() {
        return Err(format!(
            "expected {} data bytes, got {}",
            kind.required_words() * 32,
            log.data.len()
        ));
    }

    let content_hash = log.topics[1];
    let topic_address = |i: usize| Address::from_slice(&log.topics[i][12..]);
    let word = |i: usize| word_u64(&log.data, i);

    let event = match kind {
        EventKind::MarketCreated => DomainEvent::MarketCreated {
            content_hash,
            creator: topic_address(2),
            group_owner: topic_address(3),
            deadline: word(0)?,
        },
        EventKind::BetPlaced => DomainEvent::BetPlaced {
            content_hash,
            user: topic_address(2),
            outcome: Outcome::from(word(0)? == 1),
            amount: word(1)?,
            total_yes_pool: word(2)?,
            total_no_pool: word(3)?,
        },
        EventKind::MarketClosed => DomainEvent::MarketClosed { content_hash },
        EventKind::MarketResolved => {
            let code = word(0)?;
            let result = i64::try_from(code)
                .ok()
                .and_then(MarketResult::from_code)
                .ok_or_else(|| format!("unknown result code {code}"))?;
            DomainEvent::MarketResolved {
                content_hash,
                result,
                total_yes_pool: word(1)?,
                total_no_pool: word(2)?,
            }
        }
        EventKind::BetClaimed => DomainEvent::BetClaimed {
            content_hash,
            user: topic_address(2),
            amount: word(0)?,
        },
        EventKind::MarketCancelled => DomainEvent::MarketCancelled { content_hash },
        EventKind::BetRefunded => DomainEvent::BetRefunded {
            content_hash,
            user: topic_address(2),
            amount: word(0)?,
        },
        EventKind::DepositClaimed => DomainEvent::DepositClaimed {
            content_hash,
            creator: topic_address(2),
            amount: word(0)?,
        },
    };
    Ok(event)
}

/// Read data word `i` as a u64; words wider than 64 bits are rejected.
fn word_u64(data: &[u8], i: usize) -> Result<u64, String> {
    let w = data
        .get(i * 32..(i + 1) * 32)
        .ok_or_else(|| format!("missing data word {i}"))?;
    if w[..24].iter().any(|b| *b != 0) {
        return Err(format!("data word {i} exceeds 64 bits"));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&w[24..]);
    Ok(u64::from_be_bytes(low))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Bytes;

    use super::*;

    fn topic_for(addr: Address) -> B256 {
        addr.into_word()
    }

    fn words(values: &[u64]) -> Bytes {
        let mut out = Vec::with_capacity(values.len() * 32);
        for v in values {
            out.extend_from_slice(&[0u8; 24]);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Bytes::from(out)
    }

    fn log(kind: EventKind, mut topics: Vec<B256>, data: Bytes) -> LogRecord {
        topics.insert(0, signature_hash(kind));
        LogRecord {
            address: Address::ZERO,
            topics,
            data,
            tx_hash: B256::repeat_byte(0xee),
            block_number: 1,
            log_index: 0,
        }
    }

    const HASH: B256 = B256::repeat_byte(0xaa);
    const USER: Address = Address::repeat_byte(0x33);

    #[test]
    fn keccak_matches_known_transfer_topic() {
        assert_eq!(
            hex::encode(keccak256("Transfer(address,address,uint256)")),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn every_kind_is_dispatchable() {
        let decoder = EventDecoder::new();
        for kind in EventKind::ALL {
            assert_eq!(decoder.kind_of(&signature_hash(kind)), Some(kind));
        }
        assert_eq!(decoder.kind_of(&B256::ZERO), None);
    }

    #[test]
    fn decodes_bet_placed() {
        let decoder = EventDecoder::new();
        let record = log(
            EventKind::BetPlaced,
            vec![HASH, topic_for(USER)],
            words(&[1, 500, 1500, 300]),
        );
        assert_eq!(
            decoder.classify(&record),
            Classified::Event(DomainEvent::BetPlaced {
                content_hash: HASH,
                user: USER,
                outcome: Outcome::Yes,
                amount: 500,
                total_yes_pool: 1500,
                total_no_pool: 300,
            })
        );

        let no_bet = log(
            EventKind::BetPlaced,
            vec![HASH, topic_for(USER)],
            words(&[0, 200, 1500, 500]),
        );
        let Classified::Event(DomainEvent::BetPlaced { outcome, .. }) = decoder.classify(&no_bet)
        else {
            panic!("expected BetPlaced");
        };
        assert_eq!(outcome, Outcome::No);
    }

    #[test]
    fn decodes_market_created() {
        let owner = Address::repeat_byte(0x44);
        let record = log(
            EventKind::MarketCreated,
            vec![HASH, topic_for(USER), topic_for(owner)],
            words(&[1_800_000_000]),
        );
        assert_eq!(
            EventDecoder::new().classify(&record),
            Classified::Event(DomainEvent::MarketCreated {
                content_hash: HASH,
                creator: USER,
                group_owner: owner,
                deadline: 1_800_000_000,
            })
        );
    }

    #[test]
    fn decodes_resolved_and_zero_word_events() {
        let decoder = EventDecoder::new();
        let resolved = log(EventKind::MarketResolved, vec![HASH], words(&[2, 100, 900]));
        assert_eq!(
            decoder.classify(&resolved),
            Classified::Event(DomainEvent::MarketResolved {
                content_hash: HASH,
                result: MarketResult::No,
                total_yes_pool: 100,
                total_no_pool: 900,
            })
        );

        let closed = log(EventKind::MarketClosed, vec![HASH], Bytes::new());
        assert_eq!(
            decoder.classify(&closed),
            Classified::Event(DomainEvent::MarketClosed { content_hash: HASH })
        );
    }

    #[test]
    fn unknown_topic0_is_unrecognized() {
        let mut record = log(EventKind::MarketClosed, vec![HASH], Bytes::new());
        record.topics[0] = B256::repeat_byte(0x01);
        assert_eq!(EventDecoder::new().classify(&record), Classified::Unrecognized);

        record.topics.clear();
        assert_eq!(EventDecoder::new().classify(&record), Classified::Unrecognized);
    }

    #[test]
    fn short_payloads_are_malformed() {
        let decoder = EventDecoder::new();

        let missing_topic = log(EventKind::BetClaimed, vec![HASH], words(&[10]));
        assert!(matches!(
            decoder.classify(&missing_topic),
            Classified::Malformed { kind: EventKind::BetClaimed, .. }
        ));

        let short_data = log(
            EventKind::BetPlaced,
            vec![HASH, topic_for(USER)],
            words(&[1, 500, 1500]),
        );
        assert!(matches!(
            decoder.classify(&short_data),
            Classified::Malformed { kind: EventKind::BetPlaced, .. }
        ));
    }

    #[test]
    fn oversized_words_and_bad_result_codes_are_malformed() {
        let decoder = EventDecoder::new();

        let mut wide = vec![0u8; 32];
        wide[0] = 1;
        let record = log(EventKind::BetRefunded, vec![HASH, topic_for(USER)], Bytes::from(wide));
        assert!(matches!(
            decoder.classify(&record),
            Classified::Malformed { kind: EventKind::BetRefunded, .. }
        ));

        let bad_result = log(EventKind::MarketResolved, vec![HASH], words(&[7, 0, 0]));
        let Classified::Malformed { reason, .. } = decoder.classify(&bad_result) else {
            panic!("expected malformed");
        };
        assert_eq!(reason, "unknown result code 7");
    }
}
