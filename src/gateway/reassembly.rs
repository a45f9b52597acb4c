//! # SYS_EX Reassembly
//!
//! Fragments are parked per sender, ordered by IDX, until the first
//! fragment's declared length is covered by a consecutive run starting at
//! IDX 0. A fragment carrying a different SEQ than the ones already parked
//! starts the sender's message over.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::enocean::protocol::Txid;
use crate::enocean::sys_ex::{SysExErp1, FIRST_FRAGMENT_PAYLOAD, FRAGMENT_PAYLOAD};
use crate::error::{EnoceanError, Result};

/// A fully reassembled SYS_EX message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExMessage {
    pub source: Txid,
    pub manufacturer_id: u16,
    pub function: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Entry {
    fragments: BTreeMap<u8, SysExErp1>,
    updated: Instant,
}

/// In-progress messages keyed by sender
#[derive(Debug, Default)]
pub struct Reassembly {
    entries: HashMap<Txid, Entry>,
    timeout: Option<Duration>,
}

impl Reassembly {
    /// Create a store; `timeout` of `None` keeps partial messages forever
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Number of senders with a partial message
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Park a fragment, returning the message once it is complete
    ///
    /// # Errors
    ///
    /// Returns `MalformedTelegram` for a fragment with SEQ 0
    pub fn push(&mut self, fragment: SysExErp1, now: Instant) -> Result<Option<SysExMessage>> {
        if fragment.seq() == 0 {
            return Err(EnoceanError::malformed("invalid SYS_EX SEQ 0"));
        }
        self.purge(now);

        let source = fragment.txid();
        let entry = self.entries.entry(source).or_insert_with(|| Entry {
            fragments: BTreeMap::new(),
            updated: now,
        });

        if let Some(first) = entry.fragments.values().next() {
            if first.seq() != fragment.seq() {
                let err = EnoceanError::Sequence {
                    expected: first.seq(),
                    got: fragment.seq(),
                };
                warn!("{}: {}, discarding {} fragment(s)", source, err, entry.fragments.len());
                entry.fragments.clear();
            }
        }

        debug!("{}: SYS_EX fragment SEQ {} IDX {}", source, fragment.seq(), fragment.idx());
        entry.fragments.insert(fragment.idx(), fragment);
        entry.updated = now;

        let message = match complete(source, &entry.fragments) {
            Some(message) => message,
            None => return Ok(None),
        };
        self.entries.remove(&source);
        Ok(Some(message))
    }

    fn purge(&mut self, now: Instant) {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return,
        };
        self.entries.retain(|source, entry| {
            let fresh = now.saturating_duration_since(entry.updated) < timeout;
            if !fresh {
                debug!("{}: dropping stale SYS_EX fragments", source);
            }
            fresh
        });
    }
}

fn complete(source: Txid, fragments: &BTreeMap<u8, SysExErp1>) -> Option<SysExMessage> {
    let first = fragments.get(&0)?;
    let length = first.length()?;

    let mut covered = 0;
    for (expected, (idx, fragment)) in fragments.iter().enumerate() {
        if *idx as usize != expected {
            break;
        }
        let capacity = if *idx == 0 { FIRST_FRAGMENT_PAYLOAD } else { FRAGMENT_PAYLOAD };
        covered += capacity.min(length.saturating_sub(fragment.payload_offset()));
    }
    if covered < length {
        return None;
    }

    let mut payload: Vec<u8> = fragments
        .values()
        .flat_map(|f| f.fragment_payload().iter().copied())
        .collect();
    payload.truncate(length);

    Some(SysExMessage {
        source,
        manufacturer_id: first.manufacturer_id()?,
        function: first.function()?,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enocean::frame::Frame;
    use crate::enocean::protocol::RORG_SYS_EX;

    const SOURCE: Txid = Txid(0x0580CC3A);

    fn fragments(seq: u8, payload: &[u8]) -> Vec<SysExErp1> {
        SysExErp1::fragments(SOURCE, seq, 0x049, 0x006, payload)
            .unwrap()
            .into_iter()
            .map(|f| SysExErp1::new(f).unwrap())
            .collect()
    }

    #[test]
    fn test_three_fragments_in_order() {
        let payload: Vec<u8> = (1..=20).collect();
        let mut store = Reassembly::default();
        let now = Instant::now();

        let mut frags = fragments(1, &payload).into_iter();
        assert_eq!(store.push(frags.next().unwrap(), now).unwrap(), None);
        assert_eq!(store.push(frags.next().unwrap(), now).unwrap(), None);
        let message = store.push(frags.next().unwrap(), now).unwrap().unwrap();

        assert_eq!(message.source, SOURCE);
        assert_eq!(message.manufacturer_id, 0x049);
        assert_eq!(message.function, 0x006);
        assert_eq!(message.payload, payload);
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_out_of_order_fragments() {
        let payload: Vec<u8> = (1..=20).collect();
        let mut store = Reassembly::default();
        let now = Instant::now();

        let frags = fragments(2, &payload);
        assert_eq!(store.push(frags[2].clone(), now).unwrap(), None);
        assert_eq!(store.push(frags[0].clone(), now).unwrap(), None);
        let message = store.push(frags[1].clone(), now).unwrap().unwrap();
        assert_eq!(message.payload, payload);
    }

    #[test]
    fn test_single_fragment_message() {
        let mut store = Reassembly::default();
        let frags = fragments(3, &[0xA5, 0x20]);
        let message = store.push(frags[0].clone(), Instant::now()).unwrap().unwrap();
        assert_eq!(message.payload, vec![0xA5, 0x20]);
    }

    #[test]
    fn test_seq_change_discards_partial() {
        let payload: Vec<u8> = (1..=20).collect();
        let mut store = Reassembly::default();
        let now = Instant::now();

        let old = fragments(1, &payload);
        let new = fragments(2, &payload);

        store.push(old[0].clone(), now).unwrap();
        store.push(old[1].clone(), now).unwrap();
        // New sequence: the old IDX 0 and 1 must not combine with it
        assert_eq!(store.push(new[2].clone(), now).unwrap(), None);
        assert_eq!(store.push(old[2].clone(), now).unwrap(), None);
    }

    #[test]
    fn test_seq_zero_rejected() {
        let frame = Frame::new(RORG_SYS_EX, &[0x00, 0, 0, 0, 0, 0, 0, 0, 0], SOURCE, 0).unwrap();
        let mut store = Reassembly::default();
        assert!(store.push(SysExErp1::new(frame).unwrap(), Instant::now()).is_err());
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_senders_are_independent() {
        let payload: Vec<u8> = (1..=12).collect();
        let other: Vec<SysExErp1> = SysExErp1::fragments(Txid(0x01), 1, 0, 6, &payload)
            .unwrap()
            .into_iter()
            .map(|f| SysExErp1::new(f).unwrap())
            .collect();
        let mine = fragments(1, &payload);
        let mut store = Reassembly::default();
        let now = Instant::now();

        store.push(mine[0].clone(), now).unwrap();
        store.push(other[0].clone(), now).unwrap();
        assert_eq!(store.pending(), 2);
        assert!(store.push(mine[1].clone(), now).unwrap().is_some());
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn test_timeout_purges_stale_entries() {
        let payload: Vec<u8> = (1..=20).collect();
        let frags = fragments(1, &payload);
        let mut store = Reassembly::new(Some(Duration::from_millis(500)));
        let start = Instant::now();

        store.push(frags[0].clone(), start).unwrap();
        store.push(frags[1].clone(), start).unwrap();
        // Late fragment finds the earlier ones expired
        let late = start + Duration::from_secs(1);
        assert_eq!(store.push(frags[2].clone(), late).unwrap(), None);
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn test_no_timeout_keeps_entries() {
        let payload: Vec<u8> = (1..=20).collect();
        let frags = fragments(1, &payload);
        let mut store = Reassembly::new(None);
        let start = Instant::now();

        store.push(frags[0].clone(), start).unwrap();
        store.push(frags[1].clone(), start).unwrap();
        let late = start + Duration::from_secs(3600);
        assert!(store.push(frags[2].clone(), late).unwrap().is_some());
    }
}
