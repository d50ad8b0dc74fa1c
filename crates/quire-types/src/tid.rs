use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

const ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";
const ENCODED_LEN: usize = 13;
const CLOCK_ID_BITS: u32 = 10;

/// Timestamp identifier.
///
/// A TID packs microseconds since the Unix epoch (53 bits) and a 10-bit clock
/// id into a `u64` with the top bit clear, rendered as 13 characters of a
/// sort-preserving base32 alphabet. String order equals numeric order, so
/// TIDs work both as commit revisions and as generated record keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u64);

static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);
static CLOCK_ID: OnceLock<u64> = OnceLock::new();

impl Tid {
    /// Build a TID from a microsecond timestamp and clock id.
    pub fn from_parts(micros: u64, clock_id: u16) -> Self {
        let micros = micros & ((1u64 << 53) - 1);
        let clock = u64::from(clock_id) & ((1u64 << CLOCK_ID_BITS) - 1);
        Self((micros << CLOCK_ID_BITS) | clock)
    }

    /// A fresh TID from the wall clock.
    ///
    /// TIDs issued by one process are strictly increasing even when the wall
    /// clock stalls or steps backwards.
    pub fn now() -> Self {
        let clock_id = *CLOCK_ID.get_or_init(|| rand::random::<u64>() & ((1 << CLOCK_ID_BITS) - 1));
        let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
        let candidate = Self::from_parts(micros, clock_id as u16).0;
        let mut last = LAST_ISSUED.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match LAST_ISSUED.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Self(next),
                Err(observed) => last = observed,
            }
        }
    }

    /// A fresh TID that sorts strictly after `prev`.
    pub fn next_after(prev: Option<&Tid>) -> Self {
        let now = Self::now();
        match prev {
            Some(prev) if now <= *prev => Self(prev.0 + 1),
            _ => now,
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Microseconds since the Unix epoch.
    pub fn timestamp_micros(&self) -> u64 {
        self.0 >> CLOCK_ID_BITS
    }

    pub fn encode(&self) -> String {
        let mut out = [0u8; ENCODED_LEN];
        let mut value = self.0;
        for slot in out.iter_mut().rev() {
            *slot = ALPHABET[(value & 31) as usize];
            value >>= 5;
        }
        out.iter().map(|&b| b as char).collect()
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.len() != ENCODED_LEN {
            return Err(TypeError::InvalidTid(s.to_string()));
        }
        let mut value: u64 = 0;
        for (i, byte) in s.bytes().enumerate() {
            let digit = ALPHABET
                .iter()
                .position(|&a| a == byte)
                .ok_or_else(|| TypeError::InvalidTid(s.to_string()))? as u64;
            // The leading character carries only four bits; the top bit must stay clear.
            if i == 0 && digit >= 16 {
                return Err(TypeError::InvalidTid(s.to_string()));
            }
            value = (value << 5) | digit;
        }
        Ok(Self(value))
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.encode())
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Tid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Tid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encoding_is_thirteen_chars() {
        let tid = Tid::now();
        assert_eq!(tid.encode().len(), 13);
        assert_eq!(Tid::parse(&tid.encode()).unwrap(), tid);
    }

    #[test]
    fn now_is_strictly_increasing() {
        let mut prev = Tid::now();
        for _ in 0..1000 {
            let next = Tid::now();
            assert!(next > prev);
            assert!(next.encode() > prev.encode());
            prev = next;
        }
    }

    #[test]
    fn next_after_beats_future_predecessor() {
        let future = Tid::from_parts(u64::MAX >> 12, 0);
        let next = Tid::next_after(Some(&future));
        assert!(next > future);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Tid::parse("short").is_err());
        assert!(Tid::parse("1111111111111").is_err());
        assert!(Tid::parse("zzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn parts_roundtrip() {
        let tid = Tid::from_parts(1_700_000_000_000_000, 7);
        assert_eq!(tid.timestamp_micros(), 1_700_000_000_000_000);
        assert_eq!(tid.as_u64() & 0x3ff, 7);
    }

    proptest! {
        #[test]
        fn string_order_matches_numeric_order(a in 0u64..(1 << 63), b in 0u64..(1 << 63)) {
            let (ta, tb) = (Tid(a), Tid(b));
            prop_assert_eq!(ta.cmp(&tb), ta.encode().cmp(&tb.encode()));
        }
    }
}
