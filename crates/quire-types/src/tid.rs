use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";
const TID_LEN: usize = 13;
const CLOCK_ID_BITS: u32 = 10;
const CLOCK_ID_MASK: u64 = (1 << CLOCK_ID_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 53) - 1;

/// Sortable revision token.
///
/// A `Tid` packs 53 bits of microseconds since the UNIX epoch and a 10-bit
/// clock identifier into a 64-bit integer whose top bit is always zero. It is
/// rendered as 13 characters of a base32 alphabet chosen so that string order
/// equals numeric order.
///
/// Tokens name commit revisions and serve as default record keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u64);

impl Tid {
    /// Build a token from a microsecond timestamp and a clock identifier.
    pub fn from_parts(timestamp_us: u64, clock_id: u16) -> Self {
        Self(((timestamp_us & TIMESTAMP_MASK) << CLOCK_ID_BITS) | (clock_id as u64 & CLOCK_ID_MASK))
    }

    /// Token for the current wall-clock time.
    pub fn now(clock_id: u16) -> Self {
        Self::from_parts(wall_clock_us(), clock_id)
    }

    /// The smallest token.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Microseconds since the UNIX epoch.
    pub fn timestamp_us(&self) -> u64 {
        self.0 >> CLOCK_ID_BITS
    }

    /// Clock identifier component.
    pub fn clock_id(&self) -> u16 {
        (self.0 & CLOCK_ID_MASK) as u16
    }

    /// The raw integer form.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The immediately following token.
    pub fn successor(&self) -> Self {
        Self((self.0 + 1) & (u64::MAX >> 1))
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [0u8; TID_LEN];
        for (i, slot) in out.iter_mut().enumerate() {
            let shift = 5 * (TID_LEN - 1 - i);
            *slot = ALPHABET[((self.0 >> shift) & 0x1f) as usize];
        }
        // The alphabet is ASCII.
        f.write_str(std::str::from_utf8(&out).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({self})")
    }
}

impl FromStr for Tid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidTid {
            token: s.to_string(),
            reason: reason.to_string(),
        };
        if s.len() != TID_LEN {
            return Err(invalid("expected 13 characters"));
        }
        let mut value: u64 = 0;
        for (i, c) in s.bytes().enumerate() {
            let digit = ALPHABET
                .iter()
                .position(|&a| a == c)
                .ok_or_else(|| invalid("character outside the sortable base32 alphabet"))?;
            // The leading character carries bits 60..64; bit 63 must stay clear.
            if i == 0 && digit >= 8 {
                return Err(invalid("high bit set"));
            }
            value = (value << 5) | digit as u64;
        }
        Ok(Self(value))
    }
}

impl Serialize for Tid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Monotonic [`Tid`] generator.
///
/// Every value returned is strictly greater than every value this clock has
/// returned before, even if the wall clock stalls or steps backwards.
pub struct TidClock {
    clock_id: u16,
    last: Mutex<Tid>,
}

impl TidClock {
    /// Create a clock with the given identifier (only the low 10 bits are used).
    pub fn new(clock_id: u16) -> Self {
        Self {
            clock_id: clock_id & CLOCK_ID_MASK as u16,
            last: Mutex::new(Tid::zero()),
        }
    }

    /// The next token.
    pub fn next(&self) -> Tid {
        self.next_after(&Tid::zero())
    }

    /// The next token, additionally guaranteed to be strictly after `floor`.
    pub fn next_after(&self, floor: &Tid) -> Tid {
        let wall = Tid::now(self.clock_id);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let candidate = wall.max(last.successor()).max(floor.successor());
        *last = candidate;
        candidate
    }
}

impl Default for TidClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for TidClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TidClock")
            .field("clock_id", &self.clock_id)
            .finish()
    }
}

fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_renders_as_all_twos() {
        assert_eq!(Tid::zero().to_string(), "2222222222222");
    }

    #[test]
    fn parts_roundtrip() {
        let tid = Tid::from_parts(1_700_000_000_000_000, 17);
        assert_eq!(tid.timestamp_us(), 1_700_000_000_000_000);
        assert_eq!(tid.clock_id(), 17);
    }

    #[test]
    fn string_roundtrip() {
        let tid = Tid::from_parts(1_700_000_000_123_456, 3);
        let s = tid.to_string();
        assert_eq!(s.len(), 13);
        assert_eq!(s.parse::<Tid>().unwrap(), tid);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            "222".parse::<Tid>(),
            Err(TypeError::InvalidTid { .. })
        ));
    }

    #[test]
    fn parse_rejects_foreign_characters() {
        assert!("222222222222!".parse::<Tid>().is_err());
        assert!("2222222222221".parse::<Tid>().is_err());
    }

    #[test]
    fn parse_rejects_high_bit() {
        assert!("z222222222222".parse::<Tid>().is_err());
    }

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01 in microseconds
        assert!(Tid::now(0).timestamp_us() > 1_577_836_800_000_000);
    }

    #[test]
    fn clock_is_strictly_monotonic() {
        let clock = TidClock::new(1);
        let mut prev = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn next_after_respects_floor() {
        let clock = TidClock::new(0);
        let floor = Tid::from_parts(TIMESTAMP_MASK - 10, 0);
        let tid = clock.next_after(&floor);
        assert!(tid > floor);
        assert!(clock.next() > tid);
    }

    #[test]
    fn serde_uses_string_form() {
        let tid = Tid::from_parts(42, 1);
        let json = serde_json::to_string(&tid).unwrap();
        assert_eq!(json, format!("\"{tid}\""));
        let parsed: Tid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tid);
    }

    proptest! {
        #[test]
        fn string_order_matches_numeric_order(a in 0u64..(1 << 53), b in 0u64..(1 << 53), ca in 0u16..1024, cb in 0u16..1024) {
            let ta = Tid::from_parts(a, ca);
            let tb = Tid::from_parts(b, cb);
            prop_assert_eq!(ta.cmp(&tb), ta.to_string().cmp(&tb.to_string()));
            prop_assert_eq!(ta.to_string().parse::<Tid>().unwrap(), ta);
        }
    }
}
