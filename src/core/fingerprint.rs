//! Window counts → bit vector → (bucket hash, full vector).
//!
//! Bit `i` is set iff the window's count for the table's `i`-th symbol is
//! strictly greater than its threshold. Both integers are packed MSB-first:
//! the first table symbol is the most significant bit.

use std::{fmt, str::FromStr};

use anyhow::Result;
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::{error::BincloneError, threshold::ThresholdTable, window::FrequencyCount};

/// Widest bucket prefix that fits the `u64` bucket hash
pub const MAX_BUCKET_BITS: usize = 64;

/// Ordered bits, one per table entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitVector
{
    bits: Vec<bool>,
}

impl BitVector
{
    pub fn len(&self) -> usize
    {
        self.bits
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.bits
            .is_empty()
    }

    pub fn as_slice(&self) -> &[bool]
    {
        &self.bits
    }

    /// First `sb_size` bits as an unsigned integer (`sb_size <= 64`)
    pub fn bucket(
        &self,
        sb_size: usize,
    ) -> u64
    {
        self.bits
            .iter()
            .take(sb_size)
            .fold(0u64, |acc, &b| (acc << 1) | u64::from(b))
    }

    /// All bits as one unsigned integer
    pub fn full(&self) -> FullVector
    {
        let n = self
            .bits
            .len();
        let mut limbs = vec![0u64; n.div_ceil(64)];

        for (i, &b) in self
            .bits
            .iter()
            .enumerate()
        {
            if b
            {
                let pos = n - 1 - i;
                limbs[pos / 64] |= 1u64 << (pos % 64);
            }
        }

        FullVector::from_limbs(limbs)
    }
}

impl From<Vec<bool>> for BitVector
{
    fn from(bits: Vec<bool>) -> Self
    {
        Self { bits }
    }
}

/// Arbitrary-width unsigned integer (little-endian `u64` limbs, no high zero limbs)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FullVector
{
    limbs: Vec<u64>,
}

impl FullVector
{
    pub fn from_limbs(mut limbs: Vec<u64>) -> Self
    {
        while limbs.last() == Some(&0)
        {
            limbs.pop();
        }
        Self { limbs }
    }

    /// Number of differing bits (popcount of XOR)
    pub fn hamming(
        &self,
        other: &FullVector,
    ) -> u32
    {
        self.limbs
            .iter()
            .zip_longest(other.limbs.iter())
            .map(|pair| match pair
            {
                EitherOrBoth::Both(a, b) => (a ^ b).count_ones(),
                EitherOrBoth::Left(x) | EitherOrBoth::Right(x) => x.count_ones(),
            })
            .sum()
    }

    /// Value as `u128` when it fits
    pub fn to_u128(&self) -> Option<u128>
    {
        match self
            .limbs
            .as_slice()
        {
            [] => Some(0),
            [lo] => Some(u128::from(*lo)),
            [lo, hi] => Some((u128::from(*hi) << 64) | u128::from(*lo)),
            _ => None,
        }
    }
}

impl From<u64> for FullVector
{
    fn from(v: u64) -> Self
    {
        Self::from_limbs(vec![v])
    }
}

impl fmt::Display for FullVector
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        let mut limbs = self
            .limbs
            .iter()
            .rev();

        match limbs.next()
        {
            None => write!(f, "0x0"),
            Some(top) =>
            {
                write!(f, "0x{top:x}")?;
                for limb in limbs
                {
                    write!(f, "{limb:016x}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for FullVector
{
    type Err = BincloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let bad = |reason: &str| BincloneError::Format { what: "full vector", reason: format!("{s:?}: {reason}") };

        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| bad("missing 0x prefix"))?;
        if digits.is_empty()
            || !digits
                .bytes()
                .all(|b| b.is_ascii_hexdigit())
        {
            return Err(bad("expected hexadecimal digits"));
        }

        // Consume 16 hex digits per limb from the least significant end
        let mut limbs = Vec::with_capacity(digits.len() / 16 + 1);
        let mut end = digits.len();
        while end > 0
        {
            let start = end.saturating_sub(16);
            let limb = u64::from_str_radix(&digits[start..end], 16).map_err(|e| bad(&e.to_string()))?;
            limbs.push(limb);
            end = start;
        }

        Ok(Self::from_limbs(limbs))
    }
}

impl Serialize for FullVector
{
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FullVector
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Encoded window: coarse bucket key plus the complete vector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint
{
    pub bucket: u64,
    pub full: FullVector,
}

/// Encoder bound to one threshold table and bucket width
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'t>
{
    table: &'t ThresholdTable,
    sb_size: usize,
}

impl<'t> Encoder<'t>
{
    /// Validate `sb_size` against the table once, up front.
    pub fn new(
        table: &'t ThresholdTable,
        sb_size: usize,
    ) -> Result<Self>
    {
        validate_bucket_size(sb_size, table.len())?;
        Ok(Self { table, sb_size })
    }

    pub fn table(&self) -> &'t ThresholdTable
    {
        self.table
    }

    pub fn sb_size(&self) -> usize
    {
        self.sb_size
    }

    /// Bit vector in the table's canonical order
    pub fn bits(
        &self,
        counts: &FrequencyCount,
    ) -> BitVector
    {
        self.table
            .iter()
            .map(|(sym, threshold)| {
                counts
                    .get(sym)
                    .copied()
                    .unwrap_or(0)
                    > threshold
            })
            .collect::<Vec<_>>()
            .into()
    }

    pub fn encode(
        &self,
        counts: &FrequencyCount,
    ) -> Fingerprint
    {
        let bits = self.bits(counts);
        Fingerprint { bucket: bits.bucket(self.sb_size), full: bits.full() }
    }
}

/// `1 <= sb_size <= 64` and strictly fewer bucket bits than table symbols
pub fn validate_bucket_size(
    sb_size: usize,
    table_len: usize,
) -> Result<(), BincloneError>
{
    if sb_size == 0 || sb_size > MAX_BUCKET_BITS || sb_size >= table_len
    {
        return Err(BincloneError::InvalidBucketSize { sb_size, table_len });
    }
    Ok(())
}

/// `1 - hamming / bits`, the normalized similarity of two full vectors
pub fn similarity(
    a: &FullVector,
    b: &FullVector,
    bits: usize,
) -> f64
{
    if bits == 0
    {
        return 0.0;
    }
    1.0 - f64::from(a.hamming(b)) / bits as f64
}
