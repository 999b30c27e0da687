//! A set of closed `i64` intervals that coalesces overlapping and adjacent
//! members, counts the integers it covers, and hands out its lowest integers
//! as new sets.
//!
//! ```
//! use coalesced_ranges::RangeSet;
//!
//! let mut set: RangeSet = "1..=2,5..=8".parse()?;
//! assert_eq!(set.count(), 6);
//!
//! let head = set.take_first(5);
//! assert_eq!(head.to_string(), "1..=2,5..=7");
//! assert_eq!(set.to_string(), "8");
//! # Ok::<(), coalesced_ranges::Error>(())
//! ```
use std::{
    borrow::Cow,
    fmt,
    iter::FusedIterator,
    num::ParseIntError,
    ops::RangeInclusive,
    slice,
    str::FromStr,
};

use thiserror::Error;
use tracing::trace;

/// inclusive
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct Interval {
    start: i64,
    end: i64,
}

impl Interval {
    /// Builds `[start, end]`, rejecting reversed bounds.
    #[inline]
    pub fn new(start: i64, end: i64) -> Result<Self, Error> {
        if start > end {
            return Err(Error::InvalidInterval { start, end });
        }
        Ok(Interval { start, end })
    }

    #[inline]
    pub const fn point(n: i64) -> Self {
        Interval { start: n, end: n }
    }

    #[inline]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Number of integers in the interval.
    ///
    /// The whole `i64` domain holds 2^64 integers, one more than `u64` can
    /// represent; that single interval reports `u64::MAX`.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.abs_diff(self.start).saturating_add(1)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn contains(&self, n: i64) -> bool {
        self.start <= n && n <= self.end
    }

    /// Whether every integer of `other` is also in `self`.
    ///
    /// `[10, 30].contains_interval(&[15, 25])` is `true`,
    /// `[10, 20].contains_interval(&[15, 25])` is `false`.
    #[inline]
    pub fn contains_interval(&self, other: &Self) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Whether the two intervals share at least one integer.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Whether the two intervals overlap or sit next to each other with no
    /// integer in between, e.g. `[1, 3]` and `[4, 6]`.
    #[inline]
    pub fn touches(&self, other: &Self) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }

    /// Smallest interval covering both, if they touch.
    #[inline]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        self.touches(other).then(|| Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }

    /// Splits off the first `n` integers. `None` unless `0 < n < len`.
    fn split_at(&self, n: u64) -> Option<(Self, Self)> {
        if n == 0 || n >= self.len() {
            return None;
        }
        let tail_start = self.start.checked_add_unsigned(n)?;
        let head = Interval {
            start: self.start,
            end: tail_start - 1,
        };
        let tail = Interval {
            start: tail_start,
            end: self.end,
        };
        Some((head, tail))
    }
}

impl TryFrom<(i64, i64)> for Interval {
    type Error = Error;

    #[inline]
    fn try_from((start, end): (i64, i64)) -> Result<Self, Error> {
        Interval::new(start, end)
    }
}

impl TryFrom<RangeInclusive<i64>> for Interval {
    type Error = Error;

    #[inline]
    fn try_from(rng: RangeInclusive<i64>) -> Result<Self, Error> {
        Interval::new(*rng.start(), *rng.end())
    }
}

impl From<Interval> for RangeInclusive<i64> {
    #[inline]
    fn from(rng: Interval) -> Self {
        rng.start..=rng.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

/// Parses `a..=b` or a lone integer `a`.
impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        match s.split_once("..=") {
            Some((start, end)) => Interval::new(start.trim().parse()?, end.trim().parse()?),
            None if s.is_empty() || s.contains("..") => Err(Error::Syntax(s.into())),
            None => Ok(Interval::point(s.parse()?)),
        }
    }
}

/// Ordered collection of closed intervals with a cached element count.
///
/// Once normalized the intervals are sorted by start, pairwise disjoint and
/// never adjacent, and the cached count is exact. [`RangeSet::add_range_deferred`]
/// and [`RangeSet::insert_deferred`] only append, leaving the set dirty until
/// the next [`RangeSet::normalize`]. Read accessors stay correct on a dirty
/// set: they work from a coalesced copy instead of the raw storage.
#[derive(Default, Clone)]
pub struct RangeSet {
    intervals: Vec<Interval>,
    count: u64,
    // set by deferred inserts, cleared by `normalize`
    dirty: bool,
}

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set_builder = f.debug_set();
        for rng in &self.intervals {
            set_builder.entry(&(rng.start..=rng.end));
        }
        set_builder.finish()
    }
}

impl RangeSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds a set from intervals that are already sorted, disjoint and
    /// non-adjacent.
    fn from_canonical(intervals: Vec<Interval>) -> Self {
        RangeSet {
            count: total_len(&intervals),
            intervals,
            dirty: false,
        }
    }

    /// Adds `[start, end]` and keeps the set normalized.
    ///
    /// Returns whether the set gained any integer.
    pub fn add_range(&mut self, start: i64, end: i64) -> Result<bool, Error> {
        Ok(self.insert(Interval::new(start, end)?))
    }

    /// Appends `[start, end]` without normalizing. Meant for bulk loading:
    /// call [`RangeSet::normalize`] once after the last one.
    pub fn add_range_deferred(&mut self, start: i64, end: i64) -> Result<(), Error> {
        self.insert_deferred(Interval::new(start, end)?);
        Ok(())
    }

    /// Merges `rng` into the set, normalizing any pending deferred inserts
    /// first. Returns `false` when `rng` was already fully covered.
    pub fn insert(&mut self, rng: Interval) -> bool {
        self.normalize();
        // `lo..hi` is the run of stored intervals touching `rng`; both ends
        // are sorted once normalized, so binary search finds it.
        let lo = self
            .intervals
            .partition_point(|cur| cur.end.saturating_add(1) < rng.start);
        let hi = self
            .intervals
            .partition_point(|cur| cur.start <= rng.end.saturating_add(1));
        if lo < hi && self.intervals[lo].contains_interval(&rng) {
            return false;
        }
        let mut merged = rng;
        let mut removed = 0u64;
        for cur in &self.intervals[lo..hi] {
            merged.start = merged.start.min(cur.start);
            merged.end = merged.end.max(cur.end);
            removed = removed.saturating_add(cur.len());
        }
        self.intervals.splice(lo..hi, [merged]);
        self.count = if self.count == u64::MAX {
            total_len(&self.intervals)
        } else {
            self.count.saturating_sub(removed).saturating_add(merged.len())
        };
        true
    }

    pub fn insert_deferred(&mut self, rng: Interval) {
        self.intervals.push(rng);
        self.dirty = true;
    }

    /// Sorts and coalesces the stored intervals and recomputes the count.
    /// No-op on a set that is already normalized.
    pub fn normalize(&mut self) {
        if !self.dirty {
            return;
        }
        let input = self.intervals.len();
        self.intervals = coalesce(std::mem::take(&mut self.intervals));
        self.count = total_len(&self.intervals);
        self.dirty = false;
        trace!(
            input,
            output = self.intervals.len(),
            count = self.count,
            "normalized range set"
        );
    }

    #[inline]
    pub fn is_normalized(&self) -> bool {
        !self.dirty
    }

    /// Number of integers covered.
    ///
    /// Never stale: after deferred inserts the exact figure is computed from
    /// a coalesced copy, leaving the set itself untouched.
    pub fn count(&self) -> u64 {
        if self.dirty {
            total_len(&self.canonical())
        } else {
            self.count
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The stored intervals as they currently are. Only guaranteed sorted
    /// and disjoint while [`RangeSet::is_normalized`] holds.
    #[inline]
    pub fn ranges(&self) -> &[Interval] {
        &self.intervals
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn contains(&self, n: i64) -> bool {
        if self.dirty {
            return self.intervals.iter().any(|rng| rng.contains(n));
        }
        let idx = self.intervals.partition_point(|rng| rng.start <= n);
        self.intervals[..idx].last().is_some_and(|rng| n <= rng.end)
    }

    /// Copies the lowest `n` integers into a new set; `self` is unchanged.
    ///
    /// Asking for more than [`RangeSet::count`] returns everything.
    pub fn first(&self, n: u64) -> RangeSet {
        if self.dirty {
            let mut normalized = self.clone();
            normalized.normalize();
            return normalized.first(n);
        }
        let (whole, split) = self.prefix_plan(n);
        let mut taken = self.intervals[..whole].to_vec();
        if let Some((head, _)) = split {
            taken.push(head);
        }
        let out = RangeSet::from_canonical(taken);
        trace!(
            requested = n,
            extracted = out.count,
            destructive = false,
            "extracted prefix"
        );
        out
    }

    /// Moves the lowest `n` integers out of `self` into a new set.
    ///
    /// An interval that is only partly consumed keeps its remainder in
    /// `self`. Asking for more than [`RangeSet::count`] drains the set.
    pub fn take_first(&mut self, n: u64) -> RangeSet {
        self.normalize();
        let (whole, split) = self.prefix_plan(n);
        let mut taken: Vec<Interval> = self.intervals.drain(..whole).collect();
        if let Some((head, tail)) = split {
            taken.push(head);
            if let Some(first) = self.intervals.first_mut() {
                *first = tail;
            }
        }
        let out = RangeSet::from_canonical(taken);
        self.count = if self.count == u64::MAX {
            total_len(&self.intervals)
        } else {
            self.count.saturating_sub(out.count)
        };
        trace!(
            requested = n,
            extracted = out.count,
            remaining = self.count,
            destructive = true,
            "extracted prefix"
        );
        out
    }

    /// Repeatedly takes `block_size` integers off the front until the set
    /// is empty. The last chunk may be short.
    pub fn drain_chunks(&mut self, block_size: u64) -> DrainChunks<'_> {
        DrainChunks {
            inner: self,
            block_size,
        }
    }

    /// How many leading intervals `n` consumes whole, plus the split of the
    /// interval it ends inside, if any. Requires a normalized set.
    fn prefix_plan(&self, n: u64) -> (usize, Option<(Interval, Interval)>) {
        let mut remaining = n;
        for (idx, rng) in self.intervals.iter().enumerate() {
            if remaining == 0 {
                return (idx, None);
            }
            let len = rng.len();
            if len <= remaining {
                remaining -= len;
            } else {
                return (idx, rng.split_at(remaining));
            }
        }
        (self.intervals.len(), None)
    }

    fn canonical(&self) -> Cow<'_, [Interval]> {
        if self.dirty {
            Cow::Owned(coalesce(self.intervals.clone()))
        } else {
            Cow::Borrowed(&self.intervals)
        }
    }
}

/// Sorts by `(start, end)` and folds touching neighbours together in one pass.
fn coalesce(mut rngs: Vec<Interval>) -> Vec<Interval> {
    rngs.sort_unstable();
    let mut out: Vec<Interval> = Vec::with_capacity(rngs.len());
    for rng in rngs {
        match out.last_mut() {
            Some(cur) if rng.start <= cur.end.saturating_add(1) => {
                cur.end = cur.end.max(rng.end);
            }
            _ => out.push(rng),
        }
    }
    out
}

fn total_len(rngs: &[Interval]) -> u64 {
    rngs.iter()
        .fold(0u64, |acc, rng| acc.saturating_add(rng.len()))
}

/// Sets are equal when they cover the same integers, regardless of whether
/// either has pending deferred inserts.
impl PartialEq for RangeSet {
    fn eq(&self, other: &Self) -> bool {
        self.canonical()[..] == other.canonical()[..]
    }
}

impl Eq for RangeSet {}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a Interval;
    type IntoIter = slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

impl Extend<Interval> for RangeSet {
    fn extend<I: IntoIterator<Item = Interval>>(&mut self, iter: I) {
        for rng in iter {
            self.insert_deferred(rng);
        }
        self.normalize();
    }
}

impl FromIterator<Interval> for RangeSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        let mut set = RangeSet::new();
        set.extend(iter);
        set
    }
}

/// Comma separated intervals in the coalesced form, e.g. `1..=3,7,9..=12`.
impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, rng) in self.canonical().iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rng}")?;
        }
        Ok(())
    }
}

impl FromStr for RangeSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut set = RangeSet::new();
        if s.trim().is_empty() {
            return Ok(set);
        }
        for part in s.split(',') {
            set.insert_deferred(part.parse()?);
        }
        set.normalize();
        Ok(set)
    }
}

#[derive(Debug)]
pub struct DrainChunks<'a> {
    inner: &'a mut RangeSet,
    block_size: u64,
}

impl Iterator for DrainChunks<'_> {
    type Item = RangeSet;

    fn next(&mut self) -> Option<Self::Item> {
        if self.block_size == 0 || self.inner.is_empty() {
            return None;
        }
        Some(self.inner.take_first(self.block_size))
    }
}

impl FusedIterator for DrainChunks<'_> {}

#[derive(Debug, Error)]
pub enum Error {
    #[error("interval start {start} is greater than its end {end}")]
    InvalidInterval { start: i64, end: i64 },
    #[error("malformed range `{0}`")]
    Syntax(Box<str>),
    #[error(transparent)]
    Int(#[from] ParseIntError),
    #[error(transparent)]
    Header(#[from] http_range_header::RangeUnsatisfiableError),
    #[error("unsupported range unit")]
    Unsupported,
    #[error("range index {0} does not fit in i64")]
    OutOfRange(u64),
}

impl RangeSet {
    /// Builds a set from an HTTP `Range` header value such as
    /// `bytes=0-499,1000-1499`. Suffix and open-ended positions have no
    /// absolute offsets and are rejected.
    pub fn parse_http_range_header(header_content: &str) -> Result<RangeSet, Error> {
        use http_range_header::{EndPosition, StartPosition};
        let mut set = RangeSet::new();
        let rngs = http_range_header::parse_range_header(header_content)?.ranges;
        for item in rngs {
            let StartPosition::Index(start) = item.start else {
                return Err(Error::Unsupported);
            };
            let EndPosition::Index(last) = item.end else {
                return Err(Error::Unsupported);
            };
            set.insert_deferred(Interval::new(header_index(start)?, header_index(last)?)?);
        }
        set.normalize();
        Ok(set)
    }

    /// `None` for an empty set or one holding negative integers.
    pub fn as_http_range_header_string(&self) -> Option<Box<str>> {
        let rngs = self.canonical();
        match rngs.first() {
            Some(lowest) if lowest.start >= 0 => {}
            _ => return None,
        }
        let parts: Vec<String> = rngs
            .iter()
            .map(|rng| format!("{}-{}", rng.start, rng.end))
            .collect();
        Some(format!("bytes={}", parts.join(",")).into_boxed_str())
    }
}

fn header_index(n: u64) -> Result<i64, Error> {
    i64::try_from(n).map_err(|_| Error::OutOfRange(n))
}

#[cfg(feature = "serde")]
mod serde_impl {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _, ser::SerializeSeq};

    use crate::RangeSet;

    /// A sequence of `[start, end]` pairs in coalesced form.
    impl Serialize for RangeSet {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let rngs = self.canonical();
            let mut seq = serializer.serialize_seq(Some(rngs.len()))?;
            for rng in rngs.iter() {
                seq.serialize_element(&(rng.start, rng.end))?;
            }
            seq.end()
        }
    }

    impl<'de> Deserialize<'de> for RangeSet {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let pairs = Vec::<(i64, i64)>::deserialize(deserializer)?;
            let mut set = RangeSet::new();
            for (start, end) in pairs {
                set.add_range_deferred(start, end)
                    .map_err(D::Error::custom)?;
            }
            set.normalize();
            Ok(set)
        }
    }
}
