//! Message sets: collections of message numbers or UIDs, as they appear in
//! IMAP commands like `FETCH 1,3:5,7:* (FLAGS)`.
//!
//! A set is a list of [`Range`]s. Ranges may be added in any order and may
//! overlap; before the set is formatted or queried it is *aggregated*, which
//! sorts the ranges and merges the ones that touch.

use std::borrow::Cow;
use std::fmt;

use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt, value},
    multi::separated_list1,
    sequence::{pair, preceded},
    IResult,
};

use crate::utils::iter_join_onto;

/// Errors building or parsing a [`MessageSet`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageSetError {
    /// Message numbers and UIDs start at 1.
    #[error("message numbers start at 1")]
    ZeroStart,
    /// Sets of different kinds cannot be combined.
    #[error("cannot combine a UID set with a sequence set")]
    KindMismatch,
    /// The text was not a valid IMAP sequence set.
    #[error("invalid message set: {0:?}")]
    Syntax(String),
}

type Result<T> = std::result::Result<T, MessageSetError>;

/// Whether the numbers in a set are sequence numbers or UIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetKind {
    /// Message sequence numbers.
    Sequence,
    /// Unique identifiers.
    Uid,
}

/// An inclusive range of message numbers. An `end` of `0` stands for `*`,
/// the largest number in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// First number in the range, at least 1.
    pub start: u32,
    /// Last number in the range, or `0` for `*`.
    pub end: u32,
}

impl Range {
    /// Returns `true` if the range extends to the last message.
    pub fn is_open(&self) -> bool {
        self.end == 0
    }

    /// Returns `true` if `n` lies within the range.
    pub fn contains(&self, n: u32) -> bool {
        n >= self.start && (self.is_open() || n <= self.end)
    }

    // Upper bound usable for ordering and comparisons.
    fn upper(&self) -> u64 {
        if self.is_open() {
            u64::MAX
        } else {
            u64::from(self.end)
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "{}:*", self.start)
        } else if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// A set of message sequence numbers or UIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSet {
    kind: SetKind,
    ranges: Vec<Range>,
    aggregated: bool,
}

impl MessageSet {
    /// Creates an empty set.
    pub fn new(kind: SetKind) -> Self {
        MessageSet {
            kind,
            ranges: Vec::new(),
            aggregated: true,
        }
    }

    /// Parses an IMAP `sequence-set`, such as `1,3:5,7:*`.
    ///
    /// `*:n` is accepted as a synonym for `n:*`. A bare `*` is rejected,
    /// since it cannot be expressed without knowing the mailbox size.
    pub fn parse(text: &str, kind: SetKind) -> Result<Self> {
        let syntax = || MessageSetError::Syntax(text.to_string());
        let (_, items) = all_consuming(sequence_set)(text).map_err(|_| syntax())?;

        let mut set = MessageSet::new(kind);
        for item in items {
            match item {
                (Bound::Num(n), None) => set.add(n)?,
                (Bound::Num(a), Some(Bound::Num(b))) => set.add_range(a, b)?,
                (Bound::Num(n), Some(Bound::Star)) | (Bound::Star, Some(Bound::Num(n))) => {
                    set.add_range(n, 0)?
                }
                (Bound::Star, _) => return Err(syntax()),
            }
        }
        Ok(set)
    }

    /// The kind of numbers held in this set.
    pub fn kind(&self) -> SetKind {
        self.kind
    }

    /// Returns `true` for a UID set.
    pub fn is_uid(&self) -> bool {
        self.kind == SetKind::Uid
    }

    /// Returns `true` if the set holds no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `true` if the stored ranges are already sorted and merged.
    pub fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    /// The ranges as currently stored. Call [`aggregate`](Self::aggregate)
    /// first to get them in canonical order.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Adds the range `start..=end`. An `end` of `0` means `*`; a reversed
    /// range is swapped.
    pub fn add_range(&mut self, start: u32, end: u32) -> Result<()> {
        let range = normalize(start, end)?;
        self.ranges.push(range);
        self.aggregated = false;
        Ok(())
    }

    /// Adds a single number.
    pub fn add(&mut self, n: u32) -> Result<()> {
        self.add_range(n, n)
    }

    /// Adds every range of `other`, which must be of the same kind.
    pub fn add_set(&mut self, other: &MessageSet) -> Result<()> {
        if other.kind != self.kind {
            return Err(MessageSetError::KindMismatch);
        }
        if !other.ranges.is_empty() {
            self.ranges.extend_from_slice(&other.ranges);
            self.aggregated = false;
        }
        Ok(())
    }

    /// Removes `start..=end` (with `0` again meaning `*`) from the set.
    ///
    /// Ranges that only partially overlap are trimmed, and a range that
    /// strictly contains the removed one is split in two.
    pub fn sub_range(&mut self, start: u32, end: u32) -> Result<()> {
        let cut = normalize(start, end)?;
        self.aggregate();

        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for r in self.ranges.drain(..) {
            if u64::from(r.start) > cut.upper() || r.upper() < u64::from(cut.start) {
                kept.push(r);
                continue;
            }
            if r.start < cut.start {
                kept.push(Range {
                    start: r.start,
                    end: cut.start - 1,
                });
            }
            if !cut.is_open() && r.upper() > u64::from(cut.end) {
                if let Some(start) = cut.end.checked_add(1) {
                    kept.push(Range { start, end: r.end });
                }
            }
        }
        self.ranges = kept;
        Ok(())
    }

    /// Sorts the ranges and merges overlapping or adjacent ones. An open
    /// range absorbs every range that starts after it.
    pub fn aggregate(&mut self) {
        if !self.aggregated {
            self.ranges = merged(&self.ranges);
            self.aggregated = true;
        }
    }

    /// Number of messages in the set, or `None` if it contains `*`.
    pub fn count(&self) -> Option<u64> {
        self.canonical().iter().try_fold(0u64, |n, r| {
            if r.is_open() {
                None
            } else {
                Some(n + u64::from(r.end - r.start) + 1)
            }
        })
    }

    /// Returns `true` if `n` is in the set.
    pub fn contains(&self, n: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(n))
    }

    /// The smallest number in the set.
    pub fn first(&self) -> Option<u32> {
        self.ranges.iter().map(|r| r.start).min()
    }

    /// The largest number in the set, `0` meaning `*`.
    pub fn last(&self) -> Option<u32> {
        self.canonical().last().map(|r| r.end)
    }

    /// Iterates over the numbers in the set in ascending order, taking `max`
    /// as the value of `*`. Numbers above `max` are skipped, except that an
    /// open range always yields `max` itself. Each number comes out once.
    pub fn iter(&self, max: u32) -> impl Iterator<Item = u32> {
        let mut seen = 0u64;
        self.canonical()
            .into_owned()
            .into_iter()
            .flat_map(move |r| {
                let (mut start, end) = if r.is_open() {
                    (r.start.min(max), max)
                } else {
                    (r.start, r.end.min(max))
                };
                // an open range clipped to `max` may fall inside an earlier one
                if u64::from(start) <= seen {
                    start = (seen + 1).min(u64::from(u32::MAX)) as u32;
                    if u64::from(end) <= seen {
                        return 1..=0;
                    }
                }
                seen = u64::from(end);
                start..=end
            })
    }

    fn canonical(&self) -> Cow<'_, [Range]> {
        if self.aggregated {
            Cow::Borrowed(&self.ranges)
        } else {
            Cow::Owned(merged(&self.ranges))
        }
    }
}

impl fmt::Display for MessageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        iter_join_onto(f, self.canonical().iter(), ",")
    }
}

fn normalize(start: u32, end: u32) -> Result<Range> {
    if start == 0 {
        return Err(MessageSetError::ZeroStart);
    }
    if end != 0 && end < start {
        Ok(Range {
            start: end,
            end: start,
        })
    } else {
        Ok(Range { start, end })
    }
}

fn merged(ranges: &[Range]) -> Vec<Range> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| (r.start, r.upper()));

    let mut out: Vec<Range> = Vec::with_capacity(sorted.len());
    for r in sorted {
        match out.last_mut() {
            Some(cur) if cur.is_open() => {}
            Some(cur) if u64::from(r.start) <= cur.upper() + 1 => {
                if r.is_open() {
                    cur.end = 0;
                } else if r.end > cur.end {
                    cur.end = r.end;
                }
            }
            _ => out.push(r),
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Num(u32),
    Star,
}

fn bound(input: &str) -> IResult<&str, Bound> {
    alt((
        value(Bound::Star, char('*')),
        map_res(digit1, |d: &str| match d.parse::<u32>() {
            Ok(0) | Err(_) => Err(()),
            Ok(n) => Ok(Bound::Num(n)),
        }),
    ))(input)
}

fn sequence_set(input: &str) -> IResult<&str, Vec<(Bound, Option<Bound>)>> {
    separated_list1(char(','), pair(bound, opt(preceded(char(':'), bound))))(input)
}
