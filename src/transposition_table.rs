/*
 * Crab, a UCI-compatible chess engine
 * Copyright (C) 2024 Jasper Shovelton
 *
 * Crab is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Crab is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
 * details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Crab. If not, see <https://www.gnu.org/licenses/>.
 */

//! A bucketed transposition table.
//!
//! Each bucket holds a handful of entries that hash to the same index; a
//! probe scans the whole bucket for a matching key, and a store picks the
//! least valuable entry in the bucket to evict if there's no free slot and
//! no exact match.

use core::arch::x86_64::{_mm_prefetch, _MM_HINT_ET0};
use std::{
    mem::{size_of, transmute},
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
};

use crate::{
    board::Key,
    evaluation::{Eval, MATE_BOUND},
    movegen::Move,
    search::{Depth, Height},
    util::get_unchecked,
};

/// How many entries share a bucket.
const BUCKET_SIZE: usize = 3;
/// How much the generation counter advances every [`TranspositionTable::new_search`].
const AGE_DELTA: u8 = 1;
/// The generation counter wraps within this many bits.
const AGE_BITS: u8 = 5;
const AGE_MASK: u8 = (1 << AGE_BITS) - 1;

/// The bound of a score depending on how it was obtained.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Bound {
    /// No bound: the entry is unused or the bound hasn't been set yet.
    None,
    /// A lower bound: `best_score >= beta`.
    Lower,
    /// An exact bound: `alpha < best_score < beta`.
    Exact,
    /// An upper bound: `best_score <= alpha`.
    Upper,
}

impl From<u8> for Bound {
    fn from(bits: u8) -> Self {
        match bits & 0b11 {
            1 => Self::Lower,
            2 => Self::Exact,
            3 => Self::Upper,
            _ => Self::None,
        }
    }
}

impl From<Bound> for u8 {
    fn from(bound: Bound) -> Self {
        match bound {
            Bound::None => 0,
            Bound::Lower => 1,
            Bound::Exact => 2,
            Bound::Upper => 3,
        }
    }
}

/// One 16-byte transposition table entry.
///
/// Padded to 16 bytes (one `[u64; 2]`) rather than packed tighter, so a
/// whole entry can be swapped in and out behind a pair of [`AtomicU64`]s
/// without tearing, the same trick the original flat, non-bucketed table
/// used.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct TranspositionEntry {
    /// The low 16 bits of the position's Zobrist key, used as a tag to
    /// identify a hit within the bucket.
    hash16: u16,
    /// The best move in the position, if any.
    mv: Option<Move>,
    /// The static evaluation of the position.
    static_eval: Eval,
    /// The score of the position, ply-adjusted for mate scores.
    score: Eval,
    /// The depth at which the score was obtained.
    depth: u8,
    /// Packed `age (5 bits) | pv (1 bit) | bound (2 bits)`.
    age_pv_bound: u8,
    /// Padding so the entry fills exactly `[u64; 2]`.
    _padding: [u8; 6],
}

/// The information from a successful transposition table lookup.
#[derive(Clone, Copy)]
pub struct TranspositionHit {
    /// The static evaluation of the position.
    static_eval: Eval,
    /// The score of the position.
    score: Eval,
    /// The best move in the position.
    mv: Option<Move>,
    /// The depth at which the score was obtained.
    depth: Depth,
    /// The bound of the score.
    bound: Bound,
    /// Whether the entry was written from a PV node.
    was_pv: bool,
}

/// A bucket of entries sharing the same index.
#[allow(clippy::missing_docs_in_private_items)]
struct Bucket {
    entries: [[AtomicU64; 2]; BUCKET_SIZE],
}

/// A transposition table: a hash of previous board positions and information
/// about each position.
pub struct TranspositionTable {
    buckets: Vec<Bucket>,
    /// The current search generation. Bumped by [`Self::new_search`].
    age: AtomicU8,
}

impl From<[u64; 2]> for TranspositionEntry {
    fn from(raw: [u64; 2]) -> Self {
        // SAFETY: there is no `[u64; 2]` bit pattern that is an invalid
        // `TranspositionEntry`, even if the entry doesn't make much sense.
        unsafe { transmute::<[u64; 2], Self>(raw) }
    }
}

impl From<TranspositionEntry> for [u64; 2] {
    fn from(entry: TranspositionEntry) -> Self {
        // SAFETY: all fields are integral types.
        unsafe { transmute::<TranspositionEntry, Self>(entry) }
    }
}

impl TranspositionEntry {
    /// An all-zero entry is never written by [`TranspositionTable::store`]
    /// (age/bound are never both zero for a real entry), so it doubles as
    /// the "slot never used" sentinel.
    const EMPTY: [u64; 2] = [0, 0];

    /// The entry's generation.
    const fn age(self) -> u8 {
        self.age_pv_bound >> 3
    }

    /// Whether the entry was written from a PV node.
    const fn was_pv(self) -> bool {
        self.age_pv_bound & 0b100 != 0
    }

    /// The bound of the stored score.
    fn bound(self) -> Bound {
        Bound::from(self.age_pv_bound)
    }

    /// Packs `age`, `was_pv` and `bound` into the entry's status byte.
    fn pack_status(age: u8, was_pv: bool, bound: Bound) -> u8 {
        (age & AGE_MASK) << 3 | u8::from(was_pv) << 2 | u8::from(bound)
    }
}

impl TranspositionHit {
    /// Returns the static evaluation.
    pub const fn static_eval(self) -> Eval {
        self.static_eval
    }

    /// Returns the score.
    pub const fn score(self) -> Eval {
        self.score
    }

    /// Returns the best move.
    pub const fn mv(self) -> Option<Move> {
        self.mv
    }

    /// Returns the depth at which the score was obtained.
    pub const fn depth(self) -> Depth {
        self.depth
    }

    /// Returns the bound of the score.
    pub const fn bound(self) -> Bound {
        self.bound
    }

    /// Returns whether this entry came from a PV node.
    pub const fn was_pv(self) -> bool {
        self.was_pv
    }
}

impl TranspositionTable {
    /// Creates a new, empty, zero-sized [`TranspositionTable`].
    pub const fn new() -> Self {
        Self {
            buckets: Vec::new(),
            age: AtomicU8::new(0),
        }
    }

    /// Creates a new, zeroed [`TranspositionTable`] with the given size in
    /// MiB.
    pub fn with_capacity(size_mib: usize) -> Self {
        let mut tt = Self::new();
        tt.resize(size_mib);
        tt
    }

    /// Resizes the table to the given size in MiB and zeroes it.
    pub fn resize(&mut self, size_mib: usize) {
        let bucket_count = (size_mib * 1024 * 1024 / size_of::<Bucket>()).max(1);
        self.buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            self.buckets.push(Bucket::empty());
        }
        self.age.store(0, Ordering::Relaxed);
    }

    /// Zeroes the table without changing its size.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            for entry in &mut bucket.entries {
                *entry[0].get_mut() = 0;
                *entry[1].get_mut() = 0;
            }
        }
        self.age.store(0, Ordering::Relaxed);
    }

    /// Starts a new search: bumps the generation counter so stale entries
    /// from previous searches are deprioritised for replacement.
    pub fn new_search(&self) {
        self.age.fetch_add(AGE_DELTA, Ordering::Relaxed);
    }

    /// Prefetches the bucket for `key` into cache.
    pub fn prefetch(&self, key: Key) {
        #[cfg(target_arch = "x86_64")]
        {
            let bucket = get_unchecked(&self.buckets, self.bucket_index(key));
            let pointer = bucket.entries[0][0].as_ptr();
            // SAFETY: `pointer` always points into `self.buckets`, which is
            // live for at least as long as `self`.
            unsafe { _mm_prefetch(pointer.cast(), _MM_HINT_ET0) }
        }
    }

    /// Looks up `key`'s bucket and returns the matching entry, if any.
    ///
    /// Refreshes the entry's generation on a hit, so it isn't immediately
    /// evicted as stale by the very search that just used it.
    pub fn load(&self, key: Key, height: Height) -> Option<TranspositionHit> {
        let hash16 = Self::hash16(key);
        let bucket = get_unchecked(&self.buckets, self.bucket_index(key));
        let current_age = self.age.load(Ordering::Relaxed);

        for slot in &bucket.entries {
            let raw = load_raw(slot);
            if raw == TranspositionEntry::EMPTY {
                continue;
            }

            let mut entry = TranspositionEntry::from(raw);
            if entry.hash16 != hash16 {
                continue;
            }

            if entry.age() != current_age {
                entry.age_pv_bound = TranspositionEntry::pack_status(
                    current_age,
                    entry.was_pv(),
                    entry.bound(),
                );
                store_raw(slot, entry.into());
            }

            return Some(TranspositionHit {
                static_eval: entry.static_eval,
                score: denormalise(entry.score, height),
                mv: entry.mv,
                depth: Depth::from(entry.depth),
                bound: entry.bound(),
                was_pv: entry.was_pv(),
            });
        }

        None
    }

    /// Stores a search result for `key`.
    ///
    /// Picks an empty slot, a slot already holding `key`, or (failing both)
    /// the slot with the lowest `depth - age_delta` "quality" in the bucket.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        key: Key,
        depth: Depth,
        height: Height,
        bound: Bound,
        mv: Option<Move>,
        static_eval: Eval,
        score: Eval,
        was_pv: bool,
    ) {
        let hash16 = Self::hash16(key);
        let bucket = get_unchecked(&self.buckets, self.bucket_index(key));
        let current_age = self.age.load(Ordering::Relaxed);

        let mut victim = 0;
        let mut victim_quality = i32::MAX;

        for (index, slot) in bucket.entries.iter().enumerate() {
            let raw = load_raw(slot);
            if raw == TranspositionEntry::EMPTY {
                victim = index;
                break;
            }

            let entry = TranspositionEntry::from(raw);
            if entry.hash16 == hash16 {
                victim = index;
                break;
            }

            let quality = i32::from(entry.depth) - i32::from(age_delta(entry.age(), current_age));
            if quality < victim_quality {
                victim_quality = quality;
                victim = index;
            }
        }

        let slot = &bucket.entries[victim];
        let existing_raw = load_raw(slot);
        let existing = TranspositionEntry::from(existing_raw);
        let hash_changed = existing_raw == TranspositionEntry::EMPTY || existing.hash16 != hash16;

        let stored_move = if mv.is_some() || hash_changed { mv } else { existing.mv };

        let should_overwrite = hash_changed
            || bound == Bound::Exact
            || i32::from(depth.to_compressed()) + 2 * i32::from(was_pv) + 2
                > i32::from(existing.depth);

        let new_entry = if should_overwrite {
            TranspositionEntry {
                hash16,
                mv: stored_move,
                static_eval,
                score: normalise(score, height),
                depth: depth.to_compressed(),
                age_pv_bound: TranspositionEntry::pack_status(current_age, was_pv, bound),
                _padding: [0; 6],
            }
        } else {
            TranspositionEntry {
                hash16,
                mv: stored_move,
                static_eval: existing.static_eval,
                score: existing.score,
                depth: existing.depth,
                age_pv_bound: TranspositionEntry::pack_status(
                    current_age,
                    existing.was_pv(),
                    existing.bound(),
                ),
                _padding: [0; 6],
            }
        };

        store_raw(slot, new_entry.into());
    }

    /// Estimates how full the hash is, in parts-per-thousand, by sampling up
    /// to 1000 buckets and counting entries that are both occupied and of
    /// the current search generation.
    pub fn hashfull(&self) -> usize {
        let current_age = self.age.load(Ordering::Relaxed);
        let sampled_buckets = self.buckets.len().min(1000);
        if sampled_buckets == 0 {
            return 0;
        }

        let mut filled = 0;
        let mut total = 0;
        for bucket in self.buckets.iter().take(sampled_buckets) {
            for slot in &bucket.entries {
                total += 1;
                let raw = load_raw(slot);
                if raw == TranspositionEntry::EMPTY {
                    continue;
                }
                if TranspositionEntry::from(raw).age() == current_age {
                    filled += 1;
                }
            }
        }

        filled * 1000 / total
    }

    /// The low 16 bits of a Zobrist key, used as the in-bucket tag.
    fn hash16(key: Key) -> u16 {
        key as u16
    }

    /// Maps a key into a bucket index with the same uniform distribution as
    /// the key itself, via a wide multiply instead of a slow modulo.
    fn bucket_index(&self, key: Key) -> usize {
        ((u128::from(key) * self.buckets.len() as u128) >> 64) as usize
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Bucket {
    /// Creates a zeroed bucket.
    fn empty() -> Self {
        Self {
            entries: std::array::from_fn(|_| [AtomicU64::new(0), AtomicU64::new(0)]),
        }
    }
}

/// Loads an entry's two halves, relaxed.
fn load_raw(slot: &[AtomicU64; 2]) -> [u64; 2] {
    [slot[0].load(Ordering::Relaxed), slot[1].load(Ordering::Relaxed)]
}

/// Stores an entry's two halves, relaxed.
fn store_raw(slot: &[AtomicU64; 2], raw: [u64; 2]) {
    slot[0].store(raw[0], Ordering::Relaxed);
    slot[1].store(raw[1], Ordering::Relaxed);
}

/// The relative staleness of an entry last touched at `entry_age`, given the
/// table is currently on `current_age`. Wraps within the 5-bit age range.
fn age_delta(entry_age: u8, current_age: u8) -> u8 {
    current_age.wrapping_sub(entry_age) & AGE_MASK
}

/// If `score` is a mate score, assume it is relative to the root node and
/// turn it into one relative to the current node, ready for storing.
fn normalise(score: Eval, height: Height) -> Eval {
    let height = Eval::from(height.0);
    if score <= -MATE_BOUND {
        score - height
    } else if score >= MATE_BOUND {
        score + height
    } else {
        score
    }
}

/// If `score` is a mate score, assume it is relative to the current node and
/// turn it back into one relative to the root node, for returning to the
/// caller.
fn denormalise(score: Eval, height: Height) -> Eval {
    let height = Eval::from(height.0);
    if score <= -MATE_BOUND {
        score + height
    } else if score >= MATE_BOUND {
        score - height
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::{Bound, TranspositionTable};
    use crate::{
        defs::Square,
        movegen::Move,
        search::{Depth, Height},
    };

    #[test]
    fn store_then_load_round_trips() {
        let tt = TranspositionTable::with_capacity(1);
        let key = 0x1234_5678_9abc_def0;
        let mv = Move::new(Square::E2, Square::E4);

        tt.store(key, Depth(6), Height(0), Bound::Exact, Some(mv), 37, -12, true);

        let hit = tt.load(key, Height(0)).unwrap();
        assert_eq!(hit.score(), -12);
        assert_eq!(hit.static_eval(), 37);
        assert_eq!(hit.mv(), Some(mv));
        assert!(hit.depth() == Depth(6));
        assert!(hit.bound() == Bound::Exact);
        assert!(hit.was_pv());
    }

    #[test]
    fn load_misses_on_an_empty_table() {
        let tt = TranspositionTable::with_capacity(1);
        assert!(tt.load(0xdead_beef, Height(0)).is_none());
    }

    #[test]
    fn clear_evicts_every_entry() {
        let tt = TranspositionTable::with_capacity(1);
        let key = 0x1111_2222_3333_4444;
        tt.store(key, Depth(3), Height(0), Bound::Lower, None, 0, 0, false);
        assert!(tt.load(key, Height(0)).is_some());

        tt.clear();
        assert!(tt.load(key, Height(0)).is_none());
    }
}
