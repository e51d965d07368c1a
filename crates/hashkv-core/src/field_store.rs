//! Field store: two-choice hash table for multi-field hash records.
//!
//! Every primary key has exactly two candidate buckets, one per index
//! function. All of a key's fields live in those two buckets and nowhere
//! else, so `get` and `get_all` never touch more than two buckets.
//!
//! **Insert**: update in place if the identity exists, else take a free slot,
//! else evict the oldest occupant of a candidate bucket and re-home it
//! (bounded), else double the table and keep going.
//! **Delete**: linear probe from each home index, then backfill the gap.
//! **Locking**: one table-wide RwLock. Writers exclusive, readers shared.

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::config::Config;

/// Odd multiplier for the secondary index mixing step (2^64 / golden ratio)
const SECONDARY_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

type IndexFn = fn(u64, &str, usize) -> usize;

/// Both index functions, in probe order.
const INDEX_FNS: [IndexFn; 2] = [primary_index, secondary_index];

/// First candidate bucket for `key` in a table of `size` buckets.
pub fn primary_index(seed: u64, key: &str, size: usize) -> usize {
    (xxh64(key.as_bytes(), seed) % size as u64) as usize
}

/// Second candidate bucket for `key`.
///
/// Re-mixes the seeded hash and takes the high half, so its sequence is
/// not a function of `primary_index` modulo `size`.
pub fn secondary_index(seed: u64, key: &str, size: usize) -> usize {
    let h = xxh64(key.as_bytes(), seed);
    let mixed = (h ^ (h >> 29)).wrapping_mul(SECONDARY_MIX);
    ((mixed >> 32) % size as u64) as usize
}

/// One field of one hash. Immutable: updates replace the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: String,
    field: String,
    value: String,
}

impl Record {
    pub fn new(key: &str, field: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn field(&self) -> &str { &self.field }

    pub fn value(&self) -> &str { &self.value }

    fn is(&self, key: &str, field: &str) -> bool {
        self.key == key && self.field == field
    }
}

/// Bucket array plus sizing parameters. Only ever touched under the FieldStore lock.
struct Table {
    buckets: Vec<Vec<Record>>,
    seed: u64,
    len: usize,
    bucket_capacity: usize,
    max_displacements: usize,
    max_growth_per_insert: usize,
}

fn empty_buckets(size: usize) -> Vec<Vec<Record>> {
    std::iter::repeat_with(Vec::new).take(size).collect()
}

impl Table {
    fn size(&self) -> usize {
        self.buckets.len()
    }

    fn candidates(&self, key: &str) -> [usize; 2] {
        let size = self.size();
        INDEX_FNS.map(|index| index(self.seed, key, size))
    }

    /// (bucket, slot) of the record with this identity.
    fn find(&self, key: &str, field: &str) -> Option<(usize, usize)> {
        self.candidates(key).into_iter().find_map(|bucket| {
            self.buckets[bucket]
                .iter()
                .position(|r| r.is(key, field))
                .map(|slot| (bucket, slot))
        })
    }

    fn insert(&mut self, record: Record) {
        // Both candidates are checked before anything is evicted.
        if let Some((bucket, slot)) = self.find(&record.key, &record.field) {
            self.buckets[bucket][slot] = record;
            return;
        }

        self.len += 1;
        let mut homeless = record;
        let mut growths = 0;
        loop {
            homeless = match self.place(homeless) {
                Ok(()) => return,
                Err(evicted) => evicted,
            };
            if growths == self.max_growth_per_insert {
                self.overflow(homeless);
                return;
            }
            self.grow();
            growths += 1;
        }
    }

    /// Bounded cuckoo displacement.
    ///
    /// On failure returns whichever record is still without a bucket, which
    /// is usually not the one passed in.
    fn place(&mut self, record: Record) -> Result<(), Record> {
        let mut current = record;
        let mut evicted_from: Option<usize> = None;

        for _ in 0..self.max_displacements {
            let candidates = self.candidates(&current.key);

            if let Some(&free) = candidates
                .iter()
                .find(|&&bucket| self.buckets[bucket].len() < self.bucket_capacity)
            {
                self.buckets[free].push(current);
                return Ok(());
            }

            // Eviction only shuffles the key's own fields between its two buckets.
            if self.saturated_by(&current.key, candidates) {
                self.overflow(current);
                return Ok(());
            }

            let target = match evicted_from {
                Some(from) if from == candidates[0] => candidates[1],
                _ => candidates[0],
            };
            let bucket = &mut self.buckets[target];
            let evicted = bucket.remove(0);
            bucket.push(current);
            current = evicted;
            evicted_from = Some(target);
        }

        Err(current)
    }

    fn saturated_by(&self, key: &str, candidates: [usize; 2]) -> bool {
        candidates
            .iter()
            .all(|&bucket| self.buckets[bucket].iter().all(|r| r.key == key))
    }

    /// Push past capacity into the less loaded candidate.
    fn overflow(&mut self, record: Record) {
        let [first, second] = self.candidates(&record.key);
        let target = if self.buckets[second].len() < self.buckets[first].len() {
            second
        } else {
            first
        };
        debug!(
            bucket = target,
            depth = self.buckets[target].len() + 1,
            "field store bucket over capacity"
        );
        self.buckets[target].push(record);
    }

    /// Double the bucket count and re-insert every record.
    fn grow(&mut self) {
        let old_size = self.size();
        let old = std::mem::replace(&mut self.buckets, empty_buckets(old_size * 2));
        debug!(old_size, new_size = old_size * 2, records = self.len, "resizing field store");

        for record in old.into_iter().flatten() {
            if let Some((bucket, slot)) = self.find(&record.key, &record.field) {
                self.buckets[bucket][slot] = record;
                self.len -= 1;
                continue;
            }
            if let Err(homeless) = self.place(record) {
                self.overflow(homeless);
            }
        }
    }

    fn get(&self, key: &str, field: &str) -> Option<&Record> {
        self.find(key, field)
            .map(|(bucket, slot)| &self.buckets[bucket][slot])
    }

    fn remove(&mut self, key: &str, field: &str) -> bool {
        let size = self.size();

        for index in INDEX_FNS {
            let home = index(self.seed, key, size);
            let mut probe = home;
            loop {
                if self.buckets[probe].is_empty() {
                    break;
                }
                if let Some(slot) = self.buckets[probe].iter().position(|r| r.is(key, field)) {
                    self.buckets[probe].remove(slot);
                    self.len -= 1;
                    self.backfill(index, probe);
                    return true;
                }
                probe = (probe + 1) % size;
                if probe == home {
                    break;
                }
            }
        }

        false
    }

    /// Pull a later record into the freed slot at `gap`, then repeat for
    /// the slot that move freed.
    ///
    /// A record moves only if it sits away from its `index` home and `gap`
    /// is one of its two candidates, so it stays reachable.
    fn backfill(&mut self, index: IndexFn, mut gap: usize) {
        let size = self.size();
        let mut probe = (gap + 1) % size;

        for _ in 1..size {
            if self.buckets[probe].is_empty() {
                break;
            }
            if self.buckets[gap].len() < self.bucket_capacity {
                let movable = self.buckets[probe].iter().position(|r| {
                    index(self.seed, &r.key, size) != probe
                        && self.candidates(&r.key).contains(&gap)
                });
                if let Some(slot) = movable {
                    let record = self.buckets[probe].remove(slot);
                    self.buckets[gap].push(record);
                    gap = probe;
                }
            }
            probe = (probe + 1) % size;
        }
    }

    fn get_all(&self, key: &str) -> Option<HashMap<String, String>> {
        let [first, second] = self.candidates(key);
        let buckets: &[usize] = if first == second { &[first] } else { &[first, second] };

        let fields: HashMap<String, String> = buckets
            .iter()
            .flat_map(|&bucket| self.buckets[bucket].iter())
            .filter(|r| r.key == key)
            .map(|r| (r.field.clone(), r.value.clone()))
            .collect();

        if fields.is_empty() { None } else { Some(fields) }
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        let mut seen = std::collections::HashSet::new();
        let mut total = 0;
        for (bucket, records) in self.buckets.iter().enumerate() {
            for r in records {
                assert!(
                    self.candidates(&r.key).contains(&bucket),
                    "record {}/{} in bucket {} outside its candidates",
                    r.key, r.field, bucket
                );
                assert!(
                    seen.insert((r.key.clone(), r.field.clone())),
                    "duplicate record {}/{}",
                    r.key, r.field
                );
                total += 1;
            }
        }
        assert_eq!(total, self.len, "record count drifted");
    }
}

/// Concurrent field store for hash commands (HSET/HGET/HDEL/HGETALL).
///
/// All methods take `&self`. `get`/`get_all` share the table lock;
/// `set`/`delete` (and any resize they trigger) hold it exclusively, so a
/// half-rehashed table is never observable.
pub struct FieldStore {
    table: RwLock<Table>,
}

impl FieldStore {
    /// Create an empty store with a random hash seed.
    pub fn new(config: &Config) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Create an empty store with a fixed hash seed (reproducible layouts).
    pub fn with_seed(config: &Config, seed: u64) -> Self {
        let table = Table {
            buckets: empty_buckets(config.initial_buckets.max(1)),
            seed,
            len: 0,
            bucket_capacity: config.bucket_capacity.max(1),
            max_displacements: config.max_displacements,
            max_growth_per_insert: config.max_growth_per_insert,
        };
        Self { table: RwLock::new(table) }
    }

    /// Insert or replace `key`.`field`.
    pub fn set(&self, key: &str, field: &str, value: &str) {
        let mut table = self.table.write();
        table.insert(Record::new(key, field, value));
    }

    pub fn get(&self, key: &str, field: &str) -> Option<String> {
        let table = self.table.read();
        table.get(key, field).map(|r| r.value.clone())
    }

    /// Remove `key`.`field`. Returns false (and changes nothing) if absent.
    pub fn delete(&self, key: &str, field: &str) -> bool {
        let mut table = self.table.write();
        table.remove(key, field)
    }

    /// Every field of `key`, or None if the key owns no fields.
    pub fn get_all(&self, key: &str) -> Option<HashMap<String, String>> {
        let table = self.table.read();
        table.get_all(key)
    }

    /// Number of records (fields across all keys).
    pub fn len(&self) -> usize {
        self.table.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bucket array length. Only ever doubles.
    pub fn bucket_count(&self) -> usize {
        self.table.read().size()
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        self.table.read().assert_invariants();
    }
}
