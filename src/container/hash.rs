use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

use crate::error::{Error, Result};

/// A bucket holds up to a fixed number of key/value pairs whose hashes all
/// agree on the low `depth` bits.
struct Bucket<K, V> {
    size: usize,
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: PartialEq, V> Bucket<K, V> {
    fn new(size: usize, depth: usize) -> Self {
        Bucket { size, depth, items: Vec::with_capacity(size) }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.size
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Append the pair, return false when the bucket has no room. Callers
    /// keep keys unique across buckets.
    fn insert(&mut self, key: K, value: V) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push((key, value));
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(at) => {
                self.items.remove(at);
                true
            }
            None => false,
        }
    }
}

/// ExtendibleHashTable implements the extendible hashing scheme: a directory
/// of 2^global_depth slots indexes buckets by the low bits of the key hash,
/// and a full bucket splits in two instead of rehashing the whole table.
///
/// Multiple directory slots may share one bucket. A bucket with local depth
/// d is referenced by exactly 2^(global_depth - d) slots, and all of those
/// slots agree on the low d bits of their index. The directory only ever
/// grows, buckets are never merged back.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    global_depth: usize,
    bucket_size: usize,
    num_buckets: usize,
    dir: Vec<Arc<RwLock<Bucket<K, V>>>>,
    hasher: S,
}

impl<K: Hash + Eq, V> ExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    /// Create a table with a single empty bucket and the given hasher. The
    /// directory layout depends on the low bits the hasher produces, tests
    /// that predict exact depths inject a deterministic one.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket size should be larger than zero");
        let bucket = Arc::new(RwLock::new(Bucket::new(bucket_size, 0)));
        ExtendibleHashTable {
            global_depth: 0,
            bucket_size,
            num_buckets: 1,
            dir: vec![bucket],
            hasher,
        }
    }

    /// Insert the given key/value pair into the hash table. If the key
    /// already exists, overwrite its value.
    ///
    /// While the target bucket is full: grow the directory first when the
    /// bucket's local depth has caught up with the global depth, then split
    /// the bucket on the next hash bit, redistribute its entries, re-resolve
    /// the target slot and try again. A single split may land every entry in
    /// the same child, so the loop keeps splitting until room appears.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let hash = self.hash(&key);
        let mut index = (hash & self.mask()) as usize;

        // overwrite in place when the key is already present.
        {
            let mut guard = self.dir[index].write()?;
            if let Some(v) = guard.find_mut(&key) {
                *v = value;
                return Ok(());
            }
        }

        while self.dir[index].read()?.is_full() {
            let bucket = Arc::clone(&self.dir[index]);
            let mut guard = bucket.write()?;
            // entries that collide on the full hash can never be separated
            // by splitting, bail out instead of growing the directory
            // forever.
            if guard.items.iter().all(|(k, _)| self.hash(k) == hash) {
                return Err(Error::HashCollisionOverflow);
            }
            let depth = guard.depth;
            if depth == self.global_depth {
                self.grow();
            }

            // split on the next untested hash bit.
            let mask = 1u64 << depth;
            let mut zero = Bucket::new(self.bucket_size, depth + 1);
            let mut one = Bucket::new(self.bucket_size, depth + 1);
            for (k, v) in guard.items.drain(..) {
                if self.hash(&k) & mask != 0 {
                    one.insert(k, v);
                } else {
                    zero.insert(k, v);
                }
            }
            drop(guard);

            // point every slot that aliased the old bucket at the child
            // selected by its own copy of the split bit.
            let zero = Arc::new(RwLock::new(zero));
            let one = Arc::new(RwLock::new(one));
            for i in 0..self.dir.len() {
                if Arc::ptr_eq(&self.dir[i], &bucket) {
                    self.dir[i] = if i as u64 & mask != 0 {
                        Arc::clone(&one)
                    } else {
                        Arc::clone(&zero)
                    };
                }
            }
            self.num_buckets += 1;
            debug!(
                "split bucket into local depth {}, global depth {}, {} buckets",
                depth + 1,
                self.global_depth,
                self.num_buckets
            );

            index = (hash & self.mask()) as usize;
        }

        // the loop above guaranteed room in the target bucket.
        self.dir[index].write()?.insert(key, value);
        Ok(())
    }

    /// Look up the value associated with the given key.
    pub fn find(&self, key: &K) -> Result<Option<V>>
    where
        V: Clone,
    {
        let index = self.index_of(key);
        let guard = self.dir[index].read()?;
        Ok(guard.find(key).cloned())
    }

    /// Remove the key from the table, return whether a key was removed.
    /// Buckets are not merged and the directory keeps its size.
    pub fn remove(&mut self, key: &K) -> Result<bool> {
        let index = self.index_of(key);
        let mut guard = self.dir[index].write()?;
        Ok(guard.remove(key))
    }

    /// Number of low-order hash bits used to index the directory.
    pub fn global_depth(&self) -> usize {
        self.global_depth
    }

    /// Local depth of the bucket referenced by the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let guard = self.dir[dir_index].read().unwrap();
        guard.depth
    }

    /// Number of distinct buckets referenced by the directory.
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Double the directory. The upper half mirrors the lower half so every
    /// bucket keeps 2^(global_depth - local_depth) directory references.
    fn grow(&mut self) {
        let len = self.dir.len();
        for i in 0..len {
            let bucket = Arc::clone(&self.dir[i]);
            self.dir.push(bucket);
        }
        self.global_depth += 1;
    }

    fn index_of(&self, key: &K) -> usize {
        (self.hash(key) & self.mask()) as usize
    }

    fn mask(&self) -> u64 {
        (1u64 << self.global_depth) - 1
    }

    fn hash(&self, key: &K) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// SyncExtendibleHashTable wraps the hash table with a mutex for concurrent
/// access, basically all the heavy lifting are happens in the
/// ExtendibleHashTable.
pub struct SyncExtendibleHashTable<K, V, S = RandomState> {
    inner: Mutex<ExtendibleHashTable<K, V, S>>,
}

impl<K: Hash + Eq, V> SyncExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> SyncExtendibleHashTable<K, V, S> {
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        let inner = Mutex::new(ExtendibleHashTable::with_hasher(bucket_size, hasher));
        SyncExtendibleHashTable { inner }
    }

    /// Insert the given key/value pair into the hash table. If the key
    /// already exists, overwrite its value.
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.insert(key, value)
    }

    /// Look up the value associated with the given key.
    pub fn find(&self, key: &K) -> Result<Option<V>>
    where
        V: Clone,
    {
        let guard = self.inner.lock()?;
        guard.find(key)
    }

    /// Remove the key from the table, return whether a key was removed.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut guard = self.inner.lock()?;
        guard.remove(key)
    }

    /// Number of low-order hash bits used to index the directory.
    pub fn global_depth(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.global_depth()
    }

    /// Local depth of the bucket referenced by the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.local_depth(dir_index)
    }

    /// Number of distinct buckets referenced by the directory.
    pub fn num_buckets(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.num_buckets()
    }
}
