//! Selector interning.
//!
//! Selectors are interned process-wide: each distinct name maps to exactly
//! one [`Selector`], and the name lives for the rest of the program. Equality
//! and hashing use the interned id only.
//!
//! # Sharding
//!
//! The name table is split into `NUM_SHARDS` independently locked shards
//! chosen by the low bits of the name's `FxHash`. A hit takes a read lock on
//! one shard; a miss takes that shard's write lock and then the id table's.

use fxhash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, PoisonError, RwLock};

const NUM_SHARDS: usize = 16;
const SHARD_MASK: usize = NUM_SHARDS - 1;

/// An interned message name.
#[derive(Clone, Copy)]
pub struct Selector {
    id: u32,
    name: &'static str,
}

struct SelectorRegistry {
    shards: [RwLock<FxHashMap<&'static str, Selector>>; NUM_SHARDS],
    by_id: RwLock<Vec<&'static str>>,
}

fn registry() -> &'static SelectorRegistry {
    static REGISTRY: OnceLock<SelectorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| SelectorRegistry {
        shards: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
        by_id: RwLock::new(Vec::new()),
    })
}

fn shard_for(name: &str) -> usize {
    #[allow(clippy::cast_possible_truncation)]
    let hash = fxhash::hash64(name) as usize;
    hash & SHARD_MASK
}

impl Selector {
    /// Interns `name` and returns its selector.
    ///
    /// Registering the same name twice, from any thread, returns equal
    /// selectors.
    ///
    /// ```
    /// use natbridge::runtime::Selector;
    ///
    /// let a = Selector::register("initWithFrame:");
    /// let b = Selector::register("initWithFrame:");
    /// assert_eq!(a, b);
    /// assert_eq!(a.name(), "initWithFrame:");
    /// ```
    pub fn register(name: &str) -> Selector {
        let reg = registry();
        let shard = &reg.shards[shard_for(name)];

        if let Some(sel) = shard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return *sel;
        }

        let mut map = shard.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(sel) = map.get(name) {
            return *sel;
        }

        let interned: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let mut by_id = reg.by_id.write().unwrap_or_else(PoisonError::into_inner);
        #[allow(clippy::cast_possible_truncation)]
        let sel = Selector {
            id: by_id.len() as u32,
            name: interned,
        };
        by_id.push(interned);
        map.insert(interned, sel);
        sel
    }

    /// Returns the selector for a handle produced by [`Selector::as_handle`].
    #[must_use]
    pub fn from_handle(handle: u64) -> Option<Selector> {
        let id = u32::try_from(handle.checked_sub(1)?).ok()?;
        let by_id = registry()
            .by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        by_id.get(id as usize).map(|name| Selector { id, name })
    }

    /// Returns a non-zero handle for this selector.
    #[must_use]
    pub fn as_handle(self) -> u64 {
        u64::from(self.id) + 1
    }

    /// Returns the selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Selector {}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.name)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
