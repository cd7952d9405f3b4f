//! # SharedMap
//!
//! A key/value store living in two byte buffers shared by every thread that holds a
//! clone of the map, guarded by one shared `Mutex`.
//!
//! ## Layout
//! - keys buffer: `name(start,end);` descriptors, zero-filled after the last one
//! - values buffer: encoded values packed back to back, addressed by the descriptors
//!
//! Keys are fixed at construction and so are both capacities. A `set` that changes a
//! value's encoded length shifts the later values and rewrites their descriptors in
//! place. Every operation holds the mutex from the first read to the last write.

mod buffer;
mod layout;

use std::fmt;
use std::sync::Arc;

use crate::config::DEFAULT_SHARED_MAP_MULTIPLIER;
use crate::error::SharedMapError;
use crate::sync::Mutex;
use weft_api::Payload;

use self::buffer::{Locked, Region};
pub use self::layout::{encode_value, Descriptor, Layout, NULL_ENCODING};

/// Keys buffer size when the map starts without keys.
pub const EMPTY_KEYS_CAPACITY: usize = 1024;
/// Values buffer size when the map starts without data.
pub const EMPTY_VALUES_CAPACITY: usize = 3 * 1024;

/// Sizing options for a new map.
#[derive(Clone, Debug)]
pub struct SharedMapBuilder {
    multiplier: usize,
    fixed_size: Option<usize>,
}

impl Default for SharedMapBuilder {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_SHARED_MAP_MULTIPLIER,
            fixed_size: None,
        }
    }
}

impl SharedMapBuilder {
    /// Scale both buffers to `multiplier` times their initial contents.
    pub fn multiplier(mut self, multiplier: usize) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Use exactly `bytes` for the values buffer.
    pub fn fixed_size(mut self, bytes: usize) -> Self {
        self.fixed_size = Some(bytes);
        self
    }

    pub fn build<I, K, V>(self, initial: I) -> Result<SharedMap, SharedMapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Payload>,
    {
        let mut names = Vec::new();
        let mut encoded = Vec::new();
        for (name, value) in initial {
            names.push(name.into());
            encoded.push(encode_value(&value.into())?);
        }

        let layout = Layout::pack(names.iter().map(String::as_str).zip(encoded.iter().map(Vec::len)))?;
        let keys_text = layout.encode();
        let total = layout.used();

        let keys_capacity = if keys_text.is_empty() {
            EMPTY_KEYS_CAPACITY
        } else {
            keys_text.len() * self.multiplier
        };
        let values_capacity = match self.fixed_size {
            Some(fixed) if fixed < total => {
                return Err(SharedMapError::InsufficientCapacity {
                    fixed,
                    required: total,
                })
            }
            Some(fixed) => fixed,
            None if total == 0 => EMPTY_VALUES_CAPACITY,
            None => total * self.multiplier,
        };

        let mut keys = vec![0u8; keys_capacity].into_boxed_slice();
        keys[..keys_text.len()].copy_from_slice(&keys_text);

        let mut values = vec![0u8; values_capacity].into_boxed_slice();
        let mut offset = 0;
        for bytes in &encoded {
            values[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += bytes.len();
        }

        tracing::debug!(
            keys = names.len(),
            keys_capacity,
            values_capacity,
            "shared map created"
        );

        Ok(SharedMap {
            region: Arc::new(Region::new(keys, values)),
        })
    }
}

/// Mutex-guarded key/value store in shared byte buffers. Clones attach to the same
/// buffers.
#[derive(Clone)]
pub struct SharedMap {
    region: Arc<Region>,
}

impl fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMap")
            .field("keys_capacity", &self.region.keys_capacity())
            .field("values_capacity", &self.region.values_capacity())
            .finish()
    }
}

impl SharedMap {
    /// Build a map with the default sizing.
    pub fn new<I, K, V>(initial: I) -> Result<Self, SharedMapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Payload>,
    {
        SharedMapBuilder::default().build(initial)
    }

    pub fn builder() -> SharedMapBuilder {
        SharedMapBuilder::default()
    }

    /// Textual value of `name`. `None` only when no key of that name was declared;
    /// a deleted key reads back as the null encoding.
    pub fn get(&self, name: &str) -> Result<Option<String>, SharedMapError> {
        let locked = self.region.lock();
        read(&locked, name)
    }

    /// Replace the value of an existing key.
    pub fn set(&self, name: &str, value: impl Into<Payload>) -> Result<(), SharedMapError> {
        let bytes = encode_value(&value.into())?;
        let mut locked = self.region.lock();
        write(&mut locked, name, &bytes)
    }

    /// Reset a key to the null encoding. The key itself stays declared.
    pub fn delete(&self, name: &str) -> Result<(), SharedMapError> {
        self.set(name, "")
    }

    /// Read, transform and write back `name` under one lock hold.
    pub fn update<F, V>(&self, name: &str, f: F) -> Result<(), SharedMapError>
    where
        F: FnOnce(Option<String>) -> V,
        V: Into<Payload>,
    {
        let mut locked = self.region.lock();
        let layout = Layout::decode(locked.keys())?;
        if layout.find(name).is_none() {
            return Err(SharedMapError::KeyMissing(name.to_string()));
        }
        let current = read(&locked, name)?;
        let bytes = encode_value(&f(current).into())?;
        write(&mut locked, name, &bytes)
    }

    /// Declared key names, in value order.
    pub fn keys(&self) -> Result<Vec<String>, SharedMapError> {
        let locked = self.region.lock();
        let layout = Layout::decode(locked.keys())?;
        Ok(layout.descriptors().iter().map(|d| d.name.clone()).collect())
    }

    pub fn contains_key(&self, name: &str) -> Result<bool, SharedMapError> {
        let locked = self.region.lock();
        Ok(Layout::decode(locked.keys())?.find(name).is_some())
    }

    pub fn keys_capacity(&self) -> usize {
        self.region.keys_capacity()
    }

    pub fn values_capacity(&self) -> usize {
        self.region.values_capacity()
    }

    /// Value bytes currently in use.
    pub fn values_used(&self) -> Result<usize, SharedMapError> {
        let locked = self.region.lock();
        Ok(Layout::decode(locked.keys())?.used())
    }

    /// The mutex guarding both buffers.
    pub fn mutex(&self) -> &Mutex {
        self.region.mutex()
    }

    /// Whether both handles are attached to the same buffers.
    pub fn same_map(&self, other: &SharedMap) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }
}

fn read(locked: &Locked<'_>, name: &str) -> Result<Option<String>, SharedMapError> {
    let layout = Layout::decode(locked.keys())?;
    let Some((_, descriptor)) = layout.find(name) else {
        return Ok(None);
    };

    let bytes = locked
        .values()
        .get(descriptor.start..descriptor.end)
        .ok_or_else(|| SharedMapError::Corrupted(format!("range of {name} out of bounds")))?;
    Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
}

fn write(locked: &mut Locked<'_>, name: &str, bytes: &[u8]) -> Result<(), SharedMapError> {
    let mut layout = Layout::decode(locked.keys())?;
    let (index, descriptor) = layout
        .find(name)
        .ok_or_else(|| SharedMapError::KeyMissing(name.to_string()))?;
    let start = descriptor.start;

    if descriptor.len() == bytes.len() {
        locked.values_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        return Ok(());
    }

    let old_keys_len = layout.encode().len();
    let rewrite = layout.resize(
        index,
        bytes.len(),
        locked.values().len(),
        locked.keys().len(),
    )?;

    let values = locked.values_mut();
    if rewrite.index + 1 < layout.descriptors().len() {
        values.copy_within(rewrite.old_end..rewrite.old_used, rewrite.new_end);
    }
    values[start..rewrite.new_end].copy_from_slice(bytes);
    if rewrite.new_used < rewrite.old_used {
        values[rewrite.new_used..rewrite.old_used].fill(0);
    }

    let keys = locked.keys_mut();
    keys[..rewrite.keys.len()].copy_from_slice(&rewrite.keys);
    if rewrite.keys.len() < old_keys_len {
        keys[rewrite.keys.len()..old_keys_len].fill(0);
    }

    tracing::trace!(key = name, old_len = rewrite.old_end - start, new_len = bytes.len(), "shared map value resized");
    Ok(())
}
