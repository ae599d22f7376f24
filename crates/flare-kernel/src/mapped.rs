//! CPU-side mapped views of GPU parameter data.
//!
//! A [`MappedBlock`] holds the CPU copy of one uniform block and tracks
//! whether it changed since the last upload. Writers replace the value with
//! [`MappedBlock::set`]; the submission layer later calls
//! [`MappedBlock::take_upload`] and copies the bytes to the device before the
//! dispatch that reads them. No device pointer ever leaves this module.

use bytemuck::Pod;

/// CPU copy of a single GPU block with dirty tracking.
#[derive(Debug, Clone)]
pub struct MappedBlock<T: Pod> {
    value: T,
    dirty: bool,
}

impl<T: Pod> MappedBlock<T> {
    /// Creates a block holding `value`, marked for upload.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value, dirty: true }
    }

    /// Returns the current CPU value.
    #[must_use]
    pub const fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the whole value, marking it dirty only when it changed.
    pub fn set(&mut self, value: T) {
        if bytemuck::bytes_of(&self.value) != bytemuck::bytes_of(&value) {
            self.value = value;
            self.dirty = true;
        }
    }

    /// Returns whether the block changed since the last upload.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the bytes to upload if the block is dirty, clearing the flag.
    pub fn take_upload(&mut self) -> Option<&[u8]> {
        if self.dirty {
            self.dirty = false;
            Some(bytemuck::bytes_of(&self.value))
        } else {
            None
        }
    }
}

impl<T: Pod + Default> Default for MappedBlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// CPU copy of a GPU array (storage buffer contents) with dirty tracking.
#[derive(Debug, Clone)]
pub struct MappedArray<T: Pod> {
    items: Vec<T>,
    dirty: bool,
}

impl<T: Pod> Default for MappedArray<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            dirty: true,
        }
    }
}

impl<T: Pod> MappedArray<T> {
    /// Replaces the array contents. Arrays are never partially updated.
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = items;
        self.dirty = true;
    }

    /// Returns the current contents.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns whether the array changed since the last upload.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the bytes to upload if the array is dirty, clearing the flag.
    pub fn take_upload(&mut self) -> Option<&[u8]> {
        if self.dirty {
            self.dirty = false;
            Some(bytemuck::cast_slice(&self.items))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::SphereBlock;

    #[test]
    fn test_new_block_is_dirty() {
        let mut block = MappedBlock::new(SphereBlock::default());
        assert!(block.is_dirty());
        assert_eq!(block.take_upload().map(<[u8]>::len), Some(32));
        assert!(!block.is_dirty());
        assert!(block.take_upload().is_none());
    }

    #[test]
    fn test_set_identical_value_stays_clean() {
        let mut block = MappedBlock::new(SphereBlock::default());
        let _ = block.take_upload();

        block.set(SphereBlock::default());
        assert!(!block.is_dirty());

        block.set(SphereBlock {
            count: 3,
            ..SphereBlock::default()
        });
        assert!(block.is_dirty());
    }

    #[test]
    fn test_array_replace() {
        let mut array: MappedArray<u32> = MappedArray::default();
        assert!(array.is_empty());
        array.replace(vec![1, 2, 3]);
        assert_eq!(array.len(), 3);
        assert_eq!(array.take_upload().map(<[u8]>::len), Some(12));
        assert!(array.take_upload().is_none());
    }
}
