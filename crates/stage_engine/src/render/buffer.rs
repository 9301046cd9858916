//! Packed per-instance attribute buffers

/// Fixed-stride float buffer holding one attribute per instance slot
#[derive(Debug, Clone)]
pub struct InstanceBuffer {
    item_size: usize,
    data: Vec<f32>,
    /// Contents changed since the renderer last uploaded them
    pub needs_upload: bool,
}

impl InstanceBuffer {
    /// Buffer of `capacity` slots, each initialised to `fill`
    pub fn new(item_size: usize, capacity: usize, fill: &[f32]) -> Self {
        debug_assert_eq!(fill.len(), item_size);
        let mut buffer = Self {
            item_size,
            data: Vec::with_capacity(item_size * capacity),
            needs_upload: true,
        };
        for _ in 0..capacity {
            buffer.data.extend_from_slice(fill);
        }
        buffer
    }

    /// Floats per slot
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.data.len() / self.item_size
    }

    /// Overwrite slot `index`
    ///
    /// Writes past the end are ignored; the owning batch grows the buffer
    /// and rewrites every live slot before the next upload.
    pub fn write(&mut self, index: usize, values: &[f32]) {
        let start = index * self.item_size;
        if let Some(slot) = self.data.get_mut(start..start + self.item_size) {
            for (dst, src) in slot.iter_mut().zip(values) {
                *dst = *src;
            }
        }
    }

    /// Contents of slot `index`
    pub fn read(&self, index: usize) -> Option<&[f32]> {
        let start = index * self.item_size;
        self.data.get(start..start + self.item_size)
    }

    /// Grow to `new_capacity` slots, keeping existing slots and filling new
    /// ones with `fill`; never shrinks
    pub fn grow(&mut self, new_capacity: usize, fill: &[f32]) {
        let current = self.capacity();
        if new_capacity <= current {
            return;
        }
        self.data.reserve((new_capacity - current) * self.item_size);
        for _ in current..new_capacity {
            self.data.extend_from_slice(fill);
        }
        self.needs_upload = true;
    }

    /// All slots as floats
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// All slots as upload bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_preserves_and_fills() {
        let mut buffer = InstanceBuffer::new(3, 2, &[1.0, 1.0, 1.0]);
        buffer.write(1, &[0.5, 0.25, 0.0]);
        buffer.grow(5, &[1.0, 1.0, 1.0]);

        assert_eq!(buffer.capacity(), 5);
        assert_eq!(buffer.read(1).unwrap(), &[0.5, 0.25, 0.0]);
        assert_eq!(buffer.read(4).unwrap(), &[1.0, 1.0, 1.0]);
        assert!(buffer.read(5).is_none());

        buffer.grow(3, &[0.0, 0.0, 0.0]);
        assert_eq!(buffer.capacity(), 5);
    }

    #[test]
    fn test_out_of_range_write_is_ignored() {
        let mut buffer = InstanceBuffer::new(4, 1, &[0.0; 4]);
        buffer.write(3, &[1.0; 4]);
        assert_eq!(buffer.as_slice(), &[0.0; 4]);
        assert_eq!(buffer.as_bytes().len(), 16);
    }
}
