/// Fixed-capacity FIFO. Operations return `false` instead of overrunning.
pub struct RingBuffer<T: Copy> {
    buffer: Vec<T>,
    capacity: usize,
    read_pos: usize,
    write_pos: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize, value: T) -> RingBuffer<T> {
        RingBuffer {
            buffer: vec![value; capacity + 1],
            capacity,
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn storage_len(&self) -> usize {
        self.capacity + 1
    }

    pub fn num_readable(&self) -> usize {
        if self.read_pos <= self.write_pos {
            self.write_pos - self.read_pos
        } else {
            self.write_pos + self.storage_len() - self.read_pos
        }
    }

    pub fn num_writable(&self) -> usize {
        self.capacity - self.num_readable()
    }

    pub fn is_full(&self) -> bool {
        self.num_writable() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// Copies the oldest `dest.len()` samples without consuming them.
    pub fn read(&self, dest: &mut [T]) -> bool {
        let length = dest.len();
        if self.num_readable() < length {
            return false;
        }

        let copy1 = (self.storage_len() - self.read_pos).min(length);
        dest[..copy1].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + copy1]);
        dest[copy1..].copy_from_slice(&self.buffer[..length - copy1]);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.buffer[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.storage_len();
        Some(value)
    }

    pub fn write(&mut self, src: &[T]) -> bool {
        let length = src.len();
        if self.num_writable() < length {
            return false;
        }

        let storage_len = self.storage_len();
        let copy1 = (storage_len - self.write_pos).min(length);
        self.buffer[self.write_pos..self.write_pos + copy1].copy_from_slice(&src[..copy1]);
        self.buffer[..length - copy1].copy_from_slice(&src[copy1..]);
        self.write_pos = (self.write_pos + length) % storage_len;
        true
    }

    pub fn push(&mut self, value: T) -> bool {
        self.write(&[value])
    }

    pub fn fill(&mut self, length: usize, value: T) -> bool {
        if self.num_writable() < length {
            return false;
        }

        let storage_len = self.storage_len();
        let copy1 = (storage_len - self.write_pos).min(length);
        self.buffer[self.write_pos..self.write_pos + copy1].fill(value);
        self.buffer[..length - copy1].fill(value);
        self.write_pos = (self.write_pos + length) % storage_len;
        true
    }

    pub fn discard(&mut self, length: usize) -> bool {
        if self.num_readable() < length {
            return false;
        }
        self.read_pos = (self.read_pos + length) % self.storage_len();
        true
    }

    pub fn discard_all(&mut self) {
        self.read_pos = self.write_pos;
    }
}

pub trait OverlappedAddable<T> {
    /// Adds the first `overlap_size` samples of `src` onto the newest
    /// `overlap_size` readable samples and appends the rest.
    fn overlap_add(&mut self, src: &[T], overlap_size: usize) -> bool;
}

impl<T> OverlappedAddable<T> for RingBuffer<T>
where
    T: std::ops::AddAssign + Copy,
{
    fn overlap_add(&mut self, src: &[T], overlap_size: usize) -> bool {
        let length = src.len();

        if length < overlap_size || self.num_readable() < overlap_size {
            return false;
        }
        if self.num_writable() < length - overlap_size {
            return false;
        }

        let storage_len = self.storage_len();
        let write_start = (self.write_pos + storage_len - overlap_size) % storage_len;
        for (i, &x) in src[..overlap_size].iter().enumerate() {
            self.buffer[(write_start + i) % storage_len] += x;
        }

        self.write(&src[overlap_size..])
    }
}
