/// Round `num` up to the next multiple of `alignment`. An alignment of zero
/// leaves `num` untouched; callers reject zero page sizes before laying out
/// sections.
pub fn align_to<N: num_traits::PrimInt>(num: N, alignment: N) -> N {
    if alignment.is_zero() {
        return num;
    }
    let rem = num % alignment;
    if rem.is_zero() {
        num
    } else {
        num + (alignment - rem)
    }
}

pub trait SliceExt {
    fn u32_at(&self, offset: usize) -> Option<u32>;
    fn u32_be_at(&self, offset: usize) -> Option<u32>;
    fn array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]>;
}

impl SliceExt for [u8] {
    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.array_at(offset).map(u32::from_le_bytes)
    }

    fn u32_be_at(&self, offset: usize) -> Option<u32> {
        self.array_at(offset).map(u32::from_be_bytes)
    }

    fn array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.get(offset..offset.checked_add(N)?)
            .and_then(|data| data.try_into().ok())
    }
}

pub trait SliceMutExt {
    fn put_at(&mut self, offset: usize, data: &[u8]) -> bool;
}

impl SliceMutExt for [u8] {
    fn put_at(&mut self, offset: usize, data: &[u8]) -> bool {
        match offset
            .checked_add(data.len())
            .and_then(|end| self.get_mut(offset..end))
        {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }
}

pub fn trim_end(data: &[u8]) -> &[u8] {
    &data[..data.iter().position(|&b| b == 0).unwrap_or(data.len())]
}

/// Append-only output buffer for building images. Writing into memory cannot
/// fail, so none of these return a `Result`.
#[derive(Default)]
pub struct ImageWriter {
    buf: Vec<u8>,
}

impl ImageWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        self.buf.extend_from_slice(data);
        data.len()
    }

    /// Zero-fill up to `len` bytes in total, if not already that long.
    pub fn pad_to(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }

    pub fn patch(&mut self, offset: usize, data: &[u8]) -> bool {
        self.buf.put_at(offset, data)
    }

    pub fn get(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.buf.get(offset..offset.checked_add(len)?)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
