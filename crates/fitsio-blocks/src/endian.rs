//! Big-endian conversion for FITS binary data.
//!
//! FITS stores every numeric value most-significant byte first. [`BeScalar`]
//! covers the scalar element types a binary table column can hold; the bulk
//! helpers convert whole slices through `bytemuck` views instead of writing
//! one value at a time.

use std::io::{self, Write};

/// A fixed-width numeric type with a big-endian wire form.
pub trait BeScalar: Copy + Send + Sync + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Decode from the first [`Self::SIZE`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`Self::SIZE`].
    fn from_be_slice(buf: &[u8]) -> Self;

    /// Append the big-endian encoding of `self` to `out`.
    fn put_be(self, out: &mut Vec<u8>);
}

macro_rules! impl_be_scalar {
    ($($t:ty),*) => {$(
        impl BeScalar for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn from_be_slice(buf: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&buf[..Self::SIZE]);
                <$t>::from_be_bytes(raw)
            }

            #[inline]
            fn put_be(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}

impl_be_scalar!(u8, i8, i16, i32, i64, f32, f64);

/// Decode a big-endian buffer into values. Trailing bytes that do not make a
/// whole value are ignored.
pub fn decode_be<T: BeScalar>(buf: &[u8]) -> Vec<T> {
    buf.chunks_exact(T::SIZE).map(T::from_be_slice).collect()
}

/// Write integer values to `dest` in big-endian order.
pub fn write_ints_be<T, W>(dest: &mut W, values: &[T]) -> io::Result<()>
where
    T: bytemuck::Pod + SwapBytes,
    W: Write + ?Sized,
{
    let swapped: Vec<T> = values.iter().map(|&v| v.to_be()).collect();
    dest.write_all(bytemuck::cast_slice(&swapped))
}

/// Write `f32` values to `dest` in big-endian order.
pub fn write_f32s_be<W: Write + ?Sized>(dest: &mut W, values: &[f32]) -> io::Result<()> {
    let bits: Vec<u32> = values.iter().map(|v| v.to_bits().to_be()).collect();
    dest.write_all(bytemuck::cast_slice(&bits))
}

/// Write `f64` values to `dest` in big-endian order.
pub fn write_f64s_be<W: Write + ?Sized>(dest: &mut W, values: &[f64]) -> io::Result<()> {
    let bits: Vec<u64> = values.iter().map(|v| v.to_bits().to_be()).collect();
    dest.write_all(bytemuck::cast_slice(&bits))
}

/// Integer types whose native representation can be swapped to big-endian.
pub trait SwapBytes: Copy {
    fn to_be(self) -> Self;
}

macro_rules! impl_swap_bytes {
    ($($t:ty),*) => {$(
        impl SwapBytes for $t {
            #[inline]
            fn to_be(self) -> Self {
                <$t>::to_be(self)
            }
        }
    )*};
}

impl_swap_bytes!(u8, i8, i16, i32, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut out = Vec::new();
        0x0102_0304i32.put_be(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(i32::from_be_slice(&out), 0x0102_0304);

        out.clear();
        (-2.5f64).put_be(&mut out);
        assert_eq!(out, (-2.5f64).to_be_bytes());
        assert_eq!(f64::from_be_slice(&out), -2.5);
    }

    #[test]
    fn bulk_ints_are_big_endian() {
        let mut out = Vec::new();
        write_ints_be(&mut out, &[1i16, -2, 0x1234]).unwrap();
        assert_eq!(out, [0, 1, 0xFF, 0xFE, 0x12, 0x34]);
        assert_eq!(decode_be::<i16>(&out), vec![1, -2, 0x1234]);
    }

    #[test]
    fn bulk_floats_are_big_endian() {
        let mut out = Vec::new();
        write_f32s_be(&mut out, &[1.0, f32::NAN]).unwrap();
        assert_eq!(&out[..4], &[0x3F, 0x80, 0, 0]);
        let back = decode_be::<f32>(&out);
        assert_eq!(back[0], 1.0);
        assert!(back[1].is_nan());

        out.clear();
        write_f64s_be(&mut out, &[0.5, -1.0e300]).unwrap();
        assert_eq!(decode_be::<f64>(&out), vec![0.5, -1.0e300]);
    }

    #[test]
    fn decode_ignores_partial_tail() {
        assert_eq!(decode_be::<i32>(&[0, 0, 0, 7, 9]), vec![7]);
    }
}
