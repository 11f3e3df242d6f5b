//! Byte-order-preserving sort-key encoding.
//!
//! Index entries are ordered by raw byte comparison of their encoded
//! sort-keys, so the encoding must satisfy: for any two values `a < b`
//! of the same type, `encode(a) < encode(b)` byte-wise.
//!
//! The scheme per type:
//!
//! - unsigned integers: big-endian, full width
//! - signed integers: sign bit flipped, then big-endian (two's complement
//!   order becomes unsigned order)
//! - floats: positive values flip the sign bit, negative values flip all
//!   bits (IEEE-754 totally ordered; a positive NaN sorts above +inf and
//!   a negative NaN below -inf)
//! - strings and byte slices: raw bytes
//! - `()`: empty, which roots a scan at the start of the bucket
//!
//! Composite keys are built by the index layer, which length-prefixes
//! the encoded key, so this module never needs terminators.

use byteorder::{BigEndian, WriteBytesExt};

/// A value usable as an index sort-key.
pub trait SortKey {
    /// Append the order-preserving encoding of `self` to `buf`.
    fn write(&self, buf: &mut Vec<u8>);

    /// Encode into a fresh buffer.
    fn encoded(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }
}

impl SortKey for () {
    fn write(&self, _buf: &mut Vec<u8>) {}
}

impl SortKey for bool {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }
}

macro_rules! sortkey_unsigned {
    ($($t:ty => $w:ident),*) => {$(
        impl SortKey for $t {
            fn write(&self, buf: &mut Vec<u8>) {
                buf.$w::<BigEndian>(*self).expect("write to Vec cannot fail");
            }
        }
    )*};
}

sortkey_unsigned!(u16 => write_u16, u32 => write_u32, u64 => write_u64);

impl SortKey for u8 {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl SortKey for usize {
    fn write(&self, buf: &mut Vec<u8>) {
        (*self as u64).write(buf);
    }
}

macro_rules! sortkey_signed {
    ($($t:ty => ($u:ty, $flip:expr)),*) => {$(
        impl SortKey for $t {
            fn write(&self, buf: &mut Vec<u8>) {
                // flipping the sign bit maps two's complement order
                // onto unsigned byte order
                let bits = (*self as $u) ^ $flip;
                bits.write(buf);
            }
        }
    )*};
}

sortkey_signed!(
    i8 => (u8, 0x80),
    i16 => (u16, 0x8000),
    i32 => (u32, 0x8000_0000),
    i64 => (u64, 0x8000_0000_0000_0000)
);

impl SortKey for isize {
    fn write(&self, buf: &mut Vec<u8>) {
        (*self as i64).write(buf);
    }
}

impl SortKey for f32 {
    fn write(&self, buf: &mut Vec<u8>) {
        let bits = self.to_bits();
        let ordered = if bits & 0x8000_0000 == 0 {
            bits ^ 0x8000_0000
        } else {
            !bits
        };
        ordered.write(buf);
    }
}

impl SortKey for f64 {
    fn write(&self, buf: &mut Vec<u8>) {
        let bits = self.to_bits();
        let ordered = if bits & 0x8000_0000_0000_0000 == 0 {
            bits ^ 0x8000_0000_0000_0000
        } else {
            !bits
        };
        ordered.write(buf);
    }
}

impl SortKey for str {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl SortKey for &str {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl SortKey for String {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl SortKey for [u8] {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl SortKey for &[u8] {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl SortKey for Vec<u8> {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}
