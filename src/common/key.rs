//! Fixed-width keys for the B+Tree.
//!
//! Every key type encodes to exactly `ENCODED_SIZE` bytes so node pages can
//! address entries by index. Ordering is the type's own `Ord`, not the byte
//! order of the encoding.

use std::fmt;

/// A key the index can store.
pub trait IndexKey: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// Bytes taken by one encoded key.
    const ENCODED_SIZE: usize;

    /// Write into `buf[..ENCODED_SIZE]`.
    fn encode(&self, buf: &mut [u8]);

    /// Read from `buf[..ENCODED_SIZE]`.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_index_key_for_int {
    ($($t:ty),*) => {
        $(
            impl IndexKey for $t {
                const ENCODED_SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn encode(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&buf[..Self::ENCODED_SIZE]);
                    <$t>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_index_key_for_int!(i32, i64, u32, u64);

/// An opaque `N`-byte key compared lexicographically.
///
/// Shorter inputs are zero-padded; longer ones are truncated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericKey<const N: usize>(pub [u8; N]);

impl<const N: usize> GenericKey<N> {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self(data)
    }

    /// Big-endian so byte order agrees with integer order.
    pub fn from_integer(v: u64) -> Self {
        let be = v.to_be_bytes();
        let mut data = [0u8; N];
        let take = N.min(8);
        data[N - take..].copy_from_slice(&be[8 - take..]);
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey(")?;
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.0);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self(data)
    }
}
