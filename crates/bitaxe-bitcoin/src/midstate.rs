//! SHA-256 midstate: the compression function output after the first
//! 512-bit block of an 80-byte block header, used by the ASIC so it only
//! has to vary the second block (nonce, nTime).

use bitcoin_hashes::{sha256, HashEngine};
use std::convert::TryInto;
use std::mem::size_of;
use std::slice::Chunks;

/// Array containing a SHA256 digest / midstate.
pub type Sha256Array = [u8; 32];

/// SHA-256 midstate, kept as a distinct type so it can't be confused with a
/// plain digest even though the byte representation is the same size.
#[derive(Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Midstate(Sha256Array);

impl Midstate {
    /// Compute the midstate of the first 64 bytes of `header_bytes`.
    pub fn compute(header_bytes: &[u8]) -> Self {
        let mut engine = sha256::Hash::engine();
        engine.input(&header_bytes[..super::BLOCK_HEADER_CHUNK1_SIZE]);
        engine.midstate().into()
    }

    pub fn from_hex(s: &str) -> Result<Self, bitcoin_hashes::Error> {
        Ok(Self(bitcoin_hashes::hex::FromHex::from_hex(s)?))
    }

    /// Iterate over the midstate's words of the given integer type, read
    /// little-endian, in order.
    pub fn words<T: FromMidstateWord<T>>(&self) -> MidstateWords<T> {
        MidstateWords::new(self.as_ref())
    }
}

impl From<Sha256Array> for Midstate {
    fn from(bytes: Sha256Array) -> Self {
        Self(bytes)
    }
}

impl From<Midstate> for Sha256Array {
    fn from(midstate: Midstate) -> Self {
        midstate.0
    }
}

impl AsRef<Sha256Array> for Midstate {
    fn as_ref(&self) -> &Sha256Array {
        &self.0
    }
}

macro_rules! hex_fmt_impl(
    ($imp:ident) => (
        impl ::std::fmt::$imp for Midstate {
            fn fmt(&self, fmt: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                ::bitcoin_hashes::hex::format_hex(self.as_ref(), fmt)
            }
        }
    )
);

hex_fmt_impl!(Debug);
hex_fmt_impl!(Display);
hex_fmt_impl!(LowerHex);

/// Helper trait for reading a little-endian midstate word from a byte slice.
pub trait FromMidstateWord<T> {
    fn from_le_bytes(bytes: &[u8]) -> T;
}

macro_rules! from_midstate_word_impl (
    ($imp:ident) => (
        impl FromMidstateWord<$imp> for $imp {
            fn from_le_bytes(bytes: &[u8]) -> $imp {
                $imp::from_le_bytes(bytes.try_into().expect("slice with incorrect length"))
            }
        }
    )
);

from_midstate_word_impl!(u32);
from_midstate_word_impl!(u64);

/// Iterator over a [`Midstate`]'s words of a given integer type, returned by
/// [`Midstate::words`].
pub struct MidstateWords<'a, T: FromMidstateWord<T>> {
    chunks: Chunks<'a, u8>,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: FromMidstateWord<T>> MidstateWords<'a, T> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            chunks: bytes.chunks(size_of::<T>()),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'a, T: FromMidstateWord<T>> Iterator for MidstateWords<'a, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.chunks.next().map(T::from_le_bytes)
    }
}

impl<'a, T: FromMidstateWord<T>> DoubleEndedIterator for MidstateWords<'a, T> {
    #[inline]
    fn next_back(&mut self) -> Option<T> {
        self.chunks.next_back().map(T::from_le_bytes)
    }
}
