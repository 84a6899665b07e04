/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/nibble/bit_ring.rs

    A ring buffer of bits backed by a BitVec, wrapping at its own length.
    Track data needs addressable circular access (prolog/epilog search can
    land anywhere and must wrap past the track's physical end), so this adds
    indexed get/set to the underlying bit storage rather than only exposing
    it through a cursor-advancing iterator.
*/
use bit_vec::BitVec;

pub struct BitRing {
    bits: BitVec,
}

impl From<BitVec> for BitRing {
    fn from(bits: BitVec) -> BitRing {
        BitRing { bits }
    }
}

impl BitRing {
    pub fn from_elem(len: usize, elem: bool) -> BitRing {
        BitRing { bits: BitVec::from_elem(len, elem) }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Reads the bit at `pos`, wrapping modulo the ring's length.
    pub fn get(&self, pos: usize) -> bool {
        self.bits[pos % self.bits.len()]
    }

    /// Writes the bit at `pos`, wrapping modulo the ring's length.
    pub fn set(&mut self, pos: usize, value: bool) {
        let len = self.bits.len();
        self.bits.set(pos % len, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_wrap_around_the_ring() {
        let mut ring = BitRing::from_elem(8, false);
        ring.set(10, true);
        assert!(ring.get(2));
        assert!(!ring.get(3));
    }
}
