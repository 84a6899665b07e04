/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/geometry.rs

    Sector and block addressing for 5.25"/3.5" Apple disks and ProDOS-style
    hard-drive images: track/sector addresses for 5.25" media and flat block
    numbers for ProDOS, 3.5", and hard-drive volumes.
*/
use std::fmt;
use std::fmt::{Display, Formatter};

/// The standard 5.25" DOS-family geometry: 35 tracks, 16 sectors per track.
pub const STANDARD_525_TRACKS: usize = 35;
pub const STANDARD_525_SECTORS_PER_TRACK: usize = 16;

/// A track/sector address on a 5.25" disk.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ts {
    pub track: usize,
    pub sector: usize,
}

impl Ts {
    pub fn new(track: usize, sector: usize) -> Self {
        Self { track, sector }
    }

    /// Returns the address of the following sector, wrapping the track on overflow.
    /// `sectors_per_track` is the disk's native sector count (13 or 16).
    pub fn next(&self, sectors_per_track: usize) -> Ts {
        if self.sector + 1 < sectors_per_track {
            Ts::new(self.track, self.sector + 1)
        } else {
            Ts::new(self.track + 1, 0)
        }
    }

    /// Converts to a zero-based logical block address, given the disk's sector count
    /// per track. This is a plain flattening; it says nothing about file order.
    pub fn to_lba(&self, sectors_per_track: usize) -> usize {
        self.track * sectors_per_track + self.sector
    }

    pub fn from_lba(lba: usize, sectors_per_track: usize) -> Ts {
        Ts::new(lba / sectors_per_track, lba % sectors_per_track)
    }
}

impl Display for Ts {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "t{}s{}", self.track, self.sector)
    }
}

/// A flat 512-byte block address, as used by ProDOS and hard-drive images.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(pub usize);

impl Display for Block {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

/// Converts a 5.25" track/sector address (256-byte logical sectors, DOS numbering)
/// to the ProDOS block number and half that contains it. Two consecutive DOS
/// sectors pack into one 512-byte ProDOS block; see [`crate::skew`] for the
/// sector-number permutation this assumes as input.
pub fn block_from_ts(ts: Ts) -> (Block, bool) {
    let half = ts.sector % 2 == 1;
    let block_in_track = ts.sector / 2;
    (Block(ts.track * 8 + block_in_track), half)
}

/// The inverse of [`block_from_ts`]: which two DOS sector numbers a ProDOS block
/// number occupies on its track.
pub fn ts_from_block(block: Block) -> (Ts, Ts) {
    let track = block.0 / 8;
    let block_in_track = block.0 % 8;
    let lo = Ts::new(track, block_in_track * 2);
    let hi = Ts::new(track, block_in_track * 2 + 1);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_round_trips_through_lba() {
        let ts = Ts::new(12, 7);
        let lba = ts.to_lba(16);
        assert_eq!(Ts::from_lba(lba, 16), ts);
    }

    #[test]
    fn ts_next_wraps_track() {
        let ts = Ts::new(3, 15);
        assert_eq!(ts.next(16), Ts::new(4, 0));
    }

    #[test]
    fn block_from_ts_and_back() {
        let ts = Ts::new(2, 5);
        let (block, half) = block_from_ts(ts);
        assert_eq!(block, Block(18));
        assert!(half);
        let (lo, hi) = ts_from_block(block);
        assert_eq!(lo, Ts::new(2, 4));
        assert_eq!(hi, Ts::new(2, 5));
    }
}
