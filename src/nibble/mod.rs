/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/nibble/mod.rs

    L1' of the layered stack: encode/decode 5&3 and 6&2 GCR
    sector data with address/data headers, checksums, and on-disk framing
    for 5.25" and 3.5" floppies, and locate sectors within a raw track
    bitstream.
*/
mod alphabet;
mod bit_ring;
mod codec;
mod track;

pub use alphabet::{decode_53, decode_62, encode_53, encode_62, GCR53_ALPHABET, GCR62_ALPHABET};
pub use codec::{AddressFields, NibbleCodec, SectorEncoding, SectorFlags, SectorPointer};
pub use track::NibbleTrack;
