/*
    prodigy
    https://github.com/prodigy-rs/prodigy

    --------------------------------------------------------------------------

    src/nibble/alphabet.rs

    The disk-byte alphabets for 5&3 and 6&2 GCR encoding. These
    are load-bearing test fixtures: every encoded nibble on an Apple 5.25"
    or 3.5" track is drawn from one of these two 32/64-symbol sets, and
    `find_sectors` relies on detecting a byte outside the configured
    alphabet to recognize a torn or unwritten data field.
*/
use std::sync::OnceLock;

/// The 32 disk bytes used by 5&3 GCR encoding. Index `i` encodes the 5-bit
/// value `i` (a "three").
pub const GCR53_ALPHABET: [u8; 32] = [
    0xAB, 0xAD, 0xAE, 0xAF, 0xB5, 0xB6, 0xB7, 0xBA, 0xBB, 0xBD, 0xBE, 0xBF, 0xD6, 0xD7, 0xDA, 0xDB, 0xDD, 0xDE, 0xDF,
    0xEA, 0xEB, 0xED, 0xEE, 0xEF, 0xF5, 0xF6, 0xF7, 0xFA, 0xFB, 0xFD, 0xFE, 0xFF,
];

/// The 64 disk bytes used by 6&2 GCR encoding. Index `i` encodes the 6-bit
/// value `i` (a "six").
pub const GCR62_ALPHABET: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6, 0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
    0xB7, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3, 0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC,
    0xDD, 0xDE, 0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7,
    0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

fn reverse_of(alphabet: &'static [u8]) -> [i16; 256] {
    let mut table = [-1i16; 256];
    for (value, &byte) in alphabet.iter().enumerate() {
        table[byte as usize] = value as i16;
    }
    table
}

static GCR53_REVERSE: OnceLock<[i16; 256]> = OnceLock::new();
static GCR62_REVERSE: OnceLock<[i16; 256]> = OnceLock::new();

/// Maps a disk byte back to its 5-bit "three" value, or `None` if `byte`
/// is not a member of the 5&3 alphabet.
pub fn decode_53(byte: u8) -> Option<u8> {
    let table = GCR53_REVERSE.get_or_init(|| reverse_of(&GCR53_ALPHABET));
    match table[byte as usize] {
        -1 => None,
        v => Some(v as u8),
    }
}

/// Maps a disk byte back to its 6-bit "six" value, or `None` if `byte`
/// is not a member of the 6&2 alphabet.
pub fn decode_62(byte: u8) -> Option<u8> {
    let table = GCR62_REVERSE.get_or_init(|| reverse_of(&GCR62_ALPHABET));
    match table[byte as usize] {
        -1 => None,
        v => Some(v as u8),
    }
}

/// Encodes a 5-bit value (0..32) as its 5&3 disk byte.
pub fn encode_53(value: u8) -> u8 {
    GCR53_ALPHABET[value as usize & 0x1F]
}

/// Encodes a 6-bit value (0..64) as its 6&2 disk byte.
pub fn encode_62(value: u8) -> u8 {
    GCR62_ALPHABET[value as usize & 0x3F]
}
