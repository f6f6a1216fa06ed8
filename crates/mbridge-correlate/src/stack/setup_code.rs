//! Onboarding payloads: 11-digit manual pairing codes and `MT:` QR payloads
//!
//! The simulated stack issues manual codes when a commissioning window opens
//! and accepts either form for code-based pairing.

use mbridge_core::{StackError, StackResult};

/// Setup information carried by an onboarding payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPayload {
    /// Upper four bits of the 12-bit discriminator
    pub short_discriminator: u8,
    pub pincode: u32,
}

impl SetupPayload {
    /// Parse a manual pairing code (dashes and spaces allowed) or an `MT:`
    /// QR payload
    pub fn parse(raw: &str) -> StackResult<Self> {
        let raw = raw.trim();
        match raw.strip_prefix("MT:") {
            Some(encoded) => decode_qr(encoded),
            None => decode_manual(raw),
        }
    }
}

// =============================================================================
// Manual pairing code
// =============================================================================

/// 11-digit manual pairing code for `discriminator` and `pincode`
pub fn encode_manual(discriminator: u16, pincode: u32) -> String {
    let short_discriminator = u32::from((discriminator >> 8) & 0x0F);
    let chunk1 = short_discriminator >> 2;
    let chunk2 = ((short_discriminator & 0x03) << 14) | (pincode & 0x3FFF);
    let chunk3 = (pincode >> 14) & 0x1FFF;
    let digits = format!("{}{:05}{:04}", chunk1, chunk2, chunk3);
    let check = verhoeff_check_digit(&digits);
    format!("{}{}", digits, check)
}

fn decode_manual(raw: &str) -> StackResult<SetupPayload> {
    let digits: String = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if digits.len() != 11 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("manual code must be 11 digits"));
    }
    if !verhoeff_valid(&digits) {
        return Err(invalid("manual code check digit mismatch"));
    }

    let field = |range: std::ops::Range<usize>| {
        digits[range]
            .parse::<u32>()
            .map_err(|_| invalid("manual code is not numeric"))
    };
    let chunk1 = field(0..1)?;
    let chunk2 = field(1..6)?;
    let chunk3 = field(6..10)?;
    if chunk1 > 3 {
        return Err(invalid("manual codes with vendor and product ids are not supported"));
    }

    let short_discriminator = ((chunk1 << 2) | ((chunk2 >> 14) & 0x03)) as u8;
    let pincode = (chunk3 << 14) | (chunk2 & 0x3FFF);
    Ok(SetupPayload {
        short_discriminator,
        pincode,
    })
}

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 7, 0, 6, 8],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const VERHOEFF_INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Run the Verhoeff checksum over ASCII digits; `offset` is 1 when the check
/// digit is not yet appended
fn verhoeff(digits: &str, offset: usize) -> u8 {
    digits
        .bytes()
        .rev()
        .enumerate()
        .fold(0, |check, (i, b)| {
            let digit = usize::from(b - b'0');
            VERHOEFF_D[usize::from(check)][usize::from(VERHOEFF_P[(i + offset) % 8][digit])]
        })
}

fn verhoeff_check_digit(digits: &str) -> u8 {
    VERHOEFF_INV[usize::from(verhoeff(digits, 1))]
}

fn verhoeff_valid(digits: &str) -> bool {
    verhoeff(digits, 0) == 0
}

// =============================================================================
// QR payload
// =============================================================================

const BASE38_ALPHABET: &[u8; 38] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.";

/// Packed QR payload length: version, vendor, product, flow, rendezvous,
/// discriminator, pincode and padding bits
const QR_PAYLOAD_BYTES: usize = 11;

fn decode_qr(encoded: &str) -> StackResult<SetupPayload> {
    let bytes = base38_decode(encoded)?;
    if bytes.len() < QR_PAYLOAD_BYTES {
        return Err(invalid("QR payload too short"));
    }

    let mut reader = BitReader::new(&bytes);
    let version = reader.take(3);
    if version != 0 {
        return Err(invalid("unsupported QR payload version"));
    }
    let _vendor_id = reader.take(16);
    let _product_id = reader.take(16);
    let _flow = reader.take(2);
    let _rendezvous = reader.take(8);
    let discriminator = reader.take(12);
    let pincode = reader.take(27);

    Ok(SetupPayload {
        short_discriminator: ((discriminator >> 8) & 0x0F) as u8,
        pincode: pincode as u32,
    })
}

fn base38_decode(encoded: &str) -> StackResult<Vec<u8>> {
    let chars = encoded.as_bytes();
    let mut out = Vec::with_capacity(chars.len() * 3 / 5 + 1);
    for chunk in chars.chunks(5) {
        let byte_count = match chunk.len() {
            5 => 3,
            4 => 2,
            2 => 1,
            _ => return Err(invalid("QR payload has a truncated base38 chunk")),
        };
        let mut value: u32 = 0;
        for c in chunk.iter().rev() {
            let digit = BASE38_ALPHABET
                .iter()
                .position(|a| a == c)
                .ok_or_else(|| invalid("QR payload contains a non-base38 character"))?;
            value = value * 38 + digit as u32;
        }
        for _ in 0..byte_count {
            out.push((value & 0xFF) as u8);
            value >>= 8;
        }
    }
    Ok(out)
}

/// Little-endian bit reader over the packed payload
struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, bits: usize) -> u64 {
        let mut value = 0u64;
        for i in 0..bits {
            let index = self.position + i;
            let bit = self
                .bytes
                .get(index / 8)
                .map(|byte| (byte >> (index % 8)) & 1)
                .unwrap_or(0);
            value |= u64::from(bit) << i;
        }
        self.position += bits;
        value
    }
}

fn invalid(message: &str) -> StackError {
    StackError::InvalidArgument(format!("setup payload: {}", message))
}
