//! Geohash encoding.
//!
//! Service registration advertises the node's location as a geohash
//! string. Only encoding is needed; decoding lives with whoever consumes
//! the registry. Standard algorithm: alternate longitude/latitude interval
//! bisections, pack 5 bits per base-32 character.

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Default precision (characters) used for registration. Nine characters
/// resolve to roughly a 5m x 5m cell, matching what upstream registries
/// expect.
pub const DEFAULT_PRECISION: usize = 9;

/// Encode latitude/longitude into a geohash of `precision` characters.
///
/// Inputs outside the valid ranges are clamped to [-90, 90] / [-180, 180]
/// rather than rejected; registration coordinates come from operator
/// config and a clamped hash is more useful than a refused registration.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> String {
    let lat = latitude.clamp(-90.0, 90.0);
    let lon = longitude.clamp(-180.0, 180.0);

    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);

    let mut hash = String::with_capacity(precision);
    let mut bits: u8 = 0;
    let mut bit_count: u8 = 0;
    let mut even_bit = true; // longitude first

    while hash.len() < precision {
        if even_bit {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                bits = (bits << 1) | 1;
                lon_range.0 = mid;
            } else {
                bits <<= 1;
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                bits = (bits << 1) | 1;
                lat_range.0 = mid;
            } else {
                bits <<= 1;
                lat_range.1 = mid;
            }
        }
        even_bit = !even_bit;
        bit_count += 1;

        if bit_count == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    hash
}

/// Encode at [`DEFAULT_PRECISION`].
pub fn encode_default(latitude: f64, longitude: f64) -> String {
    encode(latitude, longitude, DEFAULT_PRECISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known vectors from the original geohash reference implementation.

    #[test]
    fn known_vector_jutland() {
        assert_eq!(encode(57.64911, 10.40744, 11), "u4pruydqqvj");
        assert_eq!(encode_default(57.64911, 10.40744), "u4pruydqq");
    }

    #[test]
    fn known_vector_taiyuan() {
        assert_eq!(encode(37.8324, 112.5584, 9), "ww8p1r4t8");
    }

    #[test]
    fn precision_is_prefix_stable() {
        let full = encode(48.8566, 2.3522, 12);
        for p in 1..12 {
            assert_eq!(encode(48.8566, 2.3522, p), full[..p]);
        }
    }

    #[test]
    fn out_of_range_clamped() {
        // Clamped poles/antimeridian still produce a stable hash.
        assert_eq!(encode(95.0, 200.0, 6), encode(90.0, 180.0, 6));
        assert_eq!(encode(-95.0, -200.0, 6), encode(-90.0, -180.0, 6));
    }

    #[test]
    fn origin() {
        // (0, 0) sits on every boundary; >= bisection picks the upper half.
        assert_eq!(encode(0.0, 0.0, 9), "s00000000");
    }
}
