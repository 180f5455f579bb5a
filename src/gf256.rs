//! Arithmetic over GF(2^8), the finite field backing Reed-Solomon parity.
//!
//! Uses the primitive polynomial `x^8 + x^4 + x^3 + x^2 + 1` (0x11D),
//! the same generator used by most systematic Reed-Solomon erasure
//! coding implementations. Log/antilog tables are built once and cached
//! for the lifetime of the process.

use std::sync::OnceLock;

const PRIMITIVE_POLY: u16 = 0x11D;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    for i in 0..255usize {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE_POLY;
        }
    }
    for i in 255..512 {
        exp[i] = exp[i - 255];
    }
    Tables { exp, log }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

/// Add (equivalently, subtract) two field elements.
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiply two field elements.
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    let log_sum = t.log[a as usize] as usize + t.log[b as usize] as usize;
    t.exp[log_sum]
}

/// Divide `a` by `b` (`b` must be nonzero).
pub fn div(a: u8, b: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    assert!(b != 0, "division by zero in GF(2^8)");
    let t = tables();
    let log_diff = t.log[a as usize] as isize - t.log[b as usize] as isize + 255;
    t.exp[log_diff as usize]
}

/// Raise a field element to a non-negative power.
pub fn pow(a: u8, power: u32) -> u8 {
    if power == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let t = tables();
    let log_val = (t.log[a as usize] as usize * power as usize) % 255;
    t.exp[log_val]
}

/// Multiplicative inverse of a nonzero field element.
pub fn inv(a: u8) -> u8 {
    assert!(a != 0, "zero has no multiplicative inverse in GF(2^8)");
    let t = tables();
    t.exp[255 - t.log[a as usize] as usize]
}
