//! EIF: Echo's packed 29-byte driver instrument format. Every operator
//! field is bit-packed two-to-a-byte; detune is stored in the YM2612's
//! biased `0..=7` encoding rather than TFI's linear `0..=6`, so it goes
//! through a lookup table at this boundary instead of a range check.

use super::{FmInstrument, Operator, NUM_OPERATORS};
use crate::error::LibResult;

const EIF_SIZE: usize = 29;

/// EIF's raw YM2612 detune code, indexed by TFI's linear `0..=6` value.
const DETUNE_TO_EIF: [u8; 7] = [0x07, 0x06, 0x05, 0x00, 0x01, 0x02, 0x03];

/// TFI's linear detune value, indexed by EIF's raw YM2612 `0..=7` code.
const DETUNE_FROM_EIF: [u8; 8] = [3, 4, 5, 6, 3, 2, 1, 0];

/// Parses a 29-byte EIF instrument, validating every packed field's
/// reserved bits the way the driver's loader does.
pub fn parse(data: &[u8]) -> LibResult<FmInstrument> {
    if data.len() != EIF_SIZE {
        malformed!(
            "EIF instrument is {} bytes, expected exactly {}",
            data.len(),
            EIF_SIZE
        );
    }
    if data[0] & 0xC0 != 0 {
        malformed!("EIF algorithm/feedback byte has reserved bits set");
    }

    let mut instr = FmInstrument {
        algorithm: data[0] & 0x07,
        feedback: data[0] >> 3,
        operators: [Operator::default(); NUM_OPERATORS],
    };

    for i in 0..NUM_OPERATORS {
        let mul_dt = data[0x01 + i];
        let tl = data[0x05 + i];
        let rs_ar = data[0x09 + i];
        let dr = data[0x0D + i];
        let sr = data[0x11 + i];
        let rr_sl = data[0x15 + i];
        let ssg = data[0x19 + i];

        if mul_dt & 0x80 != 0 {
            malformed!("EIF operator {} mul/dt byte has reserved bits set", i);
        }
        if tl & 0x80 != 0 {
            malformed!("EIF operator {} total level byte has reserved bits set", i);
        }
        if rs_ar & 0x20 != 0 {
            malformed!("EIF operator {} rate-scaling/attack byte has reserved bits set", i);
        }
        if dr & 0xE0 != 0 {
            malformed!("EIF operator {} decay rate byte has reserved bits set", i);
        }
        if sr & 0xE0 != 0 {
            malformed!("EIF operator {} sustain rate byte has reserved bits set", i);
        }
        if ssg & 0xF0 != 0 {
            malformed!("EIF operator {} SSG-EG byte has reserved bits set", i);
        }

        let op = &mut instr.operators[i];
        op.mul = mul_dt & 0x0F;
        op.dt = DETUNE_FROM_EIF[(mul_dt >> 4 & 0x07) as usize];
        op.tl = tl & 0x7F;
        op.rs = rs_ar >> 6;
        op.ar = rs_ar & 0x1F;
        op.dr = dr & 0x1F;
        op.sr = sr & 0x1F;
        op.rr = rr_sl & 0x0F;
        op.sl = rr_sl >> 4;
        op.ssg_eg = ssg & 0x0F;
    }

    Ok(instr)
}

/// Serializes an instrument into EIF's packed 29-byte form. `dt` must
/// be in `0..=6`, TFI's linear detune space.
pub fn write(instr: &FmInstrument) -> LibResult<Vec<u8>> {
    let mut out = vec![0u8; EIF_SIZE];
    out[0] = instr.algorithm | instr.feedback << 3;

    for i in 0..NUM_OPERATORS {
        let op = &instr.operators[i];
        if op.dt as usize >= DETUNE_TO_EIF.len() {
            range_violation!("detune", "0..=6", op.dt);
        }
        out[0x01 + i] = op.mul | DETUNE_TO_EIF[op.dt as usize] << 4;
        out[0x05 + i] = op.tl;
        out[0x09 + i] = op.ar | op.rs << 6;
        out[0x0D + i] = op.dr;
        out[0x11 + i] = op.sr;
        out[0x15 + i] = op.rr | op.sl << 4;
        out[0x19 + i] = op.ssg_eg;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::tfi;

    fn sample_bytes() -> Vec<u8> {
        let mut bytes = vec![0x04 | 0x05 << 3];
        for _ in 0..4 {
            bytes.push(0x01 | 0x00 << 4); // mul=1, raw detune 0 -> linear 3
        }
        for _ in 0..4 {
            bytes.push(0x20);
        }
        for _ in 0..4 {
            bytes.push(0x1F);
        }
        for _ in 0..4 {
            bytes.push(0x10);
        }
        for _ in 0..4 {
            bytes.push(0x08);
        }
        for _ in 0..4 {
            bytes.push(0x04 | 0x02 << 4);
        }
        for _ in 0..4 {
            bytes.push(0x00);
        }
        bytes
    }

    #[test]
    fn parses_a_well_formed_instrument() {
        let instr = parse(&sample_bytes()).unwrap();
        assert_eq!(instr.algorithm, 4);
        assert_eq!(instr.feedback, 5);
        assert_eq!(instr.operators[0].mul, 1);
        assert_eq!(instr.operators[0].dt, 3); // raw 0 maps to linear 3
    }

    #[test]
    fn round_trips_through_write() {
        let original = sample_bytes();
        let instr = parse(&original).unwrap();
        assert_eq!(write(&instr).unwrap(), original);
    }

    #[test]
    fn reserved_bit_is_rejected() {
        let mut bytes = sample_bytes();
        bytes[0] |= 0x80;
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn detune_table_is_its_own_inverse_over_the_shared_range() {
        for linear in 0..=6u8 {
            let raw = DETUNE_TO_EIF[linear as usize];
            assert_eq!(DETUNE_FROM_EIF[raw as usize], linear);
        }
    }

    #[test]
    fn tfi_instrument_round_trips_through_eif() {
        let tfi_bytes = {
            let mut bytes = vec![0x02, 0x03];
            for _ in 0..4 {
                bytes.extend_from_slice(&[0x05, 0x04, 0x10, 0x01, 0x1F, 0x10, 0x08, 0x04, 0x02, 0x00]);
            }
            bytes
        };
        let instr = tfi::parse(&tfi_bytes).unwrap();
        let eif_bytes = write(&instr).unwrap();
        let round_tripped = parse(&eif_bytes).unwrap();
        assert_eq!(round_tripped, instr);
    }
}
