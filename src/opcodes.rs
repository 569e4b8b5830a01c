//! JVM opcode and access-flag constants, plus instruction lengths for walking `Code`.

use anyhow::{Context, Result};

pub(crate) const ACC_SYNTHETIC: u16 = 0x1000;

#[cfg(test)]
pub(crate) const RETURN: u8 = 0xb1;
pub(crate) const TABLESWITCH: u8 = 0xaa;
pub(crate) const LOOKUPSWITCH: u8 = 0xab;
pub(crate) const INVOKEVIRTUAL: u8 = 0xb6;
pub(crate) const INVOKESPECIAL: u8 = 0xb7;
pub(crate) const INVOKESTATIC: u8 = 0xb8;
pub(crate) const INVOKEINTERFACE: u8 = 0xb9;
pub(crate) const INVOKEDYNAMIC: u8 = 0xba;
pub(crate) const WIDE: u8 = 0xc4;
pub(crate) const IINC: u8 = 0x84;

/// Length in bytes of the instruction starting at `offset`, operands included.
pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = *code
        .get(offset)
        .with_context(|| format!("instruction offset {offset} out of bounds"))?;
    let length = match opcode {
        TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_u32(code, base + 4)? as i32;
            let high = read_u32(code, base + 8)? as i32;
            let count = high
                .checked_sub(low)
                .and_then(|v| v.checked_add(1))
                .filter(|v| *v >= 0)
                .context("invalid tableswitch range")?;
            1 + padding(offset) + 12 + count as usize * 4
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let npairs = read_u32(code, base + 4)? as i32;
            if npairs < 0 {
                anyhow::bail!("invalid lookupswitch pair count {npairs}");
            }
            1 + padding(offset) + 8 + npairs as usize * 8
        }
        WIDE => {
            let widened = *code
                .get(offset + 1)
                .with_context(|| format!("truncated wide instruction at {offset}"))?;
            if widened == IINC { 6 } else { 4 }
        }
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | IINC | 0x99..=0xa8 | 0xb2..=0xb5 | INVOKEVIRTUAL
        | INVOKESPECIAL | INVOKESTATIC | 0xbb | 0xbd | 0xc0 | 0xc1 | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | 0xc8 | 0xc9 => 5,
        _ => 1,
    };
    if offset + length > code.len() {
        anyhow::bail!("truncated instruction 0x{opcode:02x} at {offset}");
    }
    Ok(length)
}

/// Alignment padding after a switch opcode.
pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

pub(crate) fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let bytes = code
        .get(offset..offset + 2)
        .with_context(|| format!("read u16 out of bounds at {offset}"))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(code: &[u8], offset: usize) -> Result<u32> {
    let bytes = code
        .get(offset..offset + 4)
        .with_context(|| format!("read u32 out of bounds at {offset}"))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_instructions() {
        assert_eq!(opcode_length(&[RETURN], 0).expect("return"), 1);
        assert_eq!(opcode_length(&[INVOKEVIRTUAL, 0, 1], 0).expect("invoke"), 3);
        assert_eq!(
            opcode_length(&[INVOKEINTERFACE, 0, 1, 1, 0], 0).expect("invokeinterface"),
            5
        );
        assert_eq!(opcode_length(&[WIDE, IINC, 0, 1, 0, 1], 0).expect("wide iinc"), 6);
        assert_eq!(opcode_length(&[WIDE, 0x15, 0, 1], 0).expect("wide iload"), 4);
    }

    #[test]
    fn tableswitch_length_includes_padding_and_jump_table() {
        // offset 0: tableswitch, 3 padding bytes, default, low=0, high=1, two targets
        let mut code = vec![TABLESWITCH, 0, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());

        assert_eq!(opcode_length(&code, 0).expect("tableswitch"), 24);
    }

    #[test]
    fn lookupswitch_length_counts_pairs() {
        // offset 1: lookupswitch, 2 padding bytes, default, npairs=1, one pair
        let mut code = vec![0x00, LOOKUPSWITCH, 0, 0];
        code.extend_from_slice(&12i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&7i32.to_be_bytes());
        code.extend_from_slice(&12i32.to_be_bytes());

        assert_eq!(opcode_length(&code, 1).expect("lookupswitch"), 19);
    }

    #[test]
    fn truncated_instruction_is_rejected() {
        assert!(opcode_length(&[INVOKESTATIC, 0], 0).is_err());
        assert!(opcode_length(&[], 0).is_err());
    }
}
