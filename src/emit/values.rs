//! Element packing and C++ literal formatting.

use crate::scan::ElementType;

/// Literals for one array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedValues {
    pub values: Vec<String>,
    /// A value needs `std::numeric_limits`.
    pub needs_limits: bool,
}

/// Pack `bytes` big-endian into elements of `ty` and format each as a literal.
pub fn render_values(bytes: &[u8], ty: ElementType) -> RenderedValues {
    let width = ty.width();
    let mut needs_limits = false;
    let values = bytes
        .chunks(width)
        .map(|chunk| {
            let mut bits = 0u64;
            for i in 0..width {
                bits = (bits << 8) | chunk.get(i).copied().unwrap_or(0) as u64;
            }
            let (text, limits) = literal(bits, ty);
            needs_limits |= limits;
            text
        })
        .collect();
    RenderedValues {
        values,
        needs_limits,
    }
}

fn literal(bits: u64, ty: ElementType) -> (String, bool) {
    let digits = ty.width() * 2;
    match ty {
        ElementType::Bool => ((if bits != 0 { "true" } else { "false" }).to_string(), false),
        ElementType::Char => (format!("'\\x{:02X}'", bits), false),
        ElementType::Float => float_literal(f32::from_bits(bits as u32) as f64, "float", "f"),
        ElementType::Double => float_literal(f64::from_bits(bits), "double", ""),
        _ if ty.is_signed() => (signed_literal(bits, ty.width()), false),
        _ => (format!("0x{:0width$X}", bits, width = digits), false),
    }
}

fn signed_literal(bits: u64, width: usize) -> String {
    let shift = 64 - width as u32 * 8;
    let value = ((bits << shift) as i64) >> shift;
    let digits = width * 2;
    let min = i64::MIN >> shift;
    if value == min {
        // The positive literal of the minimum does not fit the signed type.
        return format!("(-0x{:0width$X} - 1)", (value + 1).unsigned_abs(), width = digits);
    }
    if value < 0 {
        format!("-0x{:0width$X}", value.unsigned_abs(), width = digits)
    } else {
        format!("0x{:0width$X}", value, width = digits)
    }
}

fn float_literal(value: f64, type_name: &str, suffix: &str) -> (String, bool) {
    if value.is_nan() {
        (format!("std::numeric_limits<{}>::quiet_NaN()", type_name), true)
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        (format!("{}std::numeric_limits<{}>::infinity()", sign, type_name), true)
    } else if suffix.is_empty() {
        (format!("{:?}", value), false)
    } else {
        (format!("{:?}{}", value as f32, suffix), false)
    }
}
