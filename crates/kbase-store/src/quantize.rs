//! u8 embedding quantization.
//!
//! `[min, max]` maps linearly onto `[0, 255]`; a value is restored as
//! `byte * scale + offset`.

use ndarray::Array1;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedVector {
    pub bytes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
}

impl QuantizedVector {
    pub fn quantize(values: &[f32]) -> Self {
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        if values.is_empty() || max - min < 1e-9 {
            return Self {
                bytes: vec![0; values.len()],
                scale: 0.0,
                offset: if values.is_empty() { 0.0 } else { min },
            };
        }

        let scale = (max - min) / 255.0;
        let bytes = values
            .iter()
            .map(|&v| ((v - min) / scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Self {
            bytes,
            scale,
            offset: min,
        }
    }

    pub fn dequantize(&self) -> Array1<f32> {
        self.bytes
            .iter()
            .map(|&b| b as f32 * self.scale + self.offset)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
