//! Level 5 MAT-file fixture writer
//!
//! Uncompressed double arrays only, little-endian.

use anyhow::Result;
use std::path::Path;

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;
const COMPLEX_FLAG: u32 = 0x0800;

/// Builder for a MAT v5 file
#[derive(Default)]
pub struct Mat5Writer {
    elements: Vec<u8>,
}

impl Mat5Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Real double array; `values` in MATLAB (column-major) order
    pub fn double(mut self, name: &str, dims: &[usize], values: &[f64]) -> Self {
        self.elements
            .extend(matrix_element(name, dims, values, None));
        self
    }

    /// Complex double array; parts in column-major order
    pub fn complex(mut self, name: &str, dims: &[usize], real: &[f64], imag: &[f64]) -> Self {
        self.elements
            .extend(matrix_element(name, dims, real, Some(imag)));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128 + self.elements.len());
        let mut text = b"MATLAB 5.0 MAT-file, Platform: GLNXA64, Created by: tpa-service tests".to_vec();
        text.resize(116, b' ');
        bytes.extend(text);
        bytes.extend([0u8; 8]); // subsystem data offset
        bytes.extend(0x0100u16.to_le_bytes());
        bytes.extend(b"IM");
        bytes.extend(&self.elements);
        bytes
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

fn sub_element(data_type: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len() + 7);
    out.extend(data_type.to_le_bytes());
    out.extend((data.len() as u32).to_le_bytes());
    out.extend(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

fn matrix_element(name: &str, dims: &[usize], real: &[f64], imag: Option<&[f64]>) -> Vec<u8> {
    let flags = MX_DOUBLE_CLASS | if imag.is_some() { COMPLEX_FLAG } else { 0 };
    let mut flag_bytes = flags.to_le_bytes().to_vec();
    flag_bytes.extend(0u32.to_le_bytes());

    let dim_bytes: Vec<u8> = dims
        .iter()
        .flat_map(|d| (*d as i32).to_le_bytes())
        .collect();
    let doubles = |values: &[f64]| -> Vec<u8> { values.iter().flat_map(|v| v.to_le_bytes()).collect() };

    let mut body = sub_element(MI_UINT32, &flag_bytes);
    body.extend(sub_element(MI_INT32, &dim_bytes));
    body.extend(sub_element(MI_INT8, name.as_bytes()));
    body.extend(sub_element(MI_DOUBLE, &doubles(real)));
    if let Some(imag) = imag {
        body.extend(sub_element(MI_DOUBLE, &doubles(imag)));
    }

    let mut element = MI_MATRIX.to_le_bytes().to_vec();
    element.extend((body.len() as u32).to_le_bytes());
    element.extend(body);
    element
}
