//! Parameter rules for the QR image proxy.
//!
//! The proxy forwards a whitelisted subset of parameters to a QR rendering
//! service and may stamp a text watermark on the result. This module holds
//! the parts that do not touch the network or pixels.

use crate::error::{CheckinError, Result};
use std::collections::BTreeMap;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";
pub const DEFAULT_SIZE: u32 = 300;
pub const DEFAULT_MARGIN: &str = "30";
pub const DEFAULT_WATERMARK_COLOR: &str = "FF0000";

/// Parameters accepted from callers. Anything else is dropped.
pub const ALLOWED_PARAMS: [&str; 12] = [
    "data",
    "size",
    "charset-source",
    "charset-target",
    "ecc",
    "color",
    "bgcolor",
    "margin",
    "qzone",
    "format",
    "wm",
    "wmcolor",
];

const COLOR_PARAMS: [&str; 3] = ["color", "bgcolor", "wmcolor"];

/// Drop a leading `#` and upper-case a hex colour.
pub fn strip_hash(value: &str) -> String {
    value.strip_prefix('#').unwrap_or(value).to_uppercase()
}

/// Accept `N` or `NxN`; anything else is not a square size.
pub fn parse_square_size(size: &str) -> Option<u32> {
    let size = size.trim();
    let side = match size.split_once(['x', 'X']) {
        Some((w, h)) if w == h => w,
        Some(_) => return None,
        None => size,
    };
    if side.is_empty() || !side.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    side.parse::<u32>().ok().filter(|s| *s > 0)
}

/// A validated QR request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    /// Parameters forwarded upstream, in a stable order.
    pub params: BTreeMap<String, String>,
    /// Side length in pixels.
    pub side: u32,
    pub watermark: Option<String>,
    pub watermark_color: String,
}

impl QrRequest {
    /// Validate raw caller parameters.
    pub fn from_params<'a, I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let raw: BTreeMap<&str, &str> = raw
            .into_iter()
            .filter(|(k, _)| ALLOWED_PARAMS.contains(k))
            .collect();

        let data = raw
            .get("data")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CheckinError::MissingField("`data` query param".to_string()))?;

        let side = match raw.get("size").filter(|s| !s.is_empty()) {
            None => DEFAULT_SIZE,
            Some(size) => parse_square_size(size).ok_or_else(|| {
                CheckinError::Invalid(
                    "`size` must be square like 300x300 (or a single integer).".to_string(),
                )
            })?,
        };

        let mut params = BTreeMap::new();
        params.insert("data".to_string(), data.to_string());
        params.insert("size".to_string(), format!("{side}x{side}"));
        params.insert("margin".to_string(), DEFAULT_MARGIN.to_string());

        for (key, value) in &raw {
            match *key {
                "data" | "size" | "wm" => {}
                "margin" if value.is_empty() => {}
                k if COLOR_PARAMS.contains(&k) => {
                    params.insert(k.to_string(), strip_hash(value));
                }
                k => {
                    params.insert(k.to_string(), value.to_string());
                }
            }
        }

        let watermark = raw
            .get("wm")
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        let watermark_color = params
            .get("wmcolor")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WATERMARK_COLOR.to_string());

        Ok(Self {
            params,
            side,
            watermark,
            watermark_color,
        })
    }
}

/// Where and how large to draw the watermark on a square image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkLayout {
    pub font_size: u32,
    /// Vertical centre of the text line.
    pub center_y: u32,
}

pub fn watermark_layout(side: u32) -> WatermarkLayout {
    let side_f = f64::from(side);
    let font_size = ((side_f * 0.08).round() as u32).max(12);
    let bottom_gap = ((side_f * 0.04).round() as u32).max(8);
    WatermarkLayout {
        font_size,
        center_y: side.saturating_sub(bottom_gap),
    }
}

/// Parse `RRGGBB` (optionally `#`-prefixed) into components.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = strip_hash(value.trim());
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
