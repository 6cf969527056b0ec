//! QR code images fetched from a rendering service, optionally stamped with a caption.

use crate::helpers::{ApiError, bad_gateway_error, checkin_error, internal_error, unsupported_media_type_error};
use crate::state::AppState;
use ab_glyph::{FontArc, PxScale};
use checkin_common::qr::{DEFAULT_WATERMARK_COLOR, QrRequest, parse_hex_color, watermark_layout};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::filter::gaussian_blur_f32;
use rocket::State;
use rocket::form::Form;
use rocket::http::{ContentType, Header};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::{Json, Value};
use std::collections::HashMap;
use std::io::Cursor;

const FAILURE: &str = "Unexpected error.";
/// 35% black.
const SHADOW_ALPHA: u8 = 89;
const SHADOW_OFFSET_Y: i32 = 1;
const SHADOW_BLUR_SIGMA: f32 = 1.0;

/// A PNG that must not be cached.
pub struct QrPng(pub Vec<u8>);

impl<'r> Responder<'r, 'static> for QrPng {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::PNG)
            .header(Header::new("Cache-Control", "no-store"))
            .sized_body(self.0.len(), Cursor::new(self.0))
            .ok()
    }
}

type QrResult = Result<QrPng, ApiError>;

/// Draw `text` centred horizontally around `center_y`, over a soft shadow.
pub fn stamp_watermark(image: &mut RgbaImage, text: &str, color: [u8; 3], font: &FontArc) {
    let side = image.width().min(image.height());
    let layout = watermark_layout(side);
    let scale = PxScale::from(layout.font_size as f32);
    let (text_w, text_h) = text_size(scale, font, text);

    let x = (i64::from(image.width()) - i64::from(text_w)) / 2;
    let y = i64::from(layout.center_y) - i64::from(text_h) / 2;
    let (x, y) = (x as i32, y as i32);

    let (width, height) = image.dimensions();
    let mut shadow = RgbaImage::new(width, height);
    draw_text_mut(
        &mut shadow,
        Rgba([0, 0, 0, SHADOW_ALPHA]),
        x,
        y + SHADOW_OFFSET_Y,
        scale,
        font,
        text,
    );
    let shadow = gaussian_blur_f32(&shadow, SHADOW_BLUR_SIGMA);
    imageops::overlay(image, &shadow, 0, 0);

    let mut caption = RgbaImage::new(width, height);
    let [r, g, b] = color;
    draw_text_mut(&mut caption, Rgba([r, g, b, 255]), x, y, scale, font, text);
    imageops::overlay(image, &caption, 0, 0);
}

/// Decode what the rendering service sent, apply the watermark and re-encode as PNG.
pub fn render_png(upstream: &[u8], request: &QrRequest, font: Option<&FontArc>) -> Result<Vec<u8>, String> {
    let decoded =
        image::load_from_memory(upstream).map_err(|e| format!("unreadable image: {e}"))?;

    let image = match (&request.watermark, font) {
        (Some(text), Some(font)) => {
            let color = parse_hex_color(&request.watermark_color)
                .or_else(|| parse_hex_color(DEFAULT_WATERMARK_COLOR))
                .unwrap_or([255, 0, 0]);
            let mut canvas = decoded.into_rgba8();
            stamp_watermark(&mut canvas, text, color, font);
            DynamicImage::ImageRgba8(canvas)
        }
        (Some(_), None) => {
            tracing::warn!("Watermark requested but no font is loaded, serving plain QR code");
            decoded
        }
        (None, _) => decoded,
    };

    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(out)
}

async fn proxy<'a, I>(state: &AppState, raw: I) -> QrResult
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let request = QrRequest::from_params(raw).map_err(|e| checkin_error(e, FAILURE))?;

    let response = state
        .http
        .get(&state.config.qr_upstream_url)
        .query(&request.params)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "QR upstream request failed");
            bad_gateway_error(format!("Upstream error: {e}"))
        })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::error!(%status, "QR upstream returned an error");
        return Err(bad_gateway_error(format!(
            "Upstream error ({}): {text}",
            status.as_u16()
        )));
    }

    let bytes = response.bytes().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read QR upstream body");
        bad_gateway_error(format!("Upstream error: {e}"))
    })?;

    let font = state.watermark_font.clone();
    let png = rocket::tokio::task::spawn_blocking(move || render_png(&bytes, &request, font.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "QR render task failed");
            internal_error(FAILURE)
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to render QR code");
            bad_gateway_error(format!("Upstream error: {e}"))
        })?;

    Ok(QrPng(png))
}

fn pairs(map: &HashMap<String, String>) -> impl Iterator<Item = (&str, &str)> {
    map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
}

#[get("/qrcode?<params..>")]
pub async fn qrcode_get(params: HashMap<String, String>, state: &State<AppState>) -> QrResult {
    proxy(state, pairs(&params)).await
}

/// JSON bodies: string values only, anything else is ignored.
#[post("/qrcode", format = "json", data = "<body>")]
pub async fn qrcode_post_json(body: Json<HashMap<String, Value>>, state: &State<AppState>) -> QrResult {
    let strings = body
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)));
    proxy(state, strings).await
}

#[post("/qrcode", format = "form", data = "<form>", rank = 2)]
pub async fn qrcode_post_form(form: Form<HashMap<String, String>>, state: &State<AppState>) -> QrResult {
    proxy(state, pairs(&form)).await
}

#[post("/qrcode", format = "multipart/form-data", data = "<form>", rank = 3)]
pub async fn qrcode_post_multipart(
    form: Form<HashMap<String, String>>,
    state: &State<AppState>,
) -> QrResult {
    proxy(state, pairs(&form)).await
}

#[post("/qrcode", rank = 4)]
pub fn qrcode_post_unsupported() -> ApiError {
    unsupported_media_type_error("Unsupported Content-Type for POST.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_png(side: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(side, side, Rgba([255, 255, 255, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test_log::test]
    fn test_render_reencodes_png() {
        let request = QrRequest::from_params([("data", "x"), ("size", "64")]).unwrap();
        let png = render_png(&white_png(64), &request, None).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test_log::test]
    fn test_watermark_without_font_serves_plain_image() {
        let request = QrRequest::from_params([("data", "x"), ("wm", "VIP")]).unwrap();
        let png = render_png(&white_png(32), &request, None).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().into_rgba8();
        assert!(decoded.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    /// A TrueType font for drawing tests: `CHECKIN_TEST_FONT`, else a common system font.
    fn test_font() -> Option<FontArc> {
        let candidates = std::env::var("CHECKIN_TEST_FONT").into_iter().chain(
            [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
                "/usr/share/fonts/TTF/DejaVuSans.ttf",
                "/usr/share/fonts/dejavu/DejaVuSans.ttf",
                "/System/Library/Fonts/Supplemental/Arial.ttf",
            ]
            .map(String::from),
        );
        candidates
            .filter_map(|path| std::fs::read(path).ok())
            .find_map(|bytes| FontArc::try_from_vec(bytes).ok())
    }

    fn is_red(p: &Rgba<u8>) -> bool {
        p[0] > 200 && p[1] < 80 && p[2] < 80
    }

    #[test_log::test]
    fn test_stamp_draws_caption_near_bottom() {
        let Some(font) = test_font() else {
            tracing::warn!("No font available, skipping caption drawing test");
            return;
        };
        let white = Rgba([255, 255, 255, 255]);
        let mut image = RgbaImage::from_pixel(300, 300, white);
        stamp_watermark(&mut image, "VIP", [255, 0, 0], &font);

        let layout = watermark_layout(300);
        let band = layout.center_y - layout.font_size..300;
        let (inside, outside): (Vec<_>, Vec<_>) = image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != white)
            .partition(|(_, y, _)| band.contains(y));

        assert!(outside.is_empty(), "{} pixels drawn outside the caption band", outside.len());
        assert!(inside.iter().any(|(_, _, p)| is_red(p)));
        // shadow pixels are darker than the caption and not red
        assert!(inside.iter().any(|(_, _, p)| !is_red(p) && p[0] < 255));

        // centred horizontally
        let xs = inside.iter().map(|(x, _, _)| *x);
        let (left, right) = (xs.clone().min().unwrap(), xs.max().unwrap());
        assert!(left.abs_diff(300 - right) <= 8, "caption spans {left}..{right}");
    }

    #[test_log::test]
    fn test_render_applies_requested_color() {
        let Some(font) = test_font() else {
            tracing::warn!("No font available, skipping caption color test");
            return;
        };
        let request =
            QrRequest::from_params([("data", "x"), ("wm", "GUEST"), ("wmcolor", "#0000ff")]).unwrap();
        let png = render_png(&white_png(200), &request, Some(&font)).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().into_rgba8();
        assert!(decoded.pixels().any(|p| p[2] > 200 && p[0] < 80 && p[1] < 80));
        assert!(!decoded.pixels().any(is_red));
    }

    #[test_log::test]
    fn test_garbage_upstream_body_is_rejected() {
        let request = QrRequest::from_params([("data", "x")]).unwrap();
        assert!(render_png(b"<html>oops</html>", &request, None).is_err());
    }
}
