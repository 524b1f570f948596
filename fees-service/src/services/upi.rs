use anyhow::Result;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use std::io::Cursor;

use crate::config::UpiConfig;

/// Builds the UPI rail for an intent: the deep link a UPI app understands
/// and a scannable QR image of it.
#[derive(Clone)]
pub struct UpiService {
    config: UpiConfig,
}

impl UpiService {
    pub fn new(config: UpiConfig) -> Self {
        Self { config }
    }

    /// UPI intent format: `upi://pay?pa=...&pn=...&am=...&cu=INR&tn=...&tr=...`
    /// with `tr` carrying our intent id so app payments stay reconcilable.
    pub fn payment_link(&self, amount: i64, description: &str, reference: &str) -> String {
        format!(
            "upi://pay?pa={}&pn={}&am={:.2}&cu=INR&tn={}&tr={}",
            self.config.vpa,
            urlencoding::encode(&self.config.merchant_name),
            amount as f64,
            urlencoding::encode(description),
            reference
        )
    }

    pub fn qr_png_base64(&self, upi_link: &str) -> Result<String> {
        let code = QrCode::new(upi_link)?;
        let image = code.render::<Luma<u8>>().build();

        let dynamic_image = DynamicImage::ImageLuma8(image);
        let mut buffer = Cursor::new(Vec::new());
        dynamic_image.write_to(&mut buffer, image::ImageOutputFormat::Png)?;

        Ok(general_purpose::STANDARD.encode(buffer.get_ref()))
    }
}
