//! Vision model and image access seams.
//!
//! [`VisionService`] turns image bytes plus a prompt into analysis text.
//! [`ImageSource`] resolves a chunk's `image_ref` to bytes. Both are traits
//! so the reprocessing loop runs against mocks in tests and in-memory data
//! in embedded use.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::lexicon;

/// Why a vision call failed. Only [`VisionError::Transient`] is retried.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// Rate limiting, server errors, timeouts, and connection failures.
    #[error("transient vision error: {0}")]
    Transient(String),

    #[error("vision authentication failed: {0}")]
    Auth(String),

    /// The service refused the request as malformed or unsupported.
    #[error("vision request rejected: {0}")]
    Rejected(String),

    #[error("malformed vision response: {0}")]
    Malformed(String),

    #[error("vision service is disabled")]
    Disabled,
}

impl VisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VisionError::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VisionError::Transient(_) => "transient",
            VisionError::Auth(_) => "auth",
            VisionError::Rejected(_) => "rejected",
            VisionError::Malformed(_) => "malformed",
            VisionError::Disabled => "disabled",
        }
    }
}

#[async_trait]
pub trait VisionService: Send + Sync {
    /// Analyze one image. Each call is a single attempt; retrying is the
    /// caller's job.
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, VisionError>;
}

/// Resolves image references recorded on schematic chunks.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, image_ref: &str) -> Result<Vec<u8>>;
}

/// Images held in memory, keyed by reference.
#[derive(Default)]
pub struct InMemoryImageSource {
    images: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, image_ref: impl Into<String>, bytes: Vec<u8>) {
        self.images.write().unwrap().insert(image_ref.into(), bytes);
    }
}

#[async_trait]
impl ImageSource for InMemoryImageSource {
    async fn load(&self, image_ref: &str) -> Result<Vec<u8>> {
        self.images
            .read()
            .unwrap()
            .get(image_ref)
            .cloned()
            .ok_or_else(|| anyhow!("image not found: {}", image_ref))
    }
}

const GENERAL_PROMPT: &str = "You are analyzing a technical diagram or schematic from an electronics datasheet.

Please provide:
1. A clear description of what this diagram shows
2. Any visible component labels, pin numbers, or connections
3. Important technical details (voltage levels, bus types, pin functions)
4. Any text visible in the diagram

Be specific and technical. Focus on information useful for embedded systems development.";

/// Focus sections, each emitted when the query mentions any of its terms.
const FOCUS_SECTIONS: &[(&[&str], &str)] = &[
    (
        &["spi", "mosi", "miso", "sck"],
        "- SPI bus pins: MOSI (Master Out Slave In), MISO (Master In Slave Out), SCK (Clock), CS/SS (Chip Select)
- Identify specific pin numbers and labels
- Note any alternate functions or multiplexing",
    ),
    (
        &["i2c", "scl", "sda", "twi"],
        "- I2C/TWI bus pins: SDA (Data), SCL (Clock)
- Pull-up resistor locations
- Identify specific pin numbers and labels",
    ),
    (
        &["uart", "serial", "tx", "rx"],
        "- UART/Serial pins: TX (Transmit), RX (Receive)
- Any additional flow control pins (RTS, CTS)
- Identify specific pin numbers and labels",
    ),
    (
        &["power", "vcc", "gnd", "voltage"],
        "- Power supply pins: VCC, VDD, GND
- Voltage levels and regulators
- Current ratings if visible",
    ),
    (
        &["pin", "pinout", "gpio"],
        "- Complete pinout information
- Pin numbers, names, and functions
- Any special purpose pins (reset, enable, etc.)",
    ),
];

/// Build the prompt sent with an image.
///
/// A blank query gives the general analysis prompt. Otherwise the prompt
/// quotes the question and lists focus sections for the buses and topics
/// it mentions. A numeric `location` is treated as a page and prefixed.
pub fn build_prompt(query: &str, location: Option<&str>) -> String {
    let query = query.trim();
    let body = if query.is_empty() {
        GENERAL_PROMPT.to_string()
    } else {
        let focus = lexicon::focus_terms(query);
        let mut prompt = format!(
            "You are analyzing a technical schematic or pinout diagram.\n\nUser is asking: \"{}\"\n\nPlease focus on:\n",
            query
        );
        for (terms, section) in FOCUS_SECTIONS {
            if terms.iter().any(|t| focus.contains(t)) {
                prompt.push('\n');
                prompt.push_str(section);
            }
        }
        prompt.push_str(
            "\n\nProvide specific pin numbers, labels, and connections.\nBe precise and technical. Only state what you can clearly see in the diagram.",
        );
        prompt
    };

    match location.map(str::trim).and_then(|l| l.parse::<u32>().ok()) {
        Some(page) => format!("[Page {}] {}", page, body),
        None => body,
    }
}
