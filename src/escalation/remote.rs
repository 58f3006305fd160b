//! Remote fallback decoder

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ColorType, ImageEncoder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RemoteDecodeError;
use crate::models::{ChannelLayout, DecodedPayload, PixelBuffer};

/// Last-resort decoder reached over the network
#[async_trait]
pub trait RemoteDecoder: Send + Sync {
    /// `Ok(None)` when the service found no symbol
    async fn decode(
        &self,
        frame: &PixelBuffer,
    ) -> Result<Option<DecodedPayload>, RemoteDecodeError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecodeRequest {
    image_base64: String,
}

#[derive(Deserialize)]
struct DecodeReply {
    #[serde(default)]
    text: Option<String>,
}

/// Encode a frame as a `data:image/png;base64,...` URL
pub fn encode_data_url(frame: &PixelBuffer) -> Result<String, RemoteDecodeError> {
    if frame.is_empty() {
        return Err(RemoteDecodeError::Encode("frame has zero area".into()));
    }
    let color = match frame.layout() {
        ChannelLayout::Gray => ColorType::L8,
        ChannelLayout::Rgb => ColorType::Rgb8,
        ChannelLayout::Rgba => ColorType::Rgba8,
    };
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png)
        .write_image(frame.data(), frame.width() as u32, frame.height() as u32, color)
        .map_err(|err| RemoteDecodeError::Encode(err.to_string()))?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// JSON-over-HTTP remote decoder.
///
/// POSTs `{"imageBase64": <data url>}`; `200 {"text"}` is a hit, `404` a
/// miss, anything else an upstream failure.
#[derive(Debug, Clone)]
pub struct HttpRemoteDecoder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemoteDecoder {
    /// Decoder posting to `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteDecodeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Decoder sharing an existing client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RemoteDecoder for HttpRemoteDecoder {
    async fn decode(
        &self,
        frame: &PixelBuffer,
    ) -> Result<Option<DecodedPayload>, RemoteDecodeError> {
        let body = DecodeRequest {
            image_base64: encode_data_url(frame)?,
        };
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "remote decoder replied");
        match status {
            StatusCode::OK => {
                let reply: DecodeReply = response.json().await?;
                Ok(reply
                    .text
                    .filter(|text| !text.is_empty())
                    .map(DecodedPayload::new))
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(RemoteDecodeError::Upstream(other.as_u16())),
        }
    }
}
