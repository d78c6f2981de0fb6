//! Three-phase storage upload: apply for a ticket, post the bytes,
//! commit the session. Phases are strictly sequential and there is no
//! internal retry; transport errors bubble up for the caller.

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::{json, Value};
use tracing::debug;

use dreamina_contracts::assets::{AssetRef, UploadCredential, UploadTicket};
use dreamina_contracts::config::UploadConfig;
use dreamina_contracts::errors::{UploadError, UploadPhase};

use crate::sigv4::{canonical_query, RequestSigner};

/// Transport seam for the storage gateway. The production client and
/// the test fakes both implement it.
pub trait StorageTransport {
    fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value>;
    fn post_json(&self, url: &str, headers: &[(String, String)], body: &Value) -> Result<Value>;
    fn post_bytes(&self, url: &str, headers: &[(String, String)], body: &[u8]) -> Result<Value>;
}

pub struct UploadCoordinator<'a, T: StorageTransport> {
    transport: &'a T,
    config: &'a UploadConfig,
}

impl<'a, T: StorageTransport> UploadCoordinator<'a, T> {
    pub fn new(transport: &'a T, config: &'a UploadConfig) -> Self {
        Self { transport, config }
    }

    pub fn upload(&self, credential: &UploadCredential, bytes: &[u8]) -> Result<AssetRef> {
        let ticket = self.apply(credential, bytes.len())?;
        self.put(&ticket, bytes)?;
        let uri = self.commit(credential, &ticket, bytes.len())?;

        let (format, width, height) = sniff_dimensions(bytes);
        debug!(%uri, format, width, height, "upload committed");
        Ok(AssetRef {
            uri,
            width,
            height,
            format: format.to_string(),
        })
    }

    fn apply(&self, credential: &UploadCredential, byte_len: usize) -> Result<UploadTicket> {
        let query = vec![
            ("Action".to_string(), "ApplyImageUpload".to_string()),
            ("FileSize".to_string(), byte_len.to_string()),
            ("ServiceId".to_string(), self.config.service_id.clone()),
            ("Version".to_string(), self.config.api_version.clone()),
            ("s".to_string(), upload_nonce(&mut rand::thread_rng())),
        ];
        let signer = RequestSigner::new(credential, &self.config.region, &self.config.service);
        let headers = signer.sign("GET", &query, &[], None)?;
        let url = format!("{}/?{}", self.config.endpoint, canonical_query(&query));

        let response = self.transport.get_json(&url, &headers)?;
        reject_gateway_error(UploadPhase::Apply, &response)?;

        let address = &response["Result"]["UploadAddress"];
        Ok(UploadTicket {
            upload_host: required_str(&address["UploadHosts"][0], "UploadHosts")?,
            store_uri: required_str(&address["StoreInfos"][0]["StoreUri"], "StoreUri")?,
            store_auth: required_str(&address["StoreInfos"][0]["Auth"], "Auth")?,
            session_key: required_str(&address["SessionKey"], "SessionKey")?,
        })
    }

    fn put(&self, ticket: &UploadTicket, bytes: &[u8]) -> Result<()> {
        let url = format!(
            "https://{}/upload/v1/{}",
            ticket.upload_host, ticket.store_uri
        );
        let headers = vec![
            ("Authorization".to_string(), ticket.store_auth.clone()),
            (
                "Content-Crc32".to_string(),
                format!("{:x}", crc32fast::hash(bytes)),
            ),
            (
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            ),
        ];

        let response = self.transport.post_bytes(&url, &headers, bytes)?;
        if response["code"].as_i64() != Some(2000) {
            let message = response["message"]
                .as_str()
                .unwrap_or("store rejected the bytes");
            return Err(UploadError::new(UploadPhase::Put, message).into());
        }
        Ok(())
    }

    fn commit(
        &self,
        credential: &UploadCredential,
        ticket: &UploadTicket,
        byte_len: usize,
    ) -> Result<String> {
        let query = vec![
            ("Action".to_string(), "CommitImageUpload".to_string()),
            ("FileSize".to_string(), byte_len.to_string()),
            ("ServiceId".to_string(), self.config.service_id.clone()),
            ("Version".to_string(), self.config.api_version.clone()),
        ];
        let body = json!({ "SessionKey": ticket.session_key });
        let payload = serde_json::to_vec(&body)?;
        let signer = RequestSigner::new(credential, &self.config.region, &self.config.service);
        let mut headers = signer.sign("POST", &query, &[], Some(&payload))?;
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        let url = format!("{}/?{}", self.config.endpoint, canonical_query(&query));

        let response = self.transport.post_json(&url, &headers, &body)?;
        reject_gateway_error(UploadPhase::Commit, &response)?;

        // two commit response shapes are live upstream
        response["Result"]["PluginResult"][0]["ImageUri"]
            .as_str()
            .or_else(|| response["Result"]["Results"][0]["Uri"].as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::new(UploadPhase::Commit, "commit response carried no asset uri")
                    .into()
            })
    }
}

fn reject_gateway_error(phase: UploadPhase, response: &Value) -> Result<()> {
    if let Some(message) = response["Response"]["Error"]["Message"].as_str() {
        return Err(UploadError::new(phase, message).into());
    }
    Ok(())
}

fn required_str(value: &Value, name: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("upload descriptor missing {name}"))
}

fn upload_nonce<R: Rng>(rng: &mut R) -> String {
    const POOL: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    (0..11)
        .map(|_| POOL[rng.gen_range(0..POOL.len())] as char)
        .collect()
}

/// Best-effort magic-byte sniff. Dimensions are advisory; unknown
/// bytes report as 0x0 png and the upload still proceeds.
fn sniff_dimensions(bytes: &[u8]) -> (&'static str, u32, u32) {
    if let Some((width, height)) = png_dimensions(bytes) {
        ("png", width, height)
    } else if let Some((width, height)) = jpeg_dimensions(bytes) {
        ("jpeg", width, height)
    } else if let Some((width, height)) = webp_dimensions(bytes) {
        ("webp", width, height)
    } else {
        ("png", 0, 0)
    }
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    if bytes.len() < 24 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    Some((
        u32::from_be_bytes(bytes[16..20].try_into().ok()?),
        u32::from_be_bytes(bytes[20..24].try_into().ok()?),
    ))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 2 || bytes[..2] != [0xff, 0xd8] {
        return None;
    }
    let mut offset = 2usize;
    while offset + 9 <= bytes.len() {
        if bytes[offset] != 0xff {
            return None;
        }
        let marker = bytes[offset + 1];
        // start-of-frame family, minus DHT/JPG/DAC
        if matches!(marker, 0xc0..=0xc3 | 0xc5..=0xc7 | 0xc9..=0xcb | 0xcd..=0xcf) {
            let height = u16::from_be_bytes([bytes[offset + 5], bytes[offset + 6]]);
            let width = u16::from_be_bytes([bytes[offset + 7], bytes[offset + 8]]);
            return Some((u32::from(width), u32::from(height)));
        }
        if marker == 0xd9 || marker == 0xda {
            // end of image / start of scan: no frame header found
            return None;
        }
        let length = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
        if length < 2 {
            return None;
        }
        offset += 2 + length;
    }
    None
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 30 || &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return None;
    }
    match &bytes[12..16] {
        b"VP8 " => {
            // lossy: 3-byte frame tag, sync code, then 14-bit fields
            if bytes[23..26] != [0x9d, 0x01, 0x2a] {
                return None;
            }
            let width = u16::from_le_bytes([bytes[26], bytes[27]]) & 0x3fff;
            let height = u16::from_le_bytes([bytes[28], bytes[29]]) & 0x3fff;
            Some((u32::from(width), u32::from(height)))
        }
        b"VP8L" => {
            if bytes[20] != 0x2f {
                return None;
            }
            let bits = u32::from_le_bytes([bytes[21], bytes[22], bytes[23], bytes[24]]);
            Some(((bits & 0x3fff) + 1, (bits >> 14 & 0x3fff) + 1))
        }
        _ => None,
    }
}
