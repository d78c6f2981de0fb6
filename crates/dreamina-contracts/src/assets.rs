use serde::{Deserialize, Serialize};

/// Committed upload, ready to be referenced from a generation payload.
/// Dimensions come from header sniffing and are advisory: 0x0 when the bytes
/// could not be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Short-lived STS credential for the object-storage endpoint. Fetched fresh
/// for every upload invocation and never cached.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Presigned-upload descriptor returned by the apply phase; consumed by the
/// put and commit phases of the same upload.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub upload_host: String,
    pub store_uri: String,
    pub store_auth: String,
    pub session_key: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::UploadCredential;

    #[test]
    fn credential_deserializes_from_token_payload() -> anyhow::Result<()> {
        let data = json!({
            "access_key_id": "AKTP0example",
            "secret_access_key": "c2VjcmV0",
            "session_token": "STS2example",
        });
        let credential: UploadCredential = serde_json::from_value(data)?;
        assert_eq!(credential.access_key_id, "AKTP0example");
        assert_eq!(credential.session_token, "STS2example");
        Ok(())
    }
}
