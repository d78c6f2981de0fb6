//! AWS Signature Version 4 for the storage gateway. The gateway only
//! ever sees `/` as the path, so canonicalization covers method,
//! query, headers and payload hash.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use dreamina_contracts::assets::UploadCredential;
use dreamina_contracts::errors::SignError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub struct RequestSigner<'a> {
    credential: &'a UploadCredential,
    region: &'a str,
    service: &'a str,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credential: &'a UploadCredential, region: &'a str, service: &'a str) -> Self {
        Self {
            credential,
            region,
            service,
        }
    }

    /// Signs with the current clock. Returns every header to attach,
    /// `Authorization` last.
    pub fn sign(
        &self,
        method: &str,
        query: &[(String, String)],
        extra_headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<Vec<(String, String)>, SignError> {
        self.sign_at(Utc::now(), method, query, extra_headers, body)
    }

    pub fn sign_at(
        &self,
        when: DateTime<Utc>,
        method: &str,
        query: &[(String, String)],
        extra_headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<Vec<(String, String)>, SignError> {
        if self.credential.access_key_id.is_empty() {
            return Err(SignError::MissingCredential("access_key_id"));
        }
        if self.credential.secret_access_key.is_empty() {
            return Err(SignError::MissingCredential("secret_access_key"));
        }

        let amz_date = when.format("%Y%m%dT%H%M%SZ").to_string();
        let short_date = &amz_date[..8];

        let mut headers: Vec<(String, String)> =
            vec![("X-Amz-Date".to_string(), amz_date.clone())];
        if !self.credential.session_token.is_empty() {
            headers.push((
                "X-Amz-Security-Token".to_string(),
                self.credential.session_token.clone(),
            ));
        }
        let payload_hash = hex::encode(Sha256::digest(body.unwrap_or_default()));
        if body.is_some() {
            headers.push(("X-Amz-Content-Sha256".to_string(), payload_hash.clone()));
        }
        for (name, value) in extra_headers {
            headers.push(((*name).to_string(), (*value).to_string()));
        }

        let mut canonical_headers: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        canonical_headers.sort();
        let signed_names = canonical_headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let header_block: String = canonical_headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = format!(
            "{method}\n/\n{}\n{header_block}\n{signed_names}\n{payload_hash}",
            canonical_query(query),
        );
        let scope = format!(
            "{short_date}/{}/{}/aws4_request",
            self.region, self.service
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.credential.secret_access_key);
        let mut key = hmac_sha256(secret.as_bytes(), short_date.as_bytes());
        for part in [self.region, self.service, "aws4_request"] {
            key = hmac_sha256(&key, part.as_bytes());
        }
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        headers.push((
            "Authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
                self.credential.access_key_id
            ),
        ));
        Ok(headers)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(key, value)| (uri_encode(key), uri_encode(value)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use dreamina_contracts::assets::UploadCredential;
    use dreamina_contracts::errors::SignError;

    use super::{canonical_query, RequestSigner};

    fn example_credential(session_token: &str) -> UploadCredential {
        UploadCredential {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: session_token.to_string(),
        }
    }

    #[test]
    fn reproduces_the_aws_reference_signature() -> anyhow::Result<()> {
        // GET iam.amazonaws.com?Action=ListUsers&Version=2010-05-08
        // from the published signature examples
        let credential = example_credential("");
        let signer = RequestSigner::new(&credential, "us-east-1", "iam");
        let when = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let query = vec![
            ("Action".to_string(), "ListUsers".to_string()),
            ("Version".to_string(), "2010-05-08".to_string()),
        ];
        let extra = [
            ("Host", "iam.amazonaws.com"),
            (
                "Content-Type",
                "application/x-www-form-urlencoded; charset=utf-8",
            ),
        ];
        let headers = signer.sign_at(when, "GET", &query, &extra, None)?;

        let authorization = &headers.last().expect("authorization header").1;
        assert_eq!(
            authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        Ok(())
    }

    #[test]
    fn session_token_is_signed_when_present() -> anyhow::Result<()> {
        let credential = example_credential("STSTOKEN");
        let signer = RequestSigner::new(&credential, "cn-north-1", "imagex");
        let headers = signer.sign_at(
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            "GET",
            &[("Action".to_string(), "ApplyImageUpload".to_string())],
            &[],
            None,
        )?;

        assert!(headers
            .iter()
            .any(|(name, value)| name == "X-Amz-Security-Token" && value == "STSTOKEN"));
        let authorization = &headers.last().expect("authorization header").1;
        assert!(authorization.contains("SignedHeaders=x-amz-date;x-amz-security-token,"));
        Ok(())
    }

    #[test]
    fn body_hash_header_appears_only_with_a_body() -> anyhow::Result<()> {
        let credential = example_credential("");
        let signer = RequestSigner::new(&credential, "cn-north-1", "imagex");
        let without = signer.sign_at(
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            "GET",
            &[],
            &[],
            None,
        )?;
        assert!(!without
            .iter()
            .any(|(name, _)| name == "X-Amz-Content-Sha256"));

        let with = signer.sign_at(
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            "POST",
            &[],
            &[],
            Some(br#"{"SessionKey":"abc"}"#),
        )?;
        assert!(with.iter().any(|(name, _)| name == "X-Amz-Content-Sha256"));
        Ok(())
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let credential = UploadCredential {
            access_key_id: String::new(),
            secret_access_key: "secret".to_string(),
            session_token: String::new(),
        };
        let signer = RequestSigner::new(&credential, "cn-north-1", "imagex");
        let err = signer.sign("GET", &[], &[], None).unwrap_err();
        assert!(matches!(err, SignError::MissingCredential("access_key_id")));
    }

    #[test]
    fn canonical_query_sorts_and_escapes() {
        let query = vec![
            ("s".to_string(), "ab/cd".to_string()),
            ("FileSize".to_string(), "1024".to_string()),
            ("Action".to_string(), "ApplyImageUpload".to_string()),
        ];
        assert_eq!(
            canonical_query(&query),
            "Action=ApplyImageUpload&FileSize=1024&s=ab%2Fcd"
        );
    }
}
