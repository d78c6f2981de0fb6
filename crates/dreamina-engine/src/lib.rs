//! Client engine for a remote media-generation service: fingerprint token
//! primitives, SigV4 request signing, the object-store upload protocol, the
//! job poll loop, and the HTTP session layer tying them together.
//!
//! The service speaks JSON behind a browser-shaped session. Every mutating
//! call carries a fresh `msToken` and an `a_bogus` fingerprint token computed
//! over the serialized query; uploads run through a separately signed
//! object-storage endpoint.

pub mod fingerprint;
pub mod poll;
pub mod sigv4;
pub mod upload;

pub use dreamina_contracts as contracts;

use std::env;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use dreamina_contracts::assets::{AssetRef, UploadCredential};
use dreamina_contracts::config::{ClientConfig, PollTuning, UploadConfig};
use dreamina_contracts::credit::CreditBalance;
use dreamina_contracts::errors::{JobError, SignError};
use dreamina_contracts::jobs::{JobRequest, Submission, SubmitMode};

use crate::poll::{JobBackend, JobPoller};
use crate::upload::{StorageTransport, UploadCoordinator};

const SESSION_TOKEN_VARS: [&str; 2] = ["DREAMINA_SESSION_TOKEN", "JIMENG_API_TOKEN"];

// Fixed browser headers; identity fields (appid, appvr, user agent, cookie,
// origin, referer) are filled in per client.
const BROWSER_HEADERS: [(&str, &str); 13] = [
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "zh-CN,zh;q=0.9"),
    ("cache-control", "no-cache"),
    ("last-event-id", "undefined"),
    ("pragma", "no-cache"),
    ("priority", "u=1, i"),
    ("pf", "7"),
    (
        "sec-ch-ua",
        "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
];

// The trailing '=' pads the table to 64 and is never sampled.
const MS_TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIGKLMNOPQRSTUVWXYZabcdefghigklmnopqrstuvwxyz0123456789=";

/// Blocking client for the generation service. Interior state is immutable
/// after construction, so one instance may serve several threads.
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    upload_config: UploadConfig,
    tuning: PollTuning,
    session_token: String,
    web_id: u64,
    user_id: String,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_tuning(config, PollTuning::default(), UploadConfig::default())
    }

    pub fn with_tuning(
        config: ClientConfig,
        tuning: PollTuning,
        upload_config: UploadConfig,
    ) -> Result<Self> {
        let session_token = config
            .session_token
            .clone()
            .or_else(|| {
                SESSION_TOKEN_VARS
                    .iter()
                    .find_map(|name| env::var(name).ok())
            })
            .filter(|token| !token.is_empty())
            .with_context(|| {
                format!(
                    "no session token: set ClientConfig::session_token or one of {}",
                    SESSION_TOKEN_VARS.join(", ")
                )
            })?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("building the http client")?;
        let mut rng = rand::thread_rng();
        Ok(Self {
            http,
            web_id: rng.gen_range(7_000_000_000_000_000_000..8_000_000_000_000_000_000u64),
            user_id: Uuid::new_v4().simple().to_string(),
            session_token,
            config,
            tuning,
            upload_config,
        })
    }

    /// Uploads raw image bytes: fetches a short-lived storage credential,
    /// then runs the apply/put/commit protocol.
    pub fn upload_asset(&self, bytes: &[u8]) -> Result<AssetRef> {
        let credential = self.fetch_upload_credential()?;
        UploadCoordinator::new(self, &self.upload_config).upload(&credential, bytes)
    }

    /// Submits a generation payload. Blocking mode polls the job to
    /// completion; detached mode hands back the job id immediately.
    pub fn submit_and_await(&self, request: &JobRequest, mode: SubmitMode) -> Result<Submission> {
        let job_id = self.submit(&request.body)?;
        debug!(%job_id, "generation job accepted");
        match mode {
            SubmitMode::Detached => Ok(Submission::Accepted(job_id)),
            SubmitMode::Blocking => {
                let result = JobPoller::new(self, &self.tuning).run(request, &job_id)?;
                Ok(Submission::Completed(result))
            }
        }
    }

    pub fn credit_balance(&self) -> Result<CreditBalance> {
        let response = self.post_api(
            "/commerce/v1/benefits/user_credit",
            &[],
            &json!({}),
            Some(&self.tool_referer()),
        )?;
        if let Some(message) = envelope_error(&response) {
            bail!("credit query rejected: {message}");
        }
        let credit = &response["credit"];
        let field = |name: &str| credit.get(name).and_then(Value::as_i64).unwrap_or(0);
        Ok(CreditBalance::from_parts(
            field("gift_credit"),
            field("purchase_credit"),
            field("vip_credit"),
        ))
    }

    /// Claims the daily credit grant, then re-reads the balance. Claiming
    /// twice in a day surfaces the upstream rejection.
    pub fn receive_daily_credit(&self) -> Result<CreditBalance> {
        let response = self.post_api(
            "/commerce/v1/benefits/credit_receive",
            &[],
            &json!({ "time_zone": "Asia/Shanghai" }),
            Some(&self.tool_referer()),
        )?;
        if let Some(message) = envelope_error(&response) {
            bail!("credit receive rejected: {message}");
        }
        self.credit_balance()
    }

    fn fetch_upload_credential(&self) -> Result<UploadCredential> {
        let path = format!(
            "/mweb/v1/get_upload_token?aid={}&da_version=3.2.2&aigc_features={}",
            self.config.app_id, self.config.aigc_features
        );
        let response = self.post_api(&path, &[], &json!({ "scene": 2 }), None)?;
        let data = response
            .get("data")
            .filter(|data| !data.is_null())
            .ok_or_else(|| {
                let message = response
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or("upload credential missing, the session may have expired");
                anyhow!("{message}")
            })?;
        serde_json::from_value(data.clone()).context("decoding the upload credential")
    }

    fn post_api(
        &self,
        path: &str,
        query: &[(String, String)],
        body: &Value,
        referer: Option<&str>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut headers = self.base_headers()?;
        if let Some(referer) = referer {
            headers.insert(
                HeaderName::from_static("referer"),
                header_value("referer", referer)?,
            );
        }
        let mut request = self.http.post(&url).headers(headers).json(body);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().with_context(|| format!("POST {path}"))?;
        response
            .json()
            .with_context(|| format!("decoding the {path} response"))
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in BROWSER_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        let identity = [
            ("appid", self.config.app_id.to_string()),
            ("appvr", self.config.app_version.clone()),
            ("origin", self.config.base_url.clone()),
            ("referer", self.config.base_url.clone()),
            ("user-agent", self.config.user_agent.clone()),
            ("cookie", self.cookie()),
        ];
        for (name, value) in identity {
            headers.insert(HeaderName::from_static(name), header_value(name, &value)?);
        }
        Ok(headers)
    }

    /// Auth query parameters for mutating calls. Order matters: the
    /// fingerprint token signs the serialization of everything before it.
    fn auth_params(&self) -> Vec<(String, String)> {
        self.auth_params_with(&mut rand::thread_rng())
    }

    fn auth_params_with<R: Rng>(&self, rng: &mut R) -> Vec<(String, String)> {
        let pair = |key: &str, value: String| (key.to_string(), value);
        let mut params = vec![
            pair("aid", self.config.app_id.to_string()),
            pair("device_platform", "web".to_string()),
            pair("region", "cn".to_string()),
            pair("webId", self.web_id.to_string()),
            pair("da_version", self.config.da_version.clone()),
            pair("web_component_open_flag", "1".to_string()),
            pair("web_version", self.config.web_version.clone()),
            pair("aigc_features", self.config.aigc_features.clone()),
            pair("msToken", ms_token(rng, 128)),
        ];
        let token = fingerprint::build_token(
            &form_urlencoded(&params),
            &self.config.user_agent,
            fingerprint::DEFAULT_ENV_DESCRIPTOR,
        );
        params.push(pair("a_bogus", token));
        params
    }

    fn cookie(&self) -> String {
        self.cookie_at(Utc::now().timestamp())
    }

    fn cookie_at(&self, unix_seconds: i64) -> String {
        [
            format!("_tea_web_id={}", self.web_id),
            "is_staff_user=false".to_string(),
            "store-region=cn-gd".to_string(),
            "store-region-src=uid".to_string(),
            format!(
                "sid_guard={}%7C{unix_seconds}%7C5184000%7CMon%2C+03-Feb-2025+08%3A17%3A09+GMT",
                self.session_token
            ),
            format!("uid_tt={}", self.user_id),
            format!("uid_tt_ss={}", self.user_id),
            format!("sid_tt={}", self.session_token),
            format!("sessionid={}", self.session_token),
            format!("sessionid_ss={}", self.session_token),
        ]
        .join("; ")
    }

    fn tool_referer(&self) -> String {
        format!("{}/ai-tool/image/generate", self.config.base_url)
    }
}

impl JobBackend for ApiClient {
    fn submit(&self, body: &Map<String, Value>) -> Result<String> {
        let params = self.auth_params();
        let payload = Value::Object(body.clone());
        let response = self.post_api("/mweb/v1/aigc_draft/generate", &params, &payload, None)?;
        if let Some(message) = envelope_error(&response) {
            return Err(JobError::Submission { message }.into());
        }
        response
            .pointer("/data/aigc_data/history_record_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                JobError::Submission {
                    message: "response carried no history_record_id".to_string(),
                }
                .into()
            })
    }

    fn fetch_history(&self, job_id: &str) -> Result<Value> {
        let body = history_query(job_id, self.config.app_id);
        let response = self.post_api("/mweb/v1/get_history_by_ids", &[], &body, None)?;
        if let Some(message) = envelope_error(&response) {
            bail!("history fetch rejected: {message}");
        }
        Ok(response)
    }
}

impl StorageTransport for ApiClient {
    fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .headers(pair_headers(headers)?)
            .send()
            .with_context(|| format!("GET {url}"))?;
        response.json().context("decoding the storage response")
    }

    fn post_json(&self, url: &str, headers: &[(String, String)], body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .headers(pair_headers(headers)?)
            .json(body)
            .send()
            .with_context(|| format!("POST {url}"))?;
        response.json().context("decoding the storage response")
    }

    fn post_bytes(&self, url: &str, headers: &[(String, String)], body: &[u8]) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .headers(pair_headers(headers)?)
            .body(body.to_vec())
            .send()
            .with_context(|| format!("POST {url}"))?;
        response.json().context("decoding the store reply")
    }
}

/// Body of the history poll. The scene list mirrors what the web client asks
/// for; the endpoint rejects requests without it.
fn history_query(job_id: &str, app_id: u64) -> Value {
    json!({
        "history_ids": [job_id],
        "image_info": {
            "width": 2048,
            "height": 2048,
            "format": "webp",
            "image_scene_list": [
                { "scene": "smart_crop", "width": 360, "height": 360, "uniq_key": "smart_crop-w:360-h:360", "format": "webp" },
                { "scene": "smart_crop", "width": 480, "height": 480, "uniq_key": "smart_crop-w:480-h:480", "format": "webp" },
                { "scene": "smart_crop", "width": 720, "height": 720, "uniq_key": "smart_crop-w:720-h:720", "format": "webp" },
                { "scene": "smart_crop", "width": 720, "height": 480, "uniq_key": "smart_crop-w:720-h:480", "format": "webp" },
                { "scene": "smart_crop", "width": 360, "height": 240, "uniq_key": "smart_crop-w:360-h:240", "format": "webp" },
                { "scene": "smart_crop", "width": 240, "height": 320, "uniq_key": "smart_crop-w:240-h:320", "format": "webp" },
                { "scene": "smart_crop", "width": 480, "height": 640, "uniq_key": "smart_crop-w:480-h:640", "format": "webp" },
                { "scene": "normal", "width": 2400, "height": 2400, "uniq_key": "2400", "format": "webp" },
                { "scene": "normal", "width": 1080, "height": 1080, "uniq_key": "1080", "format": "webp" },
                { "scene": "normal", "width": 720, "height": 720, "uniq_key": "720", "format": "webp" },
                { "scene": "normal", "width": 480, "height": 480, "uniq_key": "480", "format": "webp" },
                { "scene": "normal", "width": 360, "height": 360, "uniq_key": "360", "format": "webp" }
            ]
        },
        "http_common_info": { "aid": app_id }
    })
}

/// Reads the `ret`/`errmsg` envelope. `None` when the response is OK or the
/// envelope is absent (the storage endpoints use a different shape).
fn envelope_error(body: &Value) -> Option<String> {
    let ok = match body.get("ret")? {
        Value::String(code) => code == "0",
        Value::Number(code) => code.as_i64() == Some(0),
        _ => false,
    };
    if ok {
        return None;
    }
    Some(
        body.get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("unspecified upstream error")
            .to_string(),
    )
}

fn ms_token<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| MS_TOKEN_ALPHABET[rng.gen_range(0..MS_TOKEN_ALPHABET.len() - 1)] as char)
        .collect()
}

/// `application/x-www-form-urlencoded` serialization; the fingerprint token
/// digests this exact string, so the escaping rules are load-bearing.
fn form_urlencoded(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| anyhow!("header {name} rejects its value"))
}

fn pair_headers(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SignError::BadHeaderName(name.clone()))?;
        headers.insert(header, header_value(name, value)?);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    use super::{
        envelope_error, form_urlencoded, history_query, ms_token, ApiClient, MS_TOKEN_ALPHABET,
    };
    use dreamina_contracts::config::{ClientConfig, PollTuning, UploadConfig};

    fn test_client() -> ApiClient {
        ApiClient {
            http: reqwest::blocking::Client::new(),
            config: ClientConfig {
                session_token: Some("tok-123".to_string()),
                ..ClientConfig::default()
            },
            upload_config: UploadConfig::default(),
            tuning: PollTuning::immediate(),
            session_token: "tok-123".to_string(),
            web_id: 7_400_000_000_000_000_123,
            user_id: "0f1e2d3c4b5a69788796a5b4c3d2e1f0".to_string(),
        }
    }

    #[test]
    fn the_cookie_carries_session_and_identity() {
        let client = test_client();
        let cookie = client.cookie_at(1_738_570_629);
        assert_eq!(
            cookie,
            "_tea_web_id=7400000000000000123; is_staff_user=false; store-region=cn-gd; \
             store-region-src=uid; sid_guard=tok-123%7C1738570629%7C5184000%7CMon%2C+\
             03-Feb-2025+08%3A17%3A09+GMT; uid_tt=0f1e2d3c4b5a69788796a5b4c3d2e1f0; \
             uid_tt_ss=0f1e2d3c4b5a69788796a5b4c3d2e1f0; sid_tt=tok-123; \
             sessionid=tok-123; sessionid_ss=tok-123"
        );
    }

    #[test]
    fn auth_params_keep_their_order_and_signature() {
        let client = test_client();
        let mut rng = StdRng::seed_from_u64(7);
        let params = client.auth_params_with(&mut rng);

        let keys: Vec<&str> = params.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(
            keys,
            [
                "aid",
                "device_platform",
                "region",
                "webId",
                "da_version",
                "web_component_open_flag",
                "web_version",
                "aigc_features",
                "msToken",
                "a_bogus",
            ]
        );
        let value_of = |key: &str| {
            params
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
                .expect("param present")
        };
        assert_eq!(value_of("aid"), "513695");
        assert_eq!(value_of("device_platform"), "web");
        assert_eq!(value_of("region"), "cn");
        assert_eq!(value_of("webId"), "7400000000000000123");
        assert_eq!(value_of("web_component_open_flag"), "1");
        assert_eq!(value_of("msToken").len(), 128);

        let token = value_of("a_bogus");
        assert!(token.ends_with('='));
        assert_eq!(token.len(), 161);
    }

    #[test]
    fn the_ms_token_never_emits_the_padding_symbol() {
        let mut rng = StdRng::seed_from_u64(99);
        let token = ms_token(&mut rng, 512);
        assert_eq!(token.len(), 512);
        assert!(!token.contains('='));
        assert!(token
            .bytes()
            .all(|byte| MS_TOKEN_ALPHABET.contains(&byte)));
    }

    #[test]
    fn form_serialization_follows_browser_rules() {
        let params = vec![
            ("q".to_string(), "a b*c.d_e".to_string()),
            ("r".to_string(), "x/y".to_string()),
        ];
        assert_eq!(form_urlencoded(&params), "q=a+b*c.d_e&r=x%2Fy");
    }

    #[test]
    fn envelope_codes_map_to_messages() {
        assert_eq!(envelope_error(&json!({"ret": "0"})), None);
        assert_eq!(envelope_error(&json!({"ret": 0})), None);
        assert_eq!(envelope_error(&json!({"data": {}})), None);
        assert_eq!(
            envelope_error(&json!({"ret": "1014", "errmsg": "system busy"})),
            Some("system busy".to_string())
        );
        assert_eq!(
            envelope_error(&json!({"ret": "5000"})),
            Some("unspecified upstream error".to_string())
        );
    }

    #[test]
    fn the_history_query_pins_the_scene_list() {
        let body = history_query("h-123", 513695);
        assert_eq!(body["history_ids"], json!(["h-123"]));
        assert_eq!(body["http_common_info"]["aid"], json!(513695));
        let scenes = body["image_info"]["image_scene_list"]
            .as_array()
            .expect("scene list");
        assert_eq!(scenes.len(), 12);
        assert_eq!(
            scenes[0]["uniq_key"],
            Value::from("smart_crop-w:360-h:360")
        );
    }
}
