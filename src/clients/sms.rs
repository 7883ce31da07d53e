//! SMS gateway sending verification codes
use std::time::Duration;

use failure::Error as FailureError;
use failure::Fail;
use futures::future;
use futures::prelude::*;
use rand::{self, Rng};
use reqwest;

use super::ClientFuture;
use models::VerificationPurpose;

pub trait SmsSender: Send + Sync {
    /// Sends a code to `phone`, resolves to the code that was sent
    fn send_code(&self, phone: String, purpose: VerificationPurpose) -> ClientFuture<String>;
}

#[derive(Serialize)]
struct SendCodeRequest {
    phone: String,
    purpose: VerificationPurpose,
}

#[derive(Deserialize)]
struct SendCodeResponse {
    code: String,
}

pub struct HttpSmsSender {
    http_client: reqwest::async::Client,
    url: String,
    api_key: String,
}

impl HttpSmsSender {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, FailureError> {
        let http_client = reqwest::async::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, url, api_key })
    }
}

impl SmsSender for HttpSmsSender {
    fn send_code(&self, phone: String, purpose: VerificationPurpose) -> ClientFuture<String> {
        info!("Sending {} code to {}", purpose, phone);
        Box::new(
            self.http_client
                .post(self.url.as_str())
                .header("Authorization", format!("Bearer {}", self.api_key).as_str())
                .json(&SendCodeRequest { phone, purpose })
                .send()
                .and_then(|res| res.error_for_status())
                .map_err(FailureError::from)
                .and_then(|mut res| {
                    res.json::<SendCodeResponse>()
                        .map_err(|e| e.context("Received an invalid JSON from SMS gateway").into())
                })
                .map(|response| response.code),
        )
    }
}

/// Generates codes locally and only logs them, for development setups
#[derive(Clone, Default)]
pub struct NoopSmsSender;

impl SmsSender for NoopSmsSender {
    fn send_code(&self, phone: String, purpose: VerificationPurpose) -> ClientFuture<String> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0, 1_000_000));
        info!("SMS gateway is not configured, {} code for {} is {}", purpose, phone, code);
        Box::new(future::ok(code))
    }
}
