//! Full-text listing search
use std::time::Duration;

use failure::Error as FailureError;
use failure::Fail;
use futures::prelude::*;
use reqwest;

use super::ClientFuture;
use types::ListingId;

pub trait ListingSearch: Send + Sync {
    /// Ids of matching listings, best match first
    fn search_ids(&self, text: String) -> ClientFuture<Vec<ListingId>>;
}

#[derive(Deserialize)]
struct SearchResponse {
    ids: Vec<ListingId>,
}

pub struct HttpListingSearch {
    http_client: reqwest::async::Client,
    url: String,
}

impl HttpListingSearch {
    pub fn new(url: String, timeout: Duration) -> Result<Self, FailureError> {
        let http_client = reqwest::async::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, url })
    }
}

impl ListingSearch for HttpListingSearch {
    fn search_ids(&self, text: String) -> ClientFuture<Vec<ListingId>> {
        debug!("Searching listings for {:?}", text);
        Box::new(
            self.http_client
                .get(self.url.as_str())
                .query(&[("q", text)])
                .send()
                .and_then(|res| res.error_for_status())
                .map_err(FailureError::from)
                .and_then(|mut res| {
                    res.json::<SearchResponse>()
                        .map_err(|e| e.context("Received an invalid JSON from search").into())
                })
                .map(|response| response.ids),
        )
    }
}
