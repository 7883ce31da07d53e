//! Content moderation classifier
use std::collections::BTreeMap;
use std::time::Duration;

use failure::Error as FailureError;
use failure::Fail;
use futures::future;
use futures::prelude::*;
use reqwest;

use super::ClientFuture;
use models::ModerationDecision;

/// Classifier verdict for a text blob
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Classification {
    pub flagged: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
}

impl Classification {
    pub fn decision(&self) -> ModerationDecision {
        if self.flagged {
            let names = self
                .categories
                .iter()
                .filter(|&(_, &hit)| hit)
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>();
            ModerationDecision::Reject {
                reason: format!("Inappropriate content detected: {}", names.join(", ")),
            }
        } else {
            ModerationDecision::Manual
        }
    }
}

/// Text sent for classification
pub fn moderation_text(title: &str, description: &str) -> String {
    format!("{}\n{}", title, description)
}

pub trait ModerationClassifier: Send + Sync {
    fn classify(&self, text: String) -> ClientFuture<Classification>;
}

/// Runs the classifier, any failure means a human has to look at the listing
pub fn classify_or_manual(classifier: &ModerationClassifier, text: String) -> Box<Future<Item = ModerationDecision, Error = FailureError>> {
    Box::new(classifier.classify(text).then(|res| match res {
        Ok(classification) => future::ok(classification.decision()),
        Err(err) => {
            warn!("Moderation classifier failed, leaving listing for manual review: {}", err);
            future::ok(ModerationDecision::Manual)
        }
    }))
}

#[derive(Serialize)]
struct ClassifyRequest {
    input: String,
}

pub struct HttpModerationClassifier {
    http_client: reqwest::async::Client,
    url: String,
    api_key: String,
}

impl HttpModerationClassifier {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, FailureError> {
        let http_client = reqwest::async::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, url, api_key })
    }
}

impl ModerationClassifier for HttpModerationClassifier {
    fn classify(&self, text: String) -> ClientFuture<Classification> {
        debug!("Sending {} chars to moderation classifier", text.len());
        Box::new(
            self.http_client
                .post(self.url.as_str())
                .header("Authorization", format!("Bearer {}", self.api_key).as_str())
                .json(&ClassifyRequest { input: text })
                .send()
                .and_then(|res| res.error_for_status())
                .map_err(FailureError::from)
                .and_then(|mut res| {
                    res.json::<Classification>()
                        .map_err(|e| e.context("Received an invalid JSON from moderation classifier").into())
                }),
        )
    }
}

/// Classifier used when none is configured, every listing goes to manual review
#[derive(Clone, Default)]
pub struct NoopModerationClassifier;

impl ModerationClassifier for NoopModerationClassifier {
    fn classify(&self, _text: String) -> ClientFuture<Classification> {
        Box::new(future::ok(Classification::default()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Classifier returning a fixed verdict, or failing when `None`
    pub struct FixedClassifier(pub Option<Classification>);

    impl ModerationClassifier for FixedClassifier {
        fn classify(&self, _text: String) -> ClientFuture<Classification> {
            match self.0.clone() {
                Some(classification) => Box::new(future::ok(classification)),
                None => Box::new(future::err(format_err!("classifier timed out"))),
            }
        }
    }

    pub fn flagged(categories: &[&str]) -> Classification {
        Classification {
            flagged: true,
            categories: categories.iter().map(|name| (name.to_string(), true)).collect(),
        }
    }

    #[test]
    fn test_flagged_text_is_rejected_with_categories() {
        let mut classification = flagged(&["violence", "hate"]);
        classification.categories.insert("spam".to_string(), false);
        assert_eq!(
            classification.decision(),
            ModerationDecision::Reject {
                reason: "Inappropriate content detected: hate, violence".to_string()
            }
        );
    }

    #[test]
    fn test_clean_text_goes_to_manual_review() {
        assert_eq!(Classification::default().decision(), ModerationDecision::Manual);
    }

    #[test]
    fn test_classifier_failure_means_manual() {
        let decision = classify_or_manual(&FixedClassifier(None), "text".to_string()).wait().unwrap();
        assert_eq!(decision, ModerationDecision::Manual);
    }
}
