//! Phone verification service. Codes come from the SMS gateway and live in
//! the session store, nothing here touches the database.

use std::time::{Duration, SystemTime};

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use futures::future;
use futures::prelude::*;
use r2d2::ManageConnection;

use super::types::ServiceFuture;
use errors::Error;
use models::{canonicalize_phone, StoredCode, VerificationPurpose, RESET_REQUEST_INTERVAL_S};
use repos::ReposFactory;
use services::Service;

pub trait PhoneVerificationService {
    /// Sends a fresh code to `phone`, password reset requests are throttled
    fn request_code(&self, phone: String, purpose: VerificationPurpose) -> ServiceFuture<()>;
    /// Checks the code, a matching code is consumed
    fn verify_code(&self, phone: String, purpose: VerificationPurpose, code: String) -> ServiceFuture<()>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > PhoneVerificationService for Service<T, M, F>
{
    fn request_code(&self, phone: String, purpose: VerificationPurpose) -> ServiceFuture<()> {
        let phone = canonicalize_phone(&phone);
        let cpu_pool = self.static_context.cpu_pool.clone();
        let sessions = self.static_context.sessions.clone();
        let sms = self.static_context.sms.clone();
        let throttle_key = purpose.throttle_key(&phone);
        let code_key = purpose.code_key(&phone);

        let throttled = {
            let sessions = sessions.clone();
            let throttle_key = throttle_key.clone();
            let phone = phone.clone();
            cpu_pool.spawn_fn(move || -> Result<(), FailureError> {
                if !purpose.is_rate_limited() {
                    return Ok(());
                }
                let interval = Duration::from_secs(RESET_REQUEST_INTERVAL_S);
                if sessions.set_if_absent(&throttle_key, "1", interval)? {
                    Ok(())
                } else {
                    Err(format_err!("{} code for {} was requested less than {}s ago", purpose, phone, RESET_REQUEST_INTERVAL_S)
                        .context(Error::RateLimited)
                        .into())
                }
            })
        };

        let send_pool = cpu_pool.clone();
        let send_sessions = sessions.clone();
        let sent = throttled.and_then(move |_| {
            sms.send_code(phone.clone(), purpose).then(move |res| match res {
                Ok(code) => future::Either::A(future::ok::<String, FailureError>(code)),
                Err(e) => {
                    warn!("Failed to send {} code to {}: {}", purpose, phone, e);
                    // the request did not happen, so it does not count against the limit
                    let release = send_pool.spawn_fn(move || {
                        if purpose.is_rate_limited() {
                            send_sessions.remove(&throttle_key)
                        } else {
                            Ok(())
                        }
                    });
                    future::Either::B(release.then(move |_| Err::<String, FailureError>(e.context(Error::Transient).into())))
                }
            })
        });

        Box::new(
            sent.and_then(move |code| {
                cpu_pool.spawn_fn(move || {
                    let stored = StoredCode {
                        code,
                        sent_at: SystemTime::now(),
                    };
                    sessions.set(&code_key, &stored.encode(), purpose.code_ttl())
                })
            })
            .map_err(|e: FailureError| e.context("Service PhoneVerification, request_code endpoint error occurred.").into()),
        )
    }

    fn verify_code(&self, phone: String, purpose: VerificationPurpose, code: String) -> ServiceFuture<()> {
        let phone = canonicalize_phone(&phone);
        let sessions = self.static_context.sessions.clone();

        Box::new(
            self.static_context
                .cpu_pool
                .spawn_fn(move || -> Result<(), FailureError> {
                    let code_key = purpose.code_key(&phone);
                    let stored = sessions.get(&code_key)?.and_then(|raw| StoredCode::decode(&raw));
                    match stored {
                        Some(ref stored) if stored.matches(&code, purpose, SystemTime::now()) => {
                            sessions.remove(&code_key)?;
                            info!("Phone {} verified for {}", phone, purpose);
                            Ok(())
                        }
                        _ => Err(format_err!("Wrong or expired {} code for {}", purpose, phone)
                            .context(Error::InvalidCode)
                            .into()),
                    }
                })
                .map_err(|e| e.context("Service PhoneVerification, verify_code endpoint error occurred.").into()),
        )
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use tokio_core::reactor::Core;

    use clients::sms::tests::CountingSmsSender;
    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;
    use sessions::{MemorySessionStore, SessionStore};

    #[test]
    fn test_code_is_stored_and_consumed() {
        let db = MockDb::shared();
        let sender = CountingSmsSender::new(Some("123456"));
        let sessions = Arc::new(MemorySessionStore::default());
        let collaborators = MockCollaborators {
            sms: Arc::new(sender.clone()),
            sessions: sessions.clone(),
            ..Default::default()
        };
        let mut core = Core::new().unwrap();
        let service = create_service_with(None, db, collaborators);

        core.run(service.request_code("+962791234567".to_string(), VerificationPurpose::Verify))
            .unwrap();
        assert_eq!(sender.sent(), 1);
        let stored = sessions
            .get(&VerificationPurpose::Verify.code_key("0791234567"))
            .unwrap()
            .and_then(|raw| StoredCode::decode(&raw))
            .unwrap();
        assert_eq!(stored.code, "123456");

        let err = core
            .run(service.verify_code("0791234567".to_string(), VerificationPurpose::Verify, "654321".to_string()))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidCode));

        core.run(service.verify_code("0791234567".to_string(), VerificationPurpose::Verify, " 123456 ".to_string()))
            .unwrap();
        let err = core
            .run(service.verify_code("0791234567".to_string(), VerificationPurpose::Verify, "123456".to_string()))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidCode));
    }

    #[test]
    fn test_reset_requests_are_throttled() {
        let db = MockDb::shared();
        let sender = CountingSmsSender::new(Some("1111"));
        let collaborators = MockCollaborators {
            sms: Arc::new(sender.clone()),
            ..Default::default()
        };
        let mut core = Core::new().unwrap();
        let service = create_service_with(None, db, collaborators);

        core.run(service.request_code("0791234567".to_string(), VerificationPurpose::PasswordReset))
            .unwrap();
        let err = core
            .run(service.request_code("0791234567".to_string(), VerificationPurpose::PasswordReset))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::RateLimited));
        assert_eq!(sender.sent(), 1);

        core.run(service.request_code("0791234567".to_string(), VerificationPurpose::Verify))
            .unwrap();
        core.run(service.request_code("0791234567".to_string(), VerificationPurpose::Verify))
            .unwrap();
        assert_eq!(sender.sent(), 3);
    }

    #[test]
    fn test_gateway_failure_is_transient_and_not_throttled() {
        let db = MockDb::shared();
        let sender = CountingSmsSender::new(None);
        let sessions = Arc::new(MemorySessionStore::default());
        let collaborators = MockCollaborators {
            sms: Arc::new(sender.clone()),
            sessions: sessions.clone(),
            ..Default::default()
        };
        let mut core = Core::new().unwrap();
        let service = create_service_with(None, db, collaborators);

        for _ in 0..2 {
            let err = core
                .run(service.request_code("0791234567".to_string(), VerificationPurpose::PasswordReset))
                .unwrap_err();
            assert_eq!(Error::kind_of(&err), Some(Error::Transient));
        }
        assert_eq!(sender.sent(), 2);
        let code_key = VerificationPurpose::PasswordReset.code_key("0791234567");
        assert_eq!(sessions.get(&code_key).unwrap(), None);
    }

    #[test]
    fn test_expired_code_is_rejected() {
        let db = MockDb::shared();
        let sessions = Arc::new(MemorySessionStore::default());
        let stale = StoredCode {
            code: "777777".to_string(),
            sent_at: SystemTime::now() - Duration::from_secs(6 * 60),
        };
        sessions
            .set(
                &VerificationPurpose::PasswordReset.code_key("0791234567"),
                &stale.encode(),
                Duration::from_secs(600),
            )
            .unwrap();
        let collaborators = MockCollaborators {
            sessions: sessions.clone(),
            ..Default::default()
        };
        let mut core = Core::new().unwrap();
        let service = create_service_with(None, db, collaborators);

        let err = core
            .run(service.verify_code(
                "0791234567".to_string(),
                VerificationPurpose::PasswordReset,
                "777777".to_string(),
            ))
            .unwrap_err();
        assert_eq!(Error::kind_of(&err), Some(Error::InvalidCode));
    }
}
