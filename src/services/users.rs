//! Users Services, registration with referrals and phone login lookup

use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::Connection;
use failure::Error as FailureError;
use r2d2::ManageConnection;
use rand::{self, Rng};
use validator::{Validate, ValidationErrors};

use super::types::ServiceFuture;
use errors::Error;
use models::*;
use repos::{ReposFactory, UsersRepo};
use services::wallet::reward_points;
use services::Service;

/// Ledger reason of the referrer reward
pub const REFERRAL_REASON: &str = "referral";
const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_ATTEMPTS: usize = 10;

fn invalid_registration(errors: ValidationErrors) -> FailureError {
    format_err!("Registration payload is not valid").context(Error::Validate(errors)).into()
}

fn is_canonical_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.starts_with("07") && phone.chars().all(|c| c.is_ascii_digit())
}

fn generate_referral_code() -> String {
    rand::thread_rng()
        .gen_ascii_chars()
        .take(REFERRAL_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Referral code not taken by anybody yet
fn unique_referral_code(users_repo: &UsersRepo) -> Result<String, FailureError> {
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let code = generate_referral_code();
        if users_repo.find_by_referral_code(code.clone())?.is_none() {
            return Ok(code);
        }
    }
    Err(format_err!("Could not generate unique referral code in {} attempts", REFERRAL_CODE_ATTEMPTS))
}

pub trait UsersService {
    /// Creates user with canonical phone, rewarding the referrer if any
    fn register_user(&self, payload: RegisterUser) -> ServiceFuture<User>;
    /// Finds user by any accepted variant of the phone
    fn find_by_login_phone(&self, phone: String) -> ServiceFuture<Option<User>>;
}

impl<
        T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static,
        M: ManageConnection<Connection = T>,
        F: ReposFactory<T>,
    > UsersService for Service<T, M, F>
{
    fn register_user(&self, payload: RegisterUser) -> ServiceFuture<User> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            let ledger_repo = repo_factory.create_points_transactions_repo_with_sys_acl(&*conn);
            let notifications_repo = repo_factory.create_notifications_repo(&*conn);

            conn.transaction::<User, FailureError, _>(move || {
                payload.validate().map_err(invalid_registration)?;

                let phone = canonicalize_phone(&payload.phone);
                if !is_canonical_phone(&phone) {
                    return Err(invalid_registration(
                        validation_errors!({"phone": ["format" => "Phone must look like 07XXXXXXXX"]}),
                    ));
                }
                if users_repo.find_by_phones(phone_candidates(&phone))?.is_some() {
                    return Err(invalid_registration(
                        validation_errors!({"phone": ["exists" => "Phone is already registered"]}),
                    ));
                }

                let referrer = match payload.referral_code {
                    Some(ref code) if !code.trim().is_empty() => {
                        let code = code.trim().to_uppercase();
                        let referrer = users_repo.find_by_referral_code(code)?.ok_or_else(|| {
                            invalid_registration(validation_errors!({"referral_code": ["not_found" => "Unknown referral code"]}))
                        })?;
                        Some(referrer)
                    }
                    _ => None,
                };

                let user = users_repo.create(NewUser {
                    phone,
                    display_name: payload.display_name,
                    points: 0,
                    referral_code: unique_referral_code(&*users_repo)?,
                    referred_by: referrer.as_ref().map(|referrer| referrer.id),
                })?;

                if let Some(referrer) = referrer {
                    reward_points(
                        &*users_repo,
                        &*ledger_repo,
                        &*notifications_repo,
                        referrer.id,
                        REFERRAL_REWARD,
                        REFERRAL_REASON,
                    )?;
                    info!("User {} registered by referral of user {}", user.id, referrer.id);
                } else {
                    info!("User {} registered", user.id);
                }
                Ok(user)
            })
            .map_err(|e| e.context("Service Users, register endpoint error occurred.").into())
        })
    }

    fn find_by_login_phone(&self, phone: String) -> ServiceFuture<Option<User>> {
        let repo_factory = self.static_context.repo_factory.clone();

        self.spawn_on_pool(move |conn| {
            let users_repo = repo_factory.create_users_repo(&*conn);
            users_repo
                .find_by_phones(phone_candidates(&phone))
                .map_err(|e| e.context("Service Users, find_by_login_phone endpoint error occurred.").into())
        })
    }
}

#[cfg(test)]
pub mod tests {
    use tokio_core::reactor::Core;

    use errors::Error;
    use models::*;
    use repos::repo_factory::tests::*;
    use services::*;

    fn registration(phone: &str, referral_code: Option<&str>) -> RegisterUser {
        RegisterUser {
            phone: phone.to_string(),
            display_name: "Lina".to_string(),
            referral_code: referral_code.map(|code| code.to_string()),
        }
    }

    fn is_validation_error(err: &::failure::Error) -> bool {
        match Error::kind_of(err) {
            Some(Error::Validate(_)) => true,
            _ => false,
        }
    }

    #[test]
    fn test_register_stores_canonical_phone() {
        let db = MockDb::shared();
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let user = core.run(service.register_user(registration("+962 79 123 4567", None))).unwrap();
        assert_eq!(user.phone, "0791234567");
        assert_eq!(user.points, 0);
        assert_eq!(user.referral_code.len(), 8);
        assert_eq!(user.referred_by, None);

        let err = core.run(service.register_user(registration("00962791234567", None))).unwrap_err();
        assert!(is_validation_error(&err));

        let err = core.run(service.register_user(registration("12345", None))).unwrap_err();
        assert!(is_validation_error(&err));
        assert_eq!(db.lock().unwrap().users.len(), 1);
    }

    #[test]
    fn test_referrer_gets_reward() {
        let db = MockDb::shared();
        let referrer = db.lock().unwrap().add_user(5);
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let user = core
            .run(service.register_user(registration("0781112222", Some(&referrer.referral_code.to_lowercase()))))
            .unwrap();
        assert_eq!(user.referred_by, Some(referrer.id));
        assert_ne!(user.referral_code, referrer.referral_code);

        let db = db.lock().unwrap();
        assert_eq!(db.user(referrer.id).points, 55);
        assert_eq!(db.points_transactions.len(), 1);
        assert_eq!(db.points_transactions[0].reason, REFERRAL_REASON);
        let notifications = db.notifications_of(referrer.id);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].status, NotificationStatus::Reward);
    }

    #[test]
    fn test_unknown_referral_code_registers_nobody() {
        let db = MockDb::shared();
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let err = core
            .run(service.register_user(registration("0781112222", Some("NOSUCHCODE"))))
            .unwrap_err();
        assert!(is_validation_error(&err));
        assert!(db.lock().unwrap().users.is_empty());
    }

    #[test]
    fn test_login_accepts_any_phone_variant() {
        let db = MockDb::shared();
        let user = db.lock().unwrap().add_user(0);
        let mut core = Core::new().unwrap();
        let service = create_service(None, db.clone());

        let international = format!("+962{}", &user.phone[1..]);
        let found = core.run(service.find_by_login_phone(international)).unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let missing = core.run(service.find_by_login_phone("0700000000".to_string())).unwrap();
        assert_eq!(missing, None);
    }
}
