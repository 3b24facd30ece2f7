use chrono::Utc;
use sea_orm::SqlErr;
use uuid::Uuid;

use crate::{
    auth::password::{hash_password, verify_password},
    db::dao::{DaoBase, DaoLayerError, UserDao},
    db::entities::user,
    error::AppError,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const USER_EXISTS: &str = "User already exists";

#[derive(Clone)]
pub struct UserService {
    user_dao: UserDao,
}

impl UserService {
    pub fn new(user_dao: UserDao) -> Self {
        Self { user_dao }
    }

    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<user::Model>, AppError> {
        match self.user_dao.find_by_id(*id).await {
            Ok(model) => Ok(Some(model)),
            Err(DaoLayerError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, AppError> {
        Ok(self.user_dao.find_by_email(&normalize_email(email)).await?)
    }

    /// Creates an account. Emails are stored trimmed and lowercased.
    pub async fn register(&self, email: &str, password: &str) -> Result<user::Model, AppError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::bad_request("Email required"));
        }

        if self.user_dao.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict(USER_EXISTS));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .user_dao
            .create_user(&email, &password_hash, Utc::now().fixed_offset())
            .await
            .map_err(create_error)?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Checks credentials and stamps `last_login_at`.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<user::Model, AppError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_CREDENTIALS))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        self.user_dao
            .set_last_login(&user.id, Utc::now().fixed_offset())
            .await?;
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// A concurrent registration can pass the lookup and lose on the unique index.
fn create_error(err: DaoLayerError) -> AppError {
    let duplicate = matches!(
        &err,
        DaoLayerError::Db(db_err)
            if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    );
    if duplicate {
        AppError::conflict(USER_EXISTS)
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};
    use uuid::Uuid;

    use crate::{
        auth::password::hash_password,
        db::{
            dao::{DaoBase, DaoLayerError, UserDao},
            entities::user,
        },
        error::AppError,
    };

    use super::{UserService, create_error, normalize_email};
    use crate::test_helpers::sqlite_db;

    fn user_model(email: &str, password_hash: &str) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: FixedOffset::east_opt(0)
                .expect("offset should be valid")
                .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                .single()
                .expect("timestamp should be valid"),
            last_login_at: None,
        }
    }

    fn service(db: MockDatabase) -> UserService {
        UserService::new(UserDao::new(&db.into_connection()))
    }

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Keeper@Zoo.Example "), "keeper@zoo.example");
    }

    #[tokio::test]
    async fn register_rejects_blank_email() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));

        let err = service
            .register("   ", "password123")
            .await
            .expect_err("register should fail");
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user_model("keeper@zoo.example", "x")]]),
        );

        let err = service
            .register("Keeper@zoo.example", "password123")
            .await
            .expect_err("register should fail");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_stores_normalized_email() {
        let created = user_model("keeper@zoo.example", "hash");
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .append_query_results([[created.clone()]]),
        );

        let user = service
            .register(" Keeper@Zoo.Example", "password123")
            .await
            .expect("register should succeed");
        assert_eq!(user.email, "keeper@zoo.example");
    }

    #[tokio::test]
    async fn authenticate_hides_which_credential_was_wrong() {
        let hash = hash_password("password123").expect("hash should succeed");
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .append_query_results([[user_model("keeper@zoo.example", &hash)]]),
        );

        let unknown = service
            .authenticate("nobody@zoo.example", "password123")
            .await
            .expect_err("unknown email should fail");
        let wrong = service
            .authenticate("keeper@zoo.example", "wrong-password")
            .await
            .expect_err("wrong password should fail");

        assert!(matches!(unknown, AppError::Unauthorized(_)));
        assert_eq!(unknown.message(), wrong.message());
    }

    #[tokio::test]
    async fn authenticate_records_last_login() {
        let hash = hash_password("password123").expect("hash should succeed");
        let stored = user_model("keeper@zoo.example", &hash);
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stored.clone()]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }]),
        );

        let user = service
            .authenticate("keeper@zoo.example", "password123")
            .await
            .expect("authenticate should succeed");
        assert_eq!(user.id, stored.id);
    }

    #[tokio::test]
    async fn database_failure_is_internal() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_errors([DbErr::Custom("db down".to_string())]),
        );

        let err = service
            .find_by_email("keeper@zoo.example")
            .await
            .expect_err("lookup should fail");
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn unique_index_violation_maps_to_conflict() {
        let dao = UserDao::new(&sqlite_db().await);
        let at = user_model("keeper@zoo.example", "x").created_at;
        dao.create_user("keeper@zoo.example", "hash", at)
            .await
            .expect("first insert should succeed");

        let err = dao
            .create_user("keeper@zoo.example", "hash", at)
            .await
            .expect_err("second insert should hit the unique index");
        let mapped = create_error(err);
        assert!(matches!(mapped, AppError::Conflict(_)));
        assert_eq!(mapped.message(), "User already exists");
    }

    #[test]
    fn other_insert_failures_stay_internal() {
        let mapped = create_error(DaoLayerError::Db(DbErr::Custom("disk full".to_string())));
        assert!(matches!(mapped, AppError::Internal(_)));
    }
}
