use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db.message().contains("invalid input syntax")
                || db.message().contains("out of range") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Convert an unsigned filter id into the signed column type.
pub(crate) fn to_db_id(value: u64, field: &'static str) -> Result<i64, RepoError> {
    i64::try_from(value)
        .map_err(|_| RepoError::invalid_input(format!("{field} {value} exceeds BIGINT range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn other_errors_are_persistence() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::Persistence(_)
        ));
    }

    #[test]
    fn oversized_ids_are_rejected() {
        assert_eq!(to_db_id(42, "category_id").unwrap(), 42);
        assert!(matches!(
            to_db_id(u64::MAX, "category_id"),
            Err(RepoError::InvalidInput { .. })
        ));
    }
}
