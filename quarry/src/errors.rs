use basalt::errors::DbError;

#[derive(Debug)]
pub enum ExecutionError {
    /// The transaction lost a lock race and must be aborted and retried.
    Aborted,
    /// An iterator is exhausted or was never opened.
    NoSuchElement,
    Storage(DbError),
}

impl From<DbError> for ExecutionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::TransactionAborted => ExecutionError::Aborted,
            DbError::NoSuchElement => ExecutionError::NoSuchElement,
            other => ExecutionError::Storage(other),
        }
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Storage(DbError::Io(err))
    }
}
