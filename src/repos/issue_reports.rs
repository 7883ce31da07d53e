use diesel;
use diesel::connection::AnsiTransactionManager;
use diesel::pg::Pg;
use diesel::query_dsl::RunQueryDsl;
use diesel::Connection;
use failure::Error as FailureError;

use models::{IssueReport, NewIssueReport};
use repos::types::RepoResult;
use schema::issue_reports::dsl as IssueReports;

pub trait IssueReportsRepo {
    fn create(&self, payload: NewIssueReport) -> RepoResult<IssueReport>;
}

pub struct IssueReportsRepoImpl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> {
    pub db_conn: &'a T,
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> IssueReportsRepoImpl<'a, T> {
    pub fn new(db_conn: &'a T) -> Self {
        Self { db_conn }
    }
}

impl<'a, T: Connection<Backend = Pg, TransactionManager = AnsiTransactionManager> + 'static> IssueReportsRepo for IssueReportsRepoImpl<'a, T> {
    fn create(&self, payload: NewIssueReport) -> RepoResult<IssueReport> {
        debug!("Create issue report {:?}.", payload);
        diesel::insert_into(IssueReports::issue_reports)
            .values(&payload)
            .get_result::<IssueReport>(self.db_conn)
            .map_err(From::from)
            .map_err(|e: FailureError| e.context(format!("Create issue report {:?} error occurred", payload)).into())
    }
}
