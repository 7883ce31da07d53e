use std::time::SystemTime;

use validator::Validate;

use models::validation_rules::*;
use schema::issue_reports;
use types::{IssueReportId, ListingId, UserId};

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct IssueReport {
    pub id: IssueReportId,
    pub listing_id: ListingId,
    pub reporter_id: Option<UserId>,
    pub reason: String,
    pub message: String,
    pub created_at: SystemTime,
}

#[derive(Serialize, Deserialize, Insertable, Validate, Clone, Debug)]
#[table_name = "issue_reports"]
pub struct NewIssueReport {
    pub listing_id: ListingId,
    pub reporter_id: Option<UserId>,
    #[validate(length(min = "1", max = "100"), custom = "validate_content")]
    pub reason: String,
    #[validate(length(max = "2000"), custom = "validate_content")]
    pub message: String,
}

/// Report as submitted, the reporter comes from the session
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReportListing {
    pub reason: String,
    #[serde(default)]
    pub message: String,
}
