use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Moderation state of a directory listing. Only approved businesses can be featured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// User id of the listing owner (issued by the external auth service)
    pub owner_id: String,
    pub status: ApprovalStatus,
    /// Denormalized: true while an active, unexpired featured listing exists.
    pub featured: bool,
    /// Denormalized: latest expiry among active featured listings.
    pub featured_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Business {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBusiness {
    pub name: String,
    pub owner_id: String,
    #[serde(default = "default_status")]
    pub status: ApprovalStatus,
}

fn default_status() -> ApprovalStatus {
    ApprovalStatus::Pending
}
