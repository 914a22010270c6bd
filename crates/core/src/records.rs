//! Relational record shapes the provisioning sagas read and write.
//!
//! Only the fields the sagas and the session resolver touch are modelled;
//! the rest of a row is presentation data and passes through untouched.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    DocumentId, DomainError, EmployeeId, EmployeeStorage, Entity, IdentityId, Role, StorageLocation,
};

/// Collection (table) names in the relational store.
pub mod collections {
    pub const USERS: &str = "users";
    pub const EMPLOYEES: &str = "employees";
    pub const DOCUMENTS: &str = "documents";
    pub const STORAGE_POLICIES: &str = "storage_policies";
}

/// Field names used in filters and patches.
pub mod fields {
    pub const IDENTITY_ID: &str = "identity_id";
    pub const EMPLOYEE_ID: &str = "employee_id";
    pub const DOCUMENT_ID: &str = "document_id";
    pub const AREA: &str = "area";
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Pending => "pending",
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "pending" => Ok(UserStatus::Pending),
            other => Err(DomainError::unknown_tag("user status", other)),
        }
    }
}

/// Row in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub identity_id: IdentityId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    #[serde(default)]
    pub created_by: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for UserRecord {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.identity_id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Employees
// ─────────────────────────────────────────────────────────────────────────────

/// Profile fields supplied when an employee is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub email: String,
    pub designation: String,
}

/// Row in the `employees` collection.
///
/// `storage` records where the employee's area was provisioned, so later
/// readers never need to re-derive it from the (renameable) business id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub email: String,
    pub designation: String,
    #[serde(default)]
    pub identity_id: Option<IdentityId>,
    pub storage: EmployeeStorage,
    pub created_at: DateTime<Utc>,
}

impl EmployeeRecord {
    pub fn from_new(new: NewEmployee, storage: EmployeeStorage, created_at: DateTime<Utc>) -> Self {
        Self {
            employee_id: new.employee_id,
            full_name: new.full_name,
            email: new.email,
            designation: new.designation,
            identity_id: None,
            storage,
            created_at,
        }
    }
}

impl Entity for EmployeeRecord {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.employee_id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// KYC document categories accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "aadhar")]
    Aadhar,
    #[serde(rename = "pan")]
    Pan,
    #[serde(rename = "10th_marksheet")]
    TenthMarksheet,
    #[serde(rename = "12th_marksheet")]
    TwelfthMarksheet,
    #[serde(rename = "ug_degree")]
    UgDegree,
    #[serde(rename = "pg_degree")]
    PgDegree,
    #[serde(rename = "diploma")]
    Diploma,
    #[serde(rename = "other_certificate")]
    OtherCertificate,
    #[serde(rename = "bank_passbook")]
    BankPassbook,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::Aadhar,
        DocumentType::Pan,
        DocumentType::TenthMarksheet,
        DocumentType::TwelfthMarksheet,
        DocumentType::UgDegree,
        DocumentType::PgDegree,
        DocumentType::Diploma,
        DocumentType::OtherCertificate,
        DocumentType::BankPassbook,
    ];

    /// Tag used in storage paths and the `document_type` column.
    pub fn tag(self) -> &'static str {
        match self {
            DocumentType::Aadhar => "aadhar",
            DocumentType::Pan => "pan",
            DocumentType::TenthMarksheet => "10th_marksheet",
            DocumentType::TwelfthMarksheet => "12th_marksheet",
            DocumentType::UgDegree => "ug_degree",
            DocumentType::PgDegree => "pg_degree",
            DocumentType::Diploma => "diploma",
            DocumentType::OtherCertificate => "other_certificate",
            DocumentType::BankPassbook => "bank_passbook",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentType::Aadhar => "Aadhar Card",
            DocumentType::Pan => "PAN Card",
            DocumentType::TenthMarksheet => "10th Marksheet",
            DocumentType::TwelfthMarksheet => "12th Marksheet",
            DocumentType::UgDegree => "UG Degree",
            DocumentType::PgDegree => "PG Degree",
            DocumentType::Diploma => "Diploma",
            DocumentType::OtherCertificate => "Other Course Certificate",
            DocumentType::BankPassbook => "Bank Passbook (Front Page)",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| DomainError::unknown_tag("document type", s))
    }
}

/// Row in the `documents` collection.
///
/// `location` must point at a blob that was successfully written; the upload
/// saga only inserts this row after the blob exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub owner: IdentityId,
    pub employee_id: EmployeeId,
    pub document_type: DocumentType,
    pub file_name: String,
    pub location: StorageLocation,
    pub content_type: String,
    pub uploaded_by: IdentityId,
    pub uploaded_at: DateTime<Utc>,
}

impl Entity for DocumentRecord {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.document_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_tags_round_trip_through_from_str() {
        for t in DocumentType::ALL {
            assert_eq!(t.tag().parse::<DocumentType>().unwrap(), t);
        }
        assert!("passport".parse::<DocumentType>().is_err());
    }

    #[test]
    fn document_type_serializes_as_tag() {
        let json = serde_json::to_string(&DocumentType::TwelfthMarksheet).unwrap();
        assert_eq!(json, "\"12th_marksheet\"");
    }

    #[test]
    fn user_status_parses_case_insensitively() {
        assert_eq!("Inactive".parse::<UserStatus>().unwrap(), UserStatus::Inactive);
        assert!(matches!(
            "banned".parse::<UserStatus>(),
            Err(DomainError::UnknownTag { kind: "user status", .. })
        ));
    }

    #[test]
    fn user_record_tolerates_missing_optional_links() {
        let json = serde_json::json!({
            "identity_id": IdentityId::new(),
            "username": "asha",
            "email": "asha@example.com",
            "role": "hr",
            "status": "pending",
            "created_at": Utc::now(),
        });
        let record: UserRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.employee_id, None);
        assert_eq!(record.status, UserStatus::Pending);
        assert_eq!(record.role.as_str(), "hr");
    }
}
