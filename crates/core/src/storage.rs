//! Object-store addressing.
//!
//! Every function here is pure: the location a forward step writes to is
//! computed up front and recorded on the relational row, so a compensation
//! (or an operator) can always reconstruct exactly what to remove.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DocumentType, EmployeeId};

/// Name of the marker object that materialises a folder inside a shared area.
pub const FOLDER_MARKER: &str = ".keep";

/// Fallback extension when an uploaded file name carries none.
pub const DEFAULT_EXTENSION: &str = "bin";

/// A single object inside an area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub area: String,
    pub path: String,
}

impl StorageLocation {
    pub fn new(area: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            path: path.into(),
        }
    }
}

impl core::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.area, self.path)
    }
}

/// How per-employee storage is laid out in the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmployeeStorageLayout {
    /// One private area per employee.
    #[default]
    Dedicated,
    /// A folder (marker object) per employee inside one shared area.
    Shared { area: String },
}

impl EmployeeStorageLayout {
    /// Derive the storage an employee is given under this layout.
    pub fn storage_for(&self, employee_id: &EmployeeId) -> EmployeeStorage {
        match self {
            Self::Dedicated => EmployeeStorage::Dedicated {
                area: format!("emp-{}", employee_id.as_str()),
            },
            Self::Shared { area } => EmployeeStorage::Shared {
                marker: StorageLocation::new(
                    area.clone(),
                    format!("{}/{FOLDER_MARKER}", employee_id.as_str()),
                ),
            },
        }
    }
}

/// The storage actually provisioned for an employee (recorded on the row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmployeeStorage {
    Dedicated { area: String },
    Shared { marker: StorageLocation },
}

impl EmployeeStorage {
    /// Area the employee's files live in.
    pub fn area(&self) -> &str {
        match self {
            Self::Dedicated { area } => area,
            Self::Shared { marker } => &marker.area,
        }
    }

    /// Prefix of the employee's files inside [`Self::area`] (empty for a dedicated area).
    pub fn prefix(&self) -> String {
        match self {
            Self::Dedicated { .. } => String::new(),
            Self::Shared { marker } => marker
                .path
                .strip_suffix(FOLDER_MARKER)
                .unwrap_or(&marker.path)
                .to_string(),
        }
    }
}

impl core::fmt::Display for EmployeeStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Dedicated { area } => write!(f, "area {area}"),
            Self::Shared { marker } => write!(f, "folder marker {marker}"),
        }
    }
}

/// Fresh high-entropy disambiguator for a document path.
///
/// Concurrent uploads for one owner are not serialised, so uniqueness rests on
/// this value alone.
pub fn new_disambiguator() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Lower-cased extension of an uploaded file name, or [`DEFAULT_EXTENSION`].
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// `<employee id>_kyc/<document tag>_<disambiguator>.<ext>` inside `area`.
pub fn document_location(
    area: &str,
    employee_id: &EmployeeId,
    document_type: DocumentType,
    file_name: &str,
    disambiguator: &str,
) -> StorageLocation {
    StorageLocation::new(
        area,
        format!(
            "{}_kyc/{}_{}.{}",
            employee_id.as_str(),
            document_type.tag(),
            disambiguator,
            file_extension(file_name)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn emp(raw: &str) -> EmployeeId {
        EmployeeId::parse(raw).unwrap()
    }

    #[test]
    fn dedicated_layout_embeds_business_id() {
        let storage = EmployeeStorageLayout::Dedicated.storage_for(&emp("EMP-7"));
        assert_eq!(storage.area(), "emp-EMP-7");
        assert_eq!(storage.prefix(), "");
    }

    #[test]
    fn shared_layout_uses_marker_folder() {
        let layout = EmployeeStorageLayout::Shared {
            area: "employee_files".to_string(),
        };
        let storage = layout.storage_for(&emp("EMP-7"));
        assert_eq!(storage.area(), "employee_files");
        assert_eq!(storage.prefix(), "EMP-7/");
        let EmployeeStorage::Shared { marker } = storage else {
            panic!("expected shared storage");
        };
        assert_eq!(marker.path, "EMP-7/.keep");
    }

    #[test]
    fn document_path_shape() {
        let loc = document_location(
            "user_documents",
            &emp("E1"),
            DocumentType::TenthMarksheet,
            "Scan.PDF",
            "abc123",
        );
        assert_eq!(loc.area, "user_documents");
        assert_eq!(loc.path, "E1_kyc/10th_marksheet_abc123.pdf");
        assert_eq!(loc.to_string(), "user_documents/E1_kyc/10th_marksheet_abc123.pdf");
    }

    #[test]
    fn extension_falls_back() {
        assert_eq!(file_extension("noext"), "bin");
        assert_eq!(file_extension(".hidden"), "bin");
        assert_eq!(file_extension("weird.ex t"), "bin");
        assert_eq!(file_extension("a.b.PNG"), "png");
    }

    #[test]
    fn disambiguators_do_not_repeat() {
        let a = new_disambiguator();
        let b = new_disambiguator();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    proptest! {
        /// Derivation is a pure function of its inputs.
        #[test]
        fn document_location_is_pure(
            raw in "[A-Za-z0-9_-]{1,20}",
            name in "[a-z]{1,8}\\.[a-z]{1,4}",
            dis in "[a-f0-9]{32}",
        ) {
            let id = emp(&raw);
            let a = document_location("docs", &id, DocumentType::Pan, &name, &dis);
            let b = document_location("docs", &id, DocumentType::Pan, &name, &dis);
            prop_assert_eq!(&a, &b);
            let expected_prefix = format!("{}_kyc/pan_", id.as_str());
            prop_assert!(a.path.starts_with(&expected_prefix));
        }

        /// Distinct employee ids never share a dedicated area.
        #[test]
        fn dedicated_areas_are_injective(a in "[A-Za-z0-9_-]{1,20}", b in "[A-Za-z0-9_-]{1,20}") {
            prop_assume!(a != b);
            let layout = EmployeeStorageLayout::Dedicated;
            prop_assert_ne!(layout.storage_for(&emp(&a)), layout.storage_for(&emp(&b)));
        }
    }
}
