//! Static field catalog
//!
//! Enumerates the fields a host can request, their declared result type,
//! display units and flags. Compare fields share the same list, offset by
//! [`COMPARE_BASE_INDEX`].

use crate::backend::DocumentQuery;
use crate::relay::types::ValueType;

/// First index of the compare-by-content fields
pub const COMPARE_BASE_INDEX: i32 = 10_000;

/// Units offered for page dimensions, in unit-index order
pub const PAGE_SIZE_UNITS: &str = "mm|cm|in|pt";

/// Flag: host substitutes the attribute string for this field
pub const FLAG_SUBST_ATTRIBUTE_STR: i32 = 12;

/// Mask of all substitution flags
pub const FLAG_SUBST_MASK: i32 = 14;

/// Fields, in host index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Subject,
    Keywords,
    Author,
    Application,
    Producer,
    DocumentStart,
    FirstRow,
    NumberOfPages,
    Version,
    PageWidth,
    PageHeight,
    CopyingAllowed,
    PrintingAllowed,
    AddingCommentsAllowed,
    ChangingAllowed,
    Encrypted,
    Tagged,
    Linearized,
    Incremental,
    SignatureField,
    Created,
    Modified,
    Id,
    Attributes,
    Text,
}

/// How a field is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One backend query, no traversal
    Single,
    /// Traversal until the buffer is full
    Bounded,
    /// Traversal until the first line terminator
    Line,
    /// Traversal delivered chunk by chunk until the caller stops it
    Streaming,
}

impl Field {
    pub const ALL: [Field; 26] = [
        Field::Title,
        Field::Subject,
        Field::Keywords,
        Field::Author,
        Field::Application,
        Field::Producer,
        Field::DocumentStart,
        Field::FirstRow,
        Field::NumberOfPages,
        Field::Version,
        Field::PageWidth,
        Field::PageHeight,
        Field::CopyingAllowed,
        Field::PrintingAllowed,
        Field::AddingCommentsAllowed,
        Field::ChangingAllowed,
        Field::Encrypted,
        Field::Tagged,
        Field::Linearized,
        Field::Incremental,
        Field::SignatureField,
        Field::Created,
        Field::Modified,
        Field::Id,
        Field::Attributes,
        Field::Text,
    ];

    pub fn from_index(index: i32) -> Option<Field> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(self) -> i32 {
        self as i32
    }

    /// Look a field up by display name, case-insensitively
    pub fn from_name(name: &str) -> Option<Field> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name) || f.slug() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Subject => "Subject",
            Field::Keywords => "Keywords",
            Field::Author => "Author",
            Field::Application => "Application",
            Field::Producer => "PDF Producer",
            Field::DocumentStart => "Document Start",
            Field::FirstRow => "First Row",
            Field::NumberOfPages => "Number Of Pages",
            Field::Version => "PDF Version",
            Field::PageWidth => "Page Width",
            Field::PageHeight => "Page Height",
            Field::CopyingAllowed => "Copying Allowed",
            Field::PrintingAllowed => "Printing Allowed",
            Field::AddingCommentsAllowed => "Adding Comments Allowed",
            Field::ChangingAllowed => "Changing Allowed",
            Field::Encrypted => "Encrypted",
            Field::Tagged => "Tagged",
            Field::Linearized => "Linearized",
            Field::Incremental => "Incremental",
            Field::SignatureField => "Signature Field",
            Field::Created => "Created",
            Field::Modified => "Modified",
            Field::Id => "ID",
            Field::Attributes => "PDF Attributes",
            Field::Text => "Text",
        }
    }

    /// Lowercase, dash-separated name used on the command line
    pub fn slug(self) -> String {
        self.name().to_ascii_lowercase().replace(' ', "-")
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Field::NumberOfPages => ValueType::Numeric32,
            Field::Version | Field::PageWidth | Field::PageHeight => ValueType::NumericFloating,
            Field::CopyingAllowed
            | Field::PrintingAllowed
            | Field::AddingCommentsAllowed
            | Field::ChangingAllowed
            | Field::Encrypted
            | Field::Tagged
            | Field::Linearized
            | Field::Incremental
            | Field::SignatureField => ValueType::Boolean,
            Field::Created | Field::Modified => ValueType::DateTime,
            Field::Text => ValueType::FullText,
            _ => ValueType::StringW,
        }
    }

    pub fn units(self) -> Option<&'static str> {
        match self {
            Field::PageWidth | Field::PageHeight => Some(PAGE_SIZE_UNITS),
            _ => None,
        }
    }

    pub fn flags(self) -> i32 {
        match self {
            Field::Attributes => FLAG_SUBST_ATTRIBUTE_STR,
            _ => 0,
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::DocumentStart => FieldKind::Bounded,
            Field::FirstRow => FieldKind::Line,
            Field::Text => FieldKind::Streaming,
            _ => FieldKind::Single,
        }
    }

    pub fn is_streaming(self) -> bool {
        self.kind() == FieldKind::Streaming
    }

    /// Backend query answering a single-shot field
    ///
    /// `Attributes` has no query of its own; it is composed from the
    /// permission and structure flags.
    pub fn query(self) -> Option<DocumentQuery> {
        let query = match self {
            Field::Title => DocumentQuery::Info("Title"),
            Field::Subject => DocumentQuery::Info("Subject"),
            Field::Keywords => DocumentQuery::Info("Keywords"),
            Field::Author => DocumentQuery::Info("Author"),
            Field::Application => DocumentQuery::Info("Creator"),
            Field::Producer => DocumentQuery::Info("Producer"),
            Field::NumberOfPages => DocumentQuery::PageCount,
            Field::Version => DocumentQuery::Version,
            Field::PageWidth => DocumentQuery::PageWidthPoints,
            Field::PageHeight => DocumentQuery::PageHeightPoints,
            Field::CopyingAllowed => DocumentQuery::CanCopy,
            Field::PrintingAllowed => DocumentQuery::CanPrint,
            Field::AddingCommentsAllowed => DocumentQuery::CanAddNotes,
            Field::ChangingAllowed => DocumentQuery::CanChange,
            Field::Encrypted => DocumentQuery::Encrypted,
            Field::Tagged => DocumentQuery::Tagged,
            Field::Linearized => DocumentQuery::Linearized,
            Field::Incremental => DocumentQuery::Incremental,
            Field::SignatureField => DocumentQuery::HasSignature,
            Field::Created => DocumentQuery::Date("CreationDate"),
            Field::Modified => DocumentQuery::Date("ModDate"),
            Field::Id => DocumentQuery::Id,
            Field::Attributes | Field::DocumentStart | Field::FirstRow | Field::Text => {
                return None
            }
        };
        Some(query)
    }
}

/// Unit a page dimension is reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Millimeters,
    Centimeters,
    Inches,
    Points,
}

impl SizeUnit {
    pub fn from_unit_index(index: i32) -> Option<SizeUnit> {
        match index {
            0 => Some(SizeUnit::Millimeters),
            1 => Some(SizeUnit::Centimeters),
            2 => Some(SizeUnit::Inches),
            3 => Some(SizeUnit::Points),
            _ => None,
        }
    }

    /// Convert a length in points; unknown units yield 0
    pub fn convert_points(unit: Option<SizeUnit>, points: f64) -> f64 {
        match unit {
            Some(SizeUnit::Millimeters) => points * 0.3528,
            Some(SizeUnit::Centimeters) => points * 0.03528,
            Some(SizeUnit::Inches) => points * 0.0139,
            Some(SizeUnit::Points) => points,
            None => 0.0,
        }
    }
}

/// A catalog entry as reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub units: Option<&'static str>,
    pub value_type: ValueType,
    pub compare: bool,
}

/// Field catalog with host capability switches
#[derive(Debug, Clone, Copy)]
pub struct FieldCatalog {
    /// Host can display date/time values
    pub enable_datetime: bool,
    /// Host supports compare-by-content fields
    pub enable_compare: bool,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self {
            enable_datetime: true,
            enable_compare: true,
        }
    }
}

impl FieldCatalog {
    /// Set capabilities from the host plugin interface version
    pub fn for_interface_version(hi: u32, low: u32) -> Self {
        Self {
            enable_datetime: (hi == 1 && low >= 2) || hi > 1,
            enable_compare: (hi == 2 && low >= 10) || hi > 2,
        }
    }

    /// Entry for a host field index, or `None` past the end of the list
    pub fn supported_field(&self, index: i32) -> Option<FieldInfo> {
        let count = Field::ALL.len() as i32;
        if (COMPARE_BASE_INDEX..COMPARE_BASE_INDEX + count).contains(&index) {
            if !self.enable_compare {
                return None;
            }
            let field = Field::from_index(index - COMPARE_BASE_INDEX)?;
            return Some(FieldInfo {
                name: format!("Compare {}", field.name()),
                units: None,
                value_type: field.value_type(),
                compare: true,
            });
        }

        let field = Field::from_index(index)?;
        if !self.enable_datetime && matches!(field, Field::Created | Field::Modified) {
            return None;
        }
        Some(FieldInfo {
            name: field.name().to_string(),
            units: field.units(),
            value_type: field.value_type(),
            compare: false,
        })
    }

    /// All entries the host should list
    pub fn entries(&self) -> Vec<FieldInfo> {
        Field::ALL
            .iter()
            .filter_map(|f| self.supported_field(f.index()))
            .collect()
    }

    /// Map a compare index to its field
    pub fn compare_field(&self, compare_index: i32) -> Option<Field> {
        Field::from_index(compare_index - COMPARE_BASE_INDEX)
    }
}
