//! Field mappings used when records are exchanged as files.

use crate::domain::EntityKind;

/// How a cell is turned back into a typed value on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Int,
    Float,
    Bool,
    Text,
    /// Stored code from a closed vocabulary; blank means absent.
    Choice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceField {
    pub name: &'static str,
    pub cell: CellType,
}

#[derive(Debug)]
pub struct Resource {
    pub kind: EntityKind,
    /// Exported columns, in order. `id` always comes first.
    pub fields: &'static [ResourceField],
    /// Rows identical to the stored record are not re-written.
    pub skip_unchanged: bool,
    /// Skipped rows are listed in the import report.
    pub report_skipped: bool,
}

impl Resource {
    pub fn for_kind(kind: EntityKind) -> Option<&'static Resource> {
        match kind {
            EntityKind::Company => Some(&COMPANY_RESOURCE),
            EntityKind::Manager => Some(&MANAGER_RESOURCE),
            EntityKind::JobPosting => Some(&JOB_POSTING_RESOURCE),
            EntityKind::Review => Some(&REVIEW_RESOURCE),
            EntityKind::CompanyAggregate => None,
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.fields.iter().map(|field| field.name).collect()
    }
}

const fn cell(name: &'static str, cell: CellType) -> ResourceField {
    ResourceField { name, cell }
}

pub static COMPANY_RESOURCE: Resource = Resource {
    kind: EntityKind::Company,
    fields: &[
        cell("id", CellType::Int),
        cell("name", CellType::Text),
        cell("domain", CellType::Text),
        cell("lat", CellType::Float),
        cell("lng", CellType::Float),
        cell("city", CellType::Text),
        cell("region", CellType::Text),
        cell("country", CellType::Text),
        cell("logo_url", CellType::Text),
        cell("industry", CellType::Text),
        cell("size", CellType::Text),
    ],
    skip_unchanged: true,
    report_skipped: true,
};

pub static MANAGER_RESOURCE: Resource = Resource {
    kind: EntityKind::Manager,
    fields: &[
        cell("id", CellType::Int),
        cell("company", CellType::Int),
        cell("display_name", CellType::Text),
        cell("title", CellType::Text),
        cell("team", CellType::Text),
        cell("location", CellType::Text),
        cell("is_verified", CellType::Bool),
    ],
    skip_unchanged: true,
    report_skipped: true,
};

pub static JOB_POSTING_RESOURCE: Resource = Resource {
    kind: EntityKind::JobPosting,
    fields: &[
        cell("id", CellType::Int),
        cell("company", CellType::Int),
        cell("title", CellType::Text),
        cell("team", CellType::Text),
        cell("location", CellType::Text),
        cell("lat", CellType::Float),
        cell("lng", CellType::Float),
        cell("is_remote", CellType::Bool),
        cell("source", CellType::Choice),
        cell("url", CellType::Text),
        cell("salary", CellType::Text),
    ],
    skip_unchanged: true,
    report_skipped: true,
};

pub static REVIEW_RESOURCE: Resource = Resource {
    kind: EntityKind::Review,
    fields: &[
        cell("id", CellType::Int),
        cell("company", CellType::Int),
        cell("manager", CellType::Int),
        cell("autonomy", CellType::Int),
        cell("feedback_quality", CellType::Int),
        cell("clarity", CellType::Int),
        cell("fairness", CellType::Int),
        cell("work_life_balance", CellType::Int),
        cell("duration", CellType::Choice),
        cell("sentiment", CellType::Choice),
        cell("would_work_again", CellType::Choice),
        cell("tags", CellType::Text),
        cell("summary", CellType::Text),
    ],
    skip_unchanged: true,
    report_skipped: true,
};
