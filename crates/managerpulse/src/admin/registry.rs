//! Declarative admin configuration, one static record per entity.

use crate::domain::{Choice, Confidence, EntityKind, JobSource, ReviewDuration, Sentiment, WouldWorkAgain};
use crate::interchange::resource::{
    Resource, COMPANY_RESOURCE, JOB_POSTING_RESOURCE, MANAGER_RESOURCE, REVIEW_RESOURCE,
};

pub const SITE_HEADER: &str = "ManagerPulse Admin";
pub const SITE_TITLE: &str = "ManagerPulse Admin Portal";
pub const INDEX_TITLE: &str = "Welcome to ManagerPulse Admin";

/// Rows per change-list page.
pub const LIST_PER_PAGE: i64 = 100;

pub type Choices = &'static [(&'static str, &'static str)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Plain value read from the record.
    Field,
    /// Stored code rendered through its label.
    Choice(Choices),
    Timestamp,
    /// Foreign key rendered through the related record's label.
    ForeignKey(EntityKind),
    /// Number of `entity` rows pointing at this record via `fk_column`.
    RelatedCount {
        entity: EntityKind,
        fk_column: &'static str,
    },
    /// The record's derived score, one decimal.
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ColumnKind,
    /// SQL used when ordering by this column; `None` means not sortable.
    pub sort: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Boolean,
    Choice(Choices),
    /// Distinct non-null values found in the data.
    Values,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Query-string parameter, e.g. `company__industry`.
    pub param: &'static str,
    pub label: &'static str,
    pub kind: FilterKind,
    pub expr: &'static str,
}

/// A searchable lookup and the SQL it compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchField {
    pub lookup: &'static str,
    pub expr: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fieldset {
    pub name: Option<&'static str>,
    pub fields: &'static [&'static str],
    pub collapsed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inline {
    pub entity: EntityKind,
    pub fk_column: &'static str,
    pub fields: &'static [&'static str],
    pub readonly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminAction {
    DeleteSelected,
    RecomputeAggregates,
}

impl AdminAction {
    pub fn name(self) -> &'static str {
        match self {
            AdminAction::DeleteSelected => "delete_selected",
            AdminAction::RecomputeAggregates => "recompute_aggregates",
        }
    }

    pub fn description(self, admin: &EntityAdmin) -> String {
        match self {
            AdminAction::DeleteSelected => {
                format!("Delete selected {}", admin.verbose_name_plural.to_lowercase())
            }
            AdminAction::RecomputeAggregates => "Recompute aggregates".to_string(),
        }
    }
}

/// Everything the generic admin surface knows about one entity.
#[derive(Debug)]
pub struct EntityAdmin {
    pub kind: EntityKind,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    /// SQL expression producing the record label over alias `t` and `joins`.
    pub label_sql: &'static str,
    pub joins: &'static [&'static str],
    pub list_display: &'static [Column],
    pub list_filter: &'static [Filter],
    pub search_fields: &'static [SearchField],
    pub ordering: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    pub autocomplete_fields: &'static [&'static str],
    pub fieldsets: &'static [Fieldset],
    pub field_labels: &'static [(&'static str, &'static str)],
    pub field_choices: &'static [(&'static str, Choices)],
    pub inlines: &'static [Inline],
    pub actions: &'static [AdminAction],
    pub resource: Option<&'static Resource>,
}

impl EntityAdmin {
    pub fn for_kind(kind: EntityKind) -> &'static EntityAdmin {
        match kind {
            EntityKind::Company => &COMPANY_ADMIN,
            EntityKind::Manager => &MANAGER_ADMIN,
            EntityKind::JobPosting => &JOB_POSTING_ADMIN,
            EntityKind::Review => &REVIEW_ADMIN,
            EntityKind::CompanyAggregate => &COMPANY_AGGREGATE_ADMIN,
        }
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.list_display.iter().find(|column| column.name == name)
    }

    pub fn filter(&self, param: &str) -> Option<&'static Filter> {
        self.list_filter.iter().find(|filter| filter.param == param)
    }

    pub fn action(&self, name: &str) -> Option<AdminAction> {
        self.actions.iter().copied().find(|action| action.name() == name)
    }

    pub fn is_readonly(&self, field: &str) -> bool {
        self.readonly_fields.contains(&field)
    }

    pub fn field_choices(&self, field: &str) -> Option<Choices> {
        self.field_choices
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, choices)| *choices)
    }

    /// Verbose label of a form field, falling back to the humanized name.
    pub fn field_label(&self, field: &str) -> String {
        self.field_labels
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| humanize(field))
    }

    pub fn joins_sql(&self) -> String {
        self.joins.join(" ")
    }
}

/// Entity referenced by a foreign-key form field.
pub fn foreign_key_target(field: &str) -> Option<EntityKind> {
    match field {
        "company" => Some(EntityKind::Company),
        "manager" => Some(EntityKind::Manager),
        _ => None,
    }
}

/// `work_life_balance` -> `Work life balance`.
pub fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const JOIN_COMPANY: &str = "LEFT JOIN companies company ON company.id = t.company_id";
const JOIN_MANAGER: &str = "LEFT JOIN managers manager ON manager.id = t.manager_id";

/// Choices offered by boolean filters.
pub const BOOLEAN_CHOICES: Choices = &[("1", "Yes"), ("0", "No")];

const TIMESTAMP_FIELDS: Fieldset = Fieldset {
    name: Some("Timestamps"),
    fields: &["created_at", "updated_at"],
    collapsed: true,
};

const RATING_FIELDS: &[&str] = &[
    "autonomy",
    "feedback_quality",
    "clarity",
    "fairness",
    "work_life_balance",
];

const fn field(name: &'static str, label: &'static str, sort: &'static str) -> Column {
    Column {
        name,
        label,
        kind: ColumnKind::Field,
        sort: Some(sort),
    }
}

const fn timestamp(name: &'static str, label: &'static str, sort: &'static str) -> Column {
    Column {
        name,
        label,
        kind: ColumnKind::Timestamp,
        sort: Some(sort),
    }
}

pub static COMPANY_ADMIN: EntityAdmin = EntityAdmin {
    kind: EntityKind::Company,
    verbose_name: "Company",
    verbose_name_plural: "Companies",
    label_sql: "t.name",
    joins: &[],
    list_display: &[
        field("name", "Name", "t.name"),
        field("city", "City", "t.city"),
        field("region", "Region", "t.region"),
        field("industry", "Industry", "t.industry"),
        field("size", "Size", "t.size"),
        Column {
            name: "job_count",
            label: "Jobs",
            kind: ColumnKind::RelatedCount {
                entity: EntityKind::JobPosting,
                fk_column: "company_id",
            },
            sort: None,
        },
        Column {
            name: "manager_count",
            label: "Managers",
            kind: ColumnKind::RelatedCount {
                entity: EntityKind::Manager,
                fk_column: "company_id",
            },
            sort: None,
        },
        timestamp("created_at", "Created at", "t.created_at"),
    ],
    list_filter: &[
        Filter {
            param: "industry",
            label: "Industry",
            kind: FilterKind::Values,
            expr: "t.industry",
        },
        Filter {
            param: "size",
            label: "Size",
            kind: FilterKind::Values,
            expr: "t.size",
        },
        Filter {
            param: "region",
            label: "Region",
            kind: FilterKind::Values,
            expr: "t.region",
        },
        Filter {
            param: "country",
            label: "Country",
            kind: FilterKind::Values,
            expr: "t.country",
        },
    ],
    search_fields: &[
        SearchField {
            lookup: "name",
            expr: "t.name",
        },
        SearchField {
            lookup: "domain",
            expr: "t.domain",
        },
        SearchField {
            lookup: "city",
            expr: "t.city",
        },
    ],
    ordering: &["-created_at"],
    readonly_fields: &["created_at", "updated_at"],
    autocomplete_fields: &[],
    fieldsets: &[
        Fieldset {
            name: Some("Basic Info"),
            fields: &["name", "domain", "industry", "size"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Location"),
            fields: &["lat", "lng", "city", "region", "country"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Branding"),
            fields: &["logo_url"],
            collapsed: false,
        },
        TIMESTAMP_FIELDS,
    ],
    field_labels: &[("lat", "Latitude"), ("lng", "Longitude"), ("logo_url", "Logo URL")],
    field_choices: &[],
    inlines: &[
        Inline {
            entity: EntityKind::Manager,
            fk_column: "company_id",
            fields: &["display_name", "title", "team", "is_verified"],
            readonly: false,
        },
        Inline {
            entity: EntityKind::JobPosting,
            fk_column: "company_id",
            fields: &["title", "team", "location", "is_remote", "url"],
            readonly: false,
        },
    ],
    actions: &[AdminAction::DeleteSelected, AdminAction::RecomputeAggregates],
    resource: Some(&COMPANY_RESOURCE),
};

pub static MANAGER_ADMIN: EntityAdmin = EntityAdmin {
    kind: EntityKind::Manager,
    verbose_name: "Manager",
    verbose_name_plural: "Managers",
    label_sql: "COALESCE(t.display_name, 'Manager') || ' at ' || company.name",
    joins: &[JOIN_COMPANY],
    list_display: &[
        field("display_name", "Display name", "t.display_name"),
        Column {
            name: "company",
            label: "Company",
            kind: ColumnKind::ForeignKey(EntityKind::Company),
            sort: Some("company.name"),
        },
        field("title", "Title", "t.title"),
        field("team", "Team", "t.team"),
        field("is_verified", "Is verified", "t.is_verified"),
        Column {
            name: "review_count",
            label: "Reviews",
            kind: ColumnKind::RelatedCount {
                entity: EntityKind::Review,
                fk_column: "manager_id",
            },
            sort: None,
        },
        timestamp("created_at", "Created at", "t.created_at"),
    ],
    list_filter: &[
        Filter {
            param: "is_verified",
            label: "Is verified",
            kind: FilterKind::Boolean,
            expr: "t.is_verified",
        },
        Filter {
            param: "company__industry",
            label: "Company industry",
            kind: FilterKind::Values,
            expr: "company.industry",
        },
    ],
    search_fields: &[
        SearchField {
            lookup: "display_name",
            expr: "t.display_name",
        },
        SearchField {
            lookup: "title",
            expr: "t.title",
        },
        SearchField {
            lookup: "team",
            expr: "t.team",
        },
        SearchField {
            lookup: "company__name",
            expr: "company.name",
        },
    ],
    ordering: &["-created_at"],
    readonly_fields: &["created_at", "updated_at"],
    autocomplete_fields: &["company"],
    fieldsets: &[
        Fieldset {
            name: Some("Basic Info"),
            fields: &["company", "display_name", "title", "team", "location"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Verification"),
            fields: &["is_verified"],
            collapsed: false,
        },
        TIMESTAMP_FIELDS,
    ],
    field_labels: &[],
    field_choices: &[],
    inlines: &[Inline {
        entity: EntityKind::Review,
        fk_column: "manager_id",
        fields: &[
            "autonomy",
            "feedback_quality",
            "clarity",
            "fairness",
            "work_life_balance",
            "sentiment",
        ],
        readonly: true,
    }],
    actions: &[AdminAction::DeleteSelected],
    resource: Some(&MANAGER_RESOURCE),
};

pub static JOB_POSTING_ADMIN: EntityAdmin = EntityAdmin {
    kind: EntityKind::JobPosting,
    verbose_name: "Job posting",
    verbose_name_plural: "Job postings",
    label_sql: "t.title || ' at ' || company.name",
    joins: &[JOIN_COMPANY],
    list_display: &[
        field("title", "Title", "t.title"),
        Column {
            name: "company",
            label: "Company",
            kind: ColumnKind::ForeignKey(EntityKind::Company),
            sort: Some("company.name"),
        },
        field("team", "Team", "t.team"),
        field("location", "Location", "t.location"),
        field("is_remote", "Is remote", "t.is_remote"),
        Column {
            name: "source",
            label: "Source",
            kind: ColumnKind::Choice(JobSource::CHOICES),
            sort: Some("t.source"),
        },
        timestamp("created_at", "Created at", "t.created_at"),
    ],
    list_filter: &[
        Filter {
            param: "is_remote",
            label: "Is remote",
            kind: FilterKind::Boolean,
            expr: "t.is_remote",
        },
        Filter {
            param: "source",
            label: "Source",
            kind: FilterKind::Choice(JobSource::CHOICES),
            expr: "t.source",
        },
        Filter {
            param: "company__industry",
            label: "Company industry",
            kind: FilterKind::Values,
            expr: "company.industry",
        },
    ],
    search_fields: &[
        SearchField {
            lookup: "title",
            expr: "t.title",
        },
        SearchField {
            lookup: "team",
            expr: "t.team",
        },
        SearchField {
            lookup: "company__name",
            expr: "company.name",
        },
        SearchField {
            lookup: "location",
            expr: "t.location",
        },
    ],
    ordering: &["-created_at"],
    readonly_fields: &["created_at", "updated_at"],
    autocomplete_fields: &["company"],
    fieldsets: &[Fieldset {
        name: None,
        fields: &[
            "company",
            "title",
            "team",
            "location",
            "lat",
            "lng",
            "is_remote",
            "source",
            "url",
            "salary",
            "created_at",
            "updated_at",
        ],
        collapsed: false,
    }],
    field_labels: &[("lat", "Latitude"), ("lng", "Longitude"), ("url", "URL")],
    field_choices: &[("source", JobSource::CHOICES)],
    inlines: &[],
    actions: &[AdminAction::DeleteSelected],
    resource: Some(&JOB_POSTING_RESOURCE),
};

pub static REVIEW_ADMIN: EntityAdmin = EntityAdmin {
    kind: EntityKind::Review,
    verbose_name: "Review",
    verbose_name_plural: "Reviews",
    label_sql: "'Review for ' || company.name",
    joins: &[JOIN_COMPANY, JOIN_MANAGER],
    list_display: &[
        Column {
            name: "company",
            label: "Company",
            kind: ColumnKind::ForeignKey(EntityKind::Company),
            sort: Some("company.name"),
        },
        Column {
            name: "manager",
            label: "Manager",
            kind: ColumnKind::ForeignKey(EntityKind::Manager),
            sort: Some("manager.display_name"),
        },
        Column {
            name: "avg_score",
            label: "Avg Score",
            kind: ColumnKind::Score,
            sort: None,
        },
        Column {
            name: "sentiment",
            label: "Sentiment",
            kind: ColumnKind::Choice(Sentiment::CHOICES),
            sort: Some("t.sentiment"),
        },
        Column {
            name: "would_work_again",
            label: "Would work again",
            kind: ColumnKind::Choice(WouldWorkAgain::CHOICES),
            sort: Some("t.would_work_again"),
        },
        timestamp("created_at", "Created at", "t.created_at"),
    ],
    list_filter: &[
        Filter {
            param: "sentiment",
            label: "Sentiment",
            kind: FilterKind::Choice(Sentiment::CHOICES),
            expr: "t.sentiment",
        },
        Filter {
            param: "would_work_again",
            label: "Would work again",
            kind: FilterKind::Choice(WouldWorkAgain::CHOICES),
            expr: "t.would_work_again",
        },
        Filter {
            param: "duration",
            label: "Duration",
            kind: FilterKind::Choice(ReviewDuration::CHOICES),
            expr: "t.duration",
        },
    ],
    search_fields: &[
        SearchField {
            lookup: "company__name",
            expr: "company.name",
        },
        SearchField {
            lookup: "manager__display_name",
            expr: "manager.display_name",
        },
        SearchField {
            lookup: "summary",
            expr: "t.summary",
        },
    ],
    ordering: &["-created_at"],
    readonly_fields: &["created_at"],
    autocomplete_fields: &["company", "manager"],
    fieldsets: &[
        Fieldset {
            name: Some("Target"),
            fields: &["company", "manager"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Ratings (1-5)"),
            fields: RATING_FIELDS,
            collapsed: false,
        },
        Fieldset {
            name: Some("Feedback"),
            fields: &["duration", "sentiment", "would_work_again", "tags", "summary"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Timestamps"),
            fields: &["created_at"],
            collapsed: true,
        },
    ],
    field_labels: &[],
    field_choices: &[
        ("duration", ReviewDuration::CHOICES),
        ("sentiment", Sentiment::CHOICES),
        ("would_work_again", WouldWorkAgain::CHOICES),
    ],
    inlines: &[],
    actions: &[AdminAction::DeleteSelected],
    resource: Some(&REVIEW_RESOURCE),
};

pub static COMPANY_AGGREGATE_ADMIN: EntityAdmin = EntityAdmin {
    kind: EntityKind::CompanyAggregate,
    verbose_name: "Company Aggregate",
    verbose_name_plural: "Company Aggregates",
    label_sql: "'Aggregate for ' || company.name",
    joins: &[JOIN_COMPANY],
    list_display: &[
        Column {
            name: "company",
            label: "Company",
            kind: ColumnKind::ForeignKey(EntityKind::Company),
            sort: Some("company.name"),
        },
        field("n_contributors", "Number of Contributors", "t.n_contributors"),
        Column {
            name: "overall",
            label: "Overall Score",
            kind: ColumnKind::Score,
            sort: None,
        },
        Column {
            name: "confidence",
            label: "Confidence",
            kind: ColumnKind::Choice(Confidence::CHOICES),
            sort: Some("t.confidence"),
        },
        field("is_publishable", "Is publishable", "t.is_publishable"),
        timestamp("updated_at", "Updated at", "t.updated_at"),
    ],
    list_filter: &[
        Filter {
            param: "confidence",
            label: "Confidence",
            kind: FilterKind::Choice(Confidence::CHOICES),
            expr: "t.confidence",
        },
        Filter {
            param: "is_publishable",
            label: "Is publishable",
            kind: FilterKind::Boolean,
            expr: "t.is_publishable",
        },
    ],
    search_fields: &[SearchField {
        lookup: "company__name",
        expr: "company.name",
    }],
    ordering: &["-updated_at"],
    readonly_fields: &["updated_at"],
    autocomplete_fields: &["company"],
    fieldsets: &[
        Fieldset {
            name: Some("Company"),
            fields: &["company"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Statistics"),
            fields: &["n_contributors", "confidence", "is_publishable"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Average Scores"),
            fields: &[
                "avg_autonomy",
                "avg_feedback_quality",
                "avg_clarity",
                "avg_fairness",
                "avg_work_life_balance",
            ],
            collapsed: false,
        },
        Fieldset {
            name: Some("AI-Generated Content"),
            fields: &["public_summary", "top_tags", "best_for", "hard_for"],
            collapsed: false,
        },
        Fieldset {
            name: Some("Timestamps"),
            fields: &["updated_at"],
            collapsed: true,
        },
    ],
    field_labels: &[("n_contributors", "Number of Contributors")],
    field_choices: &[("confidence", Confidence::CHOICES)],
    inlines: &[],
    actions: &[AdminAction::DeleteSelected, AdminAction::RecomputeAggregates],
    resource: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entity_is_registered_under_its_own_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityAdmin::for_kind(kind).kind, kind);
        }
    }

    #[test]
    fn default_ordering_refers_to_sortable_columns() {
        for kind in EntityKind::ALL {
            let admin = EntityAdmin::for_kind(kind);
            for term in admin.ordering {
                let name = term.trim_start_matches('-');
                let column = admin.column(name).expect("ordering column is listed");
                assert!(column.sort.is_some(), "{kind}: {name} must be sortable");
            }
        }
    }

    #[test]
    fn readonly_and_autocomplete_fields_appear_in_fieldsets() {
        for kind in EntityKind::ALL {
            let admin = EntityAdmin::for_kind(kind);
            let form_fields: Vec<&str> = admin
                .fieldsets
                .iter()
                .flat_map(|fieldset| fieldset.fields.iter().copied())
                .collect();
            for field in admin.readonly_fields.iter().chain(admin.autocomplete_fields) {
                assert!(form_fields.contains(field), "{kind}: {field} missing from form");
            }
        }
    }

    #[test]
    fn aggregates_have_no_resource_and_labels_fall_back_to_humanized_names() {
        assert!(COMPANY_AGGREGATE_ADMIN.resource.is_none());
        assert_eq!(COMPANY_ADMIN.field_label("lat"), "Latitude");
        assert_eq!(REVIEW_ADMIN.field_label("work_life_balance"), "Work life balance");
    }

    #[test]
    fn foreign_key_columns_point_at_their_targets() {
        for kind in EntityKind::ALL {
            for column in EntityAdmin::for_kind(kind).list_display {
                if let ColumnKind::ForeignKey(target) = column.kind {
                    assert_eq!(foreign_key_target(column.name), Some(target));
                }
            }
        }
        assert_eq!(foreign_key_target("title"), None);
    }
}
