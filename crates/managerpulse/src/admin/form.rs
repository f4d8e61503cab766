//! Change form: one record laid out by its admin fieldsets.

use super::display::{self, render_value};
use super::registry::{foreign_key_target, ColumnKind, EntityAdmin, Inline};
use crate::domain::{FieldValue, Record};
use crate::scoring::format_score;
use crate::store::{self, Conn, StoreError};
use serde::Serialize;
use serde_json::Value;


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeForm {
    pub entity: &'static str,
    pub verbose_name: &'static str,
    pub id: i64,
    pub label: String,
    pub fieldsets: Vec<FieldsetView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreView>,
    pub inlines: Vec<InlineView>,
}

impl ChangeForm {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fieldsets
            .iter()
            .flat_map(|fieldset| fieldset.fields.iter())
            .find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldsetView {
    pub name: Option<&'static str>,
    pub collapsed: bool,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: String,
    /// Stored value as JSON, suitable for sending back in an update.
    pub value: Value,
    pub display: String,
    pub readonly: bool,
    pub autocomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedLink {
    pub entity: &'static str,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreView {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineView {
    pub entity: &'static str,
    pub verbose_name_plural: &'static str,
    pub readonly: bool,
    pub columns: Vec<String>,
    pub rows: Vec<InlineRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineRow {
    pub id: i64,
    pub cells: Vec<String>,
}

pub async fn build<R: Record>(conn: &mut Conn, record: &R) -> Result<ChangeForm, StoreError> {
    let admin = EntityAdmin::for_kind(R::KIND);
    let label = display::labels(conn, R::KIND, [record.id()])
        .await?
        .remove(&record.id())
        .unwrap_or_default();

    let mut fieldsets = Vec::with_capacity(admin.fieldsets.len());
    for fieldset in admin.fieldsets {
        let mut fields = Vec::with_capacity(fieldset.fields.len());
        for &name in fieldset.fields {
            fields.push(form_field(conn, admin, record, name).await?);
        }
        fieldsets.push(FieldsetView {
            name: fieldset.name,
            collapsed: fieldset.collapsed,
            fields,
        });
    }

    let score = admin
        .list_display
        .iter()
        .find(|column| matches!(column.kind, ColumnKind::Score))
        .map(|column| ScoreView {
            label: column.label,
            value: format_score(record.derived_score()),
        });

    let mut inlines = Vec::with_capacity(admin.inlines.len());
    for inline in admin.inlines {
        inlines.push(inline_view(conn, inline, record.id()).await?);
    }

    Ok(ChangeForm {
        entity: admin.kind.slug(),
        verbose_name: admin.verbose_name,
        id: record.id(),
        label,
        fieldsets,
        score,
        inlines,
    })
}

async fn form_field<R: Record>(
    conn: &mut Conn,
    admin: &EntityAdmin,
    record: &R,
    name: &'static str,
) -> Result<FormField, StoreError> {
    let value = record.field(name);

    let (display, related) = match (foreign_key_target(name), &value) {
        (Some(target), FieldValue::Int(id)) => {
            let label = display::labels(conn, target, [*id])
                .await?
                .remove(id)
                .unwrap_or_else(|| id.to_string());
            let link = RelatedLink {
                entity: target.slug(),
                id: *id,
            };
            (label, Some(link))
        }
        _ => (render_value(&value, field_kind(admin, name)), None),
    };

    Ok(FormField {
        name,
        label: admin.field_label(name),
        value: value.to_json(),
        display,
        readonly: admin.is_readonly(name),
        autocomplete: admin.autocomplete_fields.contains(&name),
        choices: admin.field_choices(name).map(|choices| {
            choices
                .iter()
                .map(|&(value, label)| ChoiceOption { value, label })
                .collect()
        }),
        related,
    })
}

fn field_kind(admin: &EntityAdmin, name: &str) -> ColumnKind {
    match admin.field_choices(name) {
        Some(choices) => ColumnKind::Choice(choices),
        None if name.ends_with("_at") => ColumnKind::Timestamp,
        None => ColumnKind::Field,
    }
}

async fn inline_view(
    conn: &mut Conn,
    inline: &Inline,
    parent_id: i64,
) -> Result<InlineView, StoreError> {
    let child_admin = EntityAdmin::for_kind(inline.entity);
    let rows = with_record!(inline.entity, |Child| {
        inline_rows::<Child>(conn, inline, child_admin, parent_id).await?
    });

    Ok(InlineView {
        entity: inline.entity.slug(),
        verbose_name_plural: child_admin.verbose_name_plural,
        readonly: inline.readonly,
        columns: inline
            .fields
            .iter()
            .map(|name| child_admin.field_label(name))
            .collect(),
        rows,
    })
}

async fn inline_rows<R: Record>(
    conn: &mut Conn,
    inline: &Inline,
    child_admin: &EntityAdmin,
    parent_id: i64,
) -> Result<Vec<InlineRow>, StoreError> {
    let children = store::children::<R>(conn, inline.fk_column, parent_id).await?;
    Ok(children
        .iter()
        .map(|child| InlineRow {
            id: child.id(),
            cells: inline
                .fields
                .iter()
                .map(|name| render_value(&child.field(name), field_kind(child_admin, name)))
                .collect(),
        })
        .collect())
}
