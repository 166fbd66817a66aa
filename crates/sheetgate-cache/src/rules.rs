//! The authoritative invalidation rule table.
//!
//! Maps a `WriteEvent` onto the set of dependency tags it invalidates.
//! Entries are tagged with these same strings at `put` time so invalidation
//! never needs to scan every key.

use sheetgate_core::WriteEvent;

/// Dependency tags invalidated by `event`, scoped to the event's own tenant.
/// `sheet:{title}` and `row:{id}` tags are materialized with the event's
/// own sheet title / row id.
pub fn tags_for(event: &WriteEvent) -> Vec<String> {
    match event {
        WriteEvent::SheetWrite { sheet_title, .. } => vec![
            "insights".to_string(),
            "summary".to_string(),
            "config".to_string(),
            "run_logs".to_string(),
            format!("sheet:{sheet_title}"),
        ],
        WriteEvent::RowAdd { sheet_title, .. } => vec![
            "aggregated-insights".to_string(),
            format!("sheet:{sheet_title}"),
            "summary".to_string(),
        ],
        WriteEvent::RowUpdate {
            sheet_title,
            row_id,
            ..
        } => vec![
            format!("sheet:{sheet_title}"),
            format!("row:{row_id}"),
            "aggregated-insights".to_string(),
        ],
        WriteEvent::RowDelete { sheet_title, .. } => vec![
            format!("sheet:{sheet_title}"),
            "aggregated-insights".to_string(),
        ],
        WriteEvent::ConfigUpdate { .. } => vec![
            "insights".to_string(),
            "summary".to_string(),
            "config".to_string(),
        ],
        // tenant:remove clears everything for the tenant; the caller
        // handles this case directly via `invalidate_tenant` rather than a
        // tag set, since "all entries" isn't expressible as a tag.
        WriteEvent::TenantRemove { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_write_invalidates_the_documented_tags() {
        let event = WriteEvent::SheetWrite {
            tenant_id: "t1".into(),
            sheet_title: "METRICS".into(),
        };
        let tags = tags_for(&event);
        assert!(tags.contains(&"insights".to_string()));
        assert!(tags.contains(&"sheet:METRICS".to_string()));
        assert_eq!(tags.len(), 5);
    }

    #[test]
    fn row_update_tags_include_the_specific_row() {
        let event = WriteEvent::RowUpdate {
            tenant_id: "t1".into(),
            sheet_title: "S".into(),
            row_id: "r42".into(),
        };
        let tags = tags_for(&event);
        assert!(tags.contains(&"row:r42".to_string()));
    }
}
