//! Rebuilds the two-level backlog forest from flat relation records.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ReportError;
use crate::model::link::Link;
use crate::model::work_item::{normalize, RawLinkedItem, WorkItem};

/// Ids referenced by a set of links.
#[derive(Debug, Default)]
pub struct LinkedIds {
    /// Distinct source ids in first-seen order: the candidate backlog items.
    pub sources: IndexSet<i64>,
    /// Every id referenced as source or target.
    pub all: IndexSet<i64>,
}

pub fn collect_ids(links: &[Link]) -> LinkedIds {
    let mut ids = LinkedIds::default();
    for link in links {
        if let Some(source) = link.source_id() {
            ids.sources.insert(source);
            ids.all.insert(source);
        }
        if let Some(target) = link.target_id() {
            ids.all.insert(target);
        }
    }
    ids
}

pub struct HierarchyBuilder {
    diagnostics: Arc<dyn Diagnostics>,
}

impl HierarchyBuilder {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { diagnostics }
    }

    /// Build the forest of backlog items for `iteration`.
    ///
    /// Every raw record must normalize; one bad record fails the whole batch.
    /// Roots are the found source ids in first-seen order, each carrying the
    /// items its links target, in link order. A child that is itself a root
    /// is listed only as a root. Deeper levels are not attached.
    pub fn build(
        &self,
        iteration: &str,
        links: &[Link],
        raw_items: &[Option<RawLinkedItem>],
    ) -> Result<Vec<WorkItem>, ReportError> {
        let items = raw_items
            .iter()
            .map(|raw| normalize(raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let ids = collect_ids(links);
        if ids.all.is_empty() {
            self.diagnostics.emit(Diagnostic::NoLinkedItems {
                iteration: iteration.to_string(),
            });
            return Ok(Vec::new());
        }

        let by_id: HashMap<i64, &WorkItem> = items.iter().map(|item| (item.id, item)).collect();
        let roots: IndexSet<i64> = ids
            .sources
            .iter()
            .copied()
            .filter(|id| by_id.contains_key(id))
            .collect();

        let mut forest = Vec::with_capacity(roots.len());
        for source in &ids.sources {
            let Some(root) = by_id.get(source) else {
                self.diagnostics
                    .emit(Diagnostic::BacklogItemNotFound { id: *source });
                continue;
            };

            let mut seen = IndexSet::new();
            let mut children = Vec::new();
            let targets = links
                .iter()
                .filter(|link| link.source_id() == Some(*source))
                .filter_map(Link::target_id)
                .filter(|target| !roots.contains(target) && seen.insert(*target));
            for target in targets {
                match by_id.get(&target) {
                    Some(child) => children.push((*child).clone()),
                    None => self.diagnostics.emit(Diagnostic::ChildItemNotFound {
                        parent: *source,
                        id: target,
                    }),
                }
            }

            forest.push((*root).clone().with_children(children));
        }

        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::model::work_item::FIELD_TITLE;
    use serde_json::json;

    fn raw(id: i64) -> Option<RawLinkedItem> {
        Some(RawLinkedItem {
            id: Some(id),
            fields: json!({ FIELD_TITLE: format!("Item {id}") }).as_object().cloned(),
            url: Some(format!("https://dev.azure.com/acme/_apis/wit/workItems/{id}")),
        })
    }

    fn link(source: i64, target: i64) -> Link {
        Link::new(Some(source), Some(target))
    }

    fn ids(items: &[WorkItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    fn builder() -> (HierarchyBuilder, Arc<RecordingDiagnostics>) {
        let diagnostics = RecordingDiagnostics::new();
        (HierarchyBuilder::new(diagnostics.clone()), diagnostics)
    }

    #[test]
    fn empty_input_is_an_empty_forest_with_a_diagnostic() {
        let (builder, diagnostics) = builder();
        let forest = builder.build("Sprint 7", &[], &[]).unwrap();
        assert!(forest.is_empty());
        assert_eq!(
            diagnostics.events(),
            vec![Diagnostic::NoLinkedItems {
                iteration: "Sprint 7".into()
            }]
        );
    }

    #[test]
    fn children_follow_link_order() {
        let (builder, _) = builder();
        let links = [link(1, 3), link(1, 2)];
        let forest = builder.build("S", &links, &[raw(2), raw(1), raw(3)]).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert_eq!(ids(&forest[0].children), vec![3, 2]);
    }

    #[test]
    fn one_root_with_two_children() {
        let (builder, _) = builder();
        let links = [link(1, 2), link(1, 3)];
        let forest = builder.build("S", &links, &[raw(1), raw(2), raw(3)]).unwrap();

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, 1);
        assert_eq!(ids(&forest[0].children), vec![2, 3]);
        assert_eq!(forest[0].url, "https://dev.azure.com/acme/_workitems/edit/1");
    }

    #[test]
    fn missing_source_item_is_dropped_with_its_children() {
        let (builder, diagnostics) = builder();
        let links = [link(9, 2), link(1, 3)];
        let forest = builder.build("S", &links, &[raw(1), raw(2), raw(3)]).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert_eq!(ids(&forest[0].children), vec![3]);
        assert!(forest.iter().all(|root| root.id != 2 && root.id != 9));
        assert_eq!(
            diagnostics.events(),
            vec![Diagnostic::BacklogItemNotFound { id: 9 }]
        );
    }

    #[test]
    fn unfetched_child_is_dropped_with_a_diagnostic() {
        let (builder, diagnostics) = builder();
        let forest = builder.build("S", &[link(1, 2)], &[raw(1)]).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert!(forest[0].children.is_empty());
        assert_eq!(
            diagnostics.events(),
            vec![Diagnostic::ChildItemNotFound { parent: 1, id: 2 }]
        );
    }

    #[test]
    fn links_without_source_only_mark_items_of_interest() {
        let (builder, _) = builder();
        let links = [Link::new(None, Some(1)), link(1, 2), Link::new(Some(1), None)];
        let forest = builder.build("S", &links, &[raw(1), raw(2)]).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert_eq!(ids(&forest[0].children), vec![2]);
    }

    #[test]
    fn top_level_items_without_children_are_not_roots() {
        let (builder, diagnostics) = builder();
        let links = [Link::new(None, Some(5))];
        let forest = builder.build("S", &links, &[raw(5)]).unwrap();

        assert!(forest.is_empty());
        assert!(diagnostics.events().is_empty());
    }

    #[test]
    fn hierarchy_is_capped_at_two_levels() {
        let (builder, _) = builder();
        let links = [link(1, 2), link(2, 3)];
        let forest = builder.build("S", &links, &[raw(1), raw(2), raw(3)]).unwrap();

        assert_eq!(ids(&forest), vec![1, 2]);
        assert!(forest[0].children.is_empty());
        assert_eq!(ids(&forest[1].children), vec![3]);
        assert!(forest[1].children[0].children.is_empty());
    }

    #[test]
    fn duplicate_links_do_not_duplicate_roots_or_children() {
        let (builder, _) = builder();
        let links = [link(1, 2), link(1, 2), link(1, 3)];
        let forest = builder.build("S", &links, &[raw(1), raw(2), raw(3)]).unwrap();

        assert_eq!(ids(&forest), vec![1]);
        assert_eq!(ids(&forest[0].children), vec![2, 3]);
    }

    #[test]
    fn one_invalid_record_fails_the_batch() {
        let (builder, _) = builder();
        let mut broken = raw(2);
        if let Some(item) = broken.as_mut() {
            item.url = Some("   ".into());
        }
        let result = builder.build("S", &[link(1, 2)], &[raw(1), broken]);
        assert!(matches!(
            result,
            Err(ReportError::InvalidSourceRecord { id: Some(2), .. })
        ));
    }

    #[test]
    fn null_record_fails_the_batch() {
        let (builder, _) = builder();
        let result = builder.build("S", &[link(1, 2)], &[raw(1), None]);
        assert!(matches!(result, Err(ReportError::InvalidSourceRecord { .. })));
    }

    #[test]
    fn collects_sources_and_items_of_interest() {
        let ids = collect_ids(&[Link::new(None, Some(4)), link(1, 2), link(1, 3)]);
        assert_eq!(ids.sources.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(ids.all.iter().copied().collect::<Vec<_>>(), vec![4, 1, 2, 3]);
    }
}
