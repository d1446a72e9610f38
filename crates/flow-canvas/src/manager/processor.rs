//! Processor rendering
//!
//! Culled processors keep only their position; the text rows are dropped
//! until the processor scrolls back into view. Unreadable processors render
//! as an unauthorized placeholder.

use std::collections::BTreeSet;

use crate::geometry::Point;
use crate::manager::Renderable;
use crate::types::{ProcessorEntity, ProcessorState};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorView {
    pub position: Point,
    pub culled: bool,
    pub unauthorized: bool,
    pub name: Option<String>,
    pub processor_type: Option<String>,
    pub state: Option<ProcessorState>,
}

impl Renderable for ProcessorEntity {
    type View = ProcessorView;

    fn render(&self, visible: bool) -> ProcessorView {
        let details = self.component.as_ref().filter(|_| self.permissions.can_read);
        let detailed = details.filter(|_| visible);

        ProcessorView {
            position: self.position,
            culled: !visible,
            unauthorized: details.is_none(),
            name: detailed.map(|d| d.name.clone()),
            processor_type: detailed.map(|d| short_type(&d.processor_type).to_string()),
            state: detailed.map(|d| d.state),
        }
    }
}

/// Unqualified type name, e.g. `GenerateFlowFile` for `org.example.GenerateFlowFile`
fn short_type(processor_type: &str) -> &str {
    processor_type.rsplit('.').next().unwrap_or(processor_type)
}

/// Names of the relationships the processor currently offers
pub fn relationship_names(processor: &ProcessorEntity) -> BTreeSet<String> {
    processor
        .component
        .as_ref()
        .map(|d| d.relationships.iter().map(|r| r.name.clone()).collect())
        .unwrap_or_default()
}
