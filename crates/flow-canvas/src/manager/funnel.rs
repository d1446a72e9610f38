//! Funnel rendering

use crate::geometry::Point;
use crate::manager::Renderable;
use crate::types::FunnelEntity;

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelView {
    pub position: Point,
    pub culled: bool,
    pub editable: bool,
}

impl Renderable for FunnelEntity {
    type View = FunnelView;

    fn render(&self, visible: bool) -> FunnelView {
        FunnelView {
            position: self.position,
            culled: !visible,
            editable: self.permissions.can_write,
        }
    }
}
