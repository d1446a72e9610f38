//! Remote process group rendering

use crate::geometry::Point;
use crate::manager::Renderable;
use crate::types::RemoteProcessGroupEntity;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProcessGroupView {
    pub position: Point,
    pub culled: bool,
    pub unauthorized: bool,
    pub name: Option<String>,
    pub target_uris: Option<String>,
    pub transmitting: bool,
    /// Ports the remote instance stopped exposing
    pub missing_ports: usize,
}

impl Renderable for RemoteProcessGroupEntity {
    type View = RemoteProcessGroupView;

    fn render(&self, visible: bool) -> RemoteProcessGroupView {
        let details = self.component.as_ref().filter(|_| self.permissions.can_read);
        let detailed = details.filter(|_| visible);

        RemoteProcessGroupView {
            position: self.position,
            culled: !visible,
            unauthorized: details.is_none(),
            name: detailed.map(|d| d.name.clone()),
            target_uris: detailed.map(|d| d.target_uris.clone()),
            transmitting: details.map(|d| d.transmitting).unwrap_or(false),
            missing_ports: detailed
                .map(|d| {
                    d.input_ports
                        .iter()
                        .chain(d.output_ports.iter())
                        .filter(|p| !p.exists)
                        .count()
                })
                .unwrap_or(0),
        }
    }
}
