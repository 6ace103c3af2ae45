//! Capability lookup for the host's `GetComponent` query.

use wavry_vr::RenderBackend;

use crate::display::DisplayComponent;

pub const DISPLAY_COMPONENT_VERSION: &str = "IVRDisplayComponent_003";
pub const DIRECT_MODE_COMPONENT_VERSION: &str = "IVRDriverDirectModeComponent_008";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Display,
    DirectMode,
}

const COMPONENTS: &[(&str, ComponentKind)] = &[
    (DISPLAY_COMPONENT_VERSION, ComponentKind::Display),
    (DIRECT_MODE_COMPONENT_VERSION, ComponentKind::DirectMode),
];

/// Maps a host component identifier to the capability it names.
pub fn component_kind(name: &str) -> Option<ComponentKind> {
    let name = name.trim_end_matches('\0');
    COMPONENTS
        .iter()
        .find(|(id, _)| *id == name)
        .map(|(_, kind)| *kind)
}

/// Handle to a capability a device exposes.
#[derive(Clone, Copy)]
pub enum Component<'a> {
    Display(&'a dyn DisplayComponent),
    DirectMode(&'a dyn RenderBackend),
}

impl Component<'_> {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Display(_) => ComponentKind::Display,
            Component::DirectMode(_) => ComponentKind::DirectMode,
        }
    }
}

impl std::fmt::Debug for Component<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::Display(_) => write!(f, "Display"),
            Component::DirectMode(backend) => write!(f, "DirectMode({})", backend.name()),
        }
    }
}
