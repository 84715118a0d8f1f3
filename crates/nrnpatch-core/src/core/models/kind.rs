use phf::{Map, phf_map};

/// The wrapper family a foreign object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Section,
    SectionRef,
    NetCon,
    NetStim,
    VecStim,
    Vector,
    /// Any point process without a dedicated wrapper (synapses, custom mechanisms).
    PointProcess,
    IClamp,
    SEClamp,
    ParallelContext,
    /// An object of a template the library has no wrapper for.
    Generic,
}

#[rustfmt::skip]
static TEMPLATE_KINDS: Map<&'static str, ObjectKind> = phf_map! {
    "Section" => ObjectKind::Section,
    "SectionRef" => ObjectKind::SectionRef,
    "NetCon" => ObjectKind::NetCon,
    "NetStim" => ObjectKind::NetStim,
    "VecStim" => ObjectKind::VecStim,
    "Vector" => ObjectKind::Vector,
    "IClamp" => ObjectKind::IClamp,
    "SEClamp" => ObjectKind::SEClamp,
    "ParallelContext" => ObjectKind::ParallelContext,
};

impl ObjectKind {
    /// Classifies an object by the template it was created from.
    ///
    /// Templates without a dedicated wrapper are point processes when the
    /// interpreter says so, and generic objects otherwise.
    pub fn from_template(template: &str, is_point_process: bool) -> Self {
        match TEMPLATE_KINDS.get(template) {
            Some(kind) => *kind,
            None if is_point_process => ObjectKind::PointProcess,
            None => ObjectKind::Generic,
        }
    }

    /// Whether objects of this kind can be an endpoint of a NetCon.
    pub fn is_connectable(self) -> bool {
        matches!(
            self,
            ObjectKind::Section
                | ObjectKind::NetStim
                | ObjectKind::VecStim
                | ObjectKind::PointProcess
                | ObjectKind::IClamp
                | ObjectKind::SEClamp
        )
    }

    pub fn is_point_process(self) -> bool {
        matches!(
            self,
            ObjectKind::PointProcess | ObjectKind::IClamp | ObjectKind::SEClamp
        )
    }
}
