use super::ids::ObjectId;
use std::collections::BTreeMap;

/// Wrapper-specific bookkeeping attached to a registry entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Facet {
    #[default]
    None,
    Section(SectionFacet),
    NetCon(NetConFacet),
    VecStim(VecStimFacet),
    Parallel(ParallelFacet),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionFacet {
    /// Recording vectors keyed by the bit pattern of their arc position.
    pub recordings: BTreeMap<u64, ObjectId>,
    pub synapses: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetConFacet {
    pub source: Option<ObjectId>,
    pub target: Option<ObjectId>,
    pub recorder: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecStimFacet {
    pub pattern: Option<Vec<f64>>,
    pub vector: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelFacet {
    /// Highest transfer key registered on this node, `-1` when none was.
    pub transfer_max: i64,
    /// Set when transfer variables were registered since the last `setup_transfer`.
    pub transfer_pending: bool,
}

impl Default for ParallelFacet {
    fn default() -> Self {
        Self {
            transfer_max: -1,
            transfer_pending: false,
        }
    }
}
