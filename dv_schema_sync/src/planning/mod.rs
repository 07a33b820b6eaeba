pub mod plan;
pub mod planner;

pub use plan::{
    MissingEntityPlan, NativeFieldReplacement, PlannedAlternateKeyAddition,
    PlannedAlternateKeyRemoval, PlannedAttributeAddition, PlannedAttributeRemoval,
    PlannedRelationshipAddition, PlannedRelationshipRemoval, SchemaChangePlan,
    SchemaChangePlanSummary,
};
pub use planner::{should_propose_attribute_removal, ChangePlanner};
