mod addon;
mod addon_instance;
mod addon_operator;
mod condition;
mod object_deployment;
mod object_set;
mod olm;

pub use addon::*;
pub use addon_instance::*;
pub use addon_operator::*;
pub use condition::*;
pub use object_deployment::*;
pub use object_set::*;
pub use olm::*;
