//! Value types of the unified alerting model.

pub mod amconfig;
pub mod duration;
pub mod rule;
pub mod silence;

pub use amconfig::{
    MatchType, Matcher, PostableApiReceiver, PostableGrafanaReceiver, PostableUserConfig, Route,
};
pub use duration::Duration;
pub use rule::{AlertQuery, AlertRule, ExecutionErrorState, NoDataState, RelativeTimeRange};
pub use silence::MeshSilence;
