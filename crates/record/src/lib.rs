pub mod builder;
pub mod domain;
pub mod model;

pub use builder::{build_cookie_event, build_element_event, build_request_event};
pub use domain::{base_domain, domain_of, is_third_party};
pub use model::{ActionMask, EngineRule, FilterEvent, RequestType, RuleKind, RuleSnapshot};
