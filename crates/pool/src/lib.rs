#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/turnout-rs/turnout/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod endpoint;
pub use endpoint::{Endpoint, EndpointPool, EndpointStatus};

mod metrics;
pub use metrics::{
    record_probe_duration, record_probe_failure, record_rate_limit, set_current_best,
    set_endpoint_active, set_endpoint_block_number, set_endpoint_latency,
};

mod probe;
pub use probe::Prober;

mod publisher;
pub use publisher::CurrentBest;

mod scheduler;
pub use scheduler::{Scheduler, SelectorTrigger, selector_trigger};

mod selector;
pub use selector::Selector;
