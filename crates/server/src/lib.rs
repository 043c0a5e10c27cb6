#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/turnout-rs/turnout/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod metrics;
pub use metrics::{GatewayMetrics, metrics_handler, metrics_router, record_http_request};

mod proxy;
pub use proxy::{ProxyState, proxy_router};
