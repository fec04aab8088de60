pub mod collect;
pub mod env;
pub mod extract;
pub mod fetch;
pub mod http_cache;
pub mod loader;
pub mod memo_cache;
pub mod provisioner;
pub mod routed;
pub mod source;
pub mod token;
pub mod tracing;
pub mod utils;
pub mod validate;
