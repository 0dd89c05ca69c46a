mod middleware;
mod public;

pub use middleware::RequestId;
pub use public::{HttpState, build_router};
