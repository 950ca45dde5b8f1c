pub mod auth;
pub mod permissions;
pub mod rate_limit;
pub mod real_ip;
pub mod recover;
pub mod response;

pub use auth::{authenticate, CurrentUser, Identity};
pub use permissions::{require_activated_user, require_authenticated_user, require_permission, PermissionGate};
pub use rate_limit::{rate_limit, RateLimiter};
pub use real_ip::{real_ip, ClientIp};
pub use recover::handle_panic;
pub use response::{ApiResponse, ApiResult};
