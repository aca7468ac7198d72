//! HTTP handlers.

mod auth;
mod misc;

pub use auth::{
    CodeResponse, LoginForm, LoginResponse, SUCCESS_CODE, UserInfoResponse, get_user_info, login,
    logout, protected_route,
};
pub use misc::ping;
