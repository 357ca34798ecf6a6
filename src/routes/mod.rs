mod auth;
mod health_check;

pub use auth::{
    get_current_user, list_sessions, login, logout, refresh, register, revoke_all,
    AuthResponse, UserResponse,
};
pub use health_check::health_check;
