//! Backend endpoint paths

pub(crate) const AUTH_APPLE: &str = "/auth/apple";
pub(crate) const AUTH_REFRESH: &str = "/auth/refresh";
pub(crate) const AUTH_VALIDATE: &str = "/auth/validate";
pub(crate) const USERS_ME: &str = "/api/users/me";
pub(crate) const USERS_CREDITS: &str = "/api/users/credits";
pub(crate) const TRANSFORM: &str = "/api/transform";
pub(crate) const TRANSFORM_HISTORY: &str = "/api/transform/history";
pub(crate) const PACKAGES: &str = "/api/packages";
pub(crate) const CREDITS_PURCHASE: &str = "/api/credits/purchase";
pub(crate) const CREDITS_SUBSCRIPTION: &str = "/api/credits/subscription";
pub(crate) const CREDITS_HISTORY: &str = "/api/credits/history";
pub(crate) const HEALTH: &str = "/health";
pub(crate) const ROOT: &str = "/";
