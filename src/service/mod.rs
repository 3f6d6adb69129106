pub mod extension;
pub mod lifecycle;
pub mod password;
pub mod provisioning;
pub mod provisioning_actor;
pub mod template_loader;
pub mod users;
