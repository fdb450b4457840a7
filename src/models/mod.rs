pub mod billing;
pub mod invoice;
pub mod member;
pub mod subscription;
