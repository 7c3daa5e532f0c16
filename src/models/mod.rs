pub mod attendance;
pub mod change_event;
pub mod member;
